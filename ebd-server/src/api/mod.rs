//! HTTP API handlers for ebd-server

pub mod event;
pub mod files;
pub mod health;
pub mod station;
pub mod waveform;

pub use event::event_routes;
pub use files::file_routes;
pub use health::health_routes;
pub use station::station_routes;
pub use waveform::waveform_routes;
