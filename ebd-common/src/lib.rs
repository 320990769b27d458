//! # Event-Based Data Common Library
//!
//! Shared code for the event-based data service:
//! - Error type shared by the database and configuration layers
//! - Configuration loading and root folder resolution
//! - Database initialization (schema for stations, channels, files,
//!   channel metadata, waveform channels and events)
//! - Timestamp helpers for the text representation stored in SQLite

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
