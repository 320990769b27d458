//! Business logic behind the HTTP handlers

pub mod beachball;
pub mod upload;
