//! Command-line front end: one module per mode.

pub mod app;
pub mod decompress;
pub mod decrypt;
pub mod extract;
pub mod rebuild;
