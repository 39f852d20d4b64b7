//! Data models

pub mod detection;

pub use detection::*;
