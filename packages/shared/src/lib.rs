//! Utilities shared by the Moyeo packages.

pub mod logger;
pub mod time;
