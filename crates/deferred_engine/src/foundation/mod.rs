//! Foundation utilities shared across the engine

pub mod logging;
pub mod memory;
pub mod profiling;
pub mod time;
