//! Adapters Layer
//!
//! Ports connecting the domain to the embedding runtime.
//!
//! - `global`: the process-wide scheduler and its free-function interface

pub mod global;
