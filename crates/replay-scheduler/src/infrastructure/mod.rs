//! Infrastructure Layer
//!
//! Everything that touches the outside world:
//!
//! ```text
//! infrastructure/
//! ├── config.rs         SchedulerConfig, environment loading
//! ├── schedule_file.rs  JSON schedule load/store
//! └── telemetry.rs      tracing-subscriber bootstrap
//! ```

pub mod config;
pub mod schedule_file;
pub mod telemetry;

pub use config::SchedulerConfig;
