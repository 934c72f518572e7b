//! Command implementations.

pub mod config;
pub mod generate;
pub mod import;
pub mod plan;

pub use self::config::execute_config;
pub use self::generate::{execute_generate, run_generation};
pub use self::import::execute_import;
pub use self::plan::execute_plan;
