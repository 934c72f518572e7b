//! Config command implementation.

use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;

/// Print the effective configuration.
pub async fn execute_config(config: &Config, formatter: &Formatter) -> Result<()> {
    println!("{}", formatter.format_config(config)?);
    Ok(())
}
