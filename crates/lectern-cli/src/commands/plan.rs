//! Plan command implementation.

use crate::cli::PlanArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use lectern_engine::BudgetPlan;

/// Execute the plan command.
pub async fn execute_plan(args: PlanArgs, config: &Config, formatter: &Formatter) -> Result<BudgetPlan> {
    let context_size = args.context_size.unwrap_or(config.engine.context_size);
    let plan = BudgetPlan::plan(context_size)?;
    println!("{}", formatter.format_plan(&plan)?);
    Ok(plan)
}
