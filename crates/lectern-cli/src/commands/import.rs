//! Import command implementation.

use crate::cli::ImportArgs;
use crate::error::Result;
use crate::output::Formatter;
use lectern_store::{GraphSnapshot, SqliteGraphStore};
use tracing::info;

/// Execute the import command.
///
/// Returns the number of slides stored after the import.
pub async fn execute_import(args: ImportArgs, formatter: &Formatter) -> Result<usize> {
    let snapshot = GraphSnapshot::load(&args.snapshot)?;
    let store = SqliteGraphStore::new(&args.db)?;
    store.import_snapshot(&snapshot)?;
    let slides = store.slide_count()?;

    info!(db = %args.db.display(), slides, "Snapshot imported");
    println!(
        "{}",
        formatter.success(&format!(
            "Imported {} course(s) and {} annotation(s) into {} ({} slides stored)",
            snapshot.courses.len(),
            snapshot.annotations.len(),
            args.db.display(),
            slides
        ))
    );
    Ok(slides)
}
