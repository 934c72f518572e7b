//! Generate command implementation.

use crate::cli::GenerateArgs;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use lectern_domain::traits::LlmProvider;
use lectern_engine::{
    CurriculumGenerator, EngineConfig, GenerationOutcome, GenerationRequest, LlmConceptClusterer,
    LlmOutlineExtractor, LlmOutlineMerger, SlideRef,
};
use lectern_llm::OllamaProvider;
use lectern_store::{GraphSnapshot, SqliteGraphStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Execute the generate command.
pub async fn execute_generate(args: GenerateArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let store = open_store(&args)?;
    let mut request = load_request(&args.request)?;
    fill_course_slides(&mut request, &store)?;

    let provider = build_provider(config, args.model.clone()).await?;
    info!(endpoint = %config.llm.base_url, model = provider.model(), "Using Ollama");

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling generation");
            watcher.cancel();
        }
    });

    let outcome = run_generation(
        Arc::new(provider),
        Arc::new(store),
        &request,
        config.engine.clone(),
        &cancel,
    )
    .await?;

    if let Some(path) = &args.output {
        fs::write(path, serde_json::to_string_pretty(&outcome)?)?;
        eprintln!(
            "{}",
            formatter.info(&format!("Outcome written to {}", path.display()))
        );
    }

    println!("{}", formatter.format_outcome(&outcome)?);
    if !outcome.summary.warnings.is_empty() {
        eprintln!(
            "{}",
            formatter.warning(&format!(
                "Completed with {} warning(s)",
                outcome.summary.warnings.len()
            ))
        );
    }
    Ok(())
}

/// Run one generation with LLM-backed capabilities over `llm` and the graph in `store`.
pub async fn run_generation<L>(
    llm: Arc<L>,
    store: Arc<SqliteGraphStore>,
    request: &GenerationRequest,
    engine: EngineConfig,
    cancel: &CancellationToken,
) -> Result<GenerationOutcome>
where
    L: LlmProvider + Send + Sync + 'static,
{
    let generator = CurriculumGenerator::new(
        Arc::new(LlmOutlineExtractor::new(Arc::clone(&llm))),
        Arc::new(LlmConceptClusterer::new(Arc::clone(&llm))),
        Arc::new(LlmOutlineMerger::new(llm)),
        Arc::clone(&store),
        store,
        engine,
    );
    Ok(generator.generate(request, cancel).await?)
}

/// Read a request file.
pub fn load_request(path: &Path) -> Result<GenerationRequest> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Courses that list no slides select every slide the store holds for them.
pub fn fill_course_slides(request: &mut GenerationRequest, store: &SqliteGraphStore) -> Result<()> {
    for course in request.courses.iter_mut().filter(|c| c.slides.is_empty()) {
        course.slides = store
            .course_slides(&course.course_id)?
            .into_iter()
            .map(|s| SlideRef::new(s.slide_id, s.page))
            .collect();
        info!(course = %course.course_id, slides = course.slides.len(), "Selected all stored slides");
    }
    Ok(())
}

/// The blocking HTTP client must be built off the async runtime.
async fn build_provider(config: &Config, model: Option<String>) -> Result<OllamaProvider> {
    let base_url = config.llm.base_url.clone();
    let model = model.unwrap_or_else(|| config.llm.model.clone());
    let timeout = config.engine.call_timeout();
    let max_retries = config.llm.max_retries;
    let num_ctx = config.num_ctx()?;

    let provider = tokio::task::spawn_blocking(move || {
        OllamaProvider::with_timeout(base_url, model, timeout).map(|p| {
            p.with_max_retries(max_retries).with_num_ctx(num_ctx)
        })
    })
    .await
    .map_err(|e| CliError::Config(format!("Provider setup failed: {}", e)))??;
    Ok(provider)
}

fn open_store(args: &GenerateArgs) -> Result<SqliteGraphStore> {
    match (&args.db, &args.snapshot) {
        (Some(db), _) => Ok(SqliteGraphStore::new(db)?),
        (None, Some(snapshot)) => {
            let store = SqliteGraphStore::in_memory()?;
            store.import_snapshot(&GraphSnapshot::load(snapshot)?)?;
            Ok(store)
        }
        (None, None) => Err(CliError::InvalidInput(
            "either --db or --snapshot is required".to_string(),
        )),
    }
}
