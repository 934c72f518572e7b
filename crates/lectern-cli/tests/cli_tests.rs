//! Tests for the command layer over a file-backed store

use lectern_cli::cli::{ImportArgs, PlanArgs};
use lectern_cli::commands::generate::{fill_course_slides, load_request};
use lectern_cli::commands::{execute_import, execute_plan, run_generation};
use lectern_cli::config::{Config, OutputFormat};
use lectern_cli::{CliError, Formatter};
use lectern_domain::SlideId;
use lectern_engine::{EngineConfig, EngineError, REVIEW_SECTION_TITLE};
use lectern_llm::MockProvider;
use lectern_store::{SqliteGraphStore, StoreError};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SNAPSHOT: &str = r#"{
    "courses": [
        {
            "course_id": "hr-100",
            "title": "Onboarding",
            "business_unit": "HR",
            "slides": [
                {"slide_id": "h1", "page": 1},
                {"slide_id": "h2", "page": 2}
            ]
        }
    ],
    "annotations": [
        {"slide_id": "h1", "term": "Badge Access", "salience": 0.9},
        {"slide_id": "h2", "term": "Payroll", "salience": 0.8}
    ]
}"#;

const REQUEST: &str = r#"{
    "courses": [
        {
            "course_id": "hr-100",
            "title": "Onboarding",
            "business_unit": "HR",
            "outline": {
                "type": "sections",
                "sections": [
                    {"title": "Getting In", "start_page": 1},
                    {"title": "Getting Paid", "start_page": 2}
                ]
            }
        }
    ]
}"#;

fn formatter() -> Formatter {
    Formatter::new(OutputFormat::Quiet, false)
}

async fn imported_db(dir: &TempDir) -> std::path::PathBuf {
    let snapshot = dir.path().join("graph.json");
    let db = dir.path().join("graph.db");
    fs::write(&snapshot, SNAPSHOT).unwrap();
    let slides = execute_import(
        ImportArgs {
            snapshot,
            db: db.clone(),
        },
        &formatter(),
    )
    .await
    .unwrap();
    assert_eq!(slides, 2);
    db
}

#[tokio::test]
async fn test_import_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let db = imported_db(&dir).await;

    let slides = execute_import(
        ImportArgs {
            snapshot: dir.path().join("graph.json"),
            db: db.clone(),
        },
        &formatter(),
    )
    .await
    .unwrap();
    assert_eq!(slides, 2);
}

#[tokio::test]
async fn test_missing_snapshot_file() {
    let dir = TempDir::new().unwrap();
    let result = execute_import(
        ImportArgs {
            snapshot: dir.path().join("absent.json"),
            db: dir.path().join("graph.db"),
        },
        &formatter(),
    )
    .await;
    assert!(matches!(result, Err(CliError::Store(_))));
}

#[tokio::test]
async fn test_request_without_slides_selects_stored_slides() {
    let dir = TempDir::new().unwrap();
    let db = imported_db(&dir).await;
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, REQUEST).unwrap();

    let store = SqliteGraphStore::new(&db).unwrap();
    let mut request = load_request(&request_path).unwrap();
    fill_course_slides(&mut request, &store).unwrap();

    let ids: Vec<SlideId> = request.courses[0]
        .slides
        .iter()
        .map(|s| s.slide_id.clone())
        .collect();
    assert_eq!(ids, vec![SlideId::new("h1"), SlideId::new("h2")]);
    assert_eq!(request.courses[0].slides[1].page, Some(2));
}

#[tokio::test]
async fn test_unknown_course_is_reported() {
    let dir = TempDir::new().unwrap();
    let db = imported_db(&dir).await;
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, REQUEST.replace("hr-100", "hr-999")).unwrap();

    let store = SqliteGraphStore::new(&db).unwrap();
    let mut request = load_request(&request_path).unwrap();
    let result = fill_course_slides(&mut request, &store);
    assert!(matches!(result, Err(CliError::Store(StoreError::NotFound(_)))));
}

#[tokio::test]
async fn test_generation_over_imported_db() {
    let dir = TempDir::new().unwrap();
    let db = imported_db(&dir).await;
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, REQUEST).unwrap();

    let store = SqliteGraphStore::new(&db).unwrap();
    let mut request = load_request(&request_path).unwrap();
    fill_course_slides(&mut request, &store).unwrap();

    // A single course is never sent to the merger; clustering answers with no clusters
    let llm = Arc::new(MockProvider::new("[]"));
    let outcome = run_generation(
        Arc::clone(&llm),
        Arc::new(store),
        &request,
        EngineConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let titles: Vec<&str> = outcome.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Getting In", "Getting Paid"]);
    assert!(!titles.contains(&REVIEW_SECTION_TITLE));
    assert!(outcome.assignment.unassigned.is_empty());
    assert_eq!(outcome.summary.merge_calls, 0);
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_generation_respects_cancellation() {
    let dir = TempDir::new().unwrap();
    let db = imported_db(&dir).await;
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, REQUEST).unwrap();

    let store = SqliteGraphStore::new(&db).unwrap();
    let mut request = load_request(&request_path).unwrap();
    fill_course_slides(&mut request, &store).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = run_generation(
        Arc::new(MockProvider::new("[]")),
        Arc::new(store),
        &request,
        EngineConfig::default(),
        &cancel,
    )
    .await;
    assert!(matches!(result, Err(CliError::Engine(EngineError::Aborted(_)))));
}

#[tokio::test]
async fn test_plan_with_file_config() {
    let config = Config::from_toml_str("[engine]\ncontext_size = 16384").unwrap();
    let plan = execute_plan(PlanArgs { context_size: None }, &config, &formatter())
        .await
        .unwrap();
    assert_eq!(plan.context_size, 16384);
}
