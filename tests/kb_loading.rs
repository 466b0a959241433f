//! Knowledge base download, caching and parsing.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use reqwest::Client;

use sreagent::kb::fetch::CLIENT_ID;
use sreagent::kb::{self, lookup, Classifier, KbError, KbLoader, Provenance};

const FAN_OUT_CSV: &str = "Incident Type,CWE-ID,CWE Title,Description,Example CVEs\n\
A; B,X-1,Shared Weakness,Both map here,CVE-1; CVE-2\n\
Disk Usage High,CWE-770,Allocation Without Limits,Disk fills,\n";

#[derive(Clone, Default)]
struct Served {
    body: Arc<Mutex<Option<String>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
}

async fn kb_file(State(s): State<Served>, headers: HeaderMap) -> (StatusCode, String) {
    if let Some(ua) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        s.user_agents.lock().unwrap().push(ua.to_string());
    }
    match s.body.lock().unwrap().clone() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "broken".to_string()),
    }
}

async fn serve(served: Served) -> String {
    let app = Router::new()
        .route("/kb.csv", get(kb_file))
        .with_state(served);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/kb.csv")
}

fn workbook_fixture() -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cwe_mapping.xlsx");
    std::fs::read(path).unwrap()
}

fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/kb.csv")
}

#[tokio::test]
async fn cached_copy_is_used_without_download() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kb.csv"), FAN_OUT_CSV).unwrap();

    let loader = KbLoader::new(Client::new(), unreachable_url(), dir.path(), "kb.csv");
    let table = loader.load(false).await.unwrap();

    let a = lookup("A", &table);
    let b = lookup("B", &table);
    assert_eq!(a, b);
    assert_eq!(a.code, "X-1");
    assert_eq!(a.example_references, vec!["CVE-1", "CVE-2"]);
    assert_eq!(a.provenance, Provenance::KnowledgeBase);
    assert!(table.contains("Unknown Incident"));
    // Case-sensitive keys: a miss lands on the unknown entry.
    assert_eq!(lookup("a", &table), lookup("Unknown Incident", &table));
}

#[tokio::test]
async fn missing_code_column_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kb.csv"),
        "Incident Type,Title\nCPU Spike,Something\n",
    )
    .unwrap();

    let loader = KbLoader::new(Client::new(), unreachable_url(), dir.path(), "kb.csv");
    match loader.load(false).await {
        Err(KbError::MissingCodeColumn { columns, .. }) => {
            assert_eq!(columns, vec!["Incident Type", "Title"]);
        }
        other => panic!("expected MissingCodeColumn, got {other:?}"),
    }

    // The classifier falls back to the built-in table.
    let classifier = Classifier::resolve(Some(&loader), false).await;
    assert_eq!(classifier.provenance(), Provenance::LocalFallback);
    assert_eq!(classifier.classify("CPU Spike").code, "CWE-400");
}

#[tokio::test]
async fn forced_refresh_downloads_and_identifies_itself() {
    let served = Served::default();
    *served.body.lock().unwrap() = Some(FAN_OUT_CSV.to_string());
    let url = serve(served.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("nested");

    let loader = KbLoader::new(Client::new(), url, &cache, "kb.csv");
    let table = loader.load(true).await.unwrap();

    assert_eq!(lookup("Disk Usage High", &table).code, "CWE-770");
    assert!(cache.join("kb.csv").exists());
    assert_eq!(*served.user_agents.lock().unwrap(), vec![CLIENT_ID.to_string()]);

    // A second non-forced load reads the cache.
    loader.load(false).await.unwrap();
    assert_eq!(served.user_agents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_cache() {
    let served = Served::default();
    let url = serve(served.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let cached = dir.path().join("kb.csv");
    std::fs::write(&cached, FAN_OUT_CSV).unwrap();

    let loader = KbLoader::new(Client::new(), url, dir.path(), "kb.csv");
    let err = loader.load(true).await.unwrap_err();
    assert!(matches!(err, KbError::Download(_)), "{err}");

    assert_eq!(std::fs::read_to_string(&cached).unwrap(), FAN_OUT_CSV);
    let table = loader.load(false).await.unwrap();
    assert_eq!(lookup("B", &table).code, "X-1");
}

#[tokio::test]
async fn concurrent_refreshes_see_whole_files() {
    let served = Served::default();
    *served.body.lock().unwrap() = Some(FAN_OUT_CSV.to_string());
    let url = serve(served).await;
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(KbLoader::new(Client::new(), url, dir.path(), "kb.csv"));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load(true).await })
        })
        .collect();
    for task in tasks {
        let table = task.await.unwrap().unwrap();
        assert_eq!(lookup("A", &table).code, "X-1");
    }
}

#[tokio::test]
async fn cached_workbook_loads_mapping_sheet() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("CWE_Knowledge_Base.xlsx"), workbook_fixture()).unwrap();

    let table = kb::load(&unreachable_url(), dir.path(), "CWE_Knowledge_Base.xlsx", false)
        .await
        .unwrap();

    assert_eq!(table.source(), "CWE_Knowledge_Base.xlsx::CWE_Mapping");
    assert_eq!(lookup("A", &table), lookup("B", &table));
    assert_eq!(lookup("A", &table).code, "X-1");
    assert_eq!(lookup("A", &table).source.as_deref(), Some("CWE_Knowledge_Base.xlsx::CWE_Mapping"));
    // Numeric code cells are rendered as text.
    assert_eq!(lookup("CPU Spike", &table).code, "400");
    // The row with a blank code is skipped.
    assert!(!table.contains("Orphan"));
}

#[tokio::test]
async fn forced_load_downloads_workbook() {
    let body = workbook_fixture();
    let app = Router::new().route("/kb.xlsx", get(move || {
        let body = body.clone();
        async move { body }
    }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let dir = tempfile::tempdir().unwrap();

    let table = kb::load(&format!("http://{addr}/kb.xlsx"), dir.path(), "kb.xlsx", true)
        .await
        .unwrap();

    assert!(dir.path().join("kb.xlsx").exists());
    assert_eq!(table.source(), "kb.xlsx::CWE_Mapping");
    assert_eq!(lookup("B", &table).example_references, vec!["CVE-1", "CVE-2"]);
}
