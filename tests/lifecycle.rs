use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use tempfile::TempDir;

use metrics_tracker_lib::commands::{metrics, records, settings};
use metrics_tracker_lib::db::provision::VerifyStatus;
use metrics_tracker_lib::db::repository;
use metrics_tracker_lib::db::schema;
use metrics_tracker_lib::db::StoreKind;
use metrics_tracker_lib::dialog::{Confirm, DirectoryPicker, Notice, NoticeLevel, Notifier, Prompt};
use metrics_tracker_lib::models::{Metric, NewMetric, NewWeight, Weight};
use metrics_tracker_lib::settings::{JsonSettingsStore, RootPath, SettingsStore};
use metrics_tracker_lib::{App, AppConfig, AppError, Collaborators, StoreStatus};

struct ScriptedPicker {
    answers: Mutex<VecDeque<Option<PathBuf>>>,
    calls: AtomicUsize,
}

impl ScriptedPicker {
    fn new(answers: Vec<Option<PathBuf>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DirectoryPicker for ScriptedPicker {
    async fn pick_directory(&self) -> Option<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

struct CountingConfirm {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingConfirm {
    fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Confirm for CountingConfirm {
    async fn ask(&self, _prompt: &Prompt) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<Notice>>);

impl RecordingNotifier {
    fn errors(&self) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .count()
    }

    fn titles(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|n| n.title.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.0.lock().unwrap().push(notice.clone());
    }
}

struct Harness {
    app: App,
    picker: Arc<ScriptedPicker>,
    confirm: Arc<CountingConfirm>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(settings_file: &Path, picks: Vec<Option<PathBuf>>, confirm: bool) -> Harness {
    let picker = ScriptedPicker::new(picks);
    let confirm = CountingConfirm::new(confirm);
    let notifier = Arc::new(RecordingNotifier::default());
    let app = App::new(
        AppConfig::default(),
        Collaborators {
            settings: Arc::new(JsonSettingsStore::new(settings_file)),
            picker: picker.clone(),
            confirm: confirm.clone(),
            notifier: notifier.clone(),
        },
    );
    Harness {
        app,
        picker,
        confirm,
        notifier,
    }
}

struct Dirs {
    _tmp: TempDir,
    settings: PathBuf,
    root: PathBuf,
}

fn dirs() -> Dirs {
    let tmp = tempfile::tempdir().unwrap();
    let settings = tmp.path().join("config").join("store.json");
    let root = tmp.path().join("data");
    std::fs::create_dir_all(&root).unwrap();
    Dirs {
        settings,
        root,
        _tmp: tmp,
    }
}

fn march(day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
}

async fn ready(dirs: &Dirs) -> Harness {
    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], true);
    let report = settings::initialize(&h.app).await.unwrap();
    assert!(report.is_ready());
    h
}

#[tokio::test]
async fn test_first_run_prompts_and_creates_both_stores() {
    let dirs = dirs();
    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], true);

    let report = settings::initialize(&h.app).await.unwrap();

    assert_eq!(report.root, RootPath::new(&dirs.root));
    assert_eq!(report.records, Some(StoreStatus::Connected { created: true }));
    assert_eq!(report.definitions, Some(StoreStatus::Connected { created: true }));
    assert_eq!(h.picker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.confirm.asked.load(Ordering::SeqCst), 2);

    let records_path = dirs.root.join("db").join("my.db");
    let conn = Connection::open(&records_path).unwrap();
    assert!(schema::missing_tables(&conn, StoreKind::Records).unwrap().is_empty());
    let count: u32 = conn
        .query_row("SELECT COUNT(*) FROM weights", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
    assert!(dirs.root.join("db").join("metrics.db").exists());

    let saved = JsonSettingsStore::new(&dirs.settings)
        .get("setting-path")
        .await
        .unwrap();
    assert_eq!(saved, Some(dirs.root.display().to_string()));
    assert!(h.app.records().weights.is_empty());
}

#[tokio::test]
async fn test_second_run_reuses_saved_path_and_files() {
    let dirs = dirs();
    ready(&dirs).await;

    let h = harness(&dirs.settings, vec![], false);
    let report = settings::initialize(&h.app).await.unwrap();

    assert_eq!(report.records, Some(StoreStatus::Connected { created: false }));
    assert_eq!(report.definitions, Some(StoreStatus::Connected { created: false }));
    assert_eq!(h.picker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.confirm.asked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_repeated_initialize_is_idempotent() {
    let dirs = dirs();
    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], true);

    let (a, b) = tokio::join!(h.app.initialize(), h.app.initialize());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.root, b.root);
    assert_eq!(h.picker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.confirm.asked.load(Ordering::SeqCst), 2);

    let again = h.app.initialize().await.unwrap();
    assert_eq!(again.records, Some(StoreStatus::AlreadyConnected));
    assert_eq!(again.definitions, Some(StoreStatus::AlreadyConnected));
}

#[tokio::test]
async fn test_cancelled_picker_leaves_everything_untouched() {
    let dirs = dirs();
    let h = harness(&dirs.settings, vec![None], true);

    let report = settings::initialize(&h.app).await.unwrap();
    assert!(report.root.is_none());
    assert!(!report.is_ready());
    assert_eq!(h.confirm.asked.load(Ordering::SeqCst), 0);
    assert!(!dirs.settings.exists());
    assert!(settings::current_path(&h.app).await.is_none());
}

#[tokio::test]
async fn test_declined_store_is_unavailable() {
    let dirs = dirs();
    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], false);

    let report = settings::initialize(&h.app).await.unwrap();
    assert_eq!(report.records, Some(StoreStatus::Declined));
    assert!(!dirs.root.join("db").exists());

    let result = records::add_weight(
        &h.app,
        NewWeight {
            weight: 80.0,
            date: march(1),
        },
    )
    .await;
    assert!(matches!(
        result,
        Err(AppError::DataUnavailable(StoreKind::Records))
    ));
    assert!(h.app.records().weights.is_empty());
    assert_eq!(h.notifier.errors(), 1);
}

#[tokio::test]
async fn test_insert_weight_scenario() {
    let dirs = dirs();
    let h = ready(&dirs).await;

    let older = records::add_weight(&h.app, NewWeight { weight: 83.0, date: march(1) - chrono::Duration::days(10) })
        .await
        .unwrap();
    let inserted = records::add_weight(&h.app, NewWeight { weight: 82.5, date: march(1) })
        .await
        .unwrap();

    let ids: Vec<i64> = h.app.records().weights.snapshot().iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![inserted.id, older.id]);
    assert!(h.notifier.titles().contains(&"Data Inserted".to_string()));

    let conn = Connection::open(dirs.root.join("db").join("my.db")).unwrap();
    let rows = repository::select_all::<Weight>(&conn).unwrap().items;
    let row = rows.iter().find(|w| w.id == inserted.id).unwrap();
    assert_eq!(row, &Weight { id: inserted.id, weight: 82.5, date: march(1) });
}

#[tokio::test]
async fn test_invalid_weight_is_rejected_before_write() {
    let dirs = dirs();
    let h = ready(&dirs).await;

    let result = records::add_weight(&h.app, NewWeight { weight: -5.0, date: march(1) }).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let result = records::add_weight(&h.app, NewWeight { weight: 1200.0, date: march(1) }).await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    assert!(h.app.records().weights.is_empty());
    let conn = Connection::open(dirs.root.join("db").join("my.db")).unwrap();
    let count: u32 = conn
        .query_row("SELECT COUNT(*) FROM weights", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_update_and_delete_weights() {
    let dirs = dirs();
    let h = ready(&dirs).await;

    let a = records::add_weight(&h.app, NewWeight { weight: 80.0, date: march(1) }).await.unwrap();
    let b = records::add_weight(&h.app, NewWeight { weight: 81.0, date: march(2) }).await.unwrap();
    let c = records::add_weight(&h.app, NewWeight { weight: 82.0, date: march(3) }).await.unwrap();

    let edited = Weight { weight: 79.0, date: march(4), ..a.clone() };
    records::update_weight(&h.app, edited.clone()).await.unwrap();
    let once = h.app.records().weights.snapshot();
    records::update_weight(&h.app, edited.clone()).await.unwrap();
    assert_eq!(h.app.records().weights.snapshot(), once);
    assert_eq!(once[0], edited);

    let missing = Weight { id: 9999, ..edited.clone() };
    assert!(matches!(
        records::update_weight(&h.app, missing).await,
        Err(AppError::NotFound { table: "weights", id: 9999 })
    ));

    let deleted = records::delete_weights(&h.app, &[a.id, c.id, a.id, 4242]).await.unwrap();
    assert_eq!(deleted, 2);
    let remaining = h.app.records().weights.snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, b.id);

    assert_eq!(records::delete_weights(&h.app, &[]).await.unwrap(), 0);

    let conn = Connection::open(dirs.root.join("db").join("my.db")).unwrap();
    let count: u32 = conn
        .query_row("SELECT COUNT(*) FROM weights", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_metrics_iterate_by_category() {
    let dirs = dirs();
    let h = ready(&dirs).await;

    for category in ["Running", "Cycling"] {
        metrics::add_metric(
            &h.app,
            NewMetric {
                category: category.to_string(),
                kpi: "km/week".to_string(),
                date: None,
            },
        )
        .await
        .unwrap();
    }
    let categories: Vec<String> = h
        .app
        .definitions()
        .metrics
        .snapshot()
        .into_iter()
        .map(|m| m.category)
        .collect();
    assert_eq!(categories, vec!["Cycling", "Running"]);

    let empty = metrics::add_metric(
        &h.app,
        NewMetric {
            category: "  ".to_string(),
            kpi: "x".to_string(),
            date: None,
        },
    )
    .await;
    assert!(matches!(empty, Err(AppError::Validation(_))));
    assert_eq!(h.app.definitions().metrics.len(), 2);
}

#[tokio::test]
async fn test_update_and_delete_metric() {
    let dirs = dirs();
    let h = ready(&dirs).await;

    let metric = metrics::add_metric(
        &h.app,
        NewMetric {
            category: "Running".to_string(),
            kpi: "km".to_string(),
            date: Some(march(1)),
        },
    )
    .await
    .unwrap();

    let edited = metrics::update_metric(
        &h.app,
        Metric {
            category: " Swimming ".to_string(),
            ..metric.clone()
        },
    )
    .await
    .unwrap();
    assert_eq!(edited.category, "Swimming");
    assert_eq!(h.app.definitions().metrics.get(metric.id), Some(edited));

    assert_eq!(metrics::delete_metrics(&h.app, &[metric.id]).await.unwrap(), 1);
    assert!(h.app.definitions().metrics.is_empty());
}

#[tokio::test]
async fn test_hydration_loads_existing_rows() {
    let dirs = dirs();
    {
        let h = ready(&dirs).await;
        records::add_weight(&h.app, NewWeight { weight: 80.0, date: march(1) }).await.unwrap();
        records::add_weight(&h.app, NewWeight { weight: 81.0, date: march(5) }).await.unwrap();
        metrics::add_metric(
            &h.app,
            NewMetric {
                category: "Weight".to_string(),
                kpi: "kg".to_string(),
                date: None,
            },
        )
        .await
        .unwrap();
    }

    let h = harness(&dirs.settings, vec![], false);
    settings::initialize(&h.app).await.unwrap();

    let weights: Vec<f64> = h.app.records().weights.snapshot().iter().map(|w| w.weight).collect();
    assert_eq!(weights, vec![81.0, 80.0]);
    assert_eq!(h.app.definitions().metrics.len(), 1);
    assert!(h.app.records().kilometers.is_empty());
}

#[tokio::test]
async fn test_verify_recreates_missing_file() {
    let dirs = dirs();
    let h = ready(&dirs).await;

    let report = settings::verify_databases(&h.app).await.unwrap();
    assert!(report.all_present());
    assert!(h.notifier.titles().contains(&"Config Folder".to_string()));

    let definitions = dirs.root.join("db").join("metrics.db");
    for suffix in ["", "-wal", "-shm"] {
        let mut path = definitions.clone().into_os_string();
        path.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(path));
    }

    let report = settings::verify_databases(&h.app).await.unwrap();
    assert_eq!(report.records, VerifyStatus::Present);
    assert_eq!(report.definitions, VerifyStatus::Created);
    assert!(definitions.exists());

    metrics::add_metric(
        &h.app,
        NewMetric {
            category: "Running".to_string(),
            kpi: "km".to_string(),
            date: None,
        },
    )
    .await
    .unwrap();
    let conn = Connection::open(&definitions).unwrap();
    let count: u32 = conn
        .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_change_path_reloads_from_new_root() {
    let dirs = dirs();
    let other = dirs.root.parent().unwrap().join("other");
    std::fs::create_dir_all(&other).unwrap();

    let h = harness(&dirs.settings, vec![Some(dirs.root.clone()), Some(other.clone())], true);
    settings::initialize(&h.app).await.unwrap();
    records::add_weight(&h.app, NewWeight { weight: 80.0, date: march(1) }).await.unwrap();

    let report = settings::change_setting_path(&h.app).await.unwrap().unwrap();
    assert_eq!(report.root, RootPath::new(&other));
    assert_eq!(report.records, Some(StoreStatus::Connected { created: true }));
    assert!(h.app.records().weights.is_empty());
    assert!(other.join("db").join("my.db").exists());
    assert_eq!(
        h.app.registry().get(StoreKind::Records).unwrap().path().to_path_buf(),
        other.join("db").join("my.db")
    );

    // キャンセルなら何も変わらない
    assert!(settings::change_setting_path(&h.app).await.unwrap().is_none());
    assert_eq!(settings::current_path(&h.app).await, RootPath::new(&other));
}

#[tokio::test]
async fn test_corrupt_settings_file_is_recoverable() {
    let dirs = dirs();
    std::fs::create_dir_all(dirs.settings.parent().unwrap()).unwrap();
    std::fs::write(&dirs.settings, "{not json").unwrap();

    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], true);
    let report = settings::initialize(&h.app).await.unwrap();
    assert!(report.is_ready());
    assert_eq!(h.picker.calls.load(Ordering::SeqCst), 1);

    let saved = JsonSettingsStore::new(&dirs.settings)
        .get("setting-path")
        .await
        .unwrap();
    assert_eq!(saved, Some(dirs.root.display().to_string()));
}

#[tokio::test]
async fn test_change_path_overwrites_corrupt_settings_file() {
    let dirs = dirs();
    std::fs::create_dir_all(dirs.settings.parent().unwrap()).unwrap();
    std::fs::write(&dirs.settings, "{not json").unwrap();

    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], true);
    let report = settings::change_setting_path(&h.app).await.unwrap().unwrap();
    assert_eq!(report.root, RootPath::new(&dirs.root));
    assert!(report.is_ready());
    assert_eq!(h.picker.calls.load(Ordering::SeqCst), 1);

    let saved = JsonSettingsStore::new(&dirs.settings)
        .get("setting-path")
        .await
        .unwrap();
    assert_eq!(saved, Some(dirs.root.display().to_string()));
}

#[tokio::test]
async fn test_unopenable_store_fails_alone_and_can_retry() {
    let dirs = dirs();
    let records_path = dirs.root.join("db").join("my.db");
    std::fs::create_dir_all(records_path.parent().unwrap()).unwrap();
    std::fs::write(&records_path, vec![b'x'; 4096]).unwrap();

    let h = harness(&dirs.settings, vec![Some(dirs.root.clone())], true);
    let report = settings::initialize(&h.app).await.unwrap();

    assert!(matches!(report.records, Some(StoreStatus::Failed { .. })));
    assert_eq!(report.definitions, Some(StoreStatus::Connected { created: true }));
    assert!(h.app.registry().get(StoreKind::Records).is_none());
    assert!(h.app.registry().get(StoreKind::Definitions).is_some());
    assert!(h.notifier.errors() >= 1);

    // 壊れたファイルを取り除けば次の initialize で作り直せる
    std::fs::remove_file(&records_path).unwrap();
    let report = settings::initialize(&h.app).await.unwrap();
    assert_eq!(report.records, Some(StoreStatus::Connected { created: true }));
    assert_eq!(report.definitions, Some(StoreStatus::AlreadyConnected));
    assert!(h.app.registry().get(StoreKind::Records).is_some());
}

#[tokio::test]
async fn test_failed_statement_leaves_store_untouched() {
    let dirs = dirs();
    let h = ready(&dirs).await;
    records::add_weight(&h.app, NewWeight { weight: 80.0, date: march(1) }).await.unwrap();
    let before = h.app.records().weights.snapshot();

    let conn = Connection::open(dirs.root.join("db").join("my.db")).unwrap();
    conn.execute_batch("DROP TABLE weights;").unwrap();
    drop(conn);

    let result = records::add_weight(&h.app, NewWeight { weight: 81.0, date: march(2) }).await;
    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(h.app.records().weights.snapshot(), before);
    assert_eq!(h.notifier.errors(), 1);

    let result = records::delete_weights(&h.app, &[before[0].id]).await;
    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(h.app.records().weights.snapshot(), before);
}
