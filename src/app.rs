//! アプリ全体の状態と初期化の流れ
//!
//! PathResolver → Provisioner → ConnectionRegistry → Hydrator → ReactiveStore の順に進む。
//! ルートパスが決まるまで DB には触れず、接続が登録されるまでハイドレーションしない。

use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::db::hydrate::{self, Hydrated};
use crate::db::provision::{ProvisionOutcome, Provisioner, VerifyReport};
use crate::db::registry::{ConnectionRegistry, InitState};
use crate::db::{DbHandle, StoreKind};
use crate::dialog::{Confirm, DirectoryPicker, Notice, Notifier};
use crate::error::AppError;
use crate::settings::{PathResolver, RootPath, SettingsStore};
use crate::store::{DefinitionsState, RecordsState};

/// 外部とのやりとりを担うコンポーネント一式
pub struct Collaborators {
    pub settings: Arc<dyn SettingsStore>,
    pub picker: Arc<dyn DirectoryPicker>,
    pub confirm: Arc<dyn Confirm>,
    pub notifier: Arc<dyn Notifier>,
}

/// ストア1つ分の初期化結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreStatus {
    Connected { created: bool },
    AlreadyConnected,
    InProgress,
    /// 作成を拒否された。このストアのデータは空のまま
    Declined,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub root: Option<RootPath>,
    pub records: Option<StoreStatus>,
    pub definitions: Option<StoreStatus>,
}

impl InitReport {
    fn path_unset() -> Self {
        Self {
            root: None,
            records: None,
            definitions: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        let ok = |s: &Option<StoreStatus>| {
            matches!(
                s,
                Some(StoreStatus::Connected { .. }) | Some(StoreStatus::AlreadyConnected)
            )
        };
        ok(&self.records) && ok(&self.definitions)
    }
}

/// アプリの状態を所有する。グローバル変数は使わず、必要な箇所へ参照を渡す
pub struct App {
    config: Arc<AppConfig>,
    resolver: PathResolver,
    provisioner: Provisioner,
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
    records: RecordsState,
    definitions: DefinitionsState,
}

impl App {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let resolver = PathResolver::new(
            collaborators.settings,
            collaborators.picker,
            config.settings_key.clone(),
        );
        let provisioner = Provisioner::new(
            Arc::clone(&config),
            collaborators.confirm,
            Arc::clone(&collaborators.notifier),
        );
        Self {
            config,
            resolver,
            provisioner,
            registry: ConnectionRegistry::new(),
            notifier: collaborators.notifier,
            records: RecordsState::default(),
            definitions: DefinitionsState::default(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordsState {
        &self.records
    }

    pub fn definitions(&self) -> &DefinitionsState {
        &self.definitions
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub async fn current_path(&self) -> Option<RootPath> {
        self.resolver.current().await
    }

    /// 登録済みの接続。無ければ「データなし」として扱う
    pub(crate) fn handle(&self, kind: StoreKind) -> Result<Arc<DbHandle>, AppError> {
        self.registry
            .get(kind)
            .ok_or(AppError::DataUnavailable(kind))
    }

    /// ルートパスを解決し、両方のストアを用意してメモリに読み込む
    ///
    /// 何度呼んでもよい。初期化中・完了済みのストアには何もしない。
    pub async fn initialize(&self) -> Result<InitReport, AppError> {
        let Some(root) = self.resolver.resolve().await? else {
            log::info!("data folder not selected, skipping database setup");
            return Ok(InitReport::path_unset());
        };

        let (records, definitions) = futures::join!(
            self.init_store(&root, StoreKind::Records),
            self.init_store(&root, StoreKind::Definitions),
        );
        Ok(InitReport {
            root: Some(root),
            records: Some(records),
            definitions: Some(definitions),
        })
    }

    async fn init_store(&self, root: &RootPath, kind: StoreKind) -> StoreStatus {
        let Some(guard) = self.registry.begin_init(kind) else {
            return match self.registry.state(kind) {
                InitState::Ready => StoreStatus::AlreadyConnected,
                _ => StoreStatus::InProgress,
            };
        };

        match self.provisioner.ensure(root, kind).await {
            Ok(ProvisionOutcome::Ready(provisioned)) => {
                let created = provisioned.created;
                let Some(handle) = guard.complete(provisioned.conn, provisioned.path) else {
                    return StoreStatus::InProgress;
                };
                self.hydrate(&handle).await;
                StoreStatus::Connected { created }
            }
            Ok(ProvisionOutcome::Declined) => {
                drop(guard);
                self.apply(Hydrated::empty(kind));
                StoreStatus::Declined
            }
            Err(e) => {
                drop(guard);
                log::error!("failed to set up {} database: {}", kind, e);
                self.notifier.notify(&Notice::error(e.to_string()));
                StoreStatus::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn hydrate(&self, handle: &Arc<DbHandle>) {
        match hydrate::load(handle).await {
            Ok(hydrated) => self.apply(hydrated),
            Err(e) => {
                log::error!("failed to hydrate {} store: {}", handle.kind(), e);
                self.notifier.notify(&Notice::error(e.to_string()));
            }
        }
    }

    fn apply(&self, hydrated: Hydrated) {
        match hydrated {
            Hydrated::Records(snapshot) => {
                self.records.weights.replace_all(snapshot.weights);
                self.records.kilometers.replace_all(snapshot.kilometers);
                self.records.invoices.replace_all(snapshot.invoices);
            }
            Hydrated::Definitions(snapshot) => {
                self.definitions.metrics.replace_all(snapshot.metrics);
            }
        }
    }

    /// DB ファイルの存在を確認し、無ければ作り直す
    pub async fn verify(&self) -> Result<VerifyReport, AppError> {
        let root = match self.resolver.current().await {
            Some(root) => root,
            None => self.resolver.resolve().await?.ok_or(AppError::PathUnset)?,
        };

        // 消されたファイルを指している接続は作り直す前に閉じる
        let mut released = Vec::new();
        for kind in StoreKind::ALL {
            let path = self.provisioner.path_for(&root, kind);
            let missing = !tokio::fs::try_exists(&path).await.unwrap_or(true);
            if missing && self.registry.get(kind).is_some() {
                log::warn!("{} is gone, closing its connection", path.display());
                self.registry.release(kind);
                released.push(kind);
            }
        }

        let (report, provisioned) = self.provisioner.verify(&root).await;
        for p in provisioned {
            released.retain(|kind| *kind != p.kind);
            let handle = self
                .registry
                .install(p.kind, DbHandle::new(p.kind, p.path, p.conn));
            self.hydrate(&handle).await;
        }
        // 作り直さなかったストアは空にする
        for kind in released {
            self.apply(Hydrated::empty(kind));
        }
        Ok(report)
    }

    /// フォルダを選び直す
    ///
    /// 新しいフォルダが選ばれたら接続とメモリ上のデータを捨て、そのフォルダで初期化し直す。
    /// キャンセル時は None。
    pub async fn change_path(&self) -> Result<Option<InitReport>, AppError> {
        let previous = self.resolver.current().await;
        let Some(root) = self.resolver.change().await? else {
            return Ok(None);
        };

        if previous.as_ref() != Some(&root) {
            log::info!("data folder changed, reloading databases");
            self.registry.reset();
            self.records.clear();
            self.definitions.clear();
        }
        self.initialize().await.map(Some)
    }
}
