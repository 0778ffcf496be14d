pub mod hydrate;
pub mod provision;
pub mod registry;
pub mod repository;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

/// DB ファイルの種別
///
/// records: 日々の記録 (weights / kilometers / invoices)
/// definitions: 監視する指標の定義 (metrics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Records,
    Definitions,
}

impl StoreKind {
    pub const ALL: [StoreKind; 2] = [StoreKind::Records, StoreKind::Definitions];

    pub fn file_name(self, config: &AppConfig) -> &str {
        match self {
            StoreKind::Records => &config.records_file,
            StoreKind::Definitions => &config.definitions_file,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Records => write!(f, "records"),
            StoreKind::Definitions => write!(f, "definitions"),
        }
    }
}

/// `<root>/<db_dir>` を返す
pub fn db_folder(root: &Path, config: &AppConfig) -> PathBuf {
    root.join(&config.db_dir)
}

/// `<root>/<db_dir>/<file>` を返す
pub fn store_path(root: &Path, kind: StoreKind, config: &AppConfig) -> PathBuf {
    db_folder(root, config).join(kind.file_name(config))
}

/// 既存ファイルに接続して WAL モードを有効化する
pub fn open_connection(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path)
        .map_err(|e| AppError::Database(format!("Failed to open {}: {}", path.display(), e)))?;

    // WALモードで並行読み取り性能を向上
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    Ok(conn)
}

/// 1つの DB ファイルへの接続
///
/// シングルユーザーのアプリなのでコネクションプールは使わず Mutex で排他制御する。
pub struct DbHandle {
    kind: StoreKind,
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl DbHandle {
    pub fn new(kind: StoreKind, path: PathBuf, conn: Connection) -> Self {
        Self {
            kind,
            path,
            conn: Mutex::new(conn),
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 接続をロックして同期的に処理を実行する
    pub fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::Database(e.to_string()))?;
        f(&conn)
    }

    /// ブロッキングプール上で処理を実行する
    pub async fn call<R, F>(self: &Arc<Self>, f: F) -> Result<R, AppError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> Result<R, AppError> + Send + 'static,
    {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.with_conn(f)).await?
    }

    /// 接続を明示的に閉じる
    pub(crate) fn close(self) -> Result<(), AppError> {
        let conn = self.conn.into_inner().unwrap_or_else(|p| p.into_inner());
        conn.close().map_err(|(_, e)| AppError::from(e))
    }
}
