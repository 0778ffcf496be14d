use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::AppConfig;
use crate::db::{open_connection, schema, store_path, StoreKind};
use crate::dialog::{Confirm, DialogKind, Notice, Notifier, Prompt};
use crate::error::AppError;
use crate::settings::RootPath;

/// スキーマ作成まで済んだ DB ファイルと、その接続
pub struct Provisioned {
    pub kind: StoreKind,
    pub path: PathBuf,
    /// この呼び出しでファイルを作成したか
    pub created: bool,
    pub(crate) conn: Connection,
}

pub enum ProvisionOutcome {
    Ready(Provisioned),
    /// ユーザーが作成を拒否した。エラーではない
    Declined,
}

/// verify の結果（ストア種別ごと）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum VerifyStatus {
    Present,
    Created,
    Declined,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub records: VerifyStatus,
    pub definitions: VerifyStatus,
}

impl VerifyReport {
    pub fn all_present(&self) -> bool {
        self.records == VerifyStatus::Present && self.definitions == VerifyStatus::Present
    }
}

fn prompt_for(kind: StoreKind) -> Prompt {
    let message = match kind {
        StoreKind::Records => "DB does not exist. Create it?",
        StoreKind::Definitions => "Settings DB does not exist. Create it?",
    };
    Prompt {
        title: "Config Folder".to_string(),
        message: message.to_string(),
        kind: DialogKind::Warning,
    }
}

fn fs_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::FileSystem(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// DB ファイルとテーブルを必要に応じて作成する
pub struct Provisioner {
    config: Arc<AppConfig>,
    confirm: Arc<dyn Confirm>,
    notifier: Arc<dyn Notifier>,
}

impl Provisioner {
    pub fn new(
        config: Arc<AppConfig>,
        confirm: Arc<dyn Confirm>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            confirm,
            notifier,
        }
    }

    pub fn path_for(&self, root: &RootPath, kind: StoreKind) -> PathBuf {
        store_path(root.as_path(), kind, &self.config)
    }

    /// ストアを用意して接続を返す
    ///
    /// ファイルがあれば開いて CREATE TABLE IF NOT EXISTS を流し直す（テーブルの無い
    /// ファイルが残っていても修復される）。無ければ確認のうえ作成する。
    /// 既存ファイルを上書きすることはない。
    pub async fn ensure(
        &self,
        root: &RootPath,
        kind: StoreKind,
    ) -> Result<ProvisionOutcome, AppError> {
        let path = self.path_for(root, kind);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| fs_error("check", &path, e))?;

        let created = if exists {
            false
        } else {
            if !self.confirm.ask(&prompt_for(kind)).await {
                log::info!("{} database creation declined", kind);
                return Ok(ProvisionOutcome::Declined);
            }
            create_file(&path).await?
        };

        let conn = open_with_schema(path.clone(), kind, created).await?;
        if created {
            log::info!("created {} database at {}", kind, path.display());
        }
        Ok(ProvisionOutcome::Ready(Provisioned {
            kind,
            path,
            created,
            conn,
        }))
    }

    /// 両方の DB ファイルの存在を確認し、無いものだけ作り直す
    ///
    /// 作成できたストアの接続は呼び出し側で登録する。
    pub async fn verify(&self, root: &RootPath) -> (VerifyReport, Vec<Provisioned>) {
        let mut provisioned = Vec::new();
        let mut statuses = Vec::with_capacity(StoreKind::ALL.len());

        for kind in StoreKind::ALL {
            let path = self.path_for(root, kind);
            let status = match tokio::fs::try_exists(&path).await {
                Ok(true) => VerifyStatus::Present,
                Ok(false) => match self.ensure(root, kind).await {
                    Ok(ProvisionOutcome::Ready(p)) => {
                        provisioned.push(p);
                        VerifyStatus::Created
                    }
                    Ok(ProvisionOutcome::Declined) => VerifyStatus::Declined,
                    Err(e) => VerifyStatus::Failed(e.to_string()),
                },
                Err(e) => VerifyStatus::Failed(fs_error("check", &path, e).to_string()),
            };
            if let VerifyStatus::Failed(msg) = &status {
                self.notifier.notify(&Notice::error(msg.clone()));
            }
            statuses.push(status);
        }

        let definitions = statuses.pop().unwrap_or(VerifyStatus::Present);
        let records = statuses.pop().unwrap_or(VerifyStatus::Present);
        let report = VerifyReport {
            records,
            definitions,
        };
        if report.all_present() {
            self.notifier
                .notify(&Notice::info("Config Folder", "Databases found"));
        }
        (report, provisioned)
    }
}

/// 親フォルダと空ファイルを作成する
///
/// create_new で作るので既存ファイルは切り詰めない。同時に作られていた場合は
/// そのファイルを使い、false を返す。
async fn create_file(path: &Path) -> Result<bool, AppError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| fs_error("create folder", dir, e))?;
    }
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            log::debug!("{} was created concurrently", path.display());
            Ok(false)
        }
        Err(e) => Err(fs_error("create", path, e)),
    }
}

async fn open_with_schema(
    path: PathBuf,
    kind: StoreKind,
    created: bool,
) -> Result<Connection, AppError> {
    tokio::task::spawn_blocking(move || {
        let conn = open_connection(&path)?;
        let missing = schema::missing_tables(&conn, kind)?;
        if !created && !missing.is_empty() {
            log::warn!(
                "{} is missing tables {:?}, creating them",
                path.display(),
                missing
            );
        }
        schema::create_tables(&conn, kind)?;
        Ok(conn)
    })
    .await?
}
