use serde::Serialize;
use thiserror::Error;

use crate::db::StoreKind;

/// アプリケーション共通エラー型
///
/// ユーザーによるキャンセル（ディレクトリ未選択・DB作成拒否）はエラーではなく
/// 各処理の戻り値で表現する。ここに来るのは「読み込めなかった / 保存できなかった」ものだけ。
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} database is not available")]
    DataUnavailable(StoreKind),

    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: i64 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Data folder has not been selected")]
    PathUnset,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Settings(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Database(format!("database task failed: {}", e))
    }
}

/// UI 層へのエラー伝搬用
/// エラーを文字列としてシリアライズする
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
