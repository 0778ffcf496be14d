pub mod terminal;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// ダイアログの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Info,
    Warning,
    Error,
}

/// はい / いいえ の確認ダイアログ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    pub kind: DialogKind,
}

/// 通知のレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// トースト通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub level: NoticeLevel,
}

impl Notice {
    pub fn info(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            level: NoticeLevel::Info,
        }
    }

    pub fn success(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            level: NoticeLevel::Success,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            level: NoticeLevel::Error,
        }
    }
}

/// OS のフォルダ選択ダイアログ
#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    /// 選択されたディレクトリを返す。キャンセル時は None
    async fn pick_directory(&self) -> Option<PathBuf>;
}

/// 確認ダイアログ
#[async_trait]
pub trait Confirm: Send + Sync {
    /// 承諾なら true。拒否・ダイアログを閉じた場合は false
    async fn ask(&self, prompt: &Prompt) -> bool;
}

/// 通知の表示先。戻り値は使わない
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// 通知をログに流すだけの Notifier
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Error => log::error!("{}: {}", notice.title, notice.description),
            _ => log::info!("{}: {}", notice.title, notice.description),
        }
    }
}
