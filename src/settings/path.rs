use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::dialog::DirectoryPicker;
use crate::error::AppError;
use crate::settings::SettingsStore;

/// 全データの置き場所となる絶対パス
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RootPath(PathBuf);

impl RootPath {
    /// 絶対パスのみ受け付ける
    pub fn new(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        if path.is_absolute() {
            Some(Self(path))
        } else {
            None
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for RootPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for RootPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// ルートパスを設定ファイルから読み、なければユーザーに選ばせる
pub struct PathResolver {
    settings: Arc<dyn SettingsStore>,
    picker: Arc<dyn DirectoryPicker>,
    key: String,
    // 解決中はロックを保持し、同時に呼ばれても選択ダイアログは1回だけ出す
    current: Mutex<Option<RootPath>>,
}

impl PathResolver {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        picker: Arc<dyn DirectoryPicker>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            picker,
            key: key.into(),
            current: Mutex::new(None),
        }
    }

    /// 解決済みのパス（I/O なし）
    pub async fn current(&self) -> Option<RootPath> {
        self.current.lock().await.clone()
    }

    /// ルートパスを解決する
    ///
    /// None はキャンセル（未設定）を意味し、エラーではない。
    pub async fn resolve(&self) -> Result<Option<RootPath>, AppError> {
        let mut current = self.current.lock().await;
        if let Some(root) = current.as_ref() {
            return Ok(Some(root.clone()));
        }

        // 設定ファイルが読めなければ選び直してもらう（set 側で書き直される）
        let saved = match self.settings.get(&self.key).await {
            Ok(saved) => saved,
            Err(e) => {
                log::warn!("could not read saved data folder: {}", e);
                None
            }
        };
        if let Some(saved) = saved {
            match RootPath::new(&saved) {
                Some(root) => {
                    log::info!("using saved data folder {}", root);
                    *current = Some(root.clone());
                    return Ok(Some(root));
                }
                None => log::warn!("ignoring saved data folder {:?}: not absolute", saved),
            }
        }

        let selected = self.prompt().await?;
        if let Some(root) = selected.as_ref() {
            *current = Some(root.clone());
        }
        Ok(selected)
    }

    /// 選択ダイアログを出し直して上書き保存する
    ///
    /// キャンセル時は以前の値を保持して None を返す。
    pub async fn change(&self) -> Result<Option<RootPath>, AppError> {
        let mut current = self.current.lock().await;
        let selected = self.prompt().await?;
        if let Some(root) = selected.as_ref() {
            *current = Some(root.clone());
        }
        Ok(selected)
    }

    async fn prompt(&self) -> Result<Option<RootPath>, AppError> {
        let Some(picked) = self.picker.pick_directory().await else {
            log::warn!("No folder selected.");
            return Ok(None);
        };
        let Some(root) = RootPath::new(picked.clone()) else {
            log::warn!("ignoring selected folder {}: not absolute", picked.display());
            return Ok(None);
        };

        let value = root.to_string();
        self.settings.set(&self.key, &value).await?;
        log::info!("data folder set to {}", root);
        Ok(Some(root))
    }
}
