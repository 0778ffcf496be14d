//! ルートパスの永続化と解決

pub mod path;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::AppError;

pub use path::{PathResolver, RootPath};

/// キー・バリュー形式の設定ファイル
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// 値を書き込み、即座に保存する
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

/// フラットな JSON オブジェクトとして保存する SettingsStore
///
/// 書き込みは一時ファイル経由の rename で行い、途中で壊れないようにする。
pub struct JsonSettingsStore {
    path: PathBuf,
    cache: Mutex<Option<Values>>,
}

type Values = BTreeMap<String, Option<String>>;

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<Values, AppError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path).await?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    async fn write_file(&self, values: &Values) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await?;
            }
        }
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        let json = serde_json::to_string_pretty(values)?;
        fs::write(&temp, json).await?;
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn load_cached(&self, cache: &mut Option<Values>) -> Result<Values, AppError> {
        if let Some(values) = cache.as_ref() {
            return Ok(values.clone());
        }
        let values = self.read_file().await?;
        *cache = Some(values.clone());
        Ok(values)
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut cache = self.cache.lock().await;
        let values = self.load_cached(&mut cache).await?;
        Ok(values.get(key).cloned().flatten())
    }

    /// 壊れたファイルは読み捨てて書き直す
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut cache = self.cache.lock().await;
        let mut values = match self.load_cached(&mut cache).await {
            Ok(values) => values,
            Err(AppError::Settings(e)) => {
                log::warn!(
                    "{} is not valid settings JSON ({}), starting over",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        values.insert(key.to_string(), Some(value.to_string()));
        self.write_file(&values).await?;
        *cache = Some(values);
        Ok(())
    }
}

/// 設定ファイルの既定の置き場所 (<OS の設定フォルダ>/metrics-tracker/<file>)
pub fn default_settings_path(file_name: &str) -> Result<PathBuf, AppError> {
    let base = dirs::config_dir()
        .ok_or_else(|| AppError::Settings("Could not find config directory".to_string()))?;
    Ok(base.join("metrics-tracker").join(file_name))
}
