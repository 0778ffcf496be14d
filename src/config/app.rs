use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AppError;

/// ファイル名・上限値などの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// ルートパスを保存するキー・バリューファイル名
    pub settings_file: String,
    /// ルートパスを保存するキー
    pub settings_key: String,
    /// ルート直下の DB フォルダ名
    pub db_dir: String,
    pub records_file: String,
    pub definitions_file: String,
    /// 体重の上限 (kg)
    pub max_weight: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings_file: "store.json".to_string(),
            settings_key: "setting-path".to_string(),
            db_dir: "db".to_string(),
            records_file: "my.db".to_string(),
            definitions_file: "metrics.db".to_string(),
            max_weight: 1000.0,
        }
    }
}

const CONFIG_ENV: &str = "TRACKER_CONFIG";
const FALLBACK_CONFIG_YAML: &str = include_str!("../../config/tracker.yaml");

impl AppConfig {
    /// 設定を読み込む
    ///
    /// 読み込み優先順位:
    /// 1. 環境変数 TRACKER_CONFIG が指すファイル
    /// 2. ./config/tracker.yaml（開発時）
    /// 3. コンパイル時埋め込み（フォールバック）
    pub fn load() -> Result<Self, AppError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path));
        }

        let dev_path = Path::new("config/tracker.yaml");
        if dev_path.exists() {
            return Self::load_from_path(dev_path);
        }

        Self::parse(FALLBACK_CONFIG_YAML)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse tracker.yaml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        let names = [
            ("settings_file", &self.settings_file),
            ("settings_key", &self.settings_key),
            ("db_dir", &self.db_dir),
            ("records_file", &self.records_file),
            ("definitions_file", &self.definitions_file),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{} must not be empty", field)));
            }
        }
        if self.records_file == self.definitions_file {
            return Err(AppError::Config(
                "records_file and definitions_file must differ".to_string(),
            ));
        }
        if !(self.max_weight.is_finite() && self.max_weight > 0.0) {
            return Err(AppError::Config("max_weight must be positive".to_string()));
        }
        Ok(())
    }
}
