use crate::app::{App, InitReport};
use crate::db::provision::VerifyReport;
use crate::error::AppError;
use crate::settings::RootPath;

/// 起動時の初期化
pub async fn initialize(app: &App) -> Result<InitReport, AppError> {
    app.initialize().await
}

/// 現在のデータフォルダ（未設定なら None）
pub async fn current_path(app: &App) -> Option<RootPath> {
    app.current_path().await
}

/// 「Change Setting Path」ボタン
pub async fn change_setting_path(app: &App) -> Result<Option<InitReport>, AppError> {
    app.change_path().await
}

/// 「Test Config」ボタン
pub async fn verify_databases(app: &App) -> Result<VerifyReport, AppError> {
    app.verify().await
}
