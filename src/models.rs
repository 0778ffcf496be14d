//! 記録・指標のエンティティと入力バリデーション

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::Entity;

/// 体重記録 (records ストアの weights テーブル)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub id: i64,
    pub weight: f64,
    pub date: DateTime<Utc>,
}

/// 新規保存用の体重入力
#[derive(Debug, Clone, Deserialize)]
pub struct NewWeight {
    pub weight: f64,
    pub date: DateTime<Utc>,
}

/// 走行距離記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kilometer {
    pub id: i64,
    pub km: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewKilometer {
    pub km: f64,
    pub date: DateTime<Utc>,
}

/// 請求記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub amount: f64,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub amount: f64,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
}

/// 監視対象のカテゴリ / KPI 定義 (definitions ストアの metrics テーブル)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub category: String,
    pub kpi: String,
    pub date: DateTime<Utc>,
}

/// 新規保存用の指標入力。date 省略時は現在時刻
#[derive(Debug, Clone, Deserialize)]
pub struct NewMetric {
    pub category: String,
    pub kpi: String,
    pub date: Option<DateTime<Utc>>,
}

fn earliest_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 体重の値と日付を検証する
///
/// 0 < weight <= max_weight、日付は 1900-01-01 以降かつ未来でないこと。
pub fn validate_weight(
    weight: f64,
    date: DateTime<Utc>,
    max_weight: f64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if !weight.is_finite() {
        return Err(AppError::Validation("Weight must be a number.".into()));
    }
    if weight <= 0.0 {
        return Err(AppError::Validation(
            "Weight must be a positive number.".into(),
        ));
    }
    if weight > max_weight {
        return Err(AppError::Validation(format!(
            "Weight must be below {} kg.",
            max_weight
        )));
    }
    if date > now || date < earliest_date() {
        return Err(AppError::Validation(
            "Date must be between 1900-01-01 and today.".into(),
        ));
    }
    Ok(())
}

pub fn validate_km(km: f64) -> Result<(), AppError> {
    if !km.is_finite() || km < 0.0 {
        return Err(AppError::Validation(
            "Distance must be a non-negative number.".into(),
        ));
    }
    Ok(())
}

pub fn validate_amount(amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() {
        return Err(AppError::Validation("Amount must be a number.".into()));
    }
    Ok(())
}

/// カテゴリと KPI をトリムして検証し、正規化した値を返す
pub fn normalize_metric_fields(category: &str, kpi: &str) -> Result<(String, String), AppError> {
    let category = category.trim();
    let kpi = kpi.trim();
    if category.is_empty() {
        return Err(AppError::Validation("Category cannot be empty.".into()));
    }
    if kpi.is_empty() {
        return Err(AppError::Validation("KPI cannot be empty.".into()));
    }
    Ok((category.to_string(), kpi.to_string()))
}

/// DB に書き込む日付表現 (RFC 3339)
pub fn format_db_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339()
}

/// DB から読んだ日付文字列を解釈する
///
/// RFC 3339、SQLite の CURRENT_TIMESTAMP 形式、日付のみ の順に試す。
pub fn parse_db_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// 記録系は日付の新しい順、同日時は id の大きい順
fn newest_first(a_date: &DateTime<Utc>, a_id: i64, b_date: &DateTime<Utc>, b_id: i64) -> Ordering {
    b_date.cmp(a_date).then(b_id.cmp(&a_id))
}

impl Entity for Weight {
    fn id(&self) -> i64 {
        self.id
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first(&self.date, self.id, &other.date, other.id)
    }
}

impl Entity for Kilometer {
    fn id(&self) -> i64 {
        self.id
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first(&self.date, self.id, &other.date, other.id)
    }
}

impl Entity for Invoice {
    fn id(&self) -> i64 {
        self.id
    }

    fn order(&self, other: &Self) -> Ordering {
        newest_first(&self.date, self.id, &other.date, other.id)
    }
}

impl Entity for Metric {
    fn id(&self) -> i64 {
        self.id
    }

    /// カテゴリの昇順（大文字小文字は区別しない）、同名は id 昇順
    fn order(&self, other: &Self) -> Ordering {
        self.category
            .to_lowercase()
            .cmp(&other.category.to_lowercase())
            .then_with(|| self.category.cmp(&other.category))
            .then(self.id.cmp(&other.id))
    }
}
