use chrono::Utc;

use crate::app::App;
use crate::commands::{delete_rows, write};
use crate::db::repository;
use crate::db::StoreKind;
use crate::dialog::Notice;
use crate::error::AppError;
use crate::models::{normalize_metric_fields, Metric, NewMetric};

/// 同じカテゴリが既にあれば警告だけ出す（重複は禁止していない）
fn warn_duplicate_category(app: &App, category: &str, except_id: Option<i64>) {
    let duplicate = app
        .definitions()
        .metrics
        .snapshot()
        .iter()
        .any(|m| m.category == category && Some(m.id) != except_id);
    if duplicate {
        log::warn!("category {:?} is already tracked", category);
    }
}

/// 指標定義を追加する。date 省略時は現在時刻
pub async fn add_metric(app: &App, entry: NewMetric) -> Result<Metric, AppError> {
    let (category, kpi) = normalize_metric_fields(&entry.category, &entry.kpi)?;
    let date = entry.date.unwrap_or_else(Utc::now);
    warn_duplicate_category(app, &category, None);

    let new = NewMetric {
        category: category.clone(),
        kpi: kpi.clone(),
        date: Some(date),
    };
    let id = write(app, StoreKind::Definitions, move |conn| {
        repository::insert_metric(conn, &new, &date)
    })
    .await?;

    let metric = Metric {
        id,
        category,
        kpi,
        date,
    };
    app.definitions().metrics.insert(metric.clone());
    app.notifier().notify(&Notice::success(
        "Data Inserted",
        "Your metric data has been successfully saved to the database.",
    ));
    Ok(metric)
}

/// 指標定義を更新する
pub async fn update_metric(app: &App, entry: Metric) -> Result<Metric, AppError> {
    let (category, kpi) = normalize_metric_fields(&entry.category, &entry.kpi)?;
    let metric = Metric {
        category,
        kpi,
        ..entry
    };
    warn_duplicate_category(app, &metric.category, Some(metric.id));

    let row = metric.clone();
    let found = write(app, StoreKind::Definitions, move |conn| {
        repository::update_metric(conn, &row)
    })
    .await?;
    if !found {
        return Err(AppError::NotFound {
            table: "metrics",
            id: metric.id,
        });
    }

    app.definitions()
        .metrics
        .update(metric.clone())
        .map_err(|_| AppError::NotFound {
            table: "metrics",
            id: metric.id,
        })?;
    app.notifier().notify(&Notice::success(
        "Data Updated",
        "Your metric data has been successfully updated in the database.",
    ));
    Ok(metric)
}

pub async fn delete_metrics(app: &App, ids: &[i64]) -> Result<usize, AppError> {
    delete_rows(app, StoreKind::Definitions, &app.definitions().metrics, ids).await
}
