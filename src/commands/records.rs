use chrono::Utc;

use crate::app::App;
use crate::commands::{delete_rows, write};
use crate::db::repository;
use crate::db::StoreKind;
use crate::dialog::Notice;
use crate::error::AppError;
use crate::models::{
    validate_amount, validate_km, validate_weight, Invoice, Kilometer, NewInvoice, NewKilometer,
    NewWeight, Weight,
};

/// 体重を保存し、採番済みのエンティティを返す
pub async fn add_weight(app: &App, entry: NewWeight) -> Result<Weight, AppError> {
    validate_weight(entry.weight, entry.date, app.config().max_weight, Utc::now())?;

    let new = entry.clone();
    let id = write(app, StoreKind::Records, move |conn| {
        repository::insert_weight(conn, &new)
    })
    .await?;

    let weight = Weight {
        id,
        weight: entry.weight,
        date: entry.date,
    };
    app.records().weights.insert(weight.clone());
    app.notifier().notify(&Notice::success(
        "Data Inserted",
        "Your weight data has been successfully saved to the database.",
    ));
    Ok(weight)
}

/// 体重を更新する
pub async fn update_weight(app: &App, entry: Weight) -> Result<Weight, AppError> {
    validate_weight(entry.weight, entry.date, app.config().max_weight, Utc::now())?;

    let row = entry.clone();
    let found = write(app, StoreKind::Records, move |conn| {
        repository::update_weight(conn, &row)
    })
    .await?;
    if !found {
        return Err(AppError::NotFound {
            table: "weights",
            id: entry.id,
        });
    }

    app.records()
        .weights
        .update(entry.clone())
        .map_err(|_| AppError::NotFound {
            table: "weights",
            id: entry.id,
        })?;
    app.notifier().notify(&Notice::success(
        "Data Updated",
        "Your weight data has been successfully updated in the database.",
    ));
    Ok(entry)
}

/// 選択した体重記録を削除し、削除件数を返す
pub async fn delete_weights(app: &App, ids: &[i64]) -> Result<usize, AppError> {
    delete_rows(app, StoreKind::Records, &app.records().weights, ids).await
}

pub async fn add_kilometer(app: &App, entry: NewKilometer) -> Result<Kilometer, AppError> {
    validate_km(entry.km)?;

    let new = entry.clone();
    let id = write(app, StoreKind::Records, move |conn| {
        repository::insert_kilometer(conn, &new)
    })
    .await?;

    let km = Kilometer {
        id,
        km: entry.km,
        date: entry.date,
    };
    app.records().kilometers.insert(km.clone());
    app.notifier().notify(&Notice::success(
        "Data Inserted",
        "Your distance data has been successfully saved to the database.",
    ));
    Ok(km)
}

pub async fn delete_kilometers(app: &App, ids: &[i64]) -> Result<usize, AppError> {
    delete_rows(app, StoreKind::Records, &app.records().kilometers, ids).await
}

pub async fn add_invoice(app: &App, entry: NewInvoice) -> Result<Invoice, AppError> {
    validate_amount(entry.amount)?;
    let entry = NewInvoice {
        description: entry
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        ..entry
    };

    let new = entry.clone();
    let id = write(app, StoreKind::Records, move |conn| {
        repository::insert_invoice(conn, &new)
    })
    .await?;

    let invoice = Invoice {
        id,
        amount: entry.amount,
        description: entry.description,
        date: entry.date,
    };
    app.records().invoices.insert(invoice.clone());
    app.notifier().notify(&Notice::success(
        "Data Inserted",
        "Your invoice has been successfully saved to the database.",
    ));
    Ok(invoice)
}

pub async fn delete_invoices(app: &App, ids: &[i64]) -> Result<usize, AppError> {
    delete_rows(app, StoreKind::Records, &app.records().invoices, ids).await
}
