use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::error::AppError;
use crate::models::{
    format_db_date, parse_db_date, Invoice, Kilometer, Metric, NewInvoice, NewKilometer,
    NewMetric, NewWeight, Weight,
};

/// テーブル1行を型付きエンティティに変換する
///
/// 不正な行は理由付きの Err を返し、呼び出し側で読み飛ばす。
pub trait TableRow: Sized {
    const TABLE: &'static str;

    fn from_row(row: &Row<'_>) -> Result<Self, String>;
}

/// SELECT * の結果。不正行は件数だけ残す
#[derive(Debug)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

fn get_id(row: &Row<'_>) -> Result<i64, String> {
    row.get::<_, i64>("id").map_err(|e| format!("id: {}", e))
}

fn get_real(row: &Row<'_>, column: &str) -> Result<f64, String> {
    let value = row
        .get::<_, Option<f64>>(column)
        .map_err(|e| format!("{}: {}", column, e))?
        .ok_or_else(|| format!("{} is NULL", column))?;
    if !value.is_finite() {
        return Err(format!("{} is not a finite number", column));
    }
    Ok(value)
}

/// TEXT 列を取り出す。数値で保存されている場合は文字列化する
fn get_text(row: &Row<'_>, column: &str) -> Result<Option<String>, String> {
    match row.get_ref(column).map_err(|e| format!("{}: {}", column, e))? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Some(s.to_string()))
            .map_err(|e| format!("{}: {}", column, e)),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(f) => Ok(Some(f.to_string())),
        ValueRef::Blob(_) => Err(format!("{} is a blob", column)),
    }
}

fn get_non_empty_text(row: &Row<'_>, column: &str) -> Result<String, String> {
    match get_text(row, column)? {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(format!("{} is empty", column)),
    }
}

/// date 列を取り出す。TEXT は各種書式、INTEGER は UNIX 秒として扱う
fn get_date(row: &Row<'_>) -> Result<DateTime<Utc>, String> {
    match row.get_ref("date").map_err(|e| format!("date: {}", e))? {
        ValueRef::Text(bytes) => {
            let raw = std::str::from_utf8(bytes).map_err(|e| format!("date: {}", e))?;
            parse_db_date(raw).ok_or_else(|| format!("unparsable date {:?}", raw))
        }
        ValueRef::Integer(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| format!("timestamp {} out of range", secs)),
        ValueRef::Null => Err("date is NULL".to_string()),
        _ => Err("date has an unsupported type".to_string()),
    }
}

impl TableRow for Weight {
    const TABLE: &'static str = "weights";

    fn from_row(row: &Row<'_>) -> Result<Self, String> {
        let weight = get_real(row, "weight")?;
        if weight <= 0.0 {
            return Err(format!("weight {} is not positive", weight));
        }
        Ok(Weight {
            id: get_id(row)?,
            weight,
            date: get_date(row)?,
        })
    }
}

impl TableRow for Kilometer {
    const TABLE: &'static str = "kilometers";

    fn from_row(row: &Row<'_>) -> Result<Self, String> {
        let km = get_real(row, "km")?;
        if km < 0.0 {
            return Err(format!("km {} is negative", km));
        }
        Ok(Kilometer {
            id: get_id(row)?,
            km,
            date: get_date(row)?,
        })
    }
}

impl TableRow for Invoice {
    const TABLE: &'static str = "invoices";

    fn from_row(row: &Row<'_>) -> Result<Self, String> {
        Ok(Invoice {
            id: get_id(row)?,
            amount: get_real(row, "amount")?,
            description: get_text(row, "description")?,
            date: get_date(row)?,
        })
    }
}

impl TableRow for Metric {
    const TABLE: &'static str = "metrics";

    fn from_row(row: &Row<'_>) -> Result<Self, String> {
        Ok(Metric {
            id: get_id(row)?,
            category: get_non_empty_text(row, "category")?,
            kpi: get_non_empty_text(row, "kpi")?,
            date: get_date(row)?,
        })
    }
}

/// テーブルの全行を取得する（並び順は呼び出し側で整える）
pub fn select_all<T: TableRow>(conn: &Connection) -> Result<Decoded<T>, AppError> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", T::TABLE))?;
    let mut rows = stmt.query([])?;

    let mut items = Vec::new();
    let mut skipped = 0;
    while let Some(row) = rows.next()? {
        match T::from_row(row) {
            Ok(item) => items.push(item),
            Err(reason) => {
                log::warn!("skipping malformed row in {}: {}", T::TABLE, reason);
                skipped += 1;
            }
        }
    }
    Ok(Decoded { items, skipped })
}

/// 指定 id の行をまとめて削除し、削除件数を返す
///
/// 1回の操作につき DELETE 文は1つだけ発行する。
pub fn delete_by_ids(conn: &Connection, table: &str, ids: &[i64]) -> Result<usize, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let affected = conn.execute(
        &format!("DELETE FROM {} WHERE id IN ({})", table, placeholders),
        params_from_iter(ids.iter()),
    )?;
    Ok(affected)
}

/// 体重を保存し、挿入されたIDを返す
pub fn insert_weight(conn: &Connection, entry: &NewWeight) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO weights (weight, date) VALUES (?1, ?2)",
        params![entry.weight, format_db_date(&entry.date)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// 体重を更新し、該当行があったかを返す
pub fn update_weight(conn: &Connection, entry: &Weight) -> Result<bool, AppError> {
    let affected = conn.execute(
        "UPDATE weights SET weight = ?1, date = ?2 WHERE id = ?3",
        params![entry.weight, format_db_date(&entry.date), entry.id],
    )?;
    Ok(affected > 0)
}

pub fn insert_kilometer(conn: &Connection, entry: &NewKilometer) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO kilometers (km, date) VALUES (?1, ?2)",
        params![entry.km, format_db_date(&entry.date)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_invoice(conn: &Connection, entry: &NewInvoice) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO invoices (amount, description, date) VALUES (?1, ?2, ?3)",
        params![entry.amount, entry.description, format_db_date(&entry.date)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// 指標定義を保存し、挿入されたIDを返す
pub fn insert_metric(
    conn: &Connection,
    entry: &NewMetric,
    date: &DateTime<Utc>,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO metrics (category, kpi, date) VALUES (?1, ?2, ?3)",
        params![entry.category, entry.kpi, format_db_date(date)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_metric(conn: &Connection, entry: &Metric) -> Result<bool, AppError> {
    let affected = conn.execute(
        "UPDATE metrics SET category = ?1, kpi = ?2, date = ?3 WHERE id = ?4",
        params![entry.category, entry.kpi, format_db_date(&entry.date), entry.id],
    )?;
    Ok(affected > 0)
}
