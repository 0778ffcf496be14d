use rusqlite::Connection;

use crate::db::StoreKind;
use crate::error::AppError;

const RECORDS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS weights (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        weight  REAL NOT NULL,
        date    DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS kilometers (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        km      REAL NOT NULL,
        date    DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS invoices (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        amount      REAL NOT NULL,
        description TEXT,
        date        DATETIME DEFAULT CURRENT_TIMESTAMP
    );";

const DEFINITIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS metrics (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        category  TEXT NOT NULL,
        kpi       TEXT NOT NULL,
        date      DATETIME DEFAULT CURRENT_TIMESTAMP
    );";

/// ストア種別ごとのテーブル名
pub fn tables(kind: StoreKind) -> &'static [&'static str] {
    match kind {
        StoreKind::Records => &["weights", "kilometers", "invoices"],
        StoreKind::Definitions => &["metrics"],
    }
}

/// テーブルを作成する
///
/// 各文は IF NOT EXISTS なので何度実行してもよい。既存データには触れない。
pub fn create_tables(conn: &Connection, kind: StoreKind) -> Result<(), AppError> {
    let batch = match kind {
        StoreKind::Records => RECORDS_SCHEMA,
        StoreKind::Definitions => DEFINITIONS_SCHEMA,
    };
    conn.execute_batch(batch)?;
    Ok(())
}

/// まだ存在しないテーブル名を返す
pub fn missing_tables(conn: &Connection, kind: StoreKind) -> Result<Vec<&'static str>, AppError> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for &table in tables(kind) {
        let count: u32 = stmt.query_row([table], |row| row.get(0))?;
        if count == 0 {
            missing.push(table);
        }
    }
    Ok(missing)
}
