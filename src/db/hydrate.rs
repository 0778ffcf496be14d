use std::sync::Arc;

use rusqlite::Connection;

use crate::db::repository::{self, TableRow};
use crate::db::{DbHandle, StoreKind};
use crate::error::AppError;
use crate::models::{Invoice, Kilometer, Metric, Weight};
use crate::store::Entity;

/// records ストアのハイドレーション結果
#[derive(Debug, Default)]
pub struct RecordsSnapshot {
    pub weights: Vec<Weight>,
    pub kilometers: Vec<Kilometer>,
    pub invoices: Vec<Invoice>,
}

/// definitions ストアのハイドレーション結果
#[derive(Debug, Default)]
pub struct DefinitionsSnapshot {
    pub metrics: Vec<Metric>,
}

#[derive(Debug)]
pub enum Hydrated {
    Records(RecordsSnapshot),
    Definitions(DefinitionsSnapshot),
}

impl Hydrated {
    pub fn empty(kind: StoreKind) -> Self {
        match kind {
            StoreKind::Records => Hydrated::Records(RecordsSnapshot::default()),
            StoreKind::Definitions => Hydrated::Definitions(DefinitionsSnapshot::default()),
        }
    }
}

/// 1テーブル分を読み込んで並べる
///
/// クエリが失敗してもログに残して空を返し、他のテーブルの読み込みは続ける。
fn load_table<T: TableRow + Entity>(conn: &Connection, kind: StoreKind) -> Vec<T> {
    match repository::select_all::<T>(conn) {
        Ok(decoded) => {
            let mut items = decoded.items;
            items.sort_by(T::order);
            log::info!(
                "hydrated {} rows from {}.{} ({} skipped)",
                items.len(),
                kind,
                T::TABLE,
                decoded.skipped
            );
            items
        }
        Err(e) => {
            log::error!("failed to load {}.{}: {}", kind, T::TABLE, e);
            Vec::new()
        }
    }
}

/// 接続済みのストアから全テーブルを読み込む
pub fn load_sync(kind: StoreKind, conn: &Connection) -> Hydrated {
    match kind {
        StoreKind::Records => Hydrated::Records(RecordsSnapshot {
            weights: load_table(conn, kind),
            kilometers: load_table(conn, kind),
            invoices: load_table(conn, kind),
        }),
        StoreKind::Definitions => Hydrated::Definitions(DefinitionsSnapshot {
            metrics: load_table(conn, kind),
        }),
    }
}

/// 登録済みの接続から読み込む
pub async fn load(handle: &Arc<DbHandle>) -> Result<Hydrated, AppError> {
    let kind = handle.kind();
    handle.call(move |conn| Ok(load_sync(kind, conn))).await
}
