//! 画面側から呼ばれる操作
//!
//! 書き込み系はすべて「検証 → SQL を1文だけ実行 → 成功したらストアを更新」の順で行う。
//! 失敗した場合ストアには触れない。

pub mod metrics;
pub mod records;
pub mod settings;

use std::collections::HashSet;

use rusqlite::Connection;

use crate::app::App;
use crate::db::repository::{self, TableRow};
use crate::db::StoreKind;
use crate::dialog::Notice;
use crate::error::AppError;
use crate::store::{Entity, ReactiveStore};

const SAVE_FAILED: &str = "There was an issue saving your data.";

/// 接続を取得して1文を実行する。失敗時はエラー通知を出す
pub(crate) async fn write<R, F>(app: &App, kind: StoreKind, f: F) -> Result<R, AppError>
where
    R: Send + 'static,
    F: FnOnce(&Connection) -> Result<R, AppError> + Send + 'static,
{
    let result = match app.handle(kind) {
        Ok(handle) => handle.call(f).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        log::error!("{} write failed: {}", kind, e);
        app.notifier().notify(&Notice::error(SAVE_FAILED));
    }
    result
}

/// 選択された行をまとめて削除し、ストアからも取り除く
pub(crate) async fn delete_rows<T: TableRow + Entity>(
    app: &App,
    kind: StoreKind,
    store: &ReactiveStore<T>,
    ids: &[i64],
) -> Result<usize, AppError> {
    let unique: HashSet<i64> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(0);
    }

    let targets: Vec<i64> = unique.iter().copied().collect();
    let deleted = write(app, kind, move |conn| {
        repository::delete_by_ids(conn, T::TABLE, &targets)
    })
    .await?;

    store.remove_many(&unique);
    app.notifier().notify(&Notice::success(
        "Data Deleted",
        format!(
            "{} item(s) have been successfully removed from the database.",
            deleted
        ),
    ));
    Ok(deleted)
}
