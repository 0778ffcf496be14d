//! DB の内容を写したインメモリのリアクティブストア
//!
//! 書き込み系の操作は `pub(crate)` で、コマンド層だけが呼べる。
//! コマンド層は必ず DB への書き込みが成功してからストアを更新する。

use std::cmp::Ordering;
use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::watch;

use crate::models::{Invoice, Kilometer, Metric, Weight};

/// ストアに載せるエンティティ
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> i64;

    /// ストア内の並び順
    fn order(&self, other: &Self) -> Ordering;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity {0} is not in the store")]
    NotFound(i64),
}

/// エンティティ集合を並び順を保ったまま保持し、変更を購読者へ通知する
pub struct ReactiveStore<T: Entity> {
    tx: watch::Sender<Vec<T>>,
}

impl<T: Entity> ReactiveStore<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// 現在の内容のコピー
    pub fn snapshot(&self) -> Vec<T> {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: i64) -> Option<T> {
        self.tx.borrow().iter().find(|e| e.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// 変更通知を受け取る読み取り専用ハンドル
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.tx.subscribe()
    }

    /// ハイドレーション結果で全置換する
    pub(crate) fn replace_all(&self, mut entities: Vec<T>) {
        entities.sort_by(T::order);
        self.tx.send_replace(entities);
    }

    /// 1件追加して並べ直す。id は直前の INSERT で DB が採番した値であること
    pub(crate) fn insert(&self, entity: T) {
        self.tx.send_modify(|items| {
            items.push(entity);
            items.sort_by(T::order);
        });
    }

    /// 同じ id のエンティティを置き換える。見つからなければ何もしない
    pub(crate) fn update(&self, entity: T) -> Result<(), StoreError> {
        let id = entity.id();
        let mut entity = Some(entity);
        self.tx.send_if_modified(|items| {
            let Some(pos) = items.iter().position(|e| e.id() == id) else {
                return false;
            };
            if let Some(updated) = entity.take() {
                items[pos] = updated;
            }
            items.sort_by(T::order);
            true
        });
        match entity {
            None => Ok(()),
            Some(_) => Err(StoreError::NotFound(id)),
        }
    }

    /// 指定 id をまとめて取り除き、取り除いた件数を返す
    ///
    /// 存在しない id は無視する（集合差）。
    pub(crate) fn remove_many(&self, ids: &HashSet<i64>) -> usize {
        let mut removed = 0;
        self.tx.send_if_modified(|items| {
            let before = items.len();
            items.retain(|e| !ids.contains(&e.id()));
            removed = before - items.len();
            removed > 0
        });
        removed
    }

    pub(crate) fn clear(&self) {
        self.replace_all(Vec::new());
    }
}

impl<T: Entity> Default for ReactiveStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// records ストア (my.db) の写し
#[derive(Default)]
pub struct RecordsState {
    pub weights: ReactiveStore<Weight>,
    pub kilometers: ReactiveStore<Kilometer>,
    pub invoices: ReactiveStore<Invoice>,
}

impl RecordsState {
    pub(crate) fn clear(&self) {
        self.weights.clear();
        self.kilometers.clear();
        self.invoices.clear();
    }
}

/// definitions ストア (metrics.db) の写し
#[derive(Default)]
pub struct DefinitionsState {
    pub metrics: ReactiveStore<Metric>,
}

impl DefinitionsState {
    pub(crate) fn clear(&self) {
        self.metrics.clear();
    }
}
