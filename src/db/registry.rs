use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::db::{DbHandle, StoreKind};

/// ストア種別ごとの初期化状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitState {
    #[default]
    Uninitialized,
    InFlight,
    Ready,
}

#[derive(Default)]
struct Slot {
    state: InitState,
    handle: Option<Arc<DbHandle>>,
}

/// 開いている DB 接続の置き場。種別ごとに最大1つ
#[derive(Default)]
pub struct ConnectionRegistry {
    slots: Mutex<HashMap<StoreKind, Slot>>,
    // reset のたびに進める。古い世代のガードは登録できない
    generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<StoreKind, Slot>> {
        // 保持しているのは Arc と状態だけなので、poison されても中身は使える
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get(&self, kind: StoreKind) -> Option<Arc<DbHandle>> {
        self.slots().get(&kind).and_then(|slot| slot.handle.clone())
    }

    pub fn state(&self, kind: StoreKind) -> InitState {
        self.slots()
            .get(&kind)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// 初期化を開始する
    ///
    /// すでに初期化中・完了済みなら None。重複したトリガーはここで1回にまとめる。
    pub fn begin_init(&self, kind: StoreKind) -> Option<InitGuard<'_>> {
        let mut slots = self.slots();
        let slot = slots.entry(kind).or_default();
        if slot.state != InitState::Uninitialized {
            log::debug!("{} store initialization already {:?}", kind, slot.state);
            return None;
        }
        slot.state = InitState::InFlight;
        Some(InitGuard {
            registry: self,
            kind,
            generation: self.generation.load(Ordering::SeqCst),
            done: false,
        })
    }

    /// 新しい接続を登録する。以前の接続は先に解放する
    pub fn install(&self, kind: StoreKind, handle: DbHandle) -> Arc<DbHandle> {
        debug_assert_eq!(handle.kind(), kind);
        let handle = Arc::new(handle);
        let previous = {
            let mut slots = self.slots();
            let slot = slots.entry(kind).or_default();
            slot.state = InitState::Ready;
            slot.handle.replace(Arc::clone(&handle))
        };
        if let Some(previous) = previous {
            release_handle(previous);
        }
        log::info!("{} database connected: {}", kind, handle.path().display());
        handle
    }

    /// 接続を外して閉じ、状態を未初期化に戻す
    pub fn release(&self, kind: StoreKind) {
        let previous = {
            let mut slots = self.slots();
            slots.remove(&kind).and_then(|slot| slot.handle)
        };
        if let Some(previous) = previous {
            release_handle(previous);
        }
    }

    /// 全ての接続を解放する（ルートパス変更時）
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for kind in StoreKind::ALL {
            self.release(kind);
        }
    }

    fn finish_without_handle(&self, kind: StoreKind) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&kind) {
            if slot.state == InitState::InFlight {
                slot.state = if slot.handle.is_some() {
                    InitState::Ready
                } else {
                    InitState::Uninitialized
                };
            }
        }
    }
}

/// 初期化中であることを表すガード
///
/// `complete` せずに drop されたら未初期化に戻り、次のトリガーで再試行できる。
pub struct InitGuard<'a> {
    registry: &'a ConnectionRegistry,
    kind: StoreKind,
    generation: u64,
    done: bool,
}

impl InitGuard<'_> {
    /// 接続を登録して初期化を完了する
    ///
    /// 途中で reset された場合は接続を閉じて None を返す。
    pub fn complete(mut self, conn: Connection, path: PathBuf) -> Option<Arc<DbHandle>> {
        let handle = DbHandle::new(self.kind, path, conn);
        if self.registry.generation.load(Ordering::SeqCst) != self.generation {
            log::info!("discarding {} connection opened before a reset", self.kind);
            release_handle(Arc::new(handle));
            return None;
        }
        self.done = true;
        Some(self.registry.install(self.kind, handle))
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        let current = self.registry.generation.load(Ordering::SeqCst);
        if !self.done && current == self.generation {
            self.registry.finish_without_handle(self.kind);
        }
    }
}

fn release_handle(handle: Arc<DbHandle>) {
    let kind = handle.kind();
    match Arc::try_unwrap(handle) {
        Ok(handle) => match handle.close() {
            Ok(()) => log::debug!("closed previous {} connection", kind),
            Err(e) => log::warn!("failed to close previous {} connection: {}", kind, e),
        },
        Err(_) => log::debug!(
            "previous {} connection still in use, it closes when the last user drops it",
            kind
        ),
    }
}
