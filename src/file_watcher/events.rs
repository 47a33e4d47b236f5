//! События жизненного цикла watch-задач.
//!
//! Передаются в callback, переданный в [`start_watcher`](super::start_watcher).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    GroupDiscovered,
    ItemDiscovered,
    /// Два снимка подряд совпали, загрузка считается завершённой.
    ItemStable,
    ItemConverted,
    /// Конвертер не нашёл поддерживаемых файлов.
    ItemSkipped,
    ItemRemoved,
    GroupRemoved,
    /// Задача завершилась фатальной ошибкой (текст ошибки).
    TaskFailed(String),
}

#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Директория, к которой относится событие.
    pub path: PathBuf,
    /// Время события (Unix timestamp в миллисекундах).
    pub occurred_at_ms: i64,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        let occurred_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_millis(0))
            .as_millis() as i64;

        Self {
            kind,
            path: path.into(),
            occurred_at_ms,
        }
    }
}

/// Получатель событий, общий для всех задач.
pub type EventSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;
