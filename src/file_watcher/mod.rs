//! Модуль наблюдения за директорией импорта.
//!
//! Отвечает за:
//! - опрос дерева `root/<group>/<item>` с заданным интервалом
//! - определение момента окончания загрузки item-директории
//! - запуск конвертера и удаление обработанных директорий
//! - graceful shutdown
//!
//! Нативные уведомления ФС не используются: наблюдение построено на опросе.

mod events;
mod hierarchy;
mod processor;
mod snapshot;
mod stability;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::converter::Converter;
use crate::error::ImportError;

pub use events::{EventSink, WatchEvent, WatchEventKind};
pub use hierarchy::{watch_root, Role, WatchContext};
pub use processor::{ItemOutcome, ItemProcessor};
pub use snapshot::{snapshots_equal, DirectorySnapshot};
pub use stability::{wait_until_stable, Stability};

/// Handle запущенного watcher'а.
///
/// Drop handle'а тоже посылает сигнал остановки, но не ждёт завершения задач.
pub struct WatcherHandle {
  shutdown: CancellationToken,
  join: Option<JoinHandle<Result<(), ImportError>>>,
  watch_dir: PathBuf,
}

impl WatcherHandle {
  pub fn watch_dir(&self) -> &Path {
    &self.watch_dir
  }

  /// Root-задача завершилась (остановка или фатальная ошибка корня).
  pub fn is_finished(&self) -> bool {
    self.join.as_ref().map_or(true, JoinHandle::is_finished)
  }

  /// Дождаться завершения root-задачи.
  ///
  /// Без [`stop`](Self::stop) возвращается только при фатальной ошибке
  /// листинга корня. Отмена этого future не теряет задачу.
  pub async fn join(&mut self) -> Result<(), ImportError> {
    let Some(join) = self.join.as_mut() else {
      return Ok(());
    };
    let result = join.await;
    self.join = None;

    result.unwrap_or_else(|source| {
      Err(ImportError::TaskAborted {
        path: self.watch_dir.clone(),
        source,
      })
    })
  }

  /// Остановить watcher и дождаться завершения всех задач.
  ///
  /// Сигнал замечается в паузах между опросами; уже идущая конвертация
  /// доводится до конца.
  pub async fn stop(mut self) -> Result<(), ImportError> {
    info!("Watcher shutdown requested");
    self.shutdown.cancel();
    self.join().await
  }
}

impl Drop for WatcherHandle {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

/// Запустить watcher.
///
/// Должна вызываться внутри tokio runtime. Недостающие директории импорта и
/// экспорта создаются. `on_event` вызывается на каждое событие жизненного
/// цикла задач.
pub fn start_watcher(
  config: WatcherConfig,
  converter: Arc<dyn Converter>,
  on_event: impl Fn(WatchEvent) + Send + Sync + 'static,
) -> Result<WatcherHandle, ImportError> {
  config.validate()?;
  std::fs::create_dir_all(&config.watch_dir)?;
  std::fs::create_dir_all(&config.export_dir)?;

  info!(
    "Starting watcher for: {} (export to {}, poll every {:?})",
    config.watch_dir.display(),
    config.export_dir.display(),
    config.poll_interval
  );

  let events: EventSink = Arc::new(on_event);
  let shutdown = CancellationToken::new();
  let processor = Arc::new(ItemProcessor::new(
    converter,
    config.export_dir.clone(),
    config.poll_interval,
    events.clone(),
  ));
  let ctx = Arc::new(WatchContext::new(
    config.poll_interval,
    processor,
    events,
    shutdown.clone(),
  ));

  let root = config.watch_dir.clone();
  let join = tokio::spawn(async move {
    let result = watch_root(ctx, root.clone()).await;
    match &result {
      Ok(()) => info!("Watcher for {} finished", root.display()),
      Err(e) => error!("Watcher for {} stopped: {e}", root.display()),
    }
    result
  });

  Ok(WatcherHandle {
    shutdown,
    join: Some(join),
    watch_dir: config.watch_dir,
  })
}
