//! Обработка одной item-директории: стабильность → конвертация → удаление.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, WatchEvent, WatchEventKind};
use super::stability::{wait_until_stable, Stability};
use crate::converter::{ConvertOutcome, Converter};
use crate::error::ImportError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Item сконвертирован (или пропущен) и его директория удалена.
    Removed,
    /// Остановка пришла во время ожидания стабильности; директория не тронута.
    Interrupted,
}

pub struct ItemProcessor {
    converter: Arc<dyn Converter>,
    export_dir: PathBuf,
    poll_interval: Duration,
    events: EventSink,
}

impl ItemProcessor {
    pub fn new(
        converter: Arc<dyn Converter>,
        export_dir: impl Into<PathBuf>,
        poll_interval: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            converter,
            export_dir: export_dir.into(),
            poll_interval,
            events,
        }
    }

    /// Дождаться конца загрузки, сконвертировать и удалить `item`.
    ///
    /// Удаление не рекурсивное: если конвертер оставил файлы или в директории
    /// есть поддиректории, возвращается [`ImportError::Removal`].
    pub async fn process(
        &self,
        item: &Path,
        shutdown: &CancellationToken,
    ) -> Result<ItemOutcome, ImportError> {
        match wait_until_stable(item, self.poll_interval, shutdown).await? {
            Stability::Stable { polls } => {
                debug!("{} settled after {polls} poll(s)", item.display());
            }
            Stability::Interrupted => {
                info!("Stopped waiting for {}", item.display());
                return Ok(ItemOutcome::Interrupted);
            }
        }
        self.emit(WatchEventKind::ItemStable, item);

        info!("Converting {}...", item.display());
        match self.converter.convert(item, &self.export_dir).await? {
            ConvertOutcome::Converted { output } => {
                info!(
                    "Conversion finished for {} -> {}. Removing directory...",
                    item.display(),
                    output.display()
                );
                self.emit(WatchEventKind::ItemConverted, item);
            }
            ConvertOutcome::NoInputs => {
                info!(
                    "Nothing to convert in {}. Removing directory...",
                    item.display()
                );
                self.emit(WatchEventKind::ItemSkipped, item);
            }
        }

        std::fs::remove_dir(item).map_err(|e| ImportError::removal(item, e))?;
        info!("Removed {}", item.display());
        self.emit(WatchEventKind::ItemRemoved, item);
        Ok(ItemOutcome::Removed)
    }

    fn emit(&self, kind: WatchEventKind, path: &Path) {
        (self.events)(WatchEvent::new(kind, path));
    }
}
