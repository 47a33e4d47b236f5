//! Общие заглушки для unit-тестов file_watcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::events::{EventSink, WatchEvent, WatchEventKind};
use crate::converter::{
    output_dir, remove_input_files, scan_inputs, ConvertOutcome, Converter, OUTPUT_FILE_NAME,
};
use crate::error::ImportError;

/// Конвертер без ffmpeg: проверяет конфликт форматов, пишет пустой результат
/// и удаляет входные файлы.
#[derive(Default)]
pub(crate) struct FakeConverter {
    leave_residue: bool,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeConverter {
    /// После конвертации оставляет в item-директории лишний файл.
    pub(crate) fn leaving_residue() -> Self {
        Self {
            leave_residue: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(
        &self,
        item_dir: &Path,
        export_root: &Path,
    ) -> Result<ConvertOutcome, ImportError> {
        self.calls.lock().unwrap().push(item_dir.to_path_buf());

        if scan_inputs(item_dir)?.is_none() {
            return Ok(ConvertOutcome::NoInputs);
        }
        let target = output_dir(item_dir, export_root)?;
        fs::create_dir_all(&target)?;
        let output = target.join(OUTPUT_FILE_NAME);
        fs::write(&output, b"")?;

        remove_input_files(item_dir)?;
        if self.leave_residue {
            fs::write(item_dir.join("ffmpeg.log"), b"residue")?;
        }
        Ok(ConvertOutcome::Converted { output })
    }
}

/// Накопитель событий вместе с виртуальным временем их прихода.
#[derive(Clone, Default)]
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<(tokio::time::Instant, WatchEvent)>>>,
}

impl EventLog {
    pub(crate) fn sink(&self) -> EventSink {
        let events = self.events.clone();
        Arc::new(move |event| {
            events
                .lock()
                .unwrap()
                .push((tokio::time::Instant::now(), event));
        })
    }

    pub(crate) fn kinds(&self) -> Vec<WatchEventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.kind.clone())
            .collect()
    }

    /// Первое событие `kind` для `path`, если оно было.
    pub(crate) fn first(&self, kind: &WatchEventKind, path: &Path) -> Option<tokio::time::Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| &e.kind == kind && e.path == path)
            .map(|(at, _)| *at)
    }

    pub(crate) fn failures(&self) -> Vec<PathBuf> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| matches!(e.kind, WatchEventKind::TaskFailed(_)))
            .map(|(_, e)| e.path.clone())
            .collect()
    }
}
