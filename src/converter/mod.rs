//! Конвертация item-директории в один итоговый файл.
//!
//! Ядро watcher'а знает только трейт [`Converter`]. Общие шаги, одинаковые для
//! любой реализации (поиск входных файлов, проверка конфликта форматов,
//! раскладка экспорта, удаление обработанных файлов), вынесены в функции этого
//! модуля.

mod ffmpeg;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ImportError;

pub use ffmpeg::{FfmpegConverter, DEFAULT_MAX_BITRATE, OUTPUT_FILE_NAME};

/// Поддерживаемые форматы входных файлов.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaFormat {
    Flac,
    Mp3,
    Wav,
    Mp4,
    M4b,
    M4a,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 6] = [
        MediaFormat::Flac,
        MediaFormat::Mp3,
        MediaFormat::Wav,
        MediaFormat::Mp4,
        MediaFormat::M4b,
        MediaFormat::M4a,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Flac => "flac",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Wav => "wav",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::M4b => "m4b",
            MediaFormat::M4a => "m4a",
        }
    }

    /// Формат по расширению файла (без учёта регистра).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    /// Форматы без потерь всегда перекодируются.
    pub fn is_lossless(self) -> bool {
        matches!(self, MediaFormat::Flac | MediaFormat::Wav)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// Входные файлы одной книги: один формат, отсортированы по имени без расширения.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaInputs {
    pub format: MediaFormat,
    pub files: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// Итоговый файл создан, входные файлы удалены.
    Converted { output: PathBuf },
    /// Поддерживаемых файлов нет; ничего не создано и не удалено.
    NoInputs,
}

/// Внешний конвертер item-директории.
///
/// Контракт:
/// - файлы более чем одного поддерживаемого формата → [`ImportError::Conflict`],
///   директория не трогается;
/// - нет поддерживаемых файлов → [`ConvertOutcome::NoInputs`];
/// - успех → ровно один результат в `export_root/<group>/<item>/` и удаление
///   всех файлов (не поддиректорий) непосредственно внутри `item_dir`.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        item_dir: &Path,
        export_root: &Path,
    ) -> Result<ConvertOutcome, ImportError>;
}

/// Найти поддерживаемые файлы в `item_dir`.
pub fn scan_inputs(item_dir: &Path) -> Result<Option<MediaInputs>, ImportError> {
    let mut files = Vec::new();
    let mut formats = BTreeSet::new();

    for entry in std::fs::read_dir(item_dir).map_err(|e| ImportError::list(item_dir, e))? {
        let path = entry.map_err(|e| ImportError::list(item_dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(format) = MediaFormat::from_path(&path) {
            formats.insert(format);
            files.push(path);
        }
    }

    if formats.len() > 1 {
        return Err(ImportError::Conflict {
            path: item_dir.to_path_buf(),
            formats: formats.iter().map(ToString::to_string).collect(),
        });
    }
    let Some(format) = formats.into_iter().next() else {
        return Ok(None);
    };

    files.sort_by(|a, b| a.file_stem().cmp(&b.file_stem()));
    Ok(Some(MediaInputs { format, files }))
}

/// `export_root/<имя group-директории>/<имя item-директории>`.
pub fn output_dir(item_dir: &Path, export_root: &Path) -> Result<PathBuf, ImportError> {
    let item_name = item_dir
        .file_name()
        .ok_or_else(|| ImportError::InvalidPath(format!("no item name in {}", item_dir.display())))?;
    let group_name = item_dir
        .parent()
        .and_then(Path::file_name)
        .ok_or_else(|| {
            ImportError::InvalidPath(format!("no group name in {}", item_dir.display()))
        })?;

    Ok(export_root.join(group_name).join(item_name))
}

/// Удалить все файлы непосредственно внутри `item_dir`; поддиректории остаются.
///
/// Возвращает число удалённых файлов.
pub fn remove_input_files(item_dir: &Path) -> Result<usize, ImportError> {
    let mut removed = 0;
    for entry in std::fs::read_dir(item_dir).map_err(|e| ImportError::list(item_dir, e))? {
        let path = entry.map_err(|e| ImportError::list(item_dir, e))?.path();
        if path.is_file() {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
