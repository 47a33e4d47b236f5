//! Снимок непосредственного содержимого одной директории.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::ImportError;

/// Неизменяемый снимок директории на момент одного прохода листинга.
///
/// Снимок не атомарен относительно параллельных изменений ФС.
#[derive(Clone, Debug, Default)]
pub struct DirectorySnapshot {
    subdirectories: BTreeSet<PathBuf>,
    file_sizes: BTreeMap<PathBuf, u64>,
}

impl DirectorySnapshot {
    /// Прочитать содержимое `path` ровно один раз.
    ///
    /// Если `path` не читается, возвращается [`ImportError::List`].
    /// Запись, исчезнувшая между листингом и `stat`, пропускается.
    pub fn capture(path: &Path) -> Result<Self, ImportError> {
        let mut snapshot = Self::default();

        for entry in std::fs::read_dir(path).map_err(|e| ImportError::list(path, e))? {
            let entry = entry.map_err(|e| ImportError::list(path, e))?;
            let child = entry.path();

            let metadata = match std::fs::metadata(&child) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} vanished while listing {}", child.display(), path.display());
                    continue;
                }
                Err(e) => return Err(ImportError::list(path, e)),
            };

            if metadata.is_dir() {
                snapshot.subdirectories.insert(child);
            } else if metadata.is_file() {
                snapshot.file_sizes.insert(child, metadata.len());
            }
        }

        Ok(snapshot)
    }

    pub fn subdirectories(&self) -> &BTreeSet<PathBuf> {
        &self.subdirectories
    }

    pub fn file_sizes(&self) -> &BTreeMap<PathBuf, u64> {
        &self.file_sizes
    }

    pub fn into_subdirectories(self) -> BTreeSet<PathBuf> {
        self.subdirectories
    }

    /// Поддиректории снимка, которых нет в `known`, в отсортированном порядке.
    pub fn new_subdirectories(&self, known: &BTreeSet<PathBuf>) -> Vec<PathBuf> {
        self.subdirectories.difference(known).cloned().collect()
    }
}

/// Равенство снимков для определения стабильности.
///
/// Сравниваются только размеры файлов (тот же набор путей, те же байты).
/// Поддиректории намеренно не участвуют: они нужны лишь для обнаружения
/// новых записей.
pub fn snapshots_equal(a: &DirectorySnapshot, b: &DirectorySnapshot) -> bool {
    a.file_sizes == b.file_sizes
}
