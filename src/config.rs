//! Конфигурация watcher'а.
//!
//! Значения читаются из переменных окружения; для каждой есть дефолт,
//! совпадающий с раскладкой контейнера (`/data/import`, `/data/export`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ImportError;

/// Переменная окружения: корневая директория наблюдения.
pub const ENV_IMPORT_DIR: &str = "ABS_IMPORT_DIR";
/// Переменная окружения: корневая директория экспорта.
pub const ENV_EXPORT_DIR: &str = "ABS_EXPORT_DIR";
/// Переменная окружения: интервал опроса в секундах.
pub const ENV_POLL_INTERVAL_SECS: &str = "ABS_POLL_INTERVAL_SECS";

pub const DEFAULT_IMPORT_DIR: &str = "/data/import";
pub const DEFAULT_EXPORT_DIR: &str = "/data/export";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Параметры запуска watcher'а.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Корень: внутри лежат group-директории (авторы), в них item-директории (книги).
    pub watch_dir: PathBuf,
    /// Куда конвертер складывает результат.
    pub export_dir: PathBuf,
    /// Пауза между двумя снимками одной директории.
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(DEFAULT_IMPORT_DIR),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WatcherConfig {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        export_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            export_dir: export_dir.into(),
            poll_interval,
        }
    }

    /// Прочитать конфигурацию из окружения процесса.
    pub fn from_env() -> Result<Self, ImportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Собрать конфигурацию через произвольный источник значений.
    ///
    /// Отсутствующий ключ означает дефолт; пустая строка считается ошибкой.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ImportError> {
        let defaults = Self::default();

        let watch_dir = lookup(ENV_IMPORT_DIR).map_or(defaults.watch_dir, PathBuf::from);
        let export_dir = lookup(ENV_EXPORT_DIR).map_or(defaults.export_dir, PathBuf::from);
        let poll_interval = match lookup(ENV_POLL_INTERVAL_SECS) {
            Some(raw) => parse_interval(&raw)?,
            None => defaults.poll_interval,
        };

        let config = Self {
            watch_dir,
            export_dir,
            poll_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Проверить, что пути абсолютные, а интервал ненулевой.
    pub fn validate(&self) -> Result<(), ImportError> {
        ensure_absolute(&self.watch_dir, ENV_IMPORT_DIR)?;
        ensure_absolute(&self.export_dir, ENV_EXPORT_DIR)?;
        if self.poll_interval.is_zero() {
            return Err(ImportError::Config {
                key: ENV_POLL_INTERVAL_SECS,
                message: "poll interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_interval(raw: &str) -> Result<Duration, ImportError> {
    let secs: u64 = raw.trim().parse().map_err(|e| ImportError::Config {
        key: ENV_POLL_INTERVAL_SECS,
        message: format!("{raw:?} is not a number of seconds ({e})"),
    })?;
    Ok(Duration::from_secs(secs))
}

fn ensure_absolute(path: &Path, key: &str) -> Result<(), ImportError> {
    if path.as_os_str().is_empty() {
        return Err(ImportError::InvalidPath(format!("empty {key}")));
    }
    if !path.is_absolute() {
        return Err(ImportError::InvalidPath(format!(
            "{key} must be absolute: {}",
            path.display()
        )));
    }
    Ok(())
}
