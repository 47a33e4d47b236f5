//! abs_import
//!
//! Демон импорта аудиокниг: наблюдает за деревом `import/<автор>/<книга>`,
//! ждёт окончания загрузки каждой книги, склеивает её файлы в один
//! `audiobook.m4b` в директории экспорта и убирает за собой обработанные
//! директории.
//!
//! Опрос и конвертация работают как кооперативные задачи tokio;
//! конвертер подключается через трейт [`converter::Converter`].

pub mod config;
pub mod converter;
pub mod error;
pub mod file_watcher;
pub mod logging;

pub use config::WatcherConfig;
pub use converter::{Converter, FfmpegConverter};
pub use error::ImportError;
pub use file_watcher::{start_watcher, WatchEvent, WatchEventKind, WatcherHandle};
