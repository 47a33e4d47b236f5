//! Логирование abs_import.
//!
//! ## Уровни логов
//! - `ERROR`: упавшие задачи (с путём директории)
//! - `WARN`:  некритичные странности файловой системы
//! - `INFO`:  жизненный цикл: обнаружение, стабилизация, конвертация, удаление
//! - `DEBUG`: детали каждого опроса
//!
//! ## Использование
//! ```ignore
//! abs_import::logging::init_logging(); // один раз при старте
//! log::info!("Watching {}...", path.display());
//! ```

use std::io::Write;
use std::sync::Once;

use log::{Level, LevelFilter};

static INIT: Once = Once::new();

/// Инициализировать логирование (idempotent).
///
/// Уровень управляется переменной окружения `RUST_LOG`, например
/// `RUST_LOG=abs_import=debug`.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_module("abs_import", LevelFilter::Info)
            .parse_env("RUST_LOG")
            .format(|buf, record| {
                // Формат: [timestamp] [LEVEL] [target] message
                writeln!(
                    buf,
                    "[{}] [{}] [{}] {}",
                    wall_clock_timestamp(),
                    level_tag(record.level()),
                    record.target(),
                    record.args()
                )
            })
            .try_init();
    });
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "E",
        Level::Warn => "W",
        Level::Info => "I",
        Level::Debug => "D",
        Level::Trace => "T",
    }
}

/// `hh:mm:ss.mmm` (UTC) без зависимости от chrono.
fn wall_clock_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();

    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        now.subsec_millis()
    )
}
