//! Точка входа демона: конфигурация из окружения, однопоточный runtime,
//! остановка по Ctrl+C.

use std::sync::Arc;

use log::{debug, info};

use abs_import::{logging, start_watcher, FfmpegConverter, ImportError, WatcherConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ImportError> {
    logging::init_logging();

    let config = WatcherConfig::from_env()?;
    let converter = Arc::new(FfmpegConverter::from_env()?);

    let mut handle = start_watcher(config, converter, |event| {
        debug!("{:?} {}", event.kind, event.path.display());
    })?;

    let interrupted = tokio::select! {
        result = handle.join() => {
            result?;
            false
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
    };

    if interrupted {
        handle.stop().await?;
    }
    info!("Bye");
    Ok(())
}
