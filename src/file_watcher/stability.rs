//! Ожидание "тишины" в директории: загрузка считается завершённой, когда два
//! последовательных снимка совпадают по размерам файлов.

use std::path::Path;
use std::time::Duration;

use log::info;
use tokio_util::sync::CancellationToken;

use super::snapshot::{snapshots_equal, DirectorySnapshot};
use crate::error::ImportError;

/// Результат ожидания стабильности.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    /// Два снимка подряд совпали; `polls` — сколько повторных снимков понадобилось.
    Stable { polls: u32 },
    /// Ожидание прервано остановкой watcher'а.
    Interrupted,
}

/// Ждать, пока размеры файлов в `dir` перестанут меняться.
///
/// Ни лимита попыток, ни таймаута нет: бесконечно растущая директория
/// наблюдается бесконечно. Сравниваются только размеры, поэтому файл,
/// переписанный тем же количеством байт, считается неизменным.
pub async fn wait_until_stable(
    dir: &Path,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Result<Stability, ImportError> {
    info!(
        "Waiting {:?} for download to finish for {}...",
        interval,
        dir.display()
    );
    let mut previous = DirectorySnapshot::capture(dir)?;
    if !pause(interval, shutdown).await {
        return Ok(Stability::Interrupted);
    }

    let mut polls = 0;
    loop {
        let current = DirectorySnapshot::capture(dir)?;
        polls += 1;

        if snapshots_equal(&previous, &current) {
            info!("Download finished for {}", dir.display());
            return Ok(Stability::Stable { polls });
        }

        info!(
            "Waiting {:?} for download to finish for {}...",
            interval,
            dir.display()
        );
        previous = current;
        if !pause(interval, shutdown).await {
            return Ok(Stability::Interrupted);
        }
    }
}

/// Спать `interval`; `false`, если за это время пришёл сигнал остановки.
pub(crate) async fn pause(interval: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(interval) => true,
    }
}
