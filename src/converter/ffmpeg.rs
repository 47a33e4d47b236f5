//! Конвертер на внешних процессах `ffmpeg` / `ffprobe`.
//!
//! Все входные файлы склеиваются через concat-демультиплексор в один
//! `audiobook.m4b`. Форматы без потерь перекодируются в AAC; сжатые форматы
//! копируются как есть, если их битрейт не превышает порога
//! (`ABS_MAX_BITRATE`, по умолчанию [`DEFAULT_MAX_BITRATE`]).

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;

use super::{
    output_dir, remove_input_files, scan_inputs, ConvertOutcome, Converter, MediaInputs,
};
use crate::error::ImportError;

/// Битрейт (бит/с), выше которого сжатый вход перекодируется.
pub const DEFAULT_MAX_BITRATE: u64 = 192_000;
/// Имя итогового файла в директории экспорта.
pub const OUTPUT_FILE_NAME: &str = "audiobook.m4b";

const ENV_FFMPEG: &str = "ABS_FFMPEG";
const ENV_FFPROBE: &str = "ABS_FFPROBE";
const ENV_MAX_BITRATE: &str = "ABS_MAX_BITRATE";

/// Сколько последних строк stderr ffmpeg попадает в текст ошибки.
const STDERR_TAIL_LINES: usize = 5;

#[derive(Clone, Debug)]
pub struct FfmpegConverter {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    max_bitrate: u64,
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            max_bitrate: DEFAULT_MAX_BITRATE,
        }
    }
}

impl FfmpegConverter {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            ..Self::default()
        }
    }

    /// Пути к бинарникам из `ABS_FFMPEG` / `ABS_FFPROBE` (иначе поиск в `PATH`)
    /// и порог битрейта из `ABS_MAX_BITRATE`.
    pub fn from_env() -> Result<Self, ImportError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ImportError> {
        let defaults = Self::default();
        let max_bitrate = match lookup(ENV_MAX_BITRATE) {
            Some(raw) => raw.trim().parse().map_err(|e| ImportError::Config {
                key: ENV_MAX_BITRATE,
                message: format!("{raw:?} is not a bit rate ({e})"),
            })?,
            None => defaults.max_bitrate,
        };

        Ok(Self {
            ffmpeg: lookup(ENV_FFMPEG).map_or(defaults.ffmpeg, PathBuf::from),
            ffprobe: lookup(ENV_FFPROBE).map_or(defaults.ffprobe, PathBuf::from),
            max_bitrate,
        })
    }

    async fn needs_reencode(&self, inputs: &MediaInputs) -> Result<bool, ImportError> {
        if inputs.format.is_lossless() {
            return Ok(true);
        }
        let Some(first) = inputs.files.first() else {
            return Ok(false);
        };

        match self.probe_bitrate(first).await? {
            Some(bitrate) => {
                debug!("{} has bit rate {bitrate}", first.display());
                Ok(bitrate > self.max_bitrate)
            }
            None => {
                warn!(
                    "Bit rate of {} is unknown; re-encoding",
                    first.display()
                );
                Ok(true)
            }
        }
    }

    /// Битрейт первого аудиопотока; `None`, если ffprobe его не знает.
    async fn probe_bitrate(&self, file: &Path) -> Result<Option<u64>, ImportError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a:0",
                "-show_entries",
                "stream=bit_rate",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(file)
            .output()
            .await
            .map_err(|e| ImportError::Conversion {
                path: file.to_path_buf(),
                message: format!("cannot run {}: {e}", self.ffprobe.display()),
            })?;

        if !output.status.success() {
            return Err(ImportError::Conversion {
                path: file.to_path_buf(),
                message: format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            });
        }

        Ok(parse_bitrate(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(
        &self,
        item_dir: &Path,
        export_root: &Path,
    ) -> Result<ConvertOutcome, ImportError> {
        let Some(inputs) = scan_inputs(item_dir)? else {
            info!("No supported files in {}", item_dir.display());
            return Ok(ConvertOutcome::NoInputs);
        };

        let reencode = self.needs_reencode(&inputs).await?;
        info!(
            "Merging {} {} file(s) from {} ({})",
            inputs.files.len(),
            inputs.format,
            item_dir.display(),
            if reencode { "re-encode" } else { "stream copy" }
        );

        // Список живёт вне item-директории и удаляется при drop.
        let mut list = tempfile::Builder::new()
            .prefix("abs-import-")
            .suffix(".concat")
            .tempfile()?;
        list.write_all(concat_list(&inputs.files).as_bytes())?;
        list.flush()?;

        let target_dir = output_dir(item_dir, export_root)?;
        let created = ExportDirGuard::create(&target_dir)?;
        let output = target_dir.join(OUTPUT_FILE_NAME);

        let result = Command::new(&self.ffmpeg)
            .args(ffmpeg_args(list.path(), &output, reencode))
            .output()
            .await
            .map_err(|e| ImportError::Conversion {
                path: item_dir.to_path_buf(),
                message: format!("cannot run {}: {e}", self.ffmpeg.display()),
            })?;

        if !result.status.success() {
            return Err(ImportError::Conversion {
                path: item_dir.to_path_buf(),
                message: format!(
                    "ffmpeg exited with {}: {}",
                    result.status,
                    stderr_tail(&result.stderr)
                ),
            });
        }
        created.keep();

        let removed = remove_input_files(item_dir)?;
        debug!("Removed {removed} processed file(s) from {}", item_dir.display());
        Ok(ConvertOutcome::Converted { output })
    }
}

/// Директории экспорта, созданные под результат.
///
/// Если конвертация не дошла до [`keep`](Self::keep), созданные директории
/// удаляются (только пустые, не рекурсивно).
struct ExportDirGuard {
    created: Vec<PathBuf>,
}

impl ExportDirGuard {
    fn create(dir: &Path) -> Result<Self, ImportError> {
        let created: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|d| !d.exists())
            .map(Path::to_path_buf)
            .collect();
        std::fs::create_dir_all(dir)?;
        Ok(Self { created })
    }

    fn keep(mut self) {
        self.created.clear();
    }
}

impl Drop for ExportDirGuard {
    fn drop(&mut self) {
        // От самой глубокой к верхней.
        for dir in &self.created {
            if let Err(e) = std::fs::remove_dir(dir) {
                warn!("Cannot clean up {}: {e}", dir.display());
                break;
            }
        }
    }
}

/// Содержимое списка для `-f concat`: `file '<путь>'` на строку.
fn concat_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|file| {
            let escaped = file.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn ffmpeg_args(list_path: &Path, output: &Path, reencode: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-nostdin", "-f", "concat", "-safe", "0", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(list_path.as_os_str().to_owned());

    let codec: &[&str] = if reencode {
        &["-c:a", "libfdk_aac", "-vbr", "5"]
    } else {
        &["-c", "copy"]
    };
    args.extend(codec.iter().map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

fn parse_bitrate(stdout: &str) -> Option<u64> {
    stdout.lines().next()?.trim().parse().ok()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ")
}
