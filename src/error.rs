use std::path::PathBuf;

/// Единый тип ошибок abs_import.
///
/// Все ошибки фатальны для задачи, в которой они возникли, и никогда не
/// повторяются автоматически.
#[derive(thiserror::Error, Debug)]
pub enum ImportError {
  #[error("Invalid path: {0}")]
  InvalidPath(String),

  #[error("Invalid configuration value for {key}: {message}")]
  Config { key: &'static str, message: String },

  #[error("Cannot list directory {path:?}: {source}")]
  List {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("Multiple files with different formats found in {path:?}: {formats:?}")]
  Conflict { path: PathBuf, formats: Vec<String> },

  #[error("Cannot remove directory {path:?}: {source}")]
  Removal {
    path: PathBuf,
    source: std::io::Error,
  },

  #[error("Conversion failed for {path:?}: {message}")]
  Conversion { path: PathBuf, message: String },

  #[error("Task for {path:?} aborted: {source}")]
  TaskAborted {
    path: PathBuf,
    source: tokio::task::JoinError,
  },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl ImportError {
  pub(crate) fn list(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::List {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn removal(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Removal {
      path: path.into(),
      source,
    }
  }
}
