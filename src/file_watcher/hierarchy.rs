//! Иерархический опрос: root → group → item.
//!
//! Все уровни обслуживает одна функция [`watch_level`], параметризованная
//! ролью. На каждом опросе новые поддиректории запускаются пачкой (batch)
//! отдельных задач, и следующий опрос начинается только после завершения
//! всех задач пачки. Поэтому одна и та же директория не запускается дважды,
//! а новые соседи обнаруживаются только после того, как пачка отработала.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, WatchEvent, WatchEventKind};
use super::processor::ItemProcessor;
use super::snapshot::DirectorySnapshot;
use super::stability::pause;
use crate::error::ImportError;

/// Роль watch-задачи по глубине вложенности.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Root,
    Group,
    Item,
}

impl Role {
    fn child(self) -> Option<Role> {
        match self {
            Role::Root => Some(Role::Group),
            Role::Group => Some(Role::Item),
            Role::Item => None,
        }
    }

    /// Group-директория удаляется, как только опустеет; root живёт до остановки.
    fn removes_when_empty(self) -> bool {
        matches!(self, Role::Group)
    }

    fn discovered_event(self) -> WatchEventKind {
        match self {
            Role::Root | Role::Group => WatchEventKind::GroupDiscovered,
            Role::Item => WatchEventKind::ItemDiscovered,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Root => "root",
            Role::Group => "group",
            Role::Item => "item",
        };
        f.write_str(name)
    }
}

/// Общее состояние всех watch-задач одного watcher'а.
pub struct WatchContext {
    poll_interval: Duration,
    processor: Arc<ItemProcessor>,
    events: EventSink,
    shutdown: CancellationToken,
}

impl WatchContext {
    pub fn new(
        poll_interval: Duration,
        processor: Arc<ItemProcessor>,
        events: EventSink,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            poll_interval,
            processor,
            events,
            shutdown,
        }
    }

    fn emit(&self, kind: WatchEventKind, path: &Path) {
        (self.events)(WatchEvent::new(kind, path));
    }
}

/// Итог одной пачки.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct BatchReport {
    pub(crate) spawned: usize,
    pub(crate) failed: Vec<PathBuf>,
}

/// Наблюдать корневую директорию до сигнала остановки.
///
/// Ошибка листинга самого корня завершает watcher; ошибки group- и
/// item-задач логируются и на корень не влияют.
pub fn watch_root(ctx: Arc<WatchContext>, root: PathBuf) -> BoxFuture<'static, Result<(), ImportError>> {
    watch_level(ctx, root, Role::Root)
}

fn watch_level(
    ctx: Arc<WatchContext>,
    dir: PathBuf,
    role: Role,
) -> BoxFuture<'static, Result<(), ImportError>> {
    async move {
        let mut known: BTreeSet<PathBuf> = DirectorySnapshot::capture(&dir)?.into_subdirectories();
        run_batch(&ctx, role, known.iter().cloned().collect()).await;

        loop {
            if role.removes_when_empty() && !has_entries(&dir)? {
                break;
            }
            if !pause(ctx.poll_interval, &ctx.shutdown).await {
                debug!("Stopped watching {} {}", role, dir.display());
                return Ok(());
            }

            let snapshot = DirectorySnapshot::capture(&dir)?;
            let discovered = snapshot.new_subdirectories(&known);
            debug!(
                "Polled {} {}: {} new subdirectories",
                role,
                dir.display(),
                discovered.len()
            );
            run_batch(&ctx, role, discovered).await;
            known = snapshot.into_subdirectories();
        }

        std::fs::remove_dir(&dir).map_err(|e| ImportError::removal(&dir, e))?;
        info!("Removed {}", dir.display());
        ctx.emit(WatchEventKind::GroupRemoved, &dir);
        Ok::<(), ImportError>(())
    }
    .boxed()
}

/// Запустить по задаче на каждую директорию и дождаться всех.
///
/// Упавшая задача не отменяет соседей: сначала собираются все результаты,
/// затем каждая ошибка логируется с путём и уходит событием `TaskFailed`.
async fn run_batch(ctx: &Arc<WatchContext>, parent: Role, children: Vec<PathBuf>) -> BatchReport {
    let Some(role) = parent.child() else {
        return BatchReport::default();
    };
    if children.is_empty() {
        return BatchReport::default();
    }

    let mut paths = Vec::with_capacity(children.len());
    let mut handles = Vec::with_capacity(children.len());
    for path in children {
        info!("Watching {}...", display_name(&path));
        ctx.emit(role.discovered_event(), &path);
        handles.push(spawn_child(ctx.clone(), role, path.clone()));
        paths.push(path);
    }

    let mut report = BatchReport {
        spawned: paths.len(),
        failed: Vec::new(),
    };
    for (path, joined) in paths.into_iter().zip(join_all(handles).await) {
        let outcome = joined.unwrap_or_else(|source| {
            Err(ImportError::TaskAborted {
                path: path.clone(),
                source,
            })
        });
        if let Err(err) = outcome {
            error!("{} task for {} failed: {}", role, path.display(), err);
            ctx.emit(WatchEventKind::TaskFailed(err.to_string()), &path);
            report.failed.push(path);
        }
    }

    debug!(
        "Batch of {} {} task(s) finished, {} failed",
        report.spawned,
        role,
        report.failed.len()
    );
    report
}

fn spawn_child(
    ctx: Arc<WatchContext>,
    role: Role,
    path: PathBuf,
) -> JoinHandle<Result<(), ImportError>> {
    match role {
        Role::Item => tokio::spawn(async move {
            ctx.processor
                .process(&path, &ctx.shutdown)
                .await
                .map(|_| ())
        }),
        Role::Root | Role::Group => tokio::spawn(watch_level(ctx, path, role)),
    }
}

fn has_entries(dir: &Path) -> Result<bool, ImportError> {
    let mut entries = std::fs::read_dir(dir).map_err(|e| ImportError::list(dir, e))?;
    Ok(entries.next().is_some())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
