//! Интеграционные тесты для file_watcher.
//!
//! Используют временную директорию для изоляции тестов и виртуальное время
//! tokio (`start_paused`), поэтому интервал опроса в 60 с не замедляет прогон.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::Instant;

use abs_import::converter::{
    output_dir, remove_input_files, scan_inputs, ConvertOutcome, Converter, OUTPUT_FILE_NAME,
};
use abs_import::{start_watcher, ImportError, WatchEvent, WatchEventKind, WatcherConfig};

const INTERVAL: Duration = Duration::from_secs(60);

/// Собирает события вместе с виртуальным временем их прихода.
#[derive(Clone, Default)]
struct EventCollector {
    events: Arc<Mutex<Vec<(Instant, WatchEvent)>>>,
}

impl EventCollector {
    fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: WatchEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }

    fn position(&self, kind: &WatchEventKind, path: &Path) -> Option<usize> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .position(|(_, e)| &e.kind == kind && e.path == path)
    }

    fn time_of(&self, kind: &WatchEventKind, path: &Path) -> Option<Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| &e.kind == kind && e.path == path)
            .map(|(at, _)| *at)
    }

    fn failure_for(&self, path: &Path) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find_map(|(_, e)| match &e.kind {
                WatchEventKind::TaskFailed(message) if e.path == path => Some(message.clone()),
                _ => None,
            })
    }
}

/// Конвертер без ffmpeg: тот же контракт, пустой результат.
#[derive(Default)]
struct RecordingConverter {
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingConverter {
    fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for RecordingConverter {
    async fn convert(
        &self,
        item_dir: &Path,
        export_root: &Path,
    ) -> Result<ConvertOutcome, ImportError> {
        self.calls.lock().unwrap().push(item_dir.to_path_buf());

        if scan_inputs(item_dir)?.is_none() {
            return Ok(ConvertOutcome::NoInputs);
        }
        let target = output_dir(item_dir, export_root)?;
        fs::create_dir_all(&target)?;
        let output = target.join(OUTPUT_FILE_NAME);
        fs::write(&output, b"m4b")?;
        remove_input_files(item_dir)?;
        Ok(ConvertOutcome::Converted { output })
    }
}

struct Setup {
    temp: TempDir,
    import: PathBuf,
    export: PathBuf,
    converter: Arc<RecordingConverter>,
    collector: EventCollector,
}

fn setup() -> Setup {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let import = temp.path().join("import");
    let export = temp.path().join("export");
    Setup {
        temp,
        import,
        export,
        converter: Arc::new(RecordingConverter::default()),
        collector: EventCollector::new(),
    }
}

impl Setup {
    fn start(&self) -> abs_import::WatcherHandle {
        let collector = self.collector.clone();
        start_watcher(
            WatcherConfig::new(&self.import, &self.export, INTERVAL),
            self.converter.clone(),
            move |e| collector.push(e),
        )
        .expect("Failed to start watcher")
    }
}

/// Создаёт item-директорию с файлами заданного размера.
fn create_book(root: &Path, group: &str, item: &str, files: &[(&str, usize)]) -> PathBuf {
    let dir = root.join(group).join(item);
    fs::create_dir_all(&dir).expect("Failed to create book dir");
    for (name, len) in files {
        fs::write(dir.join(name), vec![0u8; *len]).expect("Failed to create test file");
    }
    dir
}

fn append(path: &Path, len: usize) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("Failed to open file for append");
    file.write_all(&vec![1u8; len]).expect("Failed to append");
}

// ============================================================================
// Тесты запуска и остановки
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_watcher_creates_directories_and_stops() {
    let s = setup();
    assert!(!s.import.exists());

    let handle = s.start();

    assert!(s.import.is_dir());
    assert!(s.export.is_dir());
    assert_eq!(handle.watch_dir(), s.import);

    tokio::time::sleep(INTERVAL * 2).await;
    assert!(!handle.is_finished());
    handle.stop().await.expect("Failed to stop watcher");
}

#[tokio::test(start_paused = true)]
async fn test_watcher_rejects_relative_path() {
    let result = start_watcher(
        WatcherConfig::new("relative/import", "/tmp/export", INTERVAL),
        Arc::new(RecordingConverter::default()),
        |_| {},
    );

    let err = result.err().expect("relative path must be rejected");
    assert!(err.to_string().contains("must be absolute"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_waiting_for_download_leaves_item() {
    let s = setup();
    let book = create_book(&s.import, "Author1", "Book1", &[("01.mp3", 1000)]);
    let handle = s.start();

    tokio::time::sleep(INTERVAL / 2).await;
    let before_stop = Instant::now();
    handle.stop().await.expect("Failed to stop watcher");

    assert_eq!(before_stop.elapsed(), Duration::ZERO);
    assert!(book.join("01.mp3").exists());
    assert!(s.converter.calls().is_empty());
}

// ============================================================================
// Сквозные сценарии
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_finished_download_is_converted_and_cleaned_up() {
    let s = setup();
    let book = create_book(
        &s.import,
        "Author1",
        "Book1",
        &[("a.flac", 500_000), ("b.flac", 500_000)],
    );
    let group = s.import.join("Author1");
    let start = Instant::now();
    let handle = s.start();

    tokio::time::sleep(INTERVAL * 3).await;

    assert_eq!(s.converter.calls(), vec![book.clone()]);
    assert!(!book.exists());
    assert!(!group.exists());
    assert!(s.export.join("Author1/Book1/audiobook.m4b").exists());

    let converted = s
        .collector
        .position(&WatchEventKind::ItemConverted, &book)
        .expect("Book1 was not converted");
    let removed = s
        .collector
        .position(&WatchEventKind::ItemRemoved, &book)
        .expect("Book1 was not removed");
    let group_removed = s
        .collector
        .position(&WatchEventKind::GroupRemoved, &group)
        .expect("Author1 was not removed");
    assert!(converted < removed && removed < group_removed);

    let done_at = s
        .collector
        .time_of(&WatchEventKind::GroupRemoved, &group)
        .unwrap();
    assert!(done_at - start <= INTERVAL * 3);

    handle.stop().await.expect("Failed to stop watcher");
}

#[tokio::test(start_paused = true)]
async fn test_mixed_formats_fail_and_are_kept() {
    let s = setup();
    let book = create_book(
        &s.import,
        "Author2",
        "Book2",
        &[("a.mp3", 1000), ("a.flac", 1000)],
    );
    let handle = s.start();

    tokio::time::sleep(INTERVAL * 3).await;

    let message = s
        .collector
        .failure_for(&book)
        .expect("Book2 failure was not reported");
    assert!(message.contains("different formats"));
    assert!(book.join("a.mp3").exists());
    assert!(book.join("a.flac").exists());
    assert!(s.import.join("Author2").exists());
    assert!(!handle.is_finished(), "item failure must not stop the watcher");

    handle.stop().await.expect("Failed to stop watcher");
}

// ============================================================================
// Тесты batch-join: следующий опрос только после завершения всей пачки
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sibling_discovered_only_after_batch_drains() {
    let s = setup();
    let book1 = create_book(&s.import, "Author1", "Book1", &[("part1.mp3", 1000)]);
    let book3 = s.import.join("Author1").join("Book3");
    let start = Instant::now();
    let handle = s.start();

    let growing = book1.join("part1.mp3");
    let late_book = book3.clone();
    tokio::spawn(async move {
        // Book1 растёт до 150 с; Book3 появляется на 70 с, пока пачка с Book1 ещё идёт.
        tokio::time::sleep(Duration::from_secs(30)).await;
        append(&growing, 1000);
        tokio::time::sleep(Duration::from_secs(40)).await;
        fs::create_dir(&late_book).unwrap();
        fs::write(late_book.join("01.mp3"), vec![0u8; 1000]).unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        append(&growing, 1000);
        tokio::time::sleep(Duration::from_secs(60)).await;
        append(&growing, 1000);
    });

    tokio::time::sleep(INTERVAL * 8).await;

    let book1_removed = s
        .collector
        .time_of(&WatchEventKind::ItemRemoved, &book1)
        .expect("Book1 was not removed");
    let book3_discovered = s
        .collector
        .time_of(&WatchEventKind::ItemDiscovered, &book3)
        .expect("Book3 was not discovered");

    assert_eq!(book1_removed - start, INTERVAL * 4);
    // Первый опрос после завершения пачки.
    assert_eq!(book3_discovered - start, INTERVAL * 5);
    assert!(!book3.exists());
    assert!(!s.import.join("Author1").exists());

    handle.stop().await.expect("Failed to stop watcher");
}

#[tokio::test(start_paused = true)]
async fn test_stuck_group_delays_root_discovery() {
    let s = setup();
    let book2 = create_book(
        &s.import,
        "Author2",
        "Book2",
        &[("a.mp3", 1000), ("a.flac", 1000)],
    );
    let author3 = s.import.join("Author3");
    let start = Instant::now();
    let handle = s.start();

    tokio::time::sleep(Duration::from_secs(100)).await;
    create_book(&s.import, "Author3", "Book4", &[("01.m4b", 1000)]);

    tokio::time::sleep(Duration::from_secs(50)).await;
    assert!(s
        .collector
        .time_of(&WatchEventKind::GroupDiscovered, &author3)
        .is_none());

    // Пользователь убирает проблемную книгу; Author2 пустеет на опросе в 180 с.
    fs::remove_dir_all(&book2).unwrap();

    tokio::time::sleep(INTERVAL * 4).await;

    let discovered = s
        .collector
        .time_of(&WatchEventKind::GroupDiscovered, &author3)
        .expect("Author3 was not discovered");
    assert_eq!(discovered - start, INTERVAL * 4);
    assert!(!s.import.join("Author2").exists());
    assert!(!author3.exists());

    handle.stop().await.expect("Failed to stop watcher");
}

// ============================================================================
// Тесты обработки ошибок
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_vanished_root_ends_watcher() {
    let s = setup();
    let mut handle = s.start();

    tokio::time::sleep(INTERVAL / 2).await;
    fs::remove_dir(&s.import).unwrap();

    let err = handle.join().await.unwrap_err();
    match err {
        ImportError::List { path, .. } => assert_eq!(path, s.import),
        other => panic!("expected List error, got {other:?}"),
    }
    assert!(handle.is_finished());
    assert!(s.temp.path().exists());
}
