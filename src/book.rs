use crate::chapter::{self, list_page_images};
use crate::ocr::OcrEngine;
use crate::timestamp::parse_timestamp;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// What happened to the chapters of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub skipped: usize,
}

impl Summary {
    fn add(&mut self, other: Summary) {
        self.processed += other.processed;
        self.skipped += other.skipped;
    }
}

/// Process every book directory under `library_dir`, one after another.
pub fn process_library(
    engine: &dyn OcrEngine,
    library_dir: &Path,
    output_dir: &Path,
    incremental: bool,
) -> Result<Summary> {
    let mut summary = Summary::default();
    for book_dir in subdirectories(library_dir)? {
        summary.add(process_book(engine, &book_dir, output_dir, incremental)?);
    }
    Ok(summary)
}

/// Write `{book}-{chapter}.txt` into `output_dir` for each chapter directory
/// of `book_dir`. In incremental mode, chapters whose output is newer than
/// their newest page are left alone.
pub fn process_book(
    engine: &dyn OcrEngine,
    book_dir: &Path,
    output_dir: &Path,
    incremental: bool,
) -> Result<Summary> {
    let book_name = dir_name(book_dir)?;
    let chapters = subdirectories(book_dir)?;
    info!("Processing {} chapters of {}", chapters.len(), book_name);

    let mut summary = Summary::default();
    for chapter_dir in chapters {
        let chapter_name = dir_name(&chapter_dir)?;
        let output_path = output_dir.join(format!("{}-{}.txt", book_name, chapter_name));

        if incremental && is_up_to_date(&chapter_dir, &output_path)? {
            println!("Skipping {} - no new images", chapter_name);
            summary.skipped += 1;
            continue;
        }

        let text = chapter::process_chapter(engine, &chapter_dir)?;
        fs::write(&output_path, text)
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
        summary.processed += 1;
    }

    Ok(summary)
}

/// Newest capture time among the chapter's page filenames. Pages without a
/// parseable timestamp are ignored.
pub fn latest_image_timestamp(chapter_dir: &Path) -> Result<Option<NaiveDateTime>> {
    Ok(list_page_images(chapter_dir)?
        .iter()
        .filter_map(|path| path.file_name())
        .filter_map(|name| parse_timestamp(&name.to_string_lossy()))
        .max())
}

/// True when `output_path` exists and was modified strictly after the
/// newest page in `chapter_dir` was captured.
pub fn is_up_to_date(chapter_dir: &Path, output_path: &Path) -> Result<bool> {
    if !output_path.exists() {
        return Ok(false);
    }

    let modified = fs::metadata(output_path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("Failed to stat output file: {}", output_path.display()))?;
    let modified = DateTime::<Local>::from(modified).naive_local();

    Ok(latest_image_timestamp(chapter_dir)?.is_some_and(|latest| modified > latest))
}

/// Immediate subdirectories of `dir`, sorted by name.
fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Name of a directory as given, without following symlinks. Only paths
/// with no final component of their own (`.`, `..`) are resolved.
fn dir_name(dir: &Path) -> Result<String> {
    if let Some(name) = dir.file_name() {
        return Ok(name.to_string_lossy().to_string());
    }
    let resolved = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve directory: {}", dir.display()))?;
    let name = resolved
        .file_name()
        .context("Directory has no name")?
        .to_string_lossy()
        .to_string();
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::testing::{write_page, PixelEngine};
    use chrono::TimeZone;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    /// Build `{root}/{book}/ch1` with two pages and return the book path.
    fn book_fixture(root: &Path, book: &str) -> PathBuf {
        let chapter = root.join(book).join("ch1");
        fs::create_dir_all(&chapter).unwrap();
        write_page(&chapter.join("page-2024-01-01-10_00_00.png"), "B");
        write_page(&chapter.join("page-2024-01-01-09_00_00.png"), "A");
        root.join(book)
    }

    fn set_local_mtime(path: &Path, y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) {
        let local = Local.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap();
        set_file_mtime(path, FileTime::from_unix_time(local.timestamp(), 0)).unwrap();
    }

    #[test]
    fn writes_one_file_per_chapter() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let book = book_fixture(input.path(), "book");
        fs::create_dir(book.join("ch2")).unwrap();
        fs::write(book.join("readme.txt"), "ignored").unwrap();

        let summary = process_book(&PixelEngine::default(), &book, output.path(), true).unwrap();

        assert_eq!(summary, Summary { processed: 2, skipped: 0 });
        assert_eq!(
            fs::read_to_string(output.path().join("book-ch1.txt")).unwrap(),
            "A\n\nB"
        );
        // Chapter without pages still gets a zero-length file.
        assert_eq!(fs::read(output.path().join("book-ch2.txt")).unwrap().len(), 0);
        assert!(!output.path().join("book-readme.txt.txt").exists());
    }

    #[test]
    fn skips_chapter_with_newer_output() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let book = book_fixture(input.path(), "book");
        let out_file = output.path().join("book-ch1.txt");
        fs::write(&out_file, "previous run").unwrap();
        set_local_mtime(&out_file, 2024, 1, 2, 0, 0, 0);
        let before = fs::metadata(&out_file).unwrap().modified().unwrap();

        let engine = PixelEngine::default();
        let summary = process_book(&engine, &book, output.path(), true).unwrap();

        assert_eq!(summary, Summary { processed: 0, skipped: 1 });
        assert_eq!(engine.calls(), 0);
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "previous run");
        assert_eq!(fs::metadata(&out_file).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn reprocesses_chapter_with_older_output() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let book = book_fixture(input.path(), "book");
        let out_file = output.path().join("book-ch1.txt");
        fs::write(&out_file, "stale").unwrap();
        set_local_mtime(&out_file, 2024, 1, 1, 9, 30, 0);

        let summary = process_book(&PixelEngine::default(), &book, output.path(), true).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "A\n\nB");
    }

    #[test]
    fn equal_mtime_is_not_up_to_date() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let book = book_fixture(input.path(), "book");
        let out_file = output.path().join("book-ch1.txt");
        fs::write(&out_file, "stale").unwrap();
        set_local_mtime(&out_file, 2024, 1, 1, 10, 0, 0);

        assert!(!is_up_to_date(&book.join("ch1"), &out_file).unwrap());
    }

    #[test]
    fn non_incremental_always_reprocesses() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let book = book_fixture(input.path(), "book");
        let out_file = output.path().join("book-ch1.txt");
        fs::write(&out_file, "previous run").unwrap();
        set_local_mtime(&out_file, 2030, 1, 1, 0, 0, 0);

        let engine = PixelEngine::default();
        let summary = process_book(&engine, &book, output.path(), false).unwrap();

        assert_eq!(summary, Summary { processed: 1, skipped: 0 });
        assert_eq!(engine.calls(), 2);
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "A\n\nB");
    }

    #[test]
    fn chapter_without_timestamps_is_reprocessed() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let chapter = input.path().join("book").join("intro");
        fs::create_dir_all(&chapter).unwrap();
        write_page(&chapter.join("cover.png"), "C");
        let out_file = output.path().join("book-intro.txt");
        fs::write(&out_file, "old").unwrap();

        assert_eq!(latest_image_timestamp(&chapter).unwrap(), None);
        process_book(
            &PixelEngine::default(),
            &input.path().join("book"),
            output.path(),
            true,
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "C");
    }

    #[test]
    fn latest_timestamp_ignores_unstamped_pages() {
        let dir = TempDir::new().unwrap();
        write_page(&dir.path().join("p-2024-01-01-09_00_00.png"), "A");
        write_page(&dir.path().join("p-2024-02-01-09_00_00.png"), "B");
        write_page(&dir.path().join("zzz.png"), "C");

        let expected = NaiveDateTime::parse_from_str("2024-02-01-09_00_00", "%Y-%m-%d-%H_%M_%S")
            .unwrap();
        assert_eq!(latest_image_timestamp(dir.path()).unwrap(), Some(expected));
    }

    #[test]
    fn library_processes_every_book() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        book_fixture(input.path(), "alpha");
        book_fixture(input.path(), "beta");

        let summary =
            process_library(&PixelEngine::default(), input.path(), output.path(), true).unwrap();

        assert_eq!(summary.processed, 2);
        assert!(output.path().join("alpha-ch1.txt").exists());
        assert!(output.path().join("beta-ch1.txt").exists());
    }

    #[test]
    fn missing_book_directory_is_fatal() {
        let output = TempDir::new().unwrap();
        let missing = output.path().join("no-such-book");
        assert!(process_book(&PixelEngine::default(), &missing, output.path(), true).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_chapter_keeps_its_entry_name() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let store = input.path().join("scans_store");
        fs::create_dir(&store).unwrap();
        write_page(&store.join("page-2024-01-01-09_00_00.png"), "A");
        let book = input.path().join("book");
        fs::create_dir(&book).unwrap();
        std::os::unix::fs::symlink(&store, book.join("ch1")).unwrap();

        process_book(&PixelEngine::default(), &book, output.path(), false).unwrap();

        let mut written: Vec<String> = fs::read_dir(output.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        written.sort();
        assert_eq!(written, vec!["book-ch1.txt"]);
        assert_eq!(
            fs::read_to_string(output.path().join("book-ch1.txt")).unwrap(),
            "A"
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_book_keeps_its_entry_name() {
        let input = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        book_fixture(store.path(), "real_book");
        std::os::unix::fs::symlink(store.path().join("real_book"), input.path().join("novel"))
            .unwrap();

        process_library(&PixelEngine::default(), input.path(), output.path(), true).unwrap();

        assert!(output.path().join("novel-ch1.txt").exists());
        assert!(!output.path().join("real_book-ch1.txt").exists());
    }
}
