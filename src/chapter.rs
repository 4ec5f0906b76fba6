use crate::ocr::{self, OcrEngine, OcrPage};
use crate::timestamp::extract_timestamp;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::info;

/// Separator between consecutive pages in a chapter's text.
const PAGE_SEPARATOR: &str = "\n\n";

/// PNG files directly inside `dir`, ordered by their filename timestamp.
pub fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read chapter directory: {}", dir.display()))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read chapter directory: {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && is_png(&path) {
            images.push(path);
        }
    }

    images.sort_by(|a, b| extract_timestamp(&file_name(a)).cmp(extract_timestamp(&file_name(b))));
    Ok(images)
}

/// OCR every page of a chapter in parallel and join the texts in
/// timestamp order.
///
/// A fresh thread pool is built for each chapter and dropped once all of its
/// pages are done.
pub fn process_chapter(engine: &dyn OcrEngine, dir: &Path) -> Result<String> {
    let images = list_page_images(dir)?;
    let name = file_name(dir);
    info!("Processing {} ({} pages)", name, images.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("ocr-{i}"))
        .build()
        .context("Failed to start OCR worker pool")?;

    // Every page is queued at once; results come back in completion order.
    let total = images.len();
    let mut pages: Vec<OcrPage> = Vec::with_capacity(total);
    let (tx, rx) = mpsc::channel();
    pool.in_place_scope(|scope| {
        for path in &images {
            let tx = tx.clone();
            scope.spawn(move |_| {
                // The receiver drains until every sender is dropped.
                let _ = tx.send(ocr::ocr_page(engine, path));
            });
        }
        drop(tx);

        for page in rx {
            pages.push(page);
            info!("{}: {}/{} pages", name, pages.len(), total);
        }
    });

    info!("Finished {}", name);
    Ok(assemble(pages))
}

/// Order pages by the timestamp in their filename and join their texts.
///
/// Input order is irrelevant; only the filenames decide placement.
pub fn assemble(mut pages: Vec<OcrPage>) -> String {
    pages.sort_by_cached_key(|page| extract_timestamp(&page.file_name()).to_string());
    pages
        .into_iter()
        .map(|page| page.text)
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default()
}
