use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::hierarchy::extract::sanitize_filename;
use crate::hierarchy::item::PageHierarchy;
use crate::hierarchy::walk;
use crate::scraper::{is_fatal, Fetcher};

// "hero-1280x720.jpg" and "hero.1280.jpg" are renditions of "hero.jpg"
static SIZE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:-\d+x\d+|\.\d+)(\.[A-Za-z0-9]+)$").unwrap());

pub const FAILURE_REPORT: &str = "image_failures.json";

/// Banner images first, then every item image in document order, without repeats.
pub fn collect_image_urls(page: &PageHierarchy) -> Vec<String> {
    let mut urls = page.banner_images.clone();
    walk::visit(&page.items, |item, _| {
        if let Some(url) = &item.image_url {
            urls.push(url.clone());
        }
    });
    urls.into_iter().unique().collect()
}

/// Same URL with the size-variant suffix removed from the file name, if it has one.
pub fn fallback_url(url: &str) -> Option<String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let (dir, file) = base.rsplit_once('/')?;
    let stripped = SIZE_SUFFIX_RE.replace(file, "$1");
    if stripped == file {
        return None;
    }
    let mut out = format!("{}/{}", dir, stripped);
    if let Some(query) = query {
        out.push('?');
        out.push_str(query);
    }
    Some(out)
}

/// Local file name for the `index`-th download.
pub fn local_name(index: usize, url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    let file = sanitize_filename(base.rsplit('/').next().unwrap_or(base));
    let file = if file.is_empty() { "image".to_string() } else { file };
    format!("{:04}-{}", index, file)
}

#[derive(Debug, Serialize)]
pub struct ImageFailure {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
    pub error: String,
}

pub struct DownloadReport {
    pub total: usize,
    pub saved: usize,
    pub via_fallback: usize,
    pub failures: Vec<ImageFailure>,
}

enum Outcome {
    Saved { fallback: bool },
    Failed(ImageFailure),
    Fatal(anyhow::Error),
}

/// Downloads every URL into `dir`, in parallel.
///
/// An expired login aborts the whole run; any other failure is collected.
pub async fn download_all(
    fetcher: Arc<Fetcher>,
    urls: Vec<String>,
    dir: &Path,
    concurrency: usize,
) -> Result<DownloadReport> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let total = urls.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Outcome>(concurrency.max(1) * 2);
    for (idx, url) in urls.into_iter().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let target = dir.join(local_name(idx, &url));

        tokio::spawn(async move {
            let outcome = match sem.acquire().await {
                Ok(_permit) => download_one(&fetcher, url, target).await,
                Err(e) => Outcome::Fatal(e.into()),
            };
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut saved = 0usize;
    let mut via_fallback = 0usize;
    let mut failures = Vec::new();
    while let Some(outcome) = rx.recv().await {
        pb.inc(1);
        match outcome {
            Outcome::Saved { fallback } => {
                saved += 1;
                if fallback {
                    via_fallback += 1;
                }
            }
            Outcome::Failed(failure) => {
                warn!("Image failed: {} ({})", failure.url, failure.error);
                failures.push(failure);
            }
            Outcome::Fatal(e) => {
                pb.finish_and_clear();
                return Err(e);
            }
        }
    }
    pb.finish_and_clear();
    info!("Downloaded {}/{} images ({} via fallback)", saved, total, via_fallback);

    Ok(DownloadReport {
        total,
        saved,
        via_fallback,
        failures,
    })
}

async fn download_one(fetcher: &Fetcher, url: String, target: PathBuf) -> Outcome {
    let first = match fetch_to(fetcher, &url, &target).await {
        Ok(()) => return Outcome::Saved { fallback: false },
        Err(e) if is_fatal(&e) => return Outcome::Fatal(e),
        Err(e) => e,
    };
    let Some(fallback) = fallback_url(&url) else {
        return Outcome::Failed(ImageFailure {
            url,
            fallback_url: None,
            error: format!("{:#}", first),
        });
    };
    match fetch_to(fetcher, &fallback, &target).await {
        Ok(()) => Outcome::Saved { fallback: true },
        Err(e) if is_fatal(&e) => Outcome::Fatal(e),
        Err(e) => Outcome::Failed(ImageFailure {
            url,
            fallback_url: Some(fallback),
            error: format!("{:#}", e),
        }),
    }
}

async fn fetch_to(fetcher: &Fetcher, url: &str, target: &Path) -> Result<()> {
    let response = fetcher.get_bytes(url).await?;
    tokio::fs::write(target, &response.body)
        .await
        .with_context(|| format!("writing {}", target.display()))?;
    Ok(())
}

/// Writes the failure report; the whole document is serialized before the file is created.
pub fn write_failure_report(out_dir: &Path, failures: &[ImageFailure]) -> Result<PathBuf> {
    let path = out_dir.join(FAILURE_REPORT);
    let json = serde_json::to_string_pretty(failures)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::item::{HierarchyItem, ItemKind, SourceTag};

    #[test]
    fn fallback_strips_dimensions() {
        assert_eq!(
            fallback_url("https://h/content/dam/site/hero-1280x720.jpg").as_deref(),
            Some("https://h/content/dam/site/hero.jpg")
        );
        assert_eq!(
            fallback_url("https://h/p/_jcr_content/root/teaser.coreimg.jpeg/0/card.1280.jpeg?id=teaser-1").as_deref(),
            Some("https://h/p/_jcr_content/root/teaser.coreimg.jpeg/0/card.jpeg?id=teaser-1")
        );
        assert_eq!(fallback_url("https://h/content/dam/site/hero.jpg"), None);
    }

    #[test]
    fn local_names_are_unique_and_clean() {
        assert_eq!(local_name(3, "https://h/a/Hero Image.JPG?id=x"), "0003-hero-image.jpg");
        assert_eq!(local_name(0, "https://h/a/"), "0000-image");
    }

    #[test]
    fn urls_collected_once() {
        let mut teaser = HierarchyItem::new("Card", ItemKind::Teaser, "teaser", SourceTag::Primary);
        teaser.image_url = Some("https://h/card.jpeg".into());
        let mut tab = HierarchyItem::new("Tab", ItemKind::Tab, "item_1", SourceTag::Primary);
        let mut again = teaser.clone();
        again.key = "teaser_2".into();
        tab.children = vec![teaser, again];
        let page = PageHierarchy {
            title: "P".into(),
            items: vec![tab],
            link_url: "/p.html".into(),
            banner_images: vec!["https://h/banner.jpeg".into()],
        };
        assert_eq!(collect_image_urls(&page), vec!["https://h/banner.jpeg", "https://h/card.jpeg"]);
    }

    #[test]
    fn failure_report_written() {
        let dir = tempfile::tempdir().unwrap();
        let failures = vec![ImageFailure {
            url: "https://h/a-10x10.png".into(),
            fallback_url: Some("https://h/a.png".into()),
            error: "HTTP 404 for https://h/a.png".into(),
        }];
        let path = write_failure_report(dir.path(), &failures).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written[0]["fallback_url"], "https://h/a.png");
    }
}
