mod config;
mod db;
mod error;
mod export;
mod hierarchy;
mod images;
mod scraper;
mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::Settings;
use hierarchy::context::RunParams;
use hierarchy::item::PageHierarchy;

#[derive(Parser)]
#[command(name = "aem_scraper", about = "AEM page export and hierarchy reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the raw JCR tree and all tabs models of a page
    Fetch {
        /// Page path, e.g. /content/site/en/support
        page: String,
        /// Skip the fetch cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Reconcile a raw tree and a model tree into one hierarchy document
    Reconcile {
        #[arg(long)]
        jcr: PathBuf,
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        page_path: String,
        /// Output file (default: <output_dir>/<page>.hierarchy.json)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Flatten a hierarchy document to CSV and/or HTML
    Export {
        hierarchy: PathBuf,
        #[arg(long)]
        csv: bool,
        #[arg(long)]
        html: bool,
    },
    /// Download every image referenced by a hierarchy document
    Images { hierarchy: PathBuf },
    /// Fetch + reconcile + export in one go
    Run {
        page: String,
        #[arg(long)]
        no_cache: bool,
    },
    /// Show fetch cache statistics
    CacheStats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Fetch { page, no_cache } => {
            let (raw_path, model_path) = fetch(&settings, &page, no_cache).await?;
            println!("Wrote {} and {}", raw_path.display(), model_path.display());
            Ok(())
        }
        Commands::Reconcile { jcr, model, page_path, out } => {
            let out = out.unwrap_or_else(|| output_file(&settings, &page_path, "hierarchy.json"));
            let page = reconcile(&settings, &jcr, model.as_deref(), &page_path, &out)?;
            println!("Reconciled \"{}\": {} top-level items -> {}", page.title, page.items.len(), out.display());
            Ok(())
        }
        Commands::Export { hierarchy, csv, html } => {
            let page = load_hierarchy(&hierarchy)?;
            // No flag means both formats.
            let (csv, html) = if csv || html { (csv, html) } else { (true, true) };
            export(&page, &hierarchy, csv, html)
        }
        Commands::Images { hierarchy } => {
            let page = load_hierarchy(&hierarchy)?;
            download_images(&settings, &page).await
        }
        Commands::Run { page, no_cache } => {
            let t_fetch = Instant::now();
            let (raw_path, model_path) = fetch(&settings, &page, no_cache).await?;
            println!("Fetched in {:.1}s", t_fetch.elapsed().as_secs_f64());

            let out = output_file(&settings, &page, "hierarchy.json");
            let hierarchy = reconcile(&settings, &raw_path, Some(&model_path), &page, &out)?;
            println!("Reconciled {} top-level items -> {}", hierarchy.items.len(), out.display());
            export(&hierarchy, &out, true, true)
        }
        Commands::CacheStats => {
            let conn = db::connect(&settings.cache_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Entries:   {}", s.entries);
            println!("JSON:      {}", s.json);
            println!("Bytes:     {}", s.bytes);
            println!("Oldest:    {}", s.oldest.as_deref().unwrap_or("-"));
            println!("Newest:    {}", s.newest.as_deref().unwrap_or("-"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_params(settings: &Settings, page_path: &str) -> RunParams {
    RunParams {
        host: settings.host.clone(),
        page_path: page_path.trim_end_matches('/').to_string(),
        max_depth: settings.max_depth,
        path_separator: settings.path_separator.clone(),
    }
}

/// `/content/site/en/support` → `<output_dir>/support.<suffix>`
fn output_file(settings: &Settings, page_path: &str, suffix: &str) -> PathBuf {
    let slug = page_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("page");
    settings.output_dir.join(format!("{}.{}", slug, suffix))
}

async fn fetch(settings: &Settings, page: &str, no_cache: bool) -> anyhow::Result<(PathBuf, PathBuf)> {
    if settings.host.is_empty() {
        anyhow::bail!("No host configured (set AEM_HOST or `host` in aem_scraper.toml)");
    }
    let cache = if no_cache {
        None
    } else {
        let conn = db::connect(&settings.cache_path)?;
        db::init_schema(&conn)?;
        Some(conn)
    };
    let fetcher = Arc::new(scraper::Fetcher::new(settings, cache)?);
    let page = page.trim_end_matches('/');
    let fetched = scraper::fetch_page(fetcher, page, settings.concurrency).await?;
    if fetched.tabs_failed > 0 {
        println!("{} of {} tabs models failed (see log)", fetched.tabs_failed, fetched.tabs_ok + fetched.tabs_failed);
    }

    let raw_path = output_file(settings, page, "infinity.json");
    let model_path = output_file(settings, page, "model.json");
    write_json(&raw_path, &fetched.raw)?;
    write_json(&model_path, &fetched.model)?;
    Ok((raw_path, model_path))
}

fn reconcile(
    settings: &Settings,
    jcr: &Path,
    model: Option<&Path>,
    page_path: &str,
    out: &Path,
) -> anyhow::Result<PageHierarchy> {
    let raw = source::load_json(jcr)?;
    let model = model.map(source::load_json).transpose()?;
    let page = hierarchy::reconcile(&raw, model.as_ref(), run_params(settings, page_path));
    write_json(out, &page)?;
    Ok(page)
}

fn load_hierarchy(path: &Path) -> anyhow::Result<PageHierarchy> {
    let value = source::load_json(path)?;
    serde_json::from_value(value).with_context(|| format!("{} is not a hierarchy document", path.display()))
}

fn export(page: &PageHierarchy, hierarchy: &Path, csv: bool, html: bool) -> anyhow::Result<()> {
    let stem = hierarchy
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".json").trim_end_matches(".hierarchy"))
        .unwrap_or("hierarchy");
    let dir = hierarchy.parent().unwrap_or_else(|| Path::new("."));
    if csv {
        let path = dir.join(format!("{}.csv", stem));
        let n = export::write_csv(page, &path)?;
        println!("Wrote {} rows to {}", n, path.display());
    }
    if html {
        let path = dir.join(format!("{}.html", stem));
        let n = export::write_html(page, &path)?;
        println!("Wrote {} rows to {}", n, path.display());
    }
    Ok(())
}

async fn download_images(settings: &Settings, page: &PageHierarchy) -> anyhow::Result<()> {
    let urls = images::collect_image_urls(page);
    if urls.is_empty() {
        println!("No images referenced.");
        return Ok(());
    }
    println!("Downloading {} images...", urls.len());
    let fetcher = Arc::new(scraper::Fetcher::new(settings, None)?);
    let dir = settings.output_dir.join("images");
    let report = images::download_all(fetcher, urls, &dir, settings.concurrency).await?;
    println!(
        "Done: {} of {} saved ({} via fallback), {} failed.",
        report.saved,
        report.total,
        report.via_fallback,
        report.failures.len()
    );
    if !report.failures.is_empty() {
        let path = images::write_failure_report(&settings.output_dir, &report.failures)?;
        println!("Failure report: {}", path.display());
    }
    Ok(())
}

/// Serializes fully before touching the file system.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
