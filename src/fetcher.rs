use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tracing::{info, warn};

use crate::config::{FetchSettings, Paths};
use crate::corpus::{self, DialogueEntry, NarrativeLine};
use crate::manifest::PageRef;
use crate::parser::PageExtractor;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// This page failed; the batch moves on.
    #[error("{url}: {message}")]
    Page { url: String, message: String },
    /// The session itself is unusable; the batch stops here.
    #[error("session failed: {0}")]
    Session(String),
}

/// Something that turns a URL into rendered HTML.
#[async_trait]
pub trait PageSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Plain HTTP source. Pages that need script execution to show their
/// dialogue will come back empty and be recorded as failures.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Session(e.to_string()))?;
        Ok(HttpSource { client })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let page_err = |message: String| FetchError::Page {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| page_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(page_err(format!("HTTP {}", status)));
        }
        response.text().await.map_err(|e| page_err(e.to_string()))
    }
}

/// Randomized pause between consecutive page requests.
#[derive(Debug, Clone, Copy)]
pub struct Delay {
    min_ms: u64,
    max_ms: u64,
}

impl Delay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Delay {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn from_settings(settings: &FetchSettings) -> Self {
        Delay::new(settings.delay_min_ms, settings.delay_max_ms)
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Delay::new(0, 0)
    }

    pub fn next(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Everything one pass over the manifest produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub pages: usize,
    pub ok: usize,
    pub failed_urls: Vec<String>,
    pub dialogues: Vec<DialogueEntry>,
    pub narratives: Vec<NarrativeLine>,
    /// Set when a session failure stopped the batch early.
    pub aborted: Option<String>,
}

impl BatchReport {
    pub fn print(&self) {
        println!(
            "Done: {} of {} pages ok, {} failed. {} dialogue lines, {} narrative lines.",
            self.ok,
            self.pages,
            self.failed_urls.len(),
            self.dialogues.len(),
            self.narratives.len()
        );
        if let Some(reason) = &self.aborted {
            println!("Batch stopped early: {}", reason);
        }
        if !self.failed_urls.is_empty() {
            println!("\nFailed URLs:");
            for url in &self.failed_urls {
                println!("  {}", url);
            }
        }
    }
}

/// Visit pages one at a time, extract each, and collect the results.
/// A failing page is recorded and skipped; a session failure ends the loop
/// but keeps everything gathered so far.
pub async fn run_batch(
    source: &dyn PageSource,
    extractor: &PageExtractor,
    pages: &[PageRef],
    delay: Delay,
) -> BatchReport {
    let mut report = BatchReport {
        pages: pages.len(),
        ..BatchReport::default()
    };

    let pb = ProgressBar::new(pages.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    for (i, page) in pages.iter().enumerate() {
        info!("Requesting {}", page.title);
        match source.fetch(&page.url).await {
            Ok(html) => {
                let extraction = extractor.extract(&html, &page.title);
                if extraction.ok() {
                    info!(
                        "{}: {} dialogue, {} narrative",
                        page.title,
                        extraction.dialogues.len(),
                        extraction.narratives.len()
                    );
                    report.ok += 1;
                    report.dialogues.extend(extraction.dialogues);
                    report.narratives.extend(extraction.narratives);
                } else {
                    warn!("No dialogue layout matched on {}", page.url);
                    report.failed_urls.push(page.url.clone());
                }
            }
            Err(FetchError::Session(reason)) => {
                warn!("Stopping batch at {}: {}", page.url, reason);
                report.aborted = Some(reason);
                break;
            }
            Err(e) => {
                warn!("Fetch failed: {}", e);
                report.failed_urls.push(page.url.clone());
            }
        }
        pb.inc(1);

        if i + 1 < pages.len() {
            tokio::time::sleep(delay.next()).await;
        }
    }

    pb.finish_and_clear();
    report
}

/// Write the batch corpus, narrative artifact and failed-URL manifest.
/// Each output is attempted even if an earlier one failed; returns how many
/// could not be written.
pub fn persist_batch(report: &BatchReport, paths: &Paths) -> usize {
    let mut failures = 0;

    match corpus::save(&paths.extracted_file, &report.dialogues) {
        Ok(()) => info!("Dialogue written to {:?}", paths.extracted_file),
        Err(e) => {
            warn!("{}", e);
            failures += 1;
        }
    }

    match corpus::write_narratives(&paths.narrative_file, &report.narratives) {
        Ok(()) => info!("Narration written to {:?}", paths.narrative_file),
        Err(e) => {
            warn!("Failed to write {:?}: {}", paths.narrative_file, e);
            failures += 1;
        }
    }

    if let Err(e) = corpus::append_failed_urls(&paths.error_manifest, &report.failed_urls) {
        warn!("Failed to append to {:?}: {}", paths.error_manifest, e);
        failures += 1;
    }

    failures
}

/// Read one page for a debug run: a local file if the path exists, else a URL.
pub async fn fetch_one(source: &dyn PageSource, target: &str) -> anyhow::Result<String> {
    let path = Path::new(target);
    if path.is_file() {
        return Ok(std::fs::read_to_string(path)?);
    }
    Ok(source.fetch(target).await?)
}

// ── Tests ──
