mod config;
mod corpus;
mod fetcher;
mod manifest;
mod narration;
mod parser;
mod speaker;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use config::Settings;
use fetcher::{Delay, HttpSource};
use parser::PageExtractor;
use speaker::group::Grouper;
use speaker::Roster;

#[derive(Parser)]
#[command(name = "questline_scraper", about = "Quest dialogue harvester and speaker grouper")]
struct Cli {
    /// Settings file (TOML); missing file means built-in defaults
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every page in the manifest and write the extracted batch
    Scrape {
        /// Manifest CSV (title,url)
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Max pages to visit (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract a single page from a local HTML file or URL and show what was found
    Page {
        /// HTML file path or URL
        target: String,
        /// Title recorded on extracted lines (default: the target)
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Recover `speaker : text` lines from the narrative artifact into their own batch
    Reextract {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Append the extracted batch to the main corpus
    Merge {
        #[arg(short, long)]
        extracted: Option<PathBuf>,
        /// Main corpus file
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Split corpus files into per-speaker buckets
    Group {
        #[arg(short, long)]
        dialogue_dir: Option<PathBuf>,
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Comma-separated roster overriding the configured one
        #[arg(short, long)]
        roster: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let result = match cli.command {
        Commands::Scrape { manifest: manifest_file, limit } => {
            let manifest_path = manifest_file.unwrap_or_else(|| settings.paths.manifest.clone());
            let mut pages = manifest::load(&manifest_path)?;
            if let Some(n) = limit {
                pages.truncate(n);
            }
            if pages.is_empty() {
                println!("No pages in {:?}.", manifest_path);
                return Ok(());
            }

            let extractor = PageExtractor::new(&settings.layout)?;
            let source = HttpSource::new(&settings.fetch)?;
            println!("Scraping {} pages...", pages.len());
            let report =
                fetcher::run_batch(&source, &extractor, &pages, Delay::from_settings(&settings.fetch))
                    .await;
            drop(source);

            let failures = fetcher::persist_batch(&report, &settings.paths);
            report.print();
            if failures > 0 {
                println!("{} output file(s) could not be written, see log.", failures);
            }
            Ok(())
        }
        Commands::Page { target, title } => {
            let title = title.unwrap_or_else(|| target.clone());
            let extractor = PageExtractor::new(&settings.layout)?;
            let source = HttpSource::new(&settings.fetch)?;
            let html = fetcher::fetch_one(&source, &target).await?;

            let extraction = extractor.extract(&html, &title);
            println!(
                "{}: {} dialogue lines, {} narrative lines",
                title,
                extraction.dialogues.len(),
                extraction.narratives.len()
            );
            if let Some(d) = extraction.dialogues.first() {
                println!("  first dialogue:  {} ： {}", d.speaker, truncate(&d.text, 60));
            }
            if let Some(n) = extraction.narratives.first() {
                println!("  first narrative: {}", truncate(&n.to_string(), 60));
            }
            if !extraction.ok() {
                println!("No known dialogue layout on this page.");
            }
            Ok(())
        }
        Commands::Reextract { input, output } => {
            let input = input.unwrap_or_else(|| settings.paths.narrative_file.clone());
            let output = output.unwrap_or_else(|| settings.paths.reextracted_file.clone());
            let n = narration::reextract_into(&input, &output)?;
            println!("Recovered {} dialogue lines into {:?}.", n, output);
            Ok(())
        }
        Commands::Merge { extracted, corpus: corpus_file } => {
            let extracted = extracted.unwrap_or_else(|| settings.paths.extracted_file.clone());
            let corpus_file = corpus_file.unwrap_or_else(|| settings.paths.corpus_file.clone());
            match corpus::merge_files(&extracted, &corpus_file)? {
                None => println!("Nothing to merge: {:?} not found.", extracted),
                Some(r) if r.renamed => {
                    println!("{:?} did not exist; moved batch of {} lines into place.", corpus_file, r.added)
                }
                Some(r) => println!(
                    "Merged into {:?}: {} existing + {} new = {} lines.",
                    corpus_file, r.initial, r.added, r.total
                ),
            }
            Ok(())
        }
        Commands::Group { dialogue_dir, out_dir, roster } => {
            let dialogue_dir = dialogue_dir.unwrap_or_else(|| settings.paths.dialogue_dir.clone());
            let out_dir = out_dir.unwrap_or_else(|| settings.paths.speaker_dir.clone());
            let roster = match roster {
                Some(list) => Roster::from_csv_list(&list),
                None => Roster::new(&settings.roster),
            };

            let report = Grouper::new(roster).run(&dialogue_dir, &out_dir);
            report.print();
            match report.error {
                Some(e) => Err(anyhow::anyhow!(e)),
                None => Ok(()),
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
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
