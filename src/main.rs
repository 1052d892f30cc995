use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use podcache::{
    Id3Tagger, NoopReporter, NoopTagger, ProgressEvent, ProgressReporter, ReqwestClient,
    SharedProgressReporter, SyncOptions, Tagger, sync_feed,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[w] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Download podcast episodes incrementally, with a persistent feed cache
#[derive(Parser, Debug)]
#[command(name = "podcache")]
#[command(about = "Incrementally download and tag podcast episodes from an RSS feed")]
#[command(version)]
struct Args {
    /// RSS feed URL
    feed_url: String,

    /// Output directory for downloaded episodes
    output_dir: PathBuf,

    /// Maximum number of episodes to download this run
    #[arg(short, long)]
    limit: Option<usize>,

    /// Re-download episodes even if the cache says they are complete
    #[arg(short, long)]
    force: bool,

    /// Skip writing ID3 tags onto downloaded files
    #[arg(long)]
    no_tag: bool,

    /// Ignore stored ETag/Last-Modified and always fetch the feed body
    #[arg(long)]
    no_http_cache: bool,

    /// Cache file location (default: .rss_cache.json in the output directory)
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Progress reporter using indicatif for terminal output.
///
/// Downloads are sequential, so a single download bar below the status
/// spinner is enough.
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            download_bar: Mutex::new(None),
        }
    }

    fn start_download_bar(&self, length: Option<u64>, message: String) {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap()
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(length.unwrap_or(0)));
        bar.set_style(style);
        bar.set_message(message);

        *self.download_bar.lock().unwrap() = Some(bar);
    }

    fn finish_download_bar(&self) {
        if let Some(bar) = self.download_bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedNotModified => {
                self.main_bar
                    .set_message(format!("{SEARCH}Feed unchanged since last run"));
            }

            ProgressEvent::FeedReady {
                podcast_title,
                total_episodes,
                to_download,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes total, {} to download",
                    podcast_title.bold().green(),
                    total_episodes.to_string().cyan(),
                    to_download.to_string().yellow()
                ));
            }

            ProgressEvent::MalformedItemsSkipped { count } => {
                self.multi
                    .println(format!(
                        "{WARNING}{} malformed feed items skipped",
                        count.to_string().yellow()
                    ))
                    .ok();
            }

            ProgressEvent::EmptyFeedWarning => {
                self.multi
                    .println(format!(
                        "{WARNING}{}",
                        "Feed returned zero parseable episodes; keeping cached state".yellow()
                    ))
                    .ok();
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.multi
                    .println(format!(
                        "{WARNING}Removed {} leftover partial file(s) from an interrupted run",
                        count.to_string().yellow()
                    ))
                    .ok();
            }

            ProgressEvent::DownloadStarting {
                episode_title,
                episode_index,
                total_to_download,
                content_length,
            } => {
                self.start_download_bar(
                    content_length,
                    format!(
                        "[{}/{}] {}",
                        (episode_index + 1).to_string().cyan(),
                        total_to_download.to_string().cyan(),
                        truncate_title(&episode_title, 40)
                    ),
                );
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                if let Some(bar) = self.download_bar.lock().unwrap().as_ref() {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                }
            }

            ProgressEvent::DownloadCompleted { episode_title, .. } => {
                self.finish_download_bar();
                self.multi
                    .println(format!(
                        "{SUCCESS}{}",
                        truncate_title(&episode_title, 40).green()
                    ))
                    .ok();
            }

            ProgressEvent::DownloadFailed {
                episode_title,
                error,
            } => {
                self.finish_download_bar();
                self.multi
                    .println(format!(
                        "{FAILURE}{} - {}",
                        truncate_title(&episode_title, 30).red(),
                        error.red()
                    ))
                    .ok();
            }

            ProgressEvent::TaggingFailed {
                episode_title,
                error,
            } => {
                self.multi
                    .println(format!(
                        "{WARNING}Tagging failed for {} - {}",
                        truncate_title(&episode_title, 30).yellow(),
                        error.dimmed()
                    ))
                    .ok();
            }

            ProgressEvent::SyncCompleted {
                downloaded_count,
                skipped_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} downloaded, {} skipped, {} failed",
                    "Sync complete:".bold().green(),
                    downloaded_count.to_string().green().bold(),
                    skipped_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.len() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!(
        "\n{}{} {}\n",
        MICROPHONE,
        "podcache".bold().magenta(),
        "- Podcast Downloader".dimmed()
    );

    let client = ReqwestClient::new();

    let options = SyncOptions {
        limit: args.limit,
        force: args.force,
        ignore_http_cache: args.no_http_cache,
        cache_file: args.cache_file,
    };

    let tagger: Box<dyn Tagger> = if args.no_tag {
        Box::new(NoopTagger)
    } else {
        Box::new(Id3Tagger)
    };

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let report = sync_feed(
        &client,
        &args.feed_url,
        &args.output_dir,
        tagger.as_ref(),
        &options,
        reporter,
    )
    .await
    .context("Failed to sync feed")?;

    if !args.quiet && !report.failed_episodes.is_empty() {
        println!("\n{}", "Failed episodes:".red().bold());
        for (title, error) in &report.failed_episodes {
            println!(
                "  {}{} - {}",
                CROSS,
                title.yellow(),
                error.to_string().dimmed()
            );
        }
    }

    if !args.quiet {
        println!(
            "\n{FOLDER}Output: {}\n",
            args.output_dir.display().to_string().cyan()
        );
    }

    if report.failed > 0 && report.downloaded == 0 {
        std::process::exit(1);
    }

    Ok(())
}
