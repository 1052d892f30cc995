// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use url::Url;

use crate::cache::{DEFAULT_CACHE_FILENAME, FeedCache, load_cache, plan_sync, save_cache};
use crate::episode::{Tagger, download_episode, generate_filename, sweep_partial_files};
use crate::error::SyncError;
use crate::feed::{FetchOutcome, Podcast, fetch_feed};
use crate::http::{HttpClient, Validators};
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Options for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Maximum number of episodes to download this run (None = all)
    pub limit: Option<usize>,
    /// Re-download episodes even when the cache says they are complete
    pub force: bool,
    /// Skip conditional headers and always fetch the feed body
    pub ignore_http_cache: bool,
    /// Cache file location (defaults to `.rss_cache.json` in the output
    /// directory)
    pub cache_file: Option<PathBuf>,
}

/// Result of a sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Number of episodes successfully downloaded
    pub downloaded: usize,
    /// Number of episodes skipped (already complete on disk)
    pub skipped: usize,
    /// Number of episodes that failed to download
    pub failed: usize,
    /// Details of failed episodes (title, error message)
    pub failed_episodes: Vec<(String, String)>,
}

/// Synchronize a podcast feed into a local directory.
///
/// This is the main entry point for the library. It:
/// 1. Loads the persisted cache and sweeps leftover partial files
/// 2. Conditionally fetches the feed (ETag / Last-Modified)
/// 3. Reconciles the episode list against the cache
/// 4. Downloads pending episodes one at a time, tagging each on completion
/// 5. Persists the cache after every finalized episode
///
/// Per-episode failures are isolated; only feed-level and cache-write
/// errors abort the run.
pub async fn sync_feed<C: HttpClient>(
    client: &C,
    feed_url: &str,
    output_dir: &Path,
    tagger: &dyn Tagger,
    options: &SyncOptions,
    reporter: SharedProgressReporter,
) -> Result<SyncReport, SyncError> {
    std::fs::create_dir_all(output_dir).map_err(|e| SyncError::OutputDirFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let cache_path = options
        .cache_file
        .clone()
        .unwrap_or_else(|| output_dir.join(DEFAULT_CACHE_FILENAME));
    let mut cache = load_cache(&cache_path)?;

    let cleaned = sweep_partial_files(output_dir);
    if cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: cleaned });
    }

    reporter.report(ProgressEvent::FetchingFeed {
        url: feed_url.to_string(),
    });

    let sent_validators = if options.ignore_http_cache {
        Validators::default()
    } else {
        cache.validators.clone()
    };

    let podcast = match fetch_feed(client, feed_url, &sent_validators).await? {
        FetchOutcome::NotModified => {
            reporter.report(ProgressEvent::FeedNotModified);
            podcast_from_cache(&cache, feed_url)?
        }
        FetchOutcome::Fetched {
            podcast,
            validators,
        } => {
            if podcast.skipped_items > 0 {
                reporter.report(ProgressEvent::MalformedItemsSkipped {
                    count: podcast.skipped_items,
                });
            }
            if podcast.episodes.is_empty() && !cache.episodes.is_empty() {
                reporter.report(ProgressEvent::EmptyFeedWarning);
            }

            cache.validators = validators;
            cache.absorb_feed(&podcast.title, podcast.author.as_deref(), &podcast.episodes);
            podcast
        }
    };

    let plan = plan_sync(podcast.episodes.clone(), &cache, output_dir, options.force);

    let to_download: Vec<_> = match options.limit {
        Some(limit) => plan.to_download.into_iter().take(limit).collect(),
        None => plan.to_download,
    };
    let total_to_download = to_download.len();
    let skipped = plan.up_to_date.len();

    reporter.report(ProgressEvent::FeedReady {
        podcast_title: podcast.title.clone(),
        total_episodes: plan.total_episodes,
        to_download: total_to_download,
    });

    // Persist validators and the merged (still incomplete) listing now, so
    // an interrupted run resumes from this feed state
    save_cache(&cache, &cache_path)?;

    let mut downloaded = 0;
    let mut failed_episodes: Vec<(String, String)> = Vec::new();

    for (episode_index, episode) in to_download.iter().enumerate() {
        let filename = cache
            .entry(episode.key())
            .map(|entry| entry.filename.clone())
            .unwrap_or_else(|| generate_filename(episode));
        let final_path = output_dir.join(&filename);

        match download_episode(
            client,
            episode,
            &final_path,
            episode_index,
            total_to_download,
            &reporter,
        )
        .await
        {
            Ok(_) => {
                // Tagging is best-effort: the file is already final, so a
                // tag failure must not put the episode back in the queue
                if let Err(e) = tagger.tag(&final_path, episode, &podcast) {
                    reporter.report(ProgressEvent::TaggingFailed {
                        episode_title: episode.title.clone(),
                        error: e.to_string(),
                    });
                }

                cache.mark_complete(episode.key());
                save_cache(&cache, &cache_path)?;
                downloaded += 1;
            }
            Err(e) => {
                reporter.report(ProgressEvent::DownloadFailed {
                    episode_title: episode.title.clone(),
                    error: e.to_string(),
                });
                failed_episodes.push((episode.title.clone(), e.to_string()));
            }
        }
    }

    let failed = failed_episodes.len();

    reporter.report(ProgressEvent::SyncCompleted {
        downloaded_count: downloaded,
        skipped_count: skipped,
        failed_count: failed,
    });

    Ok(SyncReport {
        downloaded,
        skipped,
        failed,
        failed_episodes,
    })
}

/// Rebuild the podcast from cached state after a 304 response
fn podcast_from_cache(cache: &FeedCache, feed_url: &str) -> Result<Podcast, SyncError> {
    let url = Url::parse(feed_url).map_err(|e| SyncError::Feed(e.into()))?;

    Ok(Podcast {
        title: cache
            .feed_title
            .clone()
            .unwrap_or_else(|| "Unknown Podcast".to_string()),
        author: cache.feed_author.clone(),
        feed_url: url,
        episodes: cache.cached_episodes(),
        skipped_items: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::episode::{Id3Tagger, NoopTagger};
    use crate::error::TagError;
    use crate::feed::Episode;
    use crate::http::{ByteStream, ConditionalResponse, HttpResponse};
    use crate::progress::{NoopReporter, ProgressReporter};
    use async_trait::async_trait;
    use bytes::Bytes;
    use id3::TagLike;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const AUDIO: &[u8] = b"fake audio content";

    fn feed_xml(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(title, guid)| {
                format!(
                    r#"<item>
      <title>{title}</title>
      <guid>{guid}</guid>
      <enclosure url="https://example.com/{guid}.mp3" length="{len}" type="audio/mpeg"/>
    </item>"#,
                    len = AUDIO.len(),
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast</description>
    {items}
  </channel>
</rss>"#
        )
    }

    struct MockServer {
        feed_xml: Mutex<String>,
        etag: Mutex<Option<String>>,
        /// URL whose transfer should come up short against the declared
        /// content length
        truncate_url: Mutex<Option<String>>,
        feed_fetches: AtomicUsize,
        stream_requests: AtomicUsize,
    }

    impl MockServer {
        fn new(feed_xml: String, etag: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                feed_xml: Mutex::new(feed_xml),
                etag: Mutex::new(etag.map(String::from)),
                truncate_url: Mutex::new(None),
                feed_fetches: AtomicUsize::new(0),
                stream_requests: AtomicUsize::new(0),
            })
        }
    }

    #[derive(Clone)]
    struct MockHttpClient(Arc<MockServer>);

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_conditional(
            &self,
            _url: &str,
            validators: &Validators,
        ) -> Result<ConditionalResponse, reqwest::Error> {
            let server_etag = self.0.etag.lock().unwrap().clone();

            if let (Some(cached), Some(current)) = (&validators.etag, &server_etag)
                && cached == current
            {
                return Ok(ConditionalResponse::NotModified);
            }

            self.0.feed_fetches.fetch_add(1, Ordering::SeqCst);

            Ok(ConditionalResponse::Fetched {
                status: 200,
                body: Bytes::from(self.0.feed_xml.lock().unwrap().clone()),
                validators: Validators {
                    etag: server_etag,
                    last_modified: None,
                },
            })
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.0.stream_requests.fetch_add(1, Ordering::SeqCst);

            let truncated = self
                .0
                .truncate_url
                .lock()
                .unwrap()
                .as_deref()
                .is_some_and(|u| u == url);

            let content_length = if truncated {
                Some(AUDIO.len() as u64 + 1000)
            } else {
                Some(AUDIO.len() as u64)
            };

            let stream: ByteStream =
                Box::pin(futures::stream::once(async { Ok(Bytes::from(AUDIO)) }));

            Ok(HttpResponse {
                status: 200,
                content_length,
                body: stream,
            })
        }
    }

    /// Reporter that records every event for assertions
    #[derive(Default)]
    struct RecordingReporter(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct FailingTagger;

    impl Tagger for FailingTagger {
        fn tag(&self, path: &Path, _: &Episode, _: &Podcast) -> Result<(), TagError> {
            Err(TagError::WriteFailed {
                path: path.to_path_buf(),
                source: std::io::Error::other("simulated tag failure").into(),
            })
        }
    }

    async fn run(
        client: &MockHttpClient,
        dir: &Path,
        tagger: &dyn Tagger,
        options: &SyncOptions,
    ) -> SyncReport {
        sync_feed(
            client,
            "https://example.com/feed.xml",
            dir,
            tagger,
            options,
            NoopReporter::shared(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn first_run_downloads_everything_and_persists_cache() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(
            feed_xml(&[("Ep 3", "g3"), ("Ep 2", "g2"), ("Ep 1", "g1")]),
            Some("\"v1\""),
        );
        let client = MockHttpClient(server.clone());

        let report = run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;

        assert_eq!(report.downloaded, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);

        let cache = load_cache(&dir.path().join(DEFAULT_CACHE_FILENAME)).unwrap();
        assert_eq!(cache.validators.etag, Some("\"v1\"".to_string()));
        assert_eq!(cache.episodes.len(), 3);
        assert!(cache.episodes.iter().all(|entry| entry.complete));

        for entry in &cache.episodes {
            assert!(dir.path().join(&entry.filename).exists());
        }
    }

    #[tokio::test]
    async fn unchanged_feed_downloads_nothing_on_second_run() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(feed_xml(&[("Ep 2", "g2"), ("Ep 1", "g1")]), Some("\"v1\""));
        let client = MockHttpClient(server.clone());

        run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;
        let report = run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped, 2);
        // 304 short-circuits: one full feed fetch, two episode streams, ever
        assert_eq!(server.feed_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(server.stream_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_modified_run_retries_the_incomplete_episode() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(
            feed_xml(&[("Ep 3", "g3"), ("Ep 2", "g2"), ("Ep 1", "g1")]),
            Some("\"v1\""),
        );
        let client = MockHttpClient(server.clone());

        // Ep 2's transfer comes up short on the first run
        *server.truncate_url.lock().unwrap() = Some("https://example.com/g2.mp3".to_string());

        let report = run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;
        assert_eq!(report.downloaded, 2);
        assert_eq!(report.failed, 1);

        let cache = load_cache(&dir.path().join(DEFAULT_CACHE_FILENAME)).unwrap();
        assert!(!cache.entry("g2").unwrap().complete);

        // Feed unchanged; the retry happens off the cached episode list
        *server.truncate_url.lock().unwrap() = None;
        let report = run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(server.feed_fetches.load(Ordering::SeqCst), 1);

        let cache = load_cache(&dir.path().join(DEFAULT_CACHE_FILENAME)).unwrap();
        assert!(cache.entry("g2").unwrap().complete);
    }

    #[tokio::test]
    async fn tag_failure_does_not_cause_redownload() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(feed_xml(&[("Ep 1", "g1")]), Some("\"v1\""));
        let client = MockHttpClient(server.clone());

        let report = run(&client, dir.path(), &FailingTagger, &SyncOptions::default()).await;
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed, 0);

        let report = run(&client, dir.path(), &FailingTagger, &SyncOptions::default()).await;
        assert_eq!(report.downloaded, 0);
        assert_eq!(server.stream_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn id3_tagging_writes_tags_onto_downloaded_file() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(feed_xml(&[("Ep 1", "g1")]), None);
        let client = MockHttpClient(server);

        let report = run(&client, dir.path(), &Id3Tagger, &SyncOptions::default()).await;
        assert_eq!(report.downloaded, 1);

        let cache = load_cache(&dir.path().join(DEFAULT_CACHE_FILENAME)).unwrap();
        let filename = &cache.episodes[0].filename;
        let tag = id3::Tag::read_from_path(dir.path().join(filename)).unwrap();
        assert_eq!(tag.album(), Some("Test Podcast"));
    }

    #[tokio::test]
    async fn limit_bounds_each_run() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(
            feed_xml(&[("Ep 3", "g3"), ("Ep 2", "g2"), ("Ep 1", "g1")]),
            Some("\"v1\""),
        );
        let client = MockHttpClient(server);

        let options = SyncOptions {
            limit: Some(2),
            ..Default::default()
        };

        let report = run(&client, dir.path(), &NoopTagger, &options).await;
        assert_eq!(report.downloaded, 2);

        // The remainder comes in on the next run
        let report = run(&client, dir.path(), &NoopTagger, &options).await;
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn force_redownloads_complete_episodes() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(feed_xml(&[("Ep 1", "g1")]), Some("\"v1\""));
        let client = MockHttpClient(server.clone());

        run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;

        let options = SyncOptions {
            force: true,
            ..Default::default()
        };
        let report = run(&client, dir.path(), &NoopTagger, &options).await;

        assert_eq!(report.downloaded, 1);
        assert_eq!(server.stream_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ignore_http_cache_refetches_the_feed_body() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(feed_xml(&[("Ep 1", "g1")]), Some("\"v1\""));
        let client = MockHttpClient(server.clone());

        run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;

        let options = SyncOptions {
            ignore_http_cache: true,
            ..Default::default()
        };
        let report = run(&client, dir.path(), &NoopTagger, &options).await;

        assert_eq!(report.downloaded, 0);
        assert_eq!(server.feed_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn emptied_feed_warns_and_preserves_cache() {
        let dir = tempdir().unwrap();
        let server = MockServer::new(feed_xml(&[("Ep 2", "g2"), ("Ep 1", "g1")]), Some("\"v1\""));
        let client = MockHttpClient(server.clone());

        run(&client, dir.path(), &NoopTagger, &SyncOptions::default()).await;

        // Upstream corruption: feed comes back with zero items
        *server.feed_xml.lock().unwrap() = feed_xml(&[]);
        *server.etag.lock().unwrap() = Some("\"v2\"".to_string());

        let reporter = Arc::new(RecordingReporter::default());
        let report = sync_feed(
            &client,
            "https://example.com/feed.xml",
            dir.path(),
            &NoopTagger,
            &SyncOptions::default(),
            reporter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.failed, 0);

        let events = reporter.0.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::EmptyFeedWarning))
        );

        // Entries survive as stale records, still complete
        let cache = load_cache(&dir.path().join(DEFAULT_CACHE_FILENAME)).unwrap();
        assert_eq!(cache.episodes.len(), 2);
        assert!(cache.episodes.iter().all(|entry| entry.complete));
    }

    #[tokio::test]
    async fn custom_cache_file_location_is_used() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("state").join("my-cache.json");
        std::fs::create_dir_all(cache_path.parent().unwrap()).unwrap();

        let server = MockServer::new(feed_xml(&[("Ep 1", "g1")]), Some("\"v1\""));
        let client = MockHttpClient(server);

        let options = SyncOptions {
            cache_file: Some(cache_path.clone()),
            ..Default::default()
        };

        run(&client, dir.path(), &NoopTagger, &options).await;

        assert!(cache_path.exists());
        assert!(!dir.path().join(DEFAULT_CACHE_FILENAME).exists());
    }

    #[tokio::test]
    async fn leftover_partial_files_are_swept() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("old.mp3.partial"), b"junk").unwrap();

        let server = MockServer::new(feed_xml(&[]), None);
        let client = MockHttpClient(server);

        let reporter = Arc::new(RecordingReporter::default());
        sync_feed(
            &client,
            "https://example.com/feed.xml",
            dir.path(),
            &NoopTagger,
            &SyncOptions::default(),
            reporter.clone(),
        )
        .await
        .unwrap();

        assert!(!dir.path().join("old.mp3.partial").exists());
        let events = reporter.0.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProgressEvent::PartialFilesCleanedUp { count: 1 }))
        );
    }
}
