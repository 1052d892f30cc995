use std::sync::Arc;

/// Events emitted during a sync run for progress reporting.
///
/// Purely cosmetic observers: nothing in the pipeline consults a
/// reporter's state. Downloads run sequentially, so events never
/// interleave between episodes.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// The server confirmed the cached feed is still current
    FeedNotModified,

    /// Feed is available and the sync plan has been computed
    FeedReady {
        podcast_title: String,
        total_episodes: usize,
        to_download: usize,
    },

    /// Some feed items could not be parsed and were skipped
    MalformedItemsSkipped { count: usize },

    /// The fetched feed had zero parseable episodes while the cache is
    /// non-empty; likely transient upstream corruption
    EmptyFeedWarning,

    /// Leftover .partial files from interrupted runs were removed
    PartialFilesCleanedUp { count: usize },

    /// A download is starting
    DownloadStarting {
        episode_title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes to download
        total_to_download: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        episode_title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed and the file is in its final place
    DownloadCompleted {
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// A download failed; the episode stays pending for the next run
    DownloadFailed {
        episode_title: String,
        error: String,
    },

    /// Tag write failed; non-fatal, the episode still counts as complete
    TaggingFailed {
        episode_title: String,
        error: String,
    },

    /// Sync run completed
    SyncCompleted {
        downloaded_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during a sync run.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
