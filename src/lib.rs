pub mod cache;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod progress;
pub mod sync;

// Re-export main types for convenience
pub use cache::{CacheEntry, DEFAULT_CACHE_FILENAME, FeedCache, SyncPlan, load_cache, plan_sync, save_cache};
pub use episode::{Id3Tagger, NoopTagger, Tagger, download_episode, generate_filename};
pub use error::{CacheError, DownloadError, FeedError, SyncError, TagError};
pub use feed::{Enclosure, Episode, FetchOutcome, Podcast, fetch_feed, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient, Validators};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use sync::{SyncOptions, SyncReport, sync_feed};
