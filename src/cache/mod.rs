mod reconcile;
mod store;

pub use reconcile::{SyncPlan, plan_sync};
pub use store::{CacheEntry, DEFAULT_CACHE_FILENAME, FeedCache, load_cache, save_cache};
