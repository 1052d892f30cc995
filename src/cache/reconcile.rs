// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::Path;

use crate::feed::Episode;

use super::store::FeedCache;

/// Plan for a sync run, computed by diffing the feed against the cache
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Episodes that need downloading, in feed order (newest first for
    /// typical feeds, so interrupted runs finish recent episodes first)
    pub to_download: Vec<Episode>,
    /// Episodes verified complete on disk
    pub up_to_date: Vec<Episode>,
    /// Keys of cache entries no longer present in the feed. Retained in
    /// the cache for safety; surfaced here for reporting only.
    pub stale_keys: Vec<String>,
    /// Total number of episodes in the feed
    pub total_episodes: usize,
}

/// Decide which episodes need downloading.
///
/// An episode is up to date only when its cache entry is marked complete
/// AND the file is still present in the output directory; everything else
/// (unknown, incomplete, or vanished file) is queued. `force` queues every
/// feed episode regardless of cache state.
pub fn plan_sync(
    episodes: Vec<Episode>,
    cache: &FeedCache,
    output_dir: &Path,
    force: bool,
) -> SyncPlan {
    let total_episodes = episodes.len();
    let mut to_download = Vec::new();
    let mut up_to_date = Vec::new();
    let mut feed_keys = HashSet::new();

    for episode in episodes {
        feed_keys.insert(episode.key().to_string());

        let done = !force
            && cache
                .entry(episode.key())
                .is_some_and(|entry| entry.complete && output_dir.join(&entry.filename).exists());

        if done {
            up_to_date.push(episode);
        } else {
            to_download.push(episode);
        }
    }

    let stale_keys = cache
        .episodes
        .iter()
        .map(|entry| entry.key().to_string())
        .filter(|key| !feed_keys.contains(key))
        .collect();

    SyncPlan {
        to_download,
        up_to_date,
        stale_keys,
        total_episodes,
    }
}
