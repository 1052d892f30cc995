// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::episode::generate_filename;
use crate::error::CacheError;
use crate::feed::{Enclosure, Episode};
use crate::http::Validators;

/// Default cache file name, relative to the output directory
pub const DEFAULT_CACHE_FILENAME: &str = ".rss_cache.json";

/// Persisted record for a single episode.
///
/// `complete` is set only after the audio file has been fully written and
/// renamed into place; a partially downloaded episode is never recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    pub enclosure_url: String,
    pub title: String,
    /// Local filename within the output directory
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<String>,
}

impl CacheEntry {
    /// Create an incomplete entry for a freshly seen episode
    pub fn from_episode(episode: &Episode) -> Self {
        Self {
            guid: episode.guid.clone(),
            enclosure_url: episode.enclosure.url.to_string(),
            title: episode.title.clone(),
            filename: generate_filename(episode),
            content_length: episode.enclosure.length,
            pub_date: episode.pub_date.map(|dt| dt.to_rfc3339()),
            episode_number: episode.episode_number,
            complete: false,
            downloaded_at: None,
        }
    }

    /// Identity key: guid when present, else the enclosure URL
    pub fn key(&self) -> &str {
        self.guid.as_deref().unwrap_or(&self.enclosure_url)
    }

    /// Rebuild an Episode from this entry, for reconciling after a
    /// NotModified fetch. Returns None if the stored URL no longer parses.
    pub fn to_episode(&self) -> Option<Episode> {
        let url = Url::parse(&self.enclosure_url).ok()?;
        Some(Episode {
            title: self.title.clone(),
            pub_date: self
                .pub_date
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
            guid: self.guid.clone(),
            enclosure: Enclosure {
                url,
                length: self.content_length,
                mime_type: None,
            },
            episode_number: self.episode_number,
        })
    }
}

/// The whole persisted state for one feed: HTTP validators plus the
/// per-episode completion records, in feed order.
///
/// An absent cache file is equivalent to "no episodes downloaded yet".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedCache {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_author: Option<String>,
    #[serde(default)]
    pub validators: Validators,
    #[serde(default)]
    pub episodes: Vec<CacheEntry>,
}

impl FeedCache {
    /// Look up an entry by episode key
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.episodes.iter().find(|entry| entry.key() == key)
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.episodes.iter_mut().find(|entry| entry.key() == key)
    }

    /// Merge a freshly fetched episode list into the cache.
    ///
    /// The entry list is rebuilt in feed order. Existing entries keep their
    /// filename and completion state but pick up updated feed fields (an
    /// entry with the same guid but a changed title is an update, not a new
    /// episode). Entries no longer present in the feed are retained at the
    /// end rather than deleted.
    pub fn absorb_feed(
        &mut self,
        title: &str,
        author: Option<&str>,
        episodes: &[Episode],
    ) {
        self.feed_title = Some(title.to_string());
        self.feed_author = author.map(String::from);

        let mut merged: Vec<CacheEntry> = Vec::with_capacity(self.episodes.len());

        for episode in episodes {
            let entry = match self.entry_mut(episode.key()) {
                Some(existing) => {
                    existing.title = episode.title.clone();
                    existing.enclosure_url = episode.enclosure.url.to_string();
                    existing.content_length = episode.enclosure.length;
                    existing.pub_date = episode.pub_date.map(|dt| dt.to_rfc3339());
                    existing.episode_number = episode.episode_number;
                    existing.clone()
                }
                None => CacheEntry::from_episode(episode),
            };
            merged.push(entry);
        }

        // Stale entries (in cache, gone from feed) are kept for safety
        let seen: Vec<String> = merged.iter().map(|e| e.key().to_string()).collect();
        for entry in self.episodes.drain(..) {
            if !seen.iter().any(|key| key == entry.key()) {
                merged.push(entry);
            }
        }

        self.episodes = merged;
    }

    /// Rebuild the previously cached episode list, in stored order
    pub fn cached_episodes(&self) -> Vec<Episode> {
        self.episodes
            .iter()
            .filter_map(|entry| entry.to_episode())
            .collect()
    }

    /// Record an episode as fully downloaded. Called only after the file
    /// has been renamed into its final place.
    pub fn mark_complete(&mut self, key: &str) {
        if let Some(entry) = self.entry_mut(key) {
            entry.complete = true;
            entry.downloaded_at = Some(Utc::now().to_rfc3339());
        }
    }
}

/// Load the cache from disk. A missing file yields an empty cache.
pub fn load_cache(path: &Path) -> Result<FeedCache, CacheError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FeedCache::default());
        }
        Err(e) => {
            return Err(CacheError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    serde_json::from_str(&content).map_err(|e| CacheError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Persist the cache to disk.
///
/// Writes to a temporary sibling file and renames it over the target, so an
/// interrupted run never leaves a truncated cache document behind.
pub fn save_cache(cache: &FeedCache, path: &Path) -> Result<(), CacheError> {
    let json = serde_json::to_string_pretty(cache)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|e| CacheError::WriteFailed {
        path: tmp_path.clone(),
        source: e,
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| CacheError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
