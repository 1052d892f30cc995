// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use url::Url;

use crate::error::FeedError;

/// A parsed podcast feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub author: Option<String>,
    pub feed_url: Url,
    pub episodes: Vec<Episode>,
    /// Number of feed items that failed to parse and were skipped
    pub skipped_items: usize,
}

/// A single podcast episode.
///
/// Identity is the guid when present, falling back to the enclosure URL.
/// Titles are never used for identity since they are neither unique nor
/// stable across feed updates.
#[derive(Debug, Clone)]
pub struct Episode {
    pub title: String,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub guid: Option<String>,
    pub enclosure: Enclosure,
    pub episode_number: Option<u32>,
}

impl Episode {
    /// Stable identity key: guid if present, else the enclosure URL
    pub fn key(&self) -> &str {
        self.guid
            .as_deref()
            .unwrap_or_else(|| self.enclosure.url.as_str())
    }
}

/// The audio file attached to an episode
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: Url,
    /// Declared size in bytes, when the feed provides one
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

/// Parse RSS feed XML bytes into a Podcast.
///
/// Items that fail to parse (missing or unparseable enclosure) are skipped
/// individually and counted in `skipped_items` rather than failing the feed.
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let items = channel.items();
    let episodes: Vec<Episode> = items
        .iter()
        .filter_map(|item| parse_episode(item).ok())
        .collect();
    let skipped_items = items.len() - episodes.len();

    let author = channel
        .itunes_ext()
        .and_then(|ext| ext.author().map(String::from))
        .or_else(|| channel.managing_editor().map(String::from));

    Ok(Podcast {
        title: channel.title().to_string(),
        author,
        feed_url,
        episodes,
        skipped_items,
    })
}

fn parse_episode(item: &rss::Item) -> Result<Episode, FeedError> {
    let title = item
        .title()
        .map(String::from)
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let enclosure = item
        .enclosure()
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: title.clone(),
        })?;
    let enclosure_url = Url::parse(enclosure.url())?;

    let pub_date = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str)
            .or_else(|_| parse_relaxed_date(date_str))
            .ok()
    });

    Ok(Episode {
        title,
        pub_date,
        guid: item.guid().map(|g| g.value().to_string()),
        enclosure: Enclosure {
            url: enclosure_url,
            length: enclosure.length().parse().ok().filter(|len| *len > 0),
            mime_type: Some(enclosure.mime_type().to_string()).filter(|s| !s.is_empty()),
        },
        episode_number: item
            .itunes_ext()
            .and_then(|ext| ext.episode().and_then(|e| e.parse().ok())),
    })
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Ok(dt);
        }
    }

    Err(chrono::DateTime::parse_from_rfc2822("invalid").unwrap_err())
}
