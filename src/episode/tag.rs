use std::path::Path;

use chrono::Datelike;
use id3::{Tag, TagLike, Timestamp, Version};

use crate::error::TagError;
use crate::feed::{Episode, Podcast};

/// Tag-writer seam. The sync pipeline only needs "given a finished audio
/// file and episode metadata, write standard tag fields into it".
pub trait Tagger: Send + Sync {
    fn tag(&self, path: &Path, episode: &Episode, podcast: &Podcast) -> Result<(), TagError>;
}

/// Writes ID3v2.4 tags via the id3 crate: title, artist (feed author),
/// album (podcast title), recording date, and track number from the
/// itunes episode number.
pub struct Id3Tagger;

impl Tagger for Id3Tagger {
    fn tag(&self, path: &Path, episode: &Episode, podcast: &Podcast) -> Result<(), TagError> {
        let mut tag = Tag::new();
        tag.set_title(&episode.title);
        tag.set_album(&podcast.title);

        if let Some(author) = &podcast.author {
            tag.set_artist(author);
        }

        if let Some(date) = episode.pub_date {
            tag.set_date_recorded(Timestamp {
                year: date.year(),
                month: Some(date.month() as u8),
                day: Some(date.day() as u8),
                hour: None,
                minute: None,
                second: None,
            });
        }

        if let Some(number) = episode.episode_number {
            tag.set_track(number);
        }

        tag.write_to_path(path, Version::Id3v24)
            .map_err(|e| TagError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

/// Skips tagging entirely (the `--no-tag` flag)
pub struct NoopTagger;

impl Tagger for NoopTagger {
    fn tag(&self, _path: &Path, _episode: &Episode, _podcast: &Podcast) -> Result<(), TagError> {
        Ok(())
    }
}
