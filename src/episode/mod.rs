mod download;
mod filename;
mod tag;

pub use download::{download_episode, partial_path, sweep_partial_files};
pub use filename::{generate_filename, get_audio_extension};
pub use tag::{Id3Tagger, NoopTagger, Tagger};
