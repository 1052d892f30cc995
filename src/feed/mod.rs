mod fetch;
mod parse;

pub use fetch::{FetchOutcome, fetch_feed};
pub use parse::{Enclosure, Episode, Podcast, parse_feed};
