// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

use crate::error::FeedError;
use crate::http::{ConditionalResponse, HttpClient, Validators};

use super::parse::{Podcast, parse_feed};

/// Outcome of a conditional feed fetch
pub enum FetchOutcome {
    /// The server confirmed the cached copy is current (HTTP 304).
    /// The caller reconciles against the previously cached episode list.
    NotModified,
    /// A fresh feed body was fetched and parsed
    Fetched {
        podcast: Podcast,
        validators: Validators,
    },
}

/// Fetch and parse a podcast feed, using stored validators for a
/// conditional request.
///
/// Pass empty `Validators` to force an unconditional fetch.
pub async fn fetch_feed<C: HttpClient>(
    client: &C,
    url: &str,
    validators: &Validators,
) -> Result<FetchOutcome, FeedError> {
    let feed_url = Url::parse(url)?;

    let response = client
        .get_conditional(url, validators)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    match response {
        ConditionalResponse::NotModified => Ok(FetchOutcome::NotModified),
        ConditionalResponse::Fetched {
            status,
            body,
            validators,
        } => {
            if !(200..300).contains(&status) {
                return Err(FeedError::HttpStatus {
                    url: url.to_string(),
                    status,
                });
            }

            let podcast = parse_feed(&body, feed_url)?;
            Ok(FetchOutcome::Fetched {
                podcast,
                validators,
            })
        }
    }
}
