use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Temporary path used while an episode is streaming to disk.
/// The ".partial" suffix keeps it from ever colliding with a final name.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Remove leftover `.partial` files from interrupted runs.
///
/// Best-effort: unreadable directories or undeletable files are ignored,
/// the next download will simply overwrite them.
pub fn sweep_partial_files(output_dir: &Path) -> usize {
    let mut cleaned = 0;

    if let Ok(entries) = std::fs::read_dir(output_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".partial"));

            if is_partial && std::fs::remove_file(&path).is_ok() {
                cleaned += 1;
            }
        }
    }

    cleaned
}

/// Download an episode's enclosure to its final path.
///
/// The body streams to a `.partial` sibling first; only after the byte
/// count checks out against the declared content length is the file
/// renamed into place. On any failure the partial file is removed, so an
/// interrupted download leaves the episode pending for the next run.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    episode: &Episode,
    final_path: &Path,
    episode_index: usize,
    total_to_download: usize,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let tmp_path = partial_path(final_path);

    let result = stream_to_partial(
        client,
        episode,
        &tmp_path,
        episode_index,
        total_to_download,
        reporter,
    )
    .await;

    let bytes_downloaded = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    if let Err(e) = tokio::fs::rename(&tmp_path, final_path).await {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(DownloadError::RenameFailed {
            path: final_path.to_path_buf(),
            source: e,
        });
    }

    reporter.report(ProgressEvent::DownloadCompleted {
        episode_title: episode.title.clone(),
        bytes_downloaded,
    });

    Ok(bytes_downloaded)
}

async fn stream_to_partial<C: HttpClient>(
    client: &C,
    episode: &Episode,
    tmp_path: &Path,
    episode_index: usize,
    total_to_download: usize,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let url = episode.enclosure.url.as_str();

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        episode_title: episode.title.clone(),
        episode_index,
        total_to_download,
        content_length: response.content_length,
    });

    let mut file = File::create(tmp_path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: tmp_path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: tmp_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            episode_title: episode.title.clone(),
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: tmp_path.to_path_buf(),
            source: e,
        })?;

    // A short transfer means the connection dropped mid-body
    if let Some(expected) = response.content_length
        && expected != bytes_downloaded
    {
        return Err(DownloadError::SizeMismatch {
            url: url.to_string(),
            expected,
            actual: bytes_downloaded,
        });
    }

    Ok(bytes_downloaded)
}
