use crate::feed::Episode;

/// Maximum length for the title portion of a filename
const MAX_TITLE_LENGTH: usize = 100;

/// Generate the local filename for an episode: "YYYY-MM-DD-Title.ext",
/// or "undated-Title.ext" when the feed carries no publish date.
pub fn generate_filename(episode: &Episode) -> String {
    let date_prefix = episode
        .pub_date
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    let title = sanitize_title(&episode.title);
    let ext = get_audio_extension(episode);

    if title.is_empty() {
        format!("{}.{}", date_prefix, ext)
    } else {
        format!("{}-{}.{}", date_prefix, title, ext)
    }
}

/// Audio file extension for an episode, from the enclosure URL path or
/// MIME type, defaulting to "mp3"
pub fn get_audio_extension(episode: &Episode) -> String {
    if let Some(ext) = episode
        .enclosure
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit('.').next())
        .filter(|ext| is_audio_extension(ext))
    {
        return ext.to_lowercase();
    }

    if let Some(ref mime) = episode.enclosure.mime_type
        && let Some(ext) = mime_to_extension(mime)
    {
        return ext.to_string();
    }

    "mp3".to_string()
}

/// Reduce a title to filesystem-safe characters: anything outside the
/// whitelist becomes a dash, runs of separators collapse to one dash, and
/// overlong titles are cut at a word boundary.
fn sanitize_title(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut last_was_separator = true; // swallows leading separators

    for c in title.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '_' | '.');
        if keep {
            result.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            result.push('-');
            last_was_separator = true;
        }
    }

    let trimmed = result.trim_end_matches('-');

    if trimmed.len() > MAX_TITLE_LENGTH {
        let cut: &str = &trimmed[..MAX_TITLE_LENGTH];
        match cut.rfind('-') {
            Some(pos) if pos > MAX_TITLE_LENGTH / 2 => cut[..pos].to_string(),
            _ => cut.trim_end_matches('-').to_string(),
        }
    } else {
        trimmed.to_string()
    }
}

fn is_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}

fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
