use std::{
    io::{self, Write as _},
    path::Path,
};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::{
    channel::{
        GROUP_TITLE, HTTP_REFERRER, HTTP_USER_AGENT, PlaylistEntry, TVG_COUNTRY, TVG_LANGUAGE,
        TVG_LOGO, TVG_NAME,
    },
    error::SerializationError,
    playlist::{EXTINF_PREFIX, HEADER},
};

/// Attributes written after `tvg-id` and `tvg-name`, in output order
const OPTIONAL_KEYS: [&str; 6] = [
    TVG_LOGO,
    TVG_COUNTRY,
    TVG_LANGUAGE,
    GROUP_TITLE,
    HTTP_USER_AGENT,
    HTTP_REFERRER,
];

#[derive(Debug, Default, Clone)]
pub struct RenderOptions {
    /// Adds a `# Generated at` comment under the header. Makes output differ between runs.
    pub generated_at: Option<DateTime<Utc>>,
    /// `group-title` written for entries that have none
    pub default_group: Option<String>,
}

/// Renders entries into extended M3U text, in the given order
#[must_use]
pub fn render_playlist(entries: &[PlaylistEntry], options: &RenderOptions) -> String {
    let mut out = String::with_capacity(64 + entries.len() * 256);
    out.push_str(HEADER);
    out.push('\n');

    if let Some(generated_at) = options.generated_at {
        out.push_str(&format!("# Generated at {}\n", generated_at.to_rfc2822()));
    }

    for entry in entries {
        let candidate = &entry.candidate;
        let name = entry
            .attribute(TVG_NAME)
            .unwrap_or(&candidate.display_name);

        out.push_str(&format!(
            "\n{EXTINF_PREFIX}-1 tvg-id=\"{}\" tvg-name=\"{}\"",
            escape_value(&candidate.id),
            escape_value(name)
        ));
        for key in OPTIONAL_KEYS {
            let value = match entry.attribute(key) {
                Some(value) => Some(value),
                None if key == GROUP_TITLE => options.default_group.as_deref(),
                None => None,
            };
            if let Some(value) = value {
                out.push_str(&format!(" {key}=\"{}\"", escape_value(value)));
            }
        }
        out.push_str(&format!(",{}\n", candidate.display_name.replace(',', " ")));
        out.push_str(&entry.url);
        out.push('\n');
    }

    out
}

fn escape_value(value: &str) -> String {
    value.replace('"', "'")
}

/// Writes `contents` to `path` without ever leaving a half-written file there
///
/// Contents go to a uniquely named temporary file next to the destination (same filesystem),
/// are synced, then renamed over it. An existing symlink at `path` is replaced, not followed.
///
/// # Errors
/// Errors when the temporary file can't be written or moved into place.
/// The previous file at `path`, if any, is left untouched in both cases.
#[instrument(skip(contents), fields(bytes = contents.len()))]
pub async fn write_atomically(path: &Path, contents: &str) -> Result<(), SerializationError> {
    let destination = path.to_path_buf();
    let contents = contents.to_owned();

    tokio::task::spawn_blocking(move || persist(&destination, contents.as_bytes()))
        .await
        .map_err(|e| SerializationError::Write {
            path: path.to_path_buf(),
            source: io::Error::other(e),
        })??;

    debug!("Playlist moved into place");
    Ok(())
}

fn persist(path: &Path, contents: &[u8]) -> Result<(), SerializationError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_error = |source: io::Error| SerializationError::Write {
        path: dir.to_path_buf(),
        source,
    };

    // Dropping the temp file on any early return removes it
    let mut staged = NamedTempFile::new_in(dir).map_err(write_error)?;
    staged.write_all(contents).map_err(write_error)?;
    staged.as_file().sync_all().map_err(write_error)?;

    staged.persist(path).map_err(|e| SerializationError::Persist {
        from: e.file.path().to_path_buf(),
        to: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
