use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{
    channel::{Attributes, Candidate, HTTP_REFERRER, HTTP_USER_AGENT, TVG_ID},
    playlist::{EXTINF_PREFIX, EXTVLCOPT_PREFIX, HEADER},
};

pub static EXTINF_ATTRIBUTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap());

struct PendingChannel {
    display_name: String,
    attributes: Attributes,
}

/// Parses an extended M3U playlist into candidates, numbered in file order
///
/// An `#EXTINF` line and any `#EXTVLCOPT` lines describe the next URL line.
/// `tvg-id` becomes the candidate's id (falling back to the display name),
/// `#EXTVLCOPT:http-user-agent=`/`http-referrer=` become attributes.
/// A URL without a preceding `#EXTINF` is kept and named after itself.
#[must_use]
pub fn parse_playlist(text: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut pending: Option<PendingChannel> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(HEADER) {
            continue;
        }

        if let Some(extinf) = line.strip_prefix(EXTINF_PREFIX) {
            if let Some(dangling) = pending.replace(parse_extinf(extinf)) {
                debug!("Channel {:?} has no URL, skipping", dangling.display_name);
            }
            continue;
        }

        if let Some(option) = line.strip_prefix(EXTVLCOPT_PREFIX) {
            if let (Some(channel), Some((key, value))) = (pending.as_mut(), option.split_once('=')) {
                let key = match key.trim() {
                    // Both spellings are found in the wild
                    "http-referrer" | "http-referer" => HTTP_REFERRER,
                    "http-user-agent" => HTTP_USER_AGENT,
                    _ => continue,
                };
                channel.attributes.set(key, value.trim());
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let PendingChannel {
            display_name,
            mut attributes,
        } = pending.take().unwrap_or_else(|| PendingChannel {
            display_name: line.to_string(),
            attributes: Attributes::new(),
        });

        let id = take_attribute(&mut attributes, TVG_ID)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| display_name.clone());

        candidates.push(Candidate {
            index: candidates.len(),
            id,
            display_name,
            probe_target: line.to_string(),
            attributes,
        });
    }

    if let Some(dangling) = pending {
        debug!("Channel {:?} has no URL, skipping", dangling.display_name);
    }

    candidates
}

/// `-1 tvg-id="..." group-title="A, B",Display Name`
fn parse_extinf(extinf: &str) -> PendingChannel {
    // The title starts after the first comma that is not inside a quoted value
    let mut in_quotes = false;
    let split_at = extinf.char_indices().find_map(|(i, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ',' if !in_quotes => Some(i),
        _ => None,
    });

    let (header, title) = split_at.map_or((extinf, ""), |i| (&extinf[..i], &extinf[i + 1..]));

    let attributes = EXTINF_ATTRIBUTE_REGEX
        .captures_iter(header)
        .map(|c| (c[1].to_string(), c[2].trim().to_string()))
        .collect();

    PendingChannel {
        display_name: title.trim().to_string(),
        attributes,
    }
}

fn take_attribute(attributes: &mut Attributes, key: &str) -> Option<String> {
    let value = attributes.get(key).map(ToString::to_string)?;
    *attributes = attributes
        .iter()
        .filter(|(k, _)| *k != key)
        .collect::<Attributes>();
    Some(value)
}
