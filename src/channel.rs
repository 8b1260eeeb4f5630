
use crate::error::ProbeError;

pub const TVG_ID: &str = "tvg-id";
pub const TVG_NAME: &str = "tvg-name";
pub const TVG_LOGO: &str = "tvg-logo";
pub const TVG_COUNTRY: &str = "tvg-country";
pub const TVG_LANGUAGE: &str = "tvg-language";
pub const GROUP_TITLE: &str = "group-title";
pub const HTTP_USER_AGENT: &str = "http-user-agent";
pub const HTTP_REFERRER: &str = "http-referrer";

/// Insertion-ordered string mapping of a channel's metadata (`tvg-logo`, `group-title`, ...)
///
/// Channels carry a handful of attributes at most, a linear scan beats hashing here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts or overwrites `key`. Overwriting keeps the key's original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attributes = Self::new();
        for (k, v) in iter {
            attributes.set(k, v);
        }
        attributes
    }
}

/// A channel to evaluate, as handed over by a [`ChannelSource`](crate::source::ChannelSource)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position in the discovered batch, used to restore ordering after concurrent probing
    pub index: usize,
    pub id: String,
    pub display_name: String,
    /// URL (or path) the probe works from
    pub probe_target: String,
    pub attributes: Attributes,
}

/// What the resolver learned about one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub candidate_index: usize,
    pub result: Result<String, ProbeError>,
}

/// A resolved channel headed for the output playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub candidate: Candidate,
    pub url: String,
}

impl PlaylistEntry {
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.candidate.attributes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_in_place() {
        let mut attributes: Attributes =
            [(TVG_LOGO, "a.png"), (TVG_LANGUAGE, "fr"), (GROUP_TITLE, "News")]
                .into_iter()
                .collect();

        attributes.set(TVG_LANGUAGE, "Unknown");

        let keys = attributes.iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(keys, [TVG_LOGO, TVG_LANGUAGE, GROUP_TITLE]);
        assert_eq!(attributes.get(TVG_LANGUAGE), Some("Unknown"));
        assert_eq!(attributes.len(), 3);
    }

    #[test]
    fn missing_key_is_none() {
        let attributes = Attributes::new();
        assert!(attributes.is_empty());
        assert_eq!(attributes.get(TVG_COUNTRY), None);
    }
}
