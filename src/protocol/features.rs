//! Server feature list
//!
//! Parsed from the multi-line `211` reply to `FEAT` (RFC 2389).

use std::collections::BTreeMap;

use crate::protocol::Reply;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFeatures {
    entries: BTreeMap<String, Option<String>>,
}

impl ServerFeatures {
    /// Builds the feature map from a FEAT reply. Feature lines are the
    /// continuation lines that start with a space.
    pub fn from_reply(reply: &Reply) -> Self {
        let mut features = ServerFeatures::default();
        let lines = reply.lines();
        if lines.len() < 2 {
            return features;
        }
        for line in &lines[1..lines.len() - 1] {
            if !line.starts_with(' ') {
                continue;
            }
            features.parse_and_set(line.trim());
        }
        features
    }

    fn parse_and_set(&mut self, feature: &str) {
        if feature.is_empty() {
            return;
        }
        let mut parts = feature.splitn(2, ' ');
        let name = parts.next().unwrap_or("").to_ascii_uppercase();
        let params = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.entries.insert(name, params);
    }

    pub fn supports(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_uppercase())
    }

    /// Parameters advertised with a feature, e.g. the fact list of `MLST`.
    pub fn params(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_uppercase())
            .and_then(|p| p.as_deref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
