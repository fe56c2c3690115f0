//! A plain, serde-friendly header list.
//!
//! We deliberately don't carry `http::HeaderMap` across the wire envelope:
//! it needs a feature-gated serde shim and loses ordering guarantees we'd
//! rather keep explicit. A `Vec` of pairs round-trips through JSON for free
//! and preserves the order the caller sent them in.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hop-by-hop headers a relay must not forward verbatim (RFC 7230 §6.1
    /// plus the handful every reverse proxy strips).
    pub fn is_hop_by_hop(name: &str) -> bool {
        const HOP_BY_HOP: &[&str] = &[
            "connection",
            "keep-alive",
            "proxy-authenticate",
            "proxy-authorization",
            "te",
            "trailer",
            "transfer-encoding",
            "upgrade",
            "host",
        ];
        HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
    }

    pub fn without_hop_by_hop(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !Self::is_hop_by_hop(k))
                .cloned()
                .collect(),
        )
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
