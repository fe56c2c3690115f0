//! The inline/outsourced body split shared by requests and responses.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A request or response payload, either carried inline or staged in the
/// BodyStore and fetched later by `RequestId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyContent {
    /// Payload travels with the envelope.
    Inline { bytes: Bytes },
    /// Payload is absent; fetch it from the BodyStore by `RequestId`.
    Outsourced,
}

impl BodyContent {
    pub fn inline(bytes: impl Into<Bytes>) -> Self {
        Self::Inline { bytes: bytes.into() }
    }

    pub fn is_outsourced(&self) -> bool {
        matches!(self, BodyContent::Outsourced)
    }

    pub fn as_inline(&self) -> Option<&Bytes> {
        match self {
            BodyContent::Inline { bytes } => Some(bytes),
            BodyContent::Outsourced => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BodyContent::Inline { bytes } => bytes.len(),
            BodyContent::Outsourced => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_roundtrips_through_json() {
        let body = BodyContent::inline(Bytes::from_static(b"hello"));
        let json = serde_json::to_string(&body).unwrap();
        let parsed: BodyContent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_inline().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn outsourced_has_no_inline_bytes() {
        assert!(BodyContent::Outsourced.as_inline().is_none());
        assert!(BodyContent::Outsourced.is_outsourced());
    }
}
