//! Opaque relay payloads.

use bytes::Bytes;

/// A serialized payload moving through the relay.
///
/// The frame kind is preserved end to end: text from upstream reaches
/// viewers as text, binary as binary. The contents are never inspected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayMessage {
    /// UTF-8 text frame (the dashboard's JSON status records).
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl RelayMessage {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The text contents, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Frame kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<String> for RelayMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RelayMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for RelayMessage {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}
