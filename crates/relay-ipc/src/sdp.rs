//! Session descriptors exchanged during negotiation.
//!
//! The SDP body is treated as opaque text; only its type is interpreted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl SdpType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Pranswer => "pranswer",
            Self::Answer => "answer",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A session description: opaque SDP text and its type.
///
/// Serializes as `{"sdp": "...", "type": "offer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Raw SDP text.
    pub sdp: String,

    /// Offer, answer, ...
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    /// Create an offer descriptor.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    /// Create an answer descriptor.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}
