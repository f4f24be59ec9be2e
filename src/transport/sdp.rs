//! Session description and candidate types
//!
//! Descriptions cross the control channel as base64 of their JSON form:
//! ```text
//! base64( {"type":"offer","sdp":"v=0\r\n..."} )
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Decode from the base64-wrapped JSON form
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = STANDARD.decode(encoded.trim())?;
        let desc = serde_json::from_slice(&json)?;
        Ok(desc)
    }

    /// Encode into the base64-wrapped JSON form
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }
}

/// Trickled ICE candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}
