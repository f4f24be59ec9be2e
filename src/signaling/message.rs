//! Control channel message types

use serde::{Deserialize, Serialize};

use crate::transport::IceCandidate;

/// Message type carried in `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Offer,
    Answer,
    Candidate,
    Ready,
    Error,
    /// Missing or unrecognized type
    #[default]
    #[serde(other)]
    Unknown,
}

/// One message exchanged with a remote peer through the rendezvous service
///
/// Every field may be missing on the wire; missing fields deserialize to
/// absent, never to an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(rename = "type", default)]
    pub message_type: MessageType,

    /// Base64 of the JSON session description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,

    /// Requested action on connect requests, failure text on errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl SignalMessage {
    /// Connect request acknowledged
    pub fn ready(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message_type: MessageType::Ready,
            msg: Some("OK".to_string()),
            ..Default::default()
        }
    }

    /// Failure report for `to`
    pub fn error(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message_type: MessageType::Error,
            msg: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Local answer for `to`, already encoded
    pub fn answer(to: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message_type: MessageType::Answer,
            sdp: Some(sdp.into()),
            ..Default::default()
        }
    }

    /// Action requested by a connect request
    pub fn action(&self) -> &str {
        self.msg.as_deref().unwrap_or_default()
    }

    /// Trickled candidate carried by this message
    ///
    /// Empty strings count as absent.
    pub fn ice_candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: self.candidate.clone().unwrap_or_default(),
            sdp_mid: non_empty(&self.sdp_mid),
            sdp_mline_index: self.sdp_mline_index,
            username_fragment: non_empty(&self.username_fragment),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}
