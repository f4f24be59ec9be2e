//! webrtc-rs backed transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use super::{
    CodecSpec, ConnectivityState, IceCandidate, InboundTrack, PeerTransport, RtpSink, SampleSink,
    SdpType, SessionDescription, TransportEvent, TransportEvents, TransportFactory,
};
use crate::error::{Error, Result};
use crate::media::{MediaKind, RtpPacket};

/// Configuration for [`WebRtcFactory`]
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// STUN/TURN URLs
    pub ice_servers: Vec<String>,
    /// Upper bound on candidate gathering before the local description is read
    pub gather_timeout: Duration,
    /// Stream id attached to outbound tracks
    pub stream_id: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".into()],
            gather_timeout: Duration::from_secs(5),
            stream_id: "rtc-relay".into(),
        }
    }
}

impl WebRtcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ICE server list
    pub fn ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Set the gathering timeout
    pub fn gather_timeout(mut self, timeout: Duration) -> Self {
        self.gather_timeout = timeout;
        self
    }

    /// ICE servers for the agent; none at all when no URLs are configured
    fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        if self.ice_servers.is_empty() {
            return Vec::new();
        }
        vec![RTCIceServer {
            urls: self.ice_servers.clone(),
            ..Default::default()
        }]
    }
}

/// Creates webrtc-rs peer connections
pub struct WebRtcFactory {
    api: API,
    config: WebRtcConfig,
}

impl WebRtcFactory {
    /// Build the media engine and interceptor chain
    pub fn new(config: WebRtcConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, config })
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(&self, peer_id: &str, events: TransportEvents) -> Result<Arc<dyn PeerTransport>> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.config.rtc_ice_servers(),
            ..Default::default()
        };

        let pc = Arc::new(self.api.new_peer_connection(rtc_config).await?);

        let state_events = events.clone();
        let state_peer = peer_id.to_string();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let events = state_events.clone();
            let peer_id = state_peer.clone();
            Box::pin(async move {
                tracing::debug!(peer_id = %peer_id, state = %state, "ICE connection state changed");
                if let Some(state) = map_ice_state(state) {
                    let _ = events.send(TransportEvent::Connectivity(state)).await;
                }
            })
        }));

        let track_events = events;
        let track_peer = peer_id.to_string();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            let peer_id = track_peer.clone();
            Box::pin(async move {
                tracing::info!(
                    peer_id = %peer_id,
                    ssrc = track.ssrc(),
                    kind = %track.kind(),
                    "Remote track started"
                );
                let inbound = RemoteTrack { track };
                let _ = events.send(TransportEvent::Track(Box::new(inbound))).await;
            })
        }));

        Ok(Arc::new(WebRtcPeer {
            pc,
            peer_id: peer_id.to_string(),
            stream_id: self.config.stream_id.clone(),
            gather_timeout: self.config.gather_timeout,
        }))
    }
}

fn map_ice_state(state: RTCIceConnectionState) -> Option<ConnectivityState> {
    match state {
        RTCIceConnectionState::New => Some(ConnectivityState::New),
        RTCIceConnectionState::Checking => Some(ConnectivityState::Checking),
        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
            Some(ConnectivityState::Connected)
        }
        RTCIceConnectionState::Disconnected => Some(ConnectivityState::Disconnected),
        RTCIceConnectionState::Failed => Some(ConnectivityState::Failed),
        RTCIceConnectionState::Closed => Some(ConnectivityState::Closed),
        _ => None,
    }
}

fn to_native(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let native = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(Error::Negotiation("rollback is not supported".into()));
        }
    };
    native.map_err(|e| Error::Negotiation(e.to_string()))
}

fn from_native(desc: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => return None,
    };
    Some(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

fn to_capability(codec: &CodecSpec) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: codec.mime_type.clone(),
        clock_rate: codec.clock_rate,
        channels: codec.channels,
        sdp_fmtp_line: codec.sdp_fmtp_line.clone(),
        rtcp_feedback: vec![],
    }
}

fn track_id(codec: &CodecSpec) -> &'static str {
    if codec.mime_type.to_ascii_lowercase().starts_with("audio/") {
        "audio"
    } else {
        "video"
    }
}

/// Drain RTCP for a sender so interceptors keep running
fn spawn_rtcp_drain(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while sender.read(&mut buf).await.is_ok() {}
    });
}

/// One webrtc-rs peer connection
struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    peer_id: String,
    stream_id: String,
    gather_timeout: Duration,
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let native = to_native(desc)?;
        self.pc
            .set_remote_description(native)
            .await
            .map_err(|e| Error::Negotiation(e.to_string()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(e.to_string()))?;
        from_native(answer).ok_or_else(|| Error::Negotiation("unspecified answer type".into()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let native = to_native(desc)?;
        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(native)
            .await
            .map_err(|e| Error::Negotiation(e.to_string()))?;

        if tokio::time::timeout(self.gather_timeout, gather_complete.recv())
            .await
            .is_err()
        {
            tracing::warn!(
                peer_id = %self.peer_id,
                timeout_ms = self.gather_timeout.as_millis() as u64,
                "Candidate gathering did not complete in time"
            );
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.and_then(from_native)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::Negotiation(e.to_string()))
    }

    async fn add_receive_slots(&self) -> Result<()> {
        self.pc
            .add_transceiver_from_kind(RTPCodecType::Audio, None)
            .await?;
        self.pc
            .add_transceiver_from_kind(RTPCodecType::Video, None)
            .await?;
        Ok(())
    }

    async fn add_relay_track(&self, codec: &CodecSpec) -> Result<Arc<dyn RtpSink>> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            to_capability(codec),
            track_id(codec).to_string(),
            self.stream_id.clone(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        spawn_rtcp_drain(sender);

        Ok(Arc::new(RelayTrackSink { track }))
    }

    async fn add_sample_track(&self, codec: &CodecSpec) -> Result<Arc<dyn SampleSink>> {
        let track = Arc::new(TrackLocalStaticSample::new(
            to_capability(codec),
            track_id(codec).to_string(),
            self.stream_id.clone(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        spawn_rtcp_drain(sender);

        Ok(Arc::new(FrameTrackSink { track }))
    }

    async fn request_keyframe(&self, media_ssrc: u32) -> Result<()> {
        self.pc
            .write_rtcp(&[Box::new(PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc,
            })])
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

struct RemoteTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl InboundTrack for RemoteTrack {
    fn ssrc(&self) -> u32 {
        self.track.ssrc()
    }

    fn kind(&self) -> MediaKind {
        match self.track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }

    fn codec(&self) -> CodecSpec {
        let params = self.track.codec();
        CodecSpec {
            mime_type: params.capability.mime_type,
            clock_rate: params.capability.clock_rate,
            channels: params.capability.channels,
            sdp_fmtp_line: params.capability.sdp_fmtp_line,
        }
    }

    async fn read_unit(&self) -> Result<Option<RtpPacket>> {
        match self.track.read_rtp().await {
            Ok((packet, _)) => Ok(Some(packet)),
            Err(e) if is_end_of_stream(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a track read failed because the receiver or its buffer closed
fn is_end_of_stream(err: &webrtc::Error) -> bool {
    use webrtc::{interceptor, srtp, util};

    matches!(
        err,
        webrtc::Error::ErrClosedPipe
            | webrtc::Error::Util(util::Error::ErrBufferClosed)
            | webrtc::Error::Srtp(srtp::Error::Util(util::Error::ErrBufferClosed))
            | webrtc::Error::Interceptor(interceptor::Error::Util(util::Error::ErrBufferClosed))
            | webrtc::Error::Interceptor(interceptor::Error::Srtp(srtp::Error::Util(
                util::Error::ErrBufferClosed
            )))
    )
}

struct RelayTrackSink {
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl RtpSink for RelayTrackSink {
    async fn write_rtp(&self, packet: &RtpPacket) -> Result<()> {
        match self.track.write_rtp(packet).await {
            Ok(_) => Ok(()),
            // Not yet bound to a negotiated sender
            Err(webrtc::Error::ErrClosedPipe) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct FrameTrackSink {
    track: Arc<TrackLocalStaticSample>,
}

#[async_trait]
impl SampleSink for FrameTrackSink {
    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        self.track.write_sample(&sample).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_state_mapping() {
        assert_eq!(
            map_ice_state(RTCIceConnectionState::Completed),
            Some(ConnectivityState::Connected)
        );
        assert_eq!(
            map_ice_state(RTCIceConnectionState::Failed),
            Some(ConnectivityState::Failed)
        );
        assert_eq!(map_ice_state(RTCIceConnectionState::Unspecified), None);
    }

    #[test]
    fn test_track_id_by_kind() {
        assert_eq!(track_id(&CodecSpec::opus()), "audio");
        assert_eq!(track_id(&CodecSpec::vp8()), "video");
    }

    #[test]
    fn test_config_builder() {
        let config = WebRtcConfig::new()
            .ice_servers(vec![])
            .gather_timeout(Duration::from_millis(100));
        assert!(config.ice_servers.is_empty());
        assert_eq!(config.gather_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_empty_ice_server_list() {
        assert!(WebRtcConfig::new().ice_servers(vec![]).rtc_ice_servers().is_empty());

        let servers = WebRtcConfig::new()
            .ice_servers(vec!["stun:stun.example.org:3478".into()])
            .rtc_ice_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.org:3478".to_string()]);
    }

    #[test]
    fn test_end_of_stream_errors() {
        use webrtc::{interceptor, srtp, util};

        assert!(is_end_of_stream(&webrtc::Error::ErrClosedPipe));
        assert!(is_end_of_stream(&webrtc::Error::Interceptor(interceptor::Error::Srtp(
            srtp::Error::Util(util::Error::ErrBufferClosed)
        ))));
        assert!(is_end_of_stream(&webrtc::Error::Util(util::Error::ErrBufferClosed)));
        assert!(!is_end_of_stream(&webrtc::Error::Util(util::Error::ErrBufferFull)));
        assert!(!is_end_of_stream(&webrtc::Error::ErrUnknownType));
    }
}
