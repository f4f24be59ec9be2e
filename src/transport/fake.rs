//! In-memory transport for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{
    CodecSpec, IceCandidate, InboundTrack, PeerTransport, RtpSink, SampleSink, SessionDescription,
    TransportEvent, TransportEvents, TransportFactory,
};
use crate::error::{Error, Result};
use crate::media::{MediaKind, RtpPacket};

/// SDP body that `FakeTransport` refuses to apply
pub const REJECTED_SDP: &str = "reject";

/// SDP body that makes `FakeTransport` panic, standing in for an agent bug
pub const PANIC_SDP: &str = "panic";

/// Transport that records every call
#[derive(Default)]
pub struct FakeTransport {
    pub peer_id: String,
    events: Mutex<Option<TransportEvents>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub receive_slots: AtomicBool,
    pub relay_sinks: Mutex<Vec<Arc<RecordingRtpSink>>>,
    pub sample_sinks: Mutex<Vec<Arc<RecordingSampleSink>>>,
    pub keyframe_requests: AtomicU32,
    pub closed: AtomicBool,
}

impl FakeTransport {
    pub fn new(peer_id: &str, events: TransportEvents) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            events: Mutex::new(Some(events)),
            ..Default::default()
        }
    }

    /// Publish an event onto the owning session's queue
    pub async fn emit(&self, event: TransportEvent) {
        let events = self.events.lock().unwrap().clone();
        if let Some(events) = events {
            let _ = events.send(event).await;
        }
    }

    pub fn keyframe_requests(&self) -> u32 {
        self.keyframe_requests.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn relay_sink(&self) -> Option<Arc<RecordingRtpSink>> {
        self.relay_sinks.lock().unwrap().first().cloned()
    }

    pub fn video_sample_sink(&self) -> Option<Arc<RecordingSampleSink>> {
        self.sample_sinks.lock().unwrap().first().cloned()
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if desc.sdp == PANIC_SDP {
            panic!("negotiation agent crashed");
        }
        if desc.sdp == REJECTED_SDP {
            return Err(Error::Negotiation("remote description rejected".into()));
        }
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if self.remote.lock().unwrap().is_none() {
            return Err(Error::Negotiation("no remote description".into()));
        }
        Ok(SessionDescription::answer(format!("v=0 answer-for-{}", self.peer_id)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        *self.local.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.remote.lock().unwrap().is_none() {
            return Err(Error::Negotiation("candidate before remote description".into()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_receive_slots(&self) -> Result<()> {
        self.receive_slots.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_relay_track(&self, _codec: &CodecSpec) -> Result<Arc<dyn RtpSink>> {
        let sink = Arc::new(RecordingRtpSink::default());
        self.relay_sinks.lock().unwrap().push(Arc::clone(&sink));
        Ok(sink)
    }

    async fn add_sample_track(&self, _codec: &CodecSpec) -> Result<Arc<dyn SampleSink>> {
        let sink = Arc::new(RecordingSampleSink::default());
        self.sample_sinks.lock().unwrap().push(Arc::clone(&sink));
        Ok(sink)
    }

    async fn request_keyframe(&self, _media_ssrc: u32) -> Result<()> {
        self.keyframe_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().unwrap().take();
        Ok(())
    }
}

/// Factory handing out [`FakeTransport`]s
#[derive(Default)]
pub struct FakeFactory {
    pub created: Mutex<HashMap<String, Arc<FakeTransport>>>,
    pub fail: AtomicBool,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(&self, peer_id: &str) -> Option<Arc<FakeTransport>> {
        self.created.lock().unwrap().get(peer_id).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn create(&self, peer_id: &str, events: TransportEvents) -> Result<Arc<dyn PeerTransport>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transport("transport creation refused".into()));
        }
        let transport = Arc::new(FakeTransport::new(peer_id, events));
        self.created
            .lock()
            .unwrap()
            .insert(peer_id.to_string(), Arc::clone(&transport));
        Ok(transport)
    }
}

/// Sink keeping every packet written to it
#[derive(Default)]
pub struct RecordingRtpSink {
    pub packets: Mutex<Vec<RtpPacket>>,
}

impl RecordingRtpSink {
    pub fn sequence_numbers(&self) -> Vec<u16> {
        self.packets
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.header.sequence_number)
            .collect()
    }
}

#[async_trait]
impl RtpSink for RecordingRtpSink {
    async fn write_rtp(&self, packet: &RtpPacket) -> Result<()> {
        self.packets.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

/// Sink keeping every sample with the instant it arrived
#[derive(Default)]
pub struct RecordingSampleSink {
    pub samples: Mutex<Vec<(Instant, Bytes, Duration)>>,
}

impl RecordingSampleSink {
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<Bytes> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data, _)| data.clone())
            .collect()
    }

    pub fn arrivals(&self) -> Vec<Instant> {
        self.samples.lock().unwrap().iter().map(|(at, _, _)| *at).collect()
    }
}

#[async_trait]
impl SampleSink for RecordingSampleSink {
    async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        self.samples
            .lock()
            .unwrap()
            .push((Instant::now(), data, duration));
        Ok(())
    }
}

/// Inbound track fed by the test through a channel
pub struct ScriptedTrack {
    ssrc: u32,
    kind: MediaKind,
    codec: CodecSpec,
    rx: tokio::sync::Mutex<mpsc::Receiver<RtpPacket>>,
}

impl ScriptedTrack {
    /// Create a track and the sender that feeds it; dropping the sender ends the track
    pub fn new(ssrc: u32, kind: MediaKind, codec: CodecSpec) -> (Self, mpsc::Sender<RtpPacket>) {
        let (tx, rx) = mpsc::channel(256);
        let track = Self {
            ssrc,
            kind,
            codec,
            rx: tokio::sync::Mutex::new(rx),
        };
        (track, tx)
    }

    pub fn vp8(ssrc: u32) -> (Self, mpsc::Sender<RtpPacket>) {
        Self::new(ssrc, MediaKind::Video, CodecSpec::vp8())
    }
}

#[async_trait]
impl InboundTrack for ScriptedTrack {
    fn ssrc(&self) -> u32 {
        self.ssrc
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn codec(&self) -> CodecSpec {
        self.codec.clone()
    }

    async fn read_unit(&self) -> Result<Option<RtpPacket>> {
        Ok(self.rx.lock().await.recv().await)
    }
}
