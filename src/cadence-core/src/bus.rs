//! Logical message surface shared by the aggregator, the player and providers.
//!
//! Messages are serialized as `{"type": "<name>", "data": {...}}` so a host can
//! bridge them onto its own transport.

use crate::media::{MediaType, RawMedia, TrackState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One provider's answer to a search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub phrase: String,
    #[serde(rename = "skill_id")]
    pub provider_id: String,
    /// "Still searching, no results yet" marker.
    #[serde(default)]
    pub searching: bool,
    /// Extra seconds requested while `searching` is set.
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Candidate results; validated entry by entry.
    #[serde(default)]
    pub results: Vec<Value>,
}

/// Reply in the older query dialect, collected by the legacy adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyReply {
    pub phrase: String,
    pub skill_id: String,
    /// Confidence in `0.0..=1.0`.
    #[serde(default)]
    pub conf: f64,
    #[serde(default)]
    pub callback_data: RawMedia,
    #[serde(default)]
    pub searching: bool,
}

/// Where the player sends a promoted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackTarget {
    /// The provider plays the entry itself.
    Skill { provider_id: String },
    Audio { uri: String },
    Video { uri: String },
    AudioService { uri: String },
    /// Only lifecycle events are emitted; an external interface plays.
    EventsOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BusMessage {
    #[serde(rename = "query.search.start")]
    SearchStart { phrase: String, media_type: MediaType },
    #[serde(rename = "query.search.stop")]
    SearchStop,
    #[serde(rename = "provider.search.begin")]
    ProviderSearchBegin {
        #[serde(rename = "skill_id")]
        provider_id: String,
    },
    #[serde(rename = "provider.search.end")]
    ProviderSearchEnd {
        #[serde(rename = "skill_id")]
        provider_id: String,
    },
    #[serde(rename = "provider.search.reply")]
    ProviderReply(ProviderReply),
    #[serde(rename = "legacy.query")]
    LegacyQuery { phrase: String },
    #[serde(rename = "legacy.query.reply")]
    LegacyReply(LegacyReply),
    #[serde(rename = "ui.search.spinner")]
    SearchSpinner,
    #[serde(rename = "ui.search.footer")]
    SearchFooter { text: String },
    #[serde(rename = "ui.search.results")]
    SearchResults { results: Vec<RawMedia> },
    #[serde(rename = "track.state.changed")]
    TrackStateChanged { state: TrackState },
    #[serde(rename = "playback.time.sync")]
    PlaybackTimeSync { position: u64, length: Option<u64> },
    #[serde(rename = "metadata.request")]
    MetadataRequest,
    #[serde(rename = "metadata.sync")]
    MetadataSync {
        title: String,
        image: String,
        artist: Option<String>,
    },
    #[serde(rename = "external.track_info.reply")]
    TrackInfoReply(RawMedia),
    #[serde(rename = "playback.start")]
    PlaybackStart {
        target: PlaybackTarget,
        entry: RawMedia,
    },
    #[serde(rename = "playback.pause")]
    PlaybackPause,
    #[serde(rename = "playback.resume")]
    PlaybackResume,
    #[serde(rename = "playback.stop")]
    PlaybackStop,
}

impl BusMessage {
    /// Wire name of the message.
    pub fn name(&self) -> &'static str {
        match self {
            BusMessage::SearchStart { .. } => "query.search.start",
            BusMessage::SearchStop => "query.search.stop",
            BusMessage::ProviderSearchBegin { .. } => "provider.search.begin",
            BusMessage::ProviderSearchEnd { .. } => "provider.search.end",
            BusMessage::ProviderReply(_) => "provider.search.reply",
            BusMessage::LegacyQuery { .. } => "legacy.query",
            BusMessage::LegacyReply(_) => "legacy.query.reply",
            BusMessage::SearchSpinner => "ui.search.spinner",
            BusMessage::SearchFooter { .. } => "ui.search.footer",
            BusMessage::SearchResults { .. } => "ui.search.results",
            BusMessage::TrackStateChanged { .. } => "track.state.changed",
            BusMessage::PlaybackTimeSync { .. } => "playback.time.sync",
            BusMessage::MetadataRequest => "metadata.request",
            BusMessage::MetadataSync { .. } => "metadata.sync",
            BusMessage::TrackInfoReply(_) => "external.track_info.reply",
            BusMessage::PlaybackStart { .. } => "playback.start",
            BusMessage::PlaybackPause => "playback.pause",
            BusMessage::PlaybackResume => "playback.resume",
            BusMessage::PlaybackStop => "playback.stop",
        }
    }
}

/// Emit/consume capability the core depends on.
pub trait MessageBus: Send + Sync {
    fn emit(&self, message: BusMessage);

    /// New subscription receiving every message emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<BusMessage>;
}

/// In-process bus backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MessageBus for LocalBus {
    fn emit(&self, message: BusMessage) {
        let name = message.name();
        if self.sender.send(message).is_err() {
            tracing::trace!(message = name, "no subscribers for bus message");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }
}
