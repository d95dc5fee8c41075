use cadence_core::{
    BusMessage, ExtractRequest, ExtractorRegistry, MediaEntry, MessageBus, PlaybackType, RawMedia,
    TrackState,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

/// The single entry currently promoted for playback.
///
/// The value is mutated in place for the whole player lifetime; listeners see
/// one continuous entry rather than a new one per track.
pub struct NowPlaying {
    entry: MediaEntry,
    bus: Arc<dyn MessageBus>,
    extractors: Arc<ExtractorRegistry>,
    events: Option<Receiver<BusMessage>>,
}

impl NowPlaying {
    /// Subscribes to playback events right away.
    pub fn new(bus: Arc<dyn MessageBus>, extractors: Arc<ExtractorRegistry>) -> Self {
        let events = Some(bus.subscribe());
        Self {
            entry: MediaEntry::default(),
            bus,
            extractors,
            events,
        }
    }

    pub fn entry(&self) -> &MediaEntry {
        &self.entry
    }

    pub fn is_bound(&self) -> bool {
        self.events.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.uri.is_none() && self.entry.playlist.is_empty()
    }

    /// Takes over every field of `entry` and syncs metadata.
    ///
    /// Events still queued for the previous track are dropped.
    pub fn reset_to(&mut self, entry: &MediaEntry) {
        self.discard_pending();
        self.entry.clone_from(entry);
        self.sync_metadata();
    }

    pub fn clear(&mut self) {
        self.discard_pending();
        self.entry.clone_from(&MediaEntry::default());
    }

    /// Merges `raw` into the entry and syncs metadata.
    pub fn update(&mut self, raw: &RawMedia, skip: &[&str]) {
        self.entry.update(raw, skip);
        self.sync_metadata();
    }

    pub fn set_status(&mut self, state: TrackState) {
        self.entry.status = state;
    }

    /// Resolves the entry's locator to a playable stream and merges the
    /// extracted metadata. Failures leave the last known uri in place.
    pub fn extract_stream(&mut self) {
        let Some(uri) = self.entry.uri.clone() else {
            tracing::warn!(title = %self.entry.title, "nothing to extract, entry has no uri");
            return;
        };
        let request = ExtractRequest {
            video: self.entry.playback == PlaybackType::Video,
        };
        let meta = self.extractors.resolve(&uri, &request);
        self.update(&meta, &[]);
    }

    /// Applies every queued playback event.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(events) = self.events.as_mut() else {
                return handled;
            };
            let message = match events.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "now playing lagged behind the bus");
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return handled,
            };
            if self.handle_message(&message) {
                handled += 1;
            }
        }
    }

    /// Returns true when the message concerned the now playing entry.
    pub fn handle_message(&mut self, message: &BusMessage) -> bool {
        match message {
            BusMessage::TrackStateChanged { state } => {
                tracing::info!(?state, "track state changed");
                self.entry.status = *state;
            }
            BusMessage::PlaybackTimeSync { position, length } => {
                self.entry.position = *position;
                self.entry.length = *length;
            }
            BusMessage::MetadataRequest => self.sync_metadata(),
            BusMessage::TrackInfoReply(info) => self.update(info, &[]),
            _ => return false,
        }
        true
    }

    /// Drops the event subscription.
    pub fn shutdown(&mut self) {
        if self.events.take().is_some() {
            tracing::debug!("now playing unbound from the bus");
        }
    }

    fn discard_pending(&mut self) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        let mut stale = 0usize;
        loop {
            match events.try_recv() {
                Ok(_) => stale += 1,
                Err(TryRecvError::Lagged(skipped)) => stale += skipped as usize,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if stale > 0 {
            tracing::trace!(stale, "discarded events queued for the previous track");
        }
    }

    fn sync_metadata(&self) {
        self.bus.emit(BusMessage::MetadataSync {
            title: self.entry.title.clone(),
            image: self.entry.image.clone(),
            artist: self.entry.artist.clone(),
        });
    }
}
