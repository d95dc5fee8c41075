use crate::legacy::{LegacyCommonPlay, SearchAdapter};
use crate::session::{ReplyGroup, SearchSession, StopReason};
use cadence_core::{
    BusMessage, ExtractorRegistry, MediaEntry, MediaType, MessageBus, PlaybackType, Playlist,
    ProviderReply, SearchConfig,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::time::Instant;

/// Broadcasts queries to providers and collects their replies under the
/// configured timeout and early-stop policy.
///
/// The inbox subscription is taken at construction, so replies are never
/// missed between broadcasting a query and waiting for answers.
pub struct SearchAggregator {
    bus: Arc<dyn MessageBus>,
    inbox: Receiver<BusMessage>,
    config: SearchConfig,
    extractors: Arc<ExtractorRegistry>,
    adapters: Vec<Box<dyn SearchAdapter>>,
    gui_available: bool,
    results: Playlist,
    last_session: Option<SearchSession>,
}

impl SearchAggregator {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        config: SearchConfig,
        extractors: Arc<ExtractorRegistry>,
    ) -> Self {
        let inbox = bus.subscribe();
        let mut adapters: Vec<Box<dyn SearchAdapter>> = Vec::new();
        if config.backwards_compatibility {
            adapters.push(Box::new(LegacyCommonPlay::new()));
        }
        Self {
            bus,
            inbox,
            config,
            extractors,
            adapters,
            gui_available: false,
            results: Playlist::new(),
            last_session: None,
        }
    }

    /// Whether a display surface can show video. Without one, audio-castable
    /// results are forced to audio playback.
    pub fn set_gui_available(&mut self, available: bool) {
        self.gui_available = available;
    }

    pub fn add_adapter(&mut self, adapter: Box<dyn SearchAdapter>) {
        tracing::debug!(adapter = adapter.name(), "search adapter added");
        self.adapters.push(adapter);
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn extractors(&self) -> &Arc<ExtractorRegistry> {
        &self.extractors
    }

    /// Deduplicated results of the most recent search, in arrival order.
    pub fn results(&self) -> &Playlist {
        &self.results
    }

    pub fn last_session(&self) -> Option<&SearchSession> {
        self.last_session.as_ref()
    }

    /// Runs a search and returns the reply groups that hold results.
    ///
    /// A typed query that finds nothing is retried as a generic one when
    /// fallback is enabled.
    pub async fn search(&mut self, phrase: &str, media_type: MediaType) -> Vec<ReplyGroup> {
        let mut media_type = media_type;
        loop {
            let groups = self.run_session(phrase, media_type).await;
            if !groups.is_empty()
                || !self.config.search_fallback
                || media_type == MediaType::Generic
            {
                return groups;
            }
            tracing::debug!(%phrase, from = %media_type, "no results, falling back to generic search");
            media_type = MediaType::Generic;
        }
    }

    /// Searches and keeps only the reply of one provider.
    pub async fn search_provider(
        &mut self,
        provider_id: &str,
        phrase: &str,
        media_type: MediaType,
    ) -> Option<ReplyGroup> {
        self.search(phrase, media_type)
            .await
            .into_iter()
            .find(|group| group.provider_id == provider_id)
    }

    async fn run_session(&mut self, phrase: &str, media_type: MediaType) -> Vec<ReplyGroup> {
        self.bus.emit(BusMessage::SearchStop);
        self.bus.emit(BusMessage::SearchSpinner);
        self.discard_stale();
        self.results.clear();
        self.last_session = None;

        let mut session = SearchSession::new(phrase, media_type, Instant::now(), &self.config);
        tracing::info!(%phrase, %media_type, "searching providers");
        self.bus.emit(BusMessage::SearchStart {
            phrase: phrase.to_string(),
            media_type,
        });
        if self.config.backwards_compatibility {
            for adapter in self.adapters.iter_mut() {
                adapter.send_query(self.bus.as_ref(), phrase, media_type);
            }
        }

        while session.is_searching() {
            let wake = session.next_wake();
            match tokio::time::timeout_at(wake, self.inbox.recv()).await {
                Ok(Ok(message)) => self.handle_message(&mut session, message),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "search inbox lagged, messages dropped");
                }
                Ok(Err(RecvError::Closed)) => session.finish(StopReason::Closed),
                Err(_) => {}
            }
            session.poll(Instant::now());
        }

        match session.stop_reason() {
            Some(StopReason::Deadline) => self.footer("Timeout!\nselecting best result".into()),
            Some(StopReason::AllProvidersDone) => self.footer(
                "Received search responses from all providers!\nselecting best result".into(),
            ),
            _ => {}
        }

        self.collect_late(&mut session);
        if self.config.backwards_compatibility {
            for adapter in self.adapters.iter_mut() {
                for group in adapter.collect(phrase, media_type) {
                    session.record(group);
                }
            }
        }

        self.bus.emit(BusMessage::SearchResults {
            results: self.results.iter().map(MediaEntry::info).collect(),
        });
        let groups = session.results();
        tracing::info!(
            %phrase,
            groups = groups.len(),
            results = self.results.len(),
            "search finished"
        );
        self.last_session = Some(session);
        groups
    }

    fn handle_message(&mut self, session: &mut SearchSession, message: BusMessage) {
        if self.config.backwards_compatibility {
            for adapter in self.adapters.iter_mut() {
                adapter.observe(&message);
            }
        }
        match message {
            BusMessage::ProviderSearchBegin { provider_id } => session.provider_began(&provider_id),
            BusMessage::ProviderSearchEnd { provider_id } => {
                session.provider_ended(&provider_id, Instant::now(), self.config.settle());
            }
            BusMessage::ProviderReply(reply) => self.handle_reply(session, reply),
            _ => {}
        }
    }

    fn handle_reply(&mut self, session: &mut SearchSession, reply: ProviderReply) {
        if reply.phrase != session.phrase() {
            tracing::debug!(
                provider_id = %reply.provider_id,
                phrase = %reply.phrase,
                "dropping reply for another phrase"
            );
            return;
        }

        if reply.searching {
            match reply.timeout.and_then(|secs| Duration::try_from_secs_f64(secs).ok()) {
                Some(extra) if self.config.allow_extensions => {
                    session.extend(extra);
                }
                _ => tracing::trace!(provider_id = %reply.provider_id, "provider still searching"),
            }
            return;
        }

        let now = Instant::now();
        let mut accepted = Vec::with_capacity(reply.results.len());
        let mut strongest_new: Option<MediaEntry> = None;
        for raw in &reply.results {
            let Some(entry) = self.accept(raw, &reply.provider_id) else {
                continue;
            };
            if !self.results.contains(&entry) {
                self.results.add_entry(entry.clone(), None);
                if entry.match_confidence >= self.config.progress_threshold {
                    self.footer(format!(
                        "provider - {}\nmatch - {}\nconfidence - {}",
                        reply.provider_id, entry.title, entry.match_confidence
                    ));
                }
                if strongest_new
                    .as_ref()
                    .map_or(true, |best| entry.match_confidence > best.match_confidence)
                {
                    strongest_new = Some(entry.clone());
                }
            }
            accepted.push(entry);
        }
        session.record(ReplyGroup {
            phrase: reply.phrase,
            provider_id: reply.provider_id.clone(),
            results: accepted,
        });

        if session.is_past_deadline(now) {
            tracing::debug!("search deadline passed, parsing results");
            session.finish(StopReason::Deadline);
            return;
        }
        let Some(best) = strongest_new.filter(|e| e.match_confidence >= self.config.early_stop_thresh)
        else {
            return;
        };
        let grace = self.config.early_stop_grace();
        if session.arm_early_stop(now + grace) {
            tracing::info!(
                provider_id = %reply.provider_id,
                confidence = best.match_confidence,
                grace_ms = grace.as_millis() as u64,
                "very high confidence match, stopping search early"
            );
            self.footer(format!(
                "High confidence match!\nprovider - {}\nmatch - {}\nconfidence - {}",
                reply.provider_id, best.title, best.match_confidence
            ));
        }
    }

    /// Validates one raw result and applies the playability and display filters.
    fn accept(&self, raw: &Value, provider_id: &str) -> Option<MediaEntry> {
        let Some(obj) = raw.as_object() else {
            tracing::warn!(provider_id, "discarding result that is not an object");
            return None;
        };
        if !obj.get("match_confidence").is_some_and(Value::is_number) {
            tracing::warn!(provider_id, "discarding result without match_confidence");
            return None;
        }

        let mut entry = MediaEntry::from_raw(obj);
        if !obj.contains_key("skill_id") {
            entry.provider_id = provider_id.to_string();
        }
        match entry.uri.as_deref() {
            Some(uri) if !self.extractors.is_playable(uri) => {
                tracing::error!(provider_id, %uri, "stream handler not available, result dropped");
                return None;
            }
            Some(_) => {}
            None => {
                entry.playlist.retain(|track| {
                    track
                        .uri
                        .as_deref()
                        .is_some_and(|uri| self.extractors.is_playable(uri))
                });
                if entry.playlist.is_empty() {
                    tracing::error!(provider_id, title = %entry.title, "no playable tracks in result");
                    return None;
                }
            }
        }

        if !self.gui_available && entry.media_type.is_audio_castable() {
            tracing::debug!(title = %entry.title, "no display available, forcing audio playback");
            entry.playback = PlaybackType::Audio;
            entry.match_confidence = entry
                .match_confidence
                .saturating_sub(self.config.audio_cast_penalty);
        }
        Some(entry)
    }

    fn discard_stale(&mut self) {
        let mut stale = 0usize;
        loop {
            match self.inbox.try_recv() {
                Ok(_) => stale += 1,
                Err(TryRecvError::Lagged(skipped)) => stale += skipped as usize,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if stale > 0 {
            tracing::trace!(stale, "discarded messages from a superseded search");
        }
    }

    /// Records replies that were already queued when the session stopped.
    fn collect_late(&mut self, session: &mut SearchSession) {
        loop {
            let message = match self.inbox.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            };
            if self.config.backwards_compatibility {
                for adapter in self.adapters.iter_mut() {
                    adapter.observe(&message);
                }
            }
            let BusMessage::ProviderReply(reply) = message else {
                continue;
            };
            if reply.phrase != session.phrase() || reply.searching {
                continue;
            }
            let results = reply
                .results
                .iter()
                .filter_map(|raw| self.accept(raw, &reply.provider_id))
                .collect();
            session.record_late(ReplyGroup {
                phrase: reply.phrase,
                provider_id: reply.provider_id,
                results,
            });
        }
    }

    fn footer(&self, text: String) {
        self.bus.emit(BusMessage::SearchFooter { text });
    }
}
