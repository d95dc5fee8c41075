use crate::now_playing::NowPlaying;
use cadence_core::{
    BusMessage, Config, ExtractorRegistry, MediaEntry, MediaType, MessageBus, PlaybackConfig,
    PlaybackMode, PlaybackTarget, PlaybackType, Playlist, TrackState,
};
use cadence_search::{select_best, SearchAggregator};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// A "play something" request after intent parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub phrase: String,
    pub media_type: MediaType,
    /// Force audio playback of every result.
    pub audio_only: bool,
    /// Keep only results that can play as video.
    pub video_only: bool,
}

impl PlayRequest {
    pub fn new(phrase: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            phrase: phrase.into(),
            media_type,
            audio_only: false,
            video_only: false,
        }
    }

    pub fn audio_only(mut self) -> Self {
        self.audio_only = true;
        self.video_only = false;
        self
    }

    pub fn video_only(mut self) -> Self {
        self.video_only = true;
        self.audio_only = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Playing(MediaEntry),
    Resumed,
    /// Nothing playable was found; the caller tells the user.
    NoResults {
        phrase: String,
        media_type: MediaType,
    },
    /// An empty request while not paused.
    MissingQuery,
    NothingToResume,
}

/// Player-facing control surface: owns the playlist and the now playing
/// entry and turns search results into playback.
pub struct Player {
    bus: Arc<dyn MessageBus>,
    search: SearchAggregator,
    now_playing: NowPlaying,
    playlist: Playlist,
    config: PlaybackConfig,
    state: PlayerState,
    gui_available: bool,
    last_query: Option<PlayRequest>,
}

impl Player {
    pub fn new(bus: Arc<dyn MessageBus>, config: &Config, extractors: Arc<ExtractorRegistry>) -> Self {
        let search = SearchAggregator::new(bus.clone(), config.search.clone(), extractors.clone());
        let now_playing = NowPlaying::new(bus.clone(), extractors);
        Self {
            bus,
            search,
            now_playing,
            playlist: Playlist::new(),
            config: config.playback.clone(),
            state: PlayerState::Stopped,
            gui_available: false,
            last_query: None,
        }
    }

    pub fn set_gui_available(&mut self, available: bool) {
        self.gui_available = available;
        self.search.set_gui_available(available);
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn now_playing(&self) -> &NowPlaying {
        &self.now_playing
    }

    pub fn search(&self) -> &SearchAggregator {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut SearchAggregator {
        &mut self.search
    }

    /// Searches for `request` and plays the best result, or resumes when
    /// paused and the phrase means "resume".
    pub async fn play(&mut self, request: PlayRequest) -> PlayOutcome {
        if self.should_resume(&request.phrase) {
            self.resume_playback();
            return PlayOutcome::Resumed;
        }
        if request.phrase.trim().is_empty() {
            self.stop();
            return PlayOutcome::MissingQuery;
        }

        self.reset();
        self.last_query = Some(request.clone());
        let results = self.search_results(&request).await;
        let mode = self.selection_mode(&request);
        let Some(best) = select_best(&results, mode) else {
            tracing::info!(phrase = %request.phrase, media_type = %request.media_type, "no playable results");
            return PlayOutcome::NoResults {
                phrase: request.phrase,
                media_type: request.media_type,
            };
        };
        self.play_media(best, results)
    }

    /// Flattened reply groups after the score and playback filters.
    pub async fn search_results(&mut self, request: &PlayRequest) -> Vec<MediaEntry> {
        let groups = self.search.search(&request.phrase, request.media_type).await;
        let mut results: Vec<MediaEntry> = groups
            .into_iter()
            .flat_map(|group| group.results)
            .filter(|entry| entry.match_confidence >= self.config.min_score)
            .collect();

        if request.audio_only {
            tracing::info!("audio only requested, forcing audio playback");
            for entry in &mut results {
                entry.playback = PlaybackType::Audio;
            }
        } else if request.video_only {
            tracing::info!("video only requested, dropping non-video results");
            for entry in &mut results {
                if entry.media_type == MediaType::Video {
                    entry.playback = PlaybackType::Video;
                }
            }
            results.retain(|entry| entry.playback == PlaybackType::Video);
        } else if !self.gui_available {
            results.retain(|entry| entry.playback != PlaybackType::Video);
        }
        results
    }

    /// Loads the playlist around `best` and starts it.
    ///
    /// A sub-playlist result replaces the playlist with its tracks; otherwise
    /// all results are queued by confidence with the cursor on `best`.
    pub fn play_media(&mut self, best: MediaEntry, results: Vec<MediaEntry>) -> PlayOutcome {
        let track = if best.is_sub_playlist() {
            self.playlist.replace(best.playlist.iter().map(|track| {
                let mut track = track.clone();
                track.inherit_from(&best);
                track
            }));
            self.playlist.goto_start();
            match self.playlist.current_track() {
                Some(first) => first.clone(),
                None => return self.no_results(),
            }
        } else {
            self.playlist.replace(results);
            self.playlist.sort_by_conf();
            self.playlist.goto_track(&best);
            best
        };
        self.now_playing.reset_to(&track);
        self.start_playback()
    }

    /// Advances to the next playlist entry. `None` at the end of the playlist.
    pub fn next(&mut self) -> Option<MediaEntry> {
        if self.playlist.is_last_track() {
            tracing::debug!("already at the last track");
            return None;
        }
        self.playlist.next_track();
        self.play_current()
    }

    pub fn prev(&mut self) -> Option<MediaEntry> {
        if self.playlist.is_first_track() {
            tracing::debug!("already at the first track");
            return None;
        }
        self.playlist.prev_track();
        self.play_current()
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        self.state = PlayerState::Paused;
        self.bus.emit(BusMessage::PlaybackPause);
        true
    }

    /// Resumes when paused, otherwise repeats the last query.
    pub async fn resume(&mut self) -> PlayOutcome {
        if self.state == PlayerState::Paused {
            self.resume_playback();
            return PlayOutcome::Resumed;
        }
        match self.last_query.clone() {
            Some(query) => self.play(query).await,
            None => PlayOutcome::NothingToResume,
        }
    }

    /// Stops playback; the now playing entry is cleared, the playlist kept.
    pub fn stop(&mut self) {
        if self.state != PlayerState::Stopped {
            self.bus.emit(BusMessage::PlaybackStop);
        }
        self.now_playing.clear();
        self.state = PlayerState::Stopped;
    }

    /// Applies queued playback events to the now playing entry.
    pub fn pump(&mut self) -> usize {
        self.now_playing.poll_events()
    }

    pub fn shutdown(&mut self) {
        self.stop();
        self.now_playing.shutdown();
    }

    fn should_resume(&self, phrase: &str) -> bool {
        if self.state != PlayerState::Paused {
            return false;
        }
        let phrase = phrase.trim();
        phrase.is_empty()
            || self
                .config
                .resume_phrases
                .iter()
                .any(|word| word.eq_ignore_ascii_case(phrase))
    }

    fn selection_mode(&self, request: &PlayRequest) -> PlaybackMode {
        if request.video_only {
            PlaybackMode::VideoOnly
        } else if request.audio_only {
            PlaybackMode::AudioOnly
        } else {
            match self.config.playback_mode {
                mode @ (PlaybackMode::AudioOnly | PlaybackMode::VideoOnly) => mode,
                _ => PlaybackMode::Auto,
            }
        }
    }

    fn reset(&mut self) {
        if self.state != PlayerState::Stopped {
            self.bus.emit(BusMessage::PlaybackStop);
        }
        self.playlist.clear();
        self.now_playing.clear();
        self.state = PlayerState::Stopped;
    }

    fn resume_playback(&mut self) {
        self.state = PlayerState::Playing;
        self.bus.emit(BusMessage::PlaybackResume);
    }

    fn play_current(&mut self) -> Option<MediaEntry> {
        let track = self.playlist.current_track()?.clone();
        self.now_playing.reset_to(&track);
        match self.start_playback() {
            PlayOutcome::Playing(entry) => Some(entry),
            _ => None,
        }
    }

    fn no_results(&self) -> PlayOutcome {
        let (phrase, media_type) = self
            .last_query
            .as_ref()
            .map(|q| (q.phrase.clone(), q.media_type))
            .unwrap_or_default();
        PlayOutcome::NoResults { phrase, media_type }
    }

    /// Picks the playback target for the now playing entry and announces it.
    fn start_playback(&mut self) -> PlayOutcome {
        let (target, queued) = self.playback_target();
        self.now_playing.set_status(queued);
        let entry = self.now_playing.entry().clone();
        tracing::info!(
            title = %entry.title,
            provider_id = %entry.provider_id,
            ?target,
            "starting playback"
        );
        self.bus.emit(BusMessage::TrackStateChanged { state: queued });
        self.bus.emit(BusMessage::PlaybackStart {
            target,
            entry: entry.to_raw(),
        });
        self.state = PlayerState::Playing;
        PlayOutcome::Playing(entry)
    }

    fn playback_target(&mut self) -> (PlaybackTarget, TrackState) {
        let entry = self.now_playing.entry();
        if entry.playback == PlaybackType::Skill {
            return (
                PlaybackTarget::Skill {
                    provider_id: entry.provider_id.clone(),
                },
                TrackState::QueuedSkill,
            );
        }

        self.now_playing.extract_stream();
        let entry = self.now_playing.entry();
        let uri = entry.uri.clone().unwrap_or_default();
        match self.config.playback_mode {
            PlaybackMode::EventsOnly => (PlaybackTarget::EventsOnly, TrackState::QueuedAudio),
            PlaybackMode::ForceAudioService => (
                PlaybackTarget::AudioService { uri },
                TrackState::QueuedAudioService,
            ),
            PlaybackMode::ForceAudio => (PlaybackTarget::Audio { uri }, TrackState::QueuedAudio),
            _ => match entry.playback {
                PlaybackType::AudioService => (
                    PlaybackTarget::AudioService { uri },
                    TrackState::QueuedAudioService,
                ),
                PlaybackType::Video if self.gui_available => {
                    (PlaybackTarget::Video { uri }, TrackState::QueuedVideo)
                }
                _ => (PlaybackTarget::Audio { uri }, TrackState::QueuedAudio),
            },
        }
    }
}
