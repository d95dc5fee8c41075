use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Loosely-typed media payload as it travels over the bus.
pub type RawMedia = serde_json::Map<String, Value>;

/// Provider id used when a payload does not name one.
pub const DEFAULT_PROVIDER_ID: &str = "cadence";
/// Artwork shown when a provider supplies none.
pub const DEFAULT_IMAGE: &str = "cadence://images/cadence.png";
pub const DEFAULT_ICON: &str = "cadence://images/cadence.png";
pub const DEFAULT_BACKGROUND: &str = "https://source.unsplash.com/weekly?music";

const ENTRY_FIELDS: [&str; 15] = [
    "title",
    "uri",
    "artist",
    "skill_id",
    "match_confidence",
    "media_type",
    "playback",
    "status",
    "phrase",
    "position",
    "length",
    "image",
    "bg_image",
    "skill_icon",
    "playlist",
];

/// Alternate spellings accepted by [`MediaEntry::from_raw`].
const FIELD_ALIASES: [&str; 6] = [
    "stream",
    "url",
    "track_length",
    "duration",
    "skill_logo",
    "author",
];

/// Kind of media a query asks for. `Generic` means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Generic,
    Audio,
    Music,
    Video,
    Audiobook,
    Game,
    Podcast,
    Radio,
    News,
    Tv,
    Movie,
    Trailer,
    Adult,
    VisualStory,
    BehindTheScenes,
    Documentary,
    RadioTheatre,
    ShortFilm,
    SilentMovie,
    BlackWhiteMovie,
}

impl MediaType {
    pub const ALL: [MediaType; 20] = [
        MediaType::Generic,
        MediaType::Audio,
        MediaType::Music,
        MediaType::Video,
        MediaType::Audiobook,
        MediaType::Game,
        MediaType::Podcast,
        MediaType::Radio,
        MediaType::News,
        MediaType::Tv,
        MediaType::Movie,
        MediaType::Trailer,
        MediaType::Adult,
        MediaType::VisualStory,
        MediaType::BehindTheScenes,
        MediaType::Documentary,
        MediaType::RadioTheatre,
        MediaType::ShortFilm,
        MediaType::SilentMovie,
        MediaType::BlackWhiteMovie,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Generic => "generic",
            MediaType::Audio => "audio",
            MediaType::Music => "music",
            MediaType::Video => "video",
            MediaType::Audiobook => "audiobook",
            MediaType::Game => "game",
            MediaType::Podcast => "podcast",
            MediaType::Radio => "radio",
            MediaType::News => "news",
            MediaType::Tv => "tv",
            MediaType::Movie => "movie",
            MediaType::Trailer => "trailer",
            MediaType::Adult => "adult",
            MediaType::VisualStory => "visual_story",
            MediaType::BehindTheScenes => "behind_the_scenes",
            MediaType::Documentary => "documentary",
            MediaType::RadioTheatre => "radio_theatre",
            MediaType::ShortFilm => "short_film",
            MediaType::SilentMovie => "silent_movie",
            MediaType::BlackWhiteMovie => "black_white_movie",
        }
    }

    /// Media types that can be played as audio only when no display surface exists.
    pub fn is_audio_castable(&self) -> bool {
        matches!(
            self,
            MediaType::Music
                | MediaType::Podcast
                | MediaType::Audiobook
                | MediaType::Radio
                | MediaType::RadioTheatre
                | MediaType::VisualStory
                | MediaType::News
        )
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMediaType(pub String);

impl fmt::Display for UnknownMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown media type: {}", self.0)
    }
}

impl std::error::Error for UnknownMediaType {}

impl FromStr for MediaType {
    type Err = UnknownMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        MediaType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| UnknownMediaType(s.to_string()))
    }
}

/// How an entry is meant to be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackType {
    /// The providing skill handles playback itself.
    Skill,
    #[default]
    Undefined,
    Video,
    Audio,
    AudioService,
}

/// Track lifecycle as reported by the playback subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Candidate result, not yet playing.
    #[default]
    Disambiguation,
    PlayingSkill,
    PlayingAudioService,
    PlayingVideo,
    PlayingAudio,
    QueuedSkill,
    QueuedAudioService,
    QueuedVideo,
    QueuedAudio,
}

/// A single playable candidate with its metadata and resolution state.
///
/// `uri` stays `None` until a provider supplied one or stream extraction ran.
/// Equality is field-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    pub title: String,
    pub uri: Option<String>,
    pub artist: Option<String>,
    pub provider_id: String,
    /// Match score in `0..=100`.
    pub match_confidence: u32,
    pub media_type: MediaType,
    pub playback: PlaybackType,
    pub status: TrackState,
    pub phrase: Option<String>,
    /// Playback offset in milliseconds.
    pub position: u64,
    /// Duration in milliseconds; `None` for live streams.
    pub length: Option<u64>,
    pub image: String,
    pub bg_image: String,
    pub skill_icon: String,
    /// Tracks of a provider-returned sub-playlist.
    pub playlist: Vec<MediaEntry>,
    /// Provider payload keys that have no dedicated field.
    pub extra: RawMedia,
}

impl Default for MediaEntry {
    fn default() -> Self {
        Self {
            title: String::new(),
            uri: None,
            artist: None,
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            match_confidence: 0,
            media_type: MediaType::Generic,
            playback: PlaybackType::Undefined,
            status: TrackState::Disambiguation,
            phrase: None,
            position: 0,
            length: None,
            image: DEFAULT_IMAGE.to_string(),
            bg_image: DEFAULT_BACKGROUND.to_string(),
            skill_icon: DEFAULT_ICON.to_string(),
            playlist: Vec::new(),
            extra: RawMedia::new(),
        }
    }
}

impl MediaEntry {
    /// Entry for a bare locator, titled after the locator itself.
    pub fn from_uri(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            title: uri.clone(),
            uri: Some(uri),
            ..Self::default()
        }
    }

    /// Builds an entry from a provider payload, normalizing alternate spellings.
    pub fn from_raw(raw: &RawMedia) -> Self {
        let uri = first_text(raw, &["stream", "uri", "url"]);
        let title = text(raw, "title")
            .or_else(|| uri.clone())
            .unwrap_or_default();
        let bg_image = match text(raw, "bg_image") {
            Some(path) if path.starts_with('/') => format!("file:/{path}"),
            Some(image) => image,
            None => DEFAULT_BACKGROUND.to_string(),
        };
        let playlist = match raw.get("playlist") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(MediaEntry::from_raw)
                .collect(),
            _ => Vec::new(),
        };
        let extra = raw
            .iter()
            .filter(|(key, _)| {
                !ENTRY_FIELDS.contains(&key.as_str()) && !FIELD_ALIASES.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            title,
            uri,
            artist: first_text(raw, &["artist", "author"]),
            provider_id: text(raw, "skill_id").unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string()),
            match_confidence: raw.get("match_confidence").and_then(confidence).unwrap_or(0),
            media_type: enum_field(raw, "media_type").unwrap_or_default(),
            playback: enum_field(raw, "playback").unwrap_or_default(),
            status: enum_field(raw, "status").unwrap_or_default(),
            phrase: text(raw, "phrase"),
            position: raw.get("position").and_then(number).unwrap_or(0),
            length: ["length", "track_length", "duration"]
                .iter()
                .find_map(|key| raw.get(*key).and_then(number)),
            image: text(raw, "image").unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            bg_image,
            skill_icon: first_text(raw, &["skill_icon", "skill_logo"])
                .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            playlist,
            extra,
        }
    }

    /// Serializes every field (absent optionals as `null`) plus the extra payload.
    pub fn to_raw(&self) -> RawMedia {
        let mut raw = self.extra.clone();
        raw.insert("title".into(), json!(self.title));
        raw.insert("uri".into(), json!(self.uri));
        raw.insert("artist".into(), json!(self.artist));
        raw.insert("skill_id".into(), json!(self.provider_id));
        raw.insert("match_confidence".into(), json!(self.match_confidence));
        raw.insert("media_type".into(), json!(self.media_type));
        raw.insert("playback".into(), json!(self.playback));
        raw.insert("status".into(), json!(self.status));
        raw.insert("phrase".into(), json!(self.phrase));
        raw.insert("position".into(), json!(self.position));
        raw.insert("length".into(), json!(self.length));
        raw.insert("image".into(), json!(self.image));
        raw.insert("bg_image".into(), json!(self.bg_image));
        raw.insert("skill_icon".into(), json!(self.skill_icon));
        raw.insert(
            "playlist".into(),
            Value::Array(
                self.playlist
                    .iter()
                    .map(|track| Value::Object(track.to_raw()))
                    .collect(),
            ),
        );
        raw
    }

    /// Merges known fields from `raw`, skipping `skip`. Unknown keys are ignored.
    pub fn update(&mut self, raw: &RawMedia, skip: &[&str]) {
        for (key, value) in raw {
            if skip.contains(&key.as_str()) {
                continue;
            }
            match key.as_str() {
                "title" => set_text(&mut self.title, value),
                "uri" => set_optional_text(&mut self.uri, value),
                "artist" => set_optional_text(&mut self.artist, value),
                "skill_id" => set_text(&mut self.provider_id, value),
                "match_confidence" => {
                    if let Some(score) = confidence(value) {
                        self.match_confidence = score;
                    }
                }
                "media_type" => set_enum(&mut self.media_type, value),
                "playback" => set_enum(&mut self.playback, value),
                "status" => set_enum(&mut self.status, value),
                "phrase" => set_optional_text(&mut self.phrase, value),
                "position" => {
                    if let Some(position) = number(value) {
                        self.position = position;
                    }
                }
                "length" => match value {
                    Value::Null => self.length = None,
                    other => {
                        if let Some(length) = number(other) {
                            self.length = Some(length);
                        }
                    }
                },
                "image" => set_text(&mut self.image, value),
                "bg_image" => set_text(&mut self.bg_image, value),
                "skill_icon" => set_text(&mut self.skill_icon, value),
                "playlist" => {
                    if let Value::Array(items) = value {
                        self.playlist = items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(MediaEntry::from_raw)
                            .collect();
                    }
                }
                _ => {}
            }
        }
    }

    /// Fills fields a nested track left at their defaults from its parent
    /// sub-playlist entry.
    pub fn inherit_from(&mut self, parent: &MediaEntry) {
        if self.provider_id == DEFAULT_PROVIDER_ID {
            self.provider_id.clone_from(&parent.provider_id);
        }
        if self.playback == PlaybackType::Undefined {
            self.playback = parent.playback;
        }
        if self.media_type == MediaType::Generic {
            self.media_type = parent.media_type;
        }
        if self.artist.is_none() {
            self.artist.clone_from(&parent.artist);
        }
        if self.image == DEFAULT_IMAGE {
            self.image.clone_from(&parent.image);
        }
        if self.bg_image == DEFAULT_BACKGROUND {
            self.bg_image.clone_from(&parent.bg_image);
        }
        if self.skill_icon == DEFAULT_ICON {
            self.skill_icon.clone_from(&parent.skill_icon);
        }
    }

    /// MIME type guessed from the uri's extension.
    pub fn mimetype(&self) -> Option<&'static str> {
        let uri = self.uri.as_deref()?;
        let path = match Url::parse(uri) {
            Ok(url) => url.path().to_string(),
            Err(_) => uri.to_string(),
        };
        mime_guess::from_path(path).first_raw()
    }

    /// Data model consumed by result lists and playlist views.
    pub fn info(&self) -> RawMedia {
        let mut info = self.to_raw();
        info.insert("duration".into(), json!(self.length));
        info.insert("track".into(), json!(self.title));
        info.insert("album".into(), json!(self.provider_id));
        info.insert("source".into(), json!(self.skill_icon));
        info
    }

    /// True when the entry carries nested tracks instead of its own locator.
    pub fn is_sub_playlist(&self) -> bool {
        self.uri.is_none() && !self.playlist.is_empty()
    }
}

impl From<&RawMedia> for MediaEntry {
    fn from(raw: &RawMedia) -> Self {
        MediaEntry::from_raw(raw)
    }
}

impl From<RawMedia> for MediaEntry {
    fn from(raw: RawMedia) -> Self {
        MediaEntry::from_raw(&raw)
    }
}

fn text(raw: &RawMedia, key: &str) -> Option<String> {
    match raw.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn first_text(raw: &RawMedia, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(raw, key))
}

fn enum_field<T: DeserializeOwned>(raw: &RawMedia, key: &str) -> Option<T> {
    raw.get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn number(value: &Value) -> Option<u64> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
    })
}

/// Confidence clamped to `0..=100`; negative scores count as zero.
pub(crate) fn confidence(value: &Value) -> Option<u32> {
    let Value::Number(n) = value else {
        return None;
    };
    let score = n.as_f64()?;
    if !score.is_finite() {
        return None;
    }
    Some(score.round().clamp(0.0, 100.0) as u32)
}

fn set_text(field: &mut String, value: &Value) {
    if let Value::String(s) = value {
        field.clone_from(s);
    }
}

fn set_optional_text(field: &mut Option<String>, value: &Value) {
    match value {
        Value::Null => *field = None,
        Value::String(s) if s.is_empty() => *field = None,
        Value::String(s) => *field = Some(s.clone()),
        _ => {}
    }
}

fn set_enum<T: DeserializeOwned>(field: &mut T, value: &Value) {
    if let Ok(parsed) = serde_json::from_value(value.clone()) {
        *field = parsed;
    }
}
