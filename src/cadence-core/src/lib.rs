//! Shared building blocks for Cadence: media entries, playlists, the message
//! bus, stream extraction, configuration and logging.

pub mod bus;
pub mod config;
pub mod extract;
pub mod logging;
pub mod media;
pub mod paths;
pub mod playlist;
pub mod playlist_file;

pub use bus::{BusMessage, LegacyReply, LocalBus, MessageBus, PlaybackTarget, ProviderReply};
pub use config::{
    BusConfig, Config, ConfigError, LogLevel, LoggingConfig, PlaybackConfig, PlaybackMode,
    ProviderConfig, SearchConfig, ValidationError,
};
pub use extract::{ExtractError, ExtractRequest, ExtractorKind, ExtractorRegistry, StreamExtractor};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use media::{MediaEntry, MediaType, PlaybackType, RawMedia, TrackState};
pub use paths::{AppDirs, DirsError};
pub use playlist::{Playlist, PlaylistError};
pub use playlist_file::PlaylistFileExtractor;

pub const APP_NAME: &str = "cadence";
pub const APP_AUTHOR: &str = "Cadence";
pub const APP_QUALIFIER: &str = "io";
