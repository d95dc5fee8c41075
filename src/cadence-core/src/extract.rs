//! Stream extraction capabilities keyed by locator scheme.
//!
//! Concrete backends (feed readers, site scrapers, download libraries) live
//! outside the core and are plugged in through [`StreamExtractor`].

use crate::media::RawMedia;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Locators that need no extraction.
pub const NATIVE_PREFIXES: [&str; 4] = ["http://", "https://", "file://", "/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Rss,
    Bandcamp,
    Deezer,
    YoutubeChannelLive,
    /// General-purpose download-library extractor.
    Generic,
    Youtube,
    /// `.pls` / `.m3u` manifests.
    PlaylistFile,
}

impl ExtractorKind {
    /// Order in which scheme handlers are tried.
    pub const PRECEDENCE: [ExtractorKind; 6] = [
        ExtractorKind::Rss,
        ExtractorKind::Bandcamp,
        ExtractorKind::Deezer,
        ExtractorKind::YoutubeChannelLive,
        ExtractorKind::Generic,
        ExtractorKind::Youtube,
    ];

    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            ExtractorKind::Rss => &["rss//", "rss://"],
            ExtractorKind::Bandcamp => &["bandcamp//", "bandcamp://"],
            ExtractorKind::Deezer => &["deezer//", "deezer://"],
            ExtractorKind::YoutubeChannelLive => {
                &["youtube.channel.live//", "youtube-channel-live://"]
            }
            ExtractorKind::Generic => &["ydl//", "extractor://"],
            ExtractorKind::Youtube => &["youtube//", "youtube://"],
            ExtractorKind::PlaylistFile => &[],
        }
    }

    /// Locator with this kind's scheme prefix removed, if it carries one.
    pub fn strip<'a>(&self, uri: &'a str) -> Option<&'a str> {
        self.prefixes()
            .iter()
            .find_map(|prefix| uri.strip_prefix(prefix))
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractorKind::Rss => "rss",
            ExtractorKind::Bandcamp => "bandcamp",
            ExtractorKind::Deezer => "deezer",
            ExtractorKind::YoutubeChannelLive => "youtube channel live",
            ExtractorKind::Generic => "generic extractor",
            ExtractorKind::Youtube => "youtube",
            ExtractorKind::PlaylistFile => "playlist file",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractRequest {
    /// Prefer a video stream over audio only.
    pub video: bool,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no stream found for {locator}")]
    NoStream { locator: String },
    #[error("unsupported locator: {locator}")]
    Unsupported { locator: String },
    #[error("extraction backend failed: {message}")]
    Backend { message: String },
}

/// Turns an opaque locator into stream metadata (usually including `uri`).
pub trait StreamExtractor: Send + Sync {
    fn extract(&self, locator: &str, request: &ExtractRequest) -> Result<RawMedia, ExtractError>;
}

impl<F> StreamExtractor for F
where
    F: Fn(&str, &ExtractRequest) -> Result<RawMedia, ExtractError> + Send + Sync,
{
    fn extract(&self, locator: &str, request: &ExtractRequest) -> Result<RawMedia, ExtractError> {
        self(locator, request)
    }
}

pub fn is_youtube(url: &str) -> bool {
    url.contains("youtube.com/") || url.contains("youtu.be/")
}

pub fn looks_like_playlist_file(uri: &str) -> bool {
    uri.contains(".pls") || uri.contains(".m3u")
}

/// Registered extraction capabilities.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<ExtractorKind, Arc<dyn StreamExtractor>>,
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("kinds", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ExtractorKind, extractor: Arc<dyn StreamExtractor>) {
        self.extractors.insert(kind, extractor);
    }

    pub fn with(mut self, kind: ExtractorKind, extractor: Arc<dyn StreamExtractor>) -> Self {
        self.register(kind, extractor);
        self
    }

    pub fn get(&self, kind: ExtractorKind) -> Option<&Arc<dyn StreamExtractor>> {
        self.extractors.get(&kind)
    }

    /// True when the locator is natively playable or a registered handler owns its scheme.
    pub fn is_playable(&self, uri: &str) -> bool {
        if NATIVE_PREFIXES.iter().any(|prefix| uri.starts_with(prefix)) {
            return true;
        }
        self.extractors
            .keys()
            .any(|kind| kind.strip(uri).is_some())
    }

    /// Resolves `uri` through the scheme handlers in precedence order.
    ///
    /// Handler failures are logged and the chain continues with the last known
    /// uri. A uri that still looks like a playlist manifest is handed to the
    /// playlist-file handler. Without any metadata the result is just the uri.
    pub fn resolve(&self, uri: &str, request: &ExtractRequest) -> RawMedia {
        let mut current = uri.to_string();
        let mut meta: Option<RawMedia> = None;
        let mut generic_matched = false;

        for kind in ExtractorKind::PRECEDENCE {
            let locator = match kind.strip(&current) {
                Some(stripped) => stripped.to_string(),
                // bare links go straight to the youtube handler unless the
                // generic extractor already claimed this locator
                None if kind == ExtractorKind::Youtube
                    && !generic_matched
                    && is_youtube(&current) =>
                {
                    current.clone()
                }
                None => continue,
            };
            if kind == ExtractorKind::Generic {
                generic_matched = true;
            } else if kind == ExtractorKind::Youtube && generic_matched {
                continue;
            }
            current.clone_from(&locator);

            let Some(produced) = self.run(kind, &locator, request) else {
                continue;
            };
            let resolved = produced.get("uri").and_then(Value::as_str).map(str::to_string);
            if kind == ExtractorKind::YoutubeChannelLive {
                match resolved {
                    Some(live) => current = format!("youtube//{live}"),
                    None => tracing::error!(%locator, "channel live extraction returned no url"),
                }
                continue;
            }
            if let Some(resolved) = resolved {
                current = resolved;
            }
            meta = Some(produced);
        }

        if looks_like_playlist_file(&current) {
            if let Some(produced) = self.run(ExtractorKind::PlaylistFile, &current, request) {
                if let Some(resolved) = produced.get("uri").and_then(Value::as_str) {
                    current = resolved.to_string();
                }
                meta = Some(produced);
            }
        }

        let mut meta = meta.unwrap_or_default();
        meta.entry("uri").or_insert_with(|| json!(current));
        meta
    }

    fn run(&self, kind: ExtractorKind, locator: &str, request: &ExtractRequest) -> Option<RawMedia> {
        let Some(extractor) = self.extractors.get(&kind) else {
            tracing::warn!(%kind, %locator, "no extractor registered");
            return None;
        };
        match extractor.extract(locator, request) {
            Ok(meta) if !meta.is_empty() => Some(meta),
            Ok(_) => {
                tracing::error!(%kind, %locator, "stream extraction produced no metadata");
                None
            }
            Err(err) => {
                tracing::error!(%kind, %locator, error = %err, "stream extraction failed");
                None
            }
        }
    }
}
