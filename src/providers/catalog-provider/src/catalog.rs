use cadence_core::{MediaType, PlaybackType};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bonus for entries whose media type is exactly the one asked for.
const MEDIA_TYPE_BONUS: u32 = 10;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub uri: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default = "default_playback")]
    pub playback: PlaybackType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Duration in milliseconds; omitted for live streams.
    #[serde(default)]
    pub length: Option<u64>,
}

impl CatalogEntry {
    fn tokens(&self) -> HashSet<String> {
        let mut tokens = tokenize(&self.title);
        if let Some(artist) = &self.artist {
            tokens.extend(tokenize(artist));
        }
        for tag in &self.tags {
            tokens.extend(tokenize(tag));
        }
        tokens
    }

    /// Share of query tokens found in the entry, in `0..=100`, plus the
    /// media type bonus. `None` when nothing matched.
    pub fn score(&self, query: &HashSet<String>, media_type: MediaType) -> Option<u32> {
        if query.is_empty() {
            return None;
        }
        let own = self.tokens();
        let matched = query.iter().filter(|token| own.contains(*token)).count();
        if matched == 0 {
            return None;
        }
        let mut score = (matched * 100 / query.len()) as u32;
        if media_type != MediaType::Generic && media_type == self.media_type {
            score += MEDIA_TYPE_BONUS;
        }
        Some(score.min(100))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Scored matches, best first.
    pub fn search(&self, phrase: &str, media_type: MediaType) -> Vec<(&CatalogEntry, u32)> {
        let query = tokenize(phrase);
        let mut hits: Vec<_> = self
            .entries
            .iter()
            .filter_map(|entry| entry.score(&query, media_type).map(|score| (entry, score)))
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1));
        hits
    }
}

pub(crate) fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn default_playback() -> PlaybackType {
    PlaybackType::Audio
}
