use crate::media::MediaEntry;
use std::cmp::Reverse;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("entry not in playlist: {title}")]
    NotFound { title: String },
    #[error("index {index} out of range for playlist of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered entries plus a cursor.
///
/// The cursor stays inside `0..len` whenever the playlist is non-empty. An
/// out-of-range cursor is an upstream bug; it is logged and reset to the start.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Playlist {
    entries: Vec<MediaEntry>,
    position: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn entries(&self) -> &[MediaEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MediaEntry> {
        self.entries.iter()
    }

    pub fn current_track(&self) -> Option<&MediaEntry> {
        self.entries.get(self.position)
    }

    /// Inserts at `index` (clamped to the end), or appends when `index` is `None`.
    ///
    /// Inserting before the cursor shifts it so the current track stays current.
    pub fn add_entry(&mut self, entry: impl Into<MediaEntry>, index: Option<usize>) {
        let insert_at = index.map_or(self.entries.len(), |idx| idx.min(self.entries.len()));
        self.entries.insert(insert_at, entry.into());
        if insert_at < self.position {
            self.set_position(self.position + 1);
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<MediaEntry, PlaylistError> {
        if index >= self.entries.len() {
            return Err(PlaylistError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        let removed = self.entries.remove(index);
        if index < self.position {
            self.position -= 1;
        } else if self.position >= self.entries.len() {
            self.position = self.entries.len().saturating_sub(1);
        }
        Ok(removed)
    }

    /// Removes the first structurally equal entry.
    pub fn remove_entry(&mut self, entry: &MediaEntry) -> Result<MediaEntry, PlaylistError> {
        let index = self
            .entries
            .iter()
            .position(|e| e == entry)
            .ok_or_else(|| PlaylistError::NotFound {
                title: entry.title.clone(),
            })?;
        self.remove_at(index)
    }

    pub fn replace<I>(&mut self, entries: I)
    where
        I: IntoIterator,
        I::Item: Into<MediaEntry>,
    {
        self.clear();
        for entry in entries {
            self.add_entry(entry, None);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = 0;
    }

    /// Containment by locator. A sub-playlist entry (no uri, nested tracks)
    /// matches when any nested track has the same uri, or when titles match
    /// and the probe has no uri either.
    pub fn contains(&self, item: &MediaEntry) -> bool {
        self.entries.iter().any(|e| {
            if e.is_sub_playlist() {
                (e.title == item.title && item.uri.is_none())
                    || e.playlist.iter().any(|track| track.uri == item.uri)
            } else {
                e.uri == item.uri
            }
        })
    }

    /// Stable sort, highest confidence first.
    pub fn sort_by_conf(&mut self) {
        self.entries.sort_by_key(|e| Reverse(e.match_confidence));
    }

    /// Moves the cursor to the first entry with the same uri. No-op when absent.
    pub fn goto_track(&mut self, track: &MediaEntry) -> bool {
        match self.entries.iter().position(|e| e.uri == track.uri) {
            Some(idx) => {
                self.set_position(idx);
                tracing::debug!(position = self.position, "new playlist position");
                true
            }
            None => false,
        }
    }

    pub fn goto_start(&mut self) {
        self.position = 0;
    }

    pub fn set_position(&mut self, index: usize) {
        self.position = index;
        self.validate_position();
    }

    pub fn next_track(&mut self) {
        self.set_position(self.position.saturating_add(1));
    }

    pub fn prev_track(&mut self) {
        match self.position.checked_sub(1) {
            Some(prev) => self.set_position(prev),
            None => self.reset_invalid_position("cursor moved before the first track"),
        }
    }

    pub fn is_first_track(&self) -> bool {
        self.entries.is_empty() || self.position == 0
    }

    pub fn is_last_track(&self) -> bool {
        self.entries.is_empty() || self.position == self.entries.len() - 1
    }

    fn validate_position(&mut self) {
        if self.position >= self.entries.len() && self.position != 0 {
            self.reset_invalid_position("cursor past the end of the playlist");
        }
    }

    fn reset_invalid_position(&mut self, reason: &str) {
        tracing::error!(
            position = self.position,
            len = self.entries.len(),
            reason,
            "playlist cursor in an invalid position, going to start of playlist"
        );
        self.position = 0;
    }
}

impl<'a> IntoIterator for &'a Playlist {
    type Item = &'a MediaEntry;
    type IntoIter = std::slice::Iter<'a, MediaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
