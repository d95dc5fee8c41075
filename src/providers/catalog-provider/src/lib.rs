//! Provider skill answering search queries from a local TOML catalog.

mod catalog;

pub use catalog::{Catalog, CatalogEntry, CatalogError};

use cadence_core::{BusMessage, MediaEntry, MediaType, MessageBus, ProviderConfig, ProviderReply};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct CatalogProvider {
    id: String,
    catalog: Arc<Catalog>,
    reply_delay: Duration,
}

impl CatalogProvider {
    pub fn new(id: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            id: id.into(),
            catalog: Arc::new(catalog),
            reply_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, CatalogError> {
        let catalog = Catalog::load(&config.catalog)?;
        tracing::debug!(
            provider_id = %config.id,
            entries = catalog.entries.len(),
            "catalog loaded"
        );
        Ok(Self::new(config.id.clone(), catalog).with_reply_delay(Duration::from_millis(
            config.reply_delay_ms,
        )))
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Results in the provider reply shape, best first.
    pub fn search(&self, phrase: &str, media_type: MediaType) -> Vec<Value> {
        self.catalog
            .search(phrase, media_type)
            .into_iter()
            .map(|(entry, score)| {
                let mut media = MediaEntry::from_uri(entry.uri.clone());
                media.title.clone_from(&entry.title);
                media.artist.clone_from(&entry.artist);
                media.provider_id.clone_from(&self.id);
                media.match_confidence = score;
                media.media_type = entry.media_type;
                media.playback = entry.playback;
                media.length = entry.length;
                if let Some(image) = &entry.image {
                    media.image.clone_from(image);
                }
                Value::Object(media.to_raw())
            })
            .collect()
    }

    /// Answers every search query on the bus until the bus closes.
    ///
    /// Each query is announced with a begin and closed with an end message;
    /// a reply is only sent when something matched.
    pub fn spawn(self, bus: Arc<dyn MessageBus>) -> JoinHandle<()> {
        let mut inbox = bus.subscribe();
        tokio::spawn(async move {
            loop {
                let message = match inbox.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(provider_id = %self.id, skipped, "provider lagged behind the bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let BusMessage::SearchStart { phrase, media_type } = message else {
                    continue;
                };
                self.answer(bus.as_ref(), phrase, media_type).await;
            }
            tracing::debug!(provider_id = %self.id, "provider stopped");
        })
    }

    async fn answer(&self, bus: &dyn MessageBus, phrase: String, media_type: MediaType) {
        bus.emit(BusMessage::ProviderSearchBegin {
            provider_id: self.id.clone(),
        });
        if !self.reply_delay.is_zero() {
            tokio::time::sleep(self.reply_delay).await;
        }
        let results = self.search(&phrase, media_type);
        tracing::debug!(provider_id = %self.id, %phrase, matches = results.len(), "catalog searched");
        if !results.is_empty() {
            bus.emit(BusMessage::ProviderReply(ProviderReply {
                phrase,
                provider_id: self.id.clone(),
                searching: false,
                timeout: None,
                results,
            }));
        }
        bus.emit(BusMessage::ProviderSearchEnd {
            provider_id: self.id.clone(),
        });
    }
}
