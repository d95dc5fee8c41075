use crate::session::ReplyGroup;
use cadence_core::{BusMessage, LegacyReply, MediaEntry, MediaType, MessageBus, PlaybackType};
use serde_json::{json, Value};

/// A query dialect bridged into the native search flow.
///
/// The aggregator only knows whether adapters are enabled; the dialect's wire
/// shapes stay behind this trait.
pub trait SearchAdapter: Send {
    fn name(&self) -> &str;

    /// Re-issues the query in the adapter's dialect.
    fn send_query(&mut self, bus: &dyn MessageBus, phrase: &str, media_type: MediaType);

    /// Sees every bus message while a session collects replies.
    fn observe(&mut self, message: &BusMessage);

    /// Translated reply groups for `phrase`; drains what was collected.
    fn collect(&mut self, phrase: &str, media_type: MediaType) -> Vec<ReplyGroup>;
}

/// Adapter for providers that still answer the older common-play query.
///
/// Those providers handle their own playback, so every translated result is
/// skill-delegated.
#[derive(Debug, Default)]
pub struct LegacyCommonPlay {
    replies: Vec<LegacyReply>,
}

impl LegacyCommonPlay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchAdapter for LegacyCommonPlay {
    fn name(&self) -> &str {
        "legacy-common-play"
    }

    fn send_query(&mut self, bus: &dyn MessageBus, phrase: &str, _media_type: MediaType) {
        self.replies.clear();
        bus.emit(BusMessage::LegacyQuery {
            phrase: phrase.to_string(),
        });
    }

    fn observe(&mut self, message: &BusMessage) {
        if let BusMessage::LegacyReply(reply) = message {
            if reply.searching {
                tracing::trace!(skill_id = %reply.skill_id, "legacy provider still searching");
                return;
            }
            self.replies.push(reply.clone());
        }
    }

    fn collect(&mut self, phrase: &str, media_type: MediaType) -> Vec<ReplyGroup> {
        let (matching, other): (Vec<_>, Vec<_>) = self
            .replies
            .drain(..)
            .partition(|reply| reply.phrase == phrase);
        if !other.is_empty() {
            tracing::debug!(count = other.len(), "dropping legacy replies for another phrase");
        }
        matching
            .into_iter()
            .map(|reply| translate(reply, media_type))
            .collect()
    }
}

fn translate(reply: LegacyReply, media_type: MediaType) -> ReplyGroup {
    let mut data = reply.callback_data;
    let confidence = (reply.conf.clamp(0.0, 1.0) * 100.0).round() as u32;
    let uri = ["stream", "url", "uri"]
        .iter()
        .find_map(|key| data.get(*key).filter(|v| is_text(v)).cloned())
        .unwrap_or(Value::Null);
    let image = first_present(&data, &["image", "logo", "picture"]);
    let bg_image = first_present(&data, &["bg_image", "background", "bg_picture", "logo", "picture"]);

    data.insert("skill_id".into(), json!(reply.skill_id));
    data.insert("phrase".into(), json!(reply.phrase));
    data.insert("is_old_style".into(), json!(true));
    data.insert("match_confidence".into(), json!(confidence));
    data.insert("uri".into(), uri);
    data.insert("media_type".into(), json!(media_type));
    data.insert("playback".into(), json!(PlaybackType::Skill));
    if let Some(image) = image {
        data.insert("image".into(), image);
    }
    if let Some(bg_image) = bg_image {
        data.insert("bg_image".into(), bg_image);
    }

    ReplyGroup {
        phrase: reply.phrase,
        provider_id: reply.skill_id,
        results: vec![MediaEntry::from_raw(&data)],
    }
}

fn is_text(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.is_empty())
}

fn first_present(data: &cadence_core::RawMedia, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .find_map(|key| data.get(*key).filter(|v| is_text(v)).cloned())
}
