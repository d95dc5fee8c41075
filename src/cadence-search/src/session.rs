use cadence_core::{MediaEntry, MediaType, SearchConfig};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Results one provider returned for one phrase, after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyGroup {
    pub phrase: String,
    pub provider_id: String,
    pub results: Vec<MediaEntry>,
}

/// Why a session stopped collecting replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A reply landed after the (possibly extended) deadline.
    Deadline,
    /// A high-confidence match arrived and the grace window elapsed.
    EarlyStop,
    /// Every provider that announced itself has finished.
    AllProvidersDone,
    /// The absolute ceiling was reached.
    Ceiling,
    /// The bus went away.
    Closed,
}

/// Bookkeeping for one in-flight `search(phrase, media_type)` call.
///
/// Starting a new search builds a fresh session, so nothing leaks across
/// phrases.
#[derive(Debug)]
pub struct SearchSession {
    phrase: String,
    media_type: MediaType,
    started: Instant,
    deadline: Instant,
    ceiling: Instant,
    searching: bool,
    early_stop_at: Option<Instant>,
    settle_at: Option<Instant>,
    early_stop_fired: bool,
    stop_reason: Option<StopReason>,
    active_providers: HashSet<String>,
    replies: Vec<ReplyGroup>,
    late_replies: Vec<ReplyGroup>,
}

impl SearchSession {
    pub fn new(
        phrase: impl Into<String>,
        media_type: MediaType,
        started: Instant,
        config: &SearchConfig,
    ) -> Self {
        let bonus = if media_type == MediaType::Generic {
            config.generic_bonus()
        } else {
            Duration::ZERO
        };
        Self {
            phrase: phrase.into(),
            media_type,
            started,
            deadline: started + config.min_timeout(),
            ceiling: started + config.max_timeout() + bonus,
            searching: true,
            early_stop_at: None,
            settle_at: None,
            early_stop_fired: false,
            stop_reason: None,
            active_providers: HashSet::new(),
            replies: Vec::new(),
            late_replies: Vec::new(),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn ceiling(&self) -> Instant {
        self.ceiling
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn replies(&self) -> &[ReplyGroup] {
        &self.replies
    }

    /// Replies that arrived after the session stopped; never selected from.
    pub fn late_replies(&self) -> &[ReplyGroup] {
        &self.late_replies
    }

    pub fn active_providers(&self) -> &HashSet<String> {
        &self.active_providers
    }

    /// Pushes the deadline out. Only meaningful while still searching.
    pub fn extend(&mut self, by: Duration) -> bool {
        if !self.searching {
            return false;
        }
        self.deadline += by;
        tracing::debug!(phrase = %self.phrase, extra_ms = by.as_millis() as u64, "search deadline extended");
        true
    }

    pub fn is_past_deadline(&self, now: Instant) -> bool {
        now > self.deadline
    }

    pub fn provider_began(&mut self, provider_id: &str) {
        tracing::debug!(provider_id, "provider is searching");
        self.active_providers.insert(provider_id.to_string());
        self.settle_at = None;
    }

    /// Schedules the settle stop when the last active provider finished.
    pub fn provider_ended(&mut self, provider_id: &str, now: Instant, settle: Duration) {
        tracing::debug!(provider_id, "provider finished search");
        self.active_providers.remove(provider_id);
        if self.active_providers.is_empty() && self.searching {
            self.settle_at = Some(now + settle);
        }
    }

    /// Arms the one early stop a session may have. Returns false when
    /// already armed or no longer searching.
    pub fn arm_early_stop(&mut self, at: Instant) -> bool {
        if self.early_stop_fired || !self.searching {
            return false;
        }
        self.early_stop_fired = true;
        self.early_stop_at = Some(at);
        true
    }

    /// Next instant the collection loop must wake up at, even without replies.
    pub fn next_wake(&self) -> Instant {
        [self.early_stop_at, self.settle_at]
            .into_iter()
            .flatten()
            .fold(self.ceiling, Instant::min)
    }

    /// Applies any stop that is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        if !self.searching {
            return;
        }
        if self.early_stop_at.is_some_and(|at| now >= at) {
            self.finish(StopReason::EarlyStop);
        } else if self.settle_at.is_some_and(|at| now >= at) {
            self.finish(StopReason::AllProvidersDone);
        } else if now >= self.ceiling {
            self.finish(StopReason::Ceiling);
        }
    }

    pub fn finish(&mut self, reason: StopReason) {
        if !self.searching {
            return;
        }
        self.searching = false;
        self.early_stop_at = None;
        self.settle_at = None;
        self.stop_reason = Some(reason);
        tracing::debug!(
            phrase = %self.phrase,
            ?reason,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "search session stopped"
        );
    }

    pub fn record(&mut self, group: ReplyGroup) {
        self.replies.push(group);
    }

    pub fn record_late(&mut self, group: ReplyGroup) {
        tracing::warn!(
            provider_id = %group.provider_id,
            "provider is not answering fast enough, reply ignored in selection"
        );
        self.late_replies.push(group);
    }

    /// Reply groups with at least one result, in arrival order.
    pub fn into_results(self) -> Vec<ReplyGroup> {
        self.replies
            .into_iter()
            .filter(|group| !group.results.is_empty())
            .collect()
    }

    pub fn results(&self) -> Vec<ReplyGroup> {
        self.replies
            .iter()
            .filter(|group| !group.results.is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(media_type: MediaType) -> (SearchSession, Instant) {
        let now = Instant::now();
        (
            SearchSession::new("jazz", media_type, now, &SearchConfig::default()),
            now,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn generic_queries_get_a_longer_ceiling() {
        let (typed, start) = session(MediaType::Music);
        assert_eq!(typed.ceiling() - start, Duration::from_secs(5));
        let (generic, start) = session(MediaType::Generic);
        assert_eq!(generic.ceiling() - start, Duration::from_secs(8));
        assert_eq!(generic.deadline() - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn extension_only_while_searching() {
        let (mut s, start) = session(MediaType::Music);
        assert!(s.extend(Duration::from_secs(2)));
        assert_eq!(s.deadline() - start, Duration::from_secs(3));
        s.finish(StopReason::Ceiling);
        assert!(!s.extend(Duration::from_secs(2)));
        assert_eq!(s.deadline() - start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn early_stop_arms_once() {
        let (mut s, start) = session(MediaType::Music);
        assert!(s.arm_early_stop(start + Duration::from_secs(1)));
        assert!(!s.arm_early_stop(start + Duration::from_millis(200)));
        assert_eq!(s.next_wake(), start + Duration::from_secs(1));

        s.poll(start + Duration::from_millis(999));
        assert!(s.is_searching());
        s.poll(start + Duration::from_secs(1));
        assert_eq!(s.stop_reason(), Some(StopReason::EarlyStop));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_returning_cancels_settle_stop() {
        let (mut s, start) = session(MediaType::Music);
        s.provider_began("a");
        s.provider_ended("a", start, Duration::from_millis(500));
        assert_eq!(s.next_wake(), start + Duration::from_millis(500));

        s.provider_began("b");
        assert_eq!(s.next_wake(), s.ceiling());
        s.provider_ended("b", start, Duration::from_millis(500));
        s.poll(start + Duration::from_millis(500));
        assert_eq!(s.stop_reason(), Some(StopReason::AllProvidersDone));
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_stops_the_session() {
        let (mut s, start) = session(MediaType::Music);
        s.poll(start + Duration::from_secs(5));
        assert!(!s.is_searching());
        assert_eq!(s.stop_reason(), Some(StopReason::Ceiling));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_groups_are_not_results() {
        let (mut s, _) = session(MediaType::Music);
        s.record(ReplyGroup {
            phrase: "jazz".into(),
            provider_id: "empty".into(),
            results: Vec::new(),
        });
        s.record(ReplyGroup {
            phrase: "jazz".into(),
            provider_id: "full".into(),
            results: vec![MediaEntry::from_uri("http://x/1.mp3")],
        });
        let results = s.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider_id, "full");
    }
}
