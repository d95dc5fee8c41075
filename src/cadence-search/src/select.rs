use cadence_core::{MediaEntry, PlaybackMode, PlaybackType};
use rand::seq::SliceRandom;
use rand::Rng;

/// Picks the highest-confidence result, breaking ties at random.
///
/// `VideoOnly` restricts the tie to video playback and `AudioOnly` to anything
/// but video; either returns `None` when nothing in the tie qualifies.
pub fn select_best(results: &[MediaEntry], mode: PlaybackMode) -> Option<MediaEntry> {
    select_best_with(results, mode, &mut rand::thread_rng())
}

pub fn select_best_with<R: Rng + ?Sized>(
    results: &[MediaEntry],
    mode: PlaybackMode,
    rng: &mut R,
) -> Option<MediaEntry> {
    let best = results.iter().map(|entry| entry.match_confidence).max()?;
    let ties = results
        .iter()
        .filter(|entry| entry.match_confidence == best);
    let pool: Vec<&MediaEntry> = match mode {
        PlaybackMode::VideoOnly => ties
            .filter(|entry| entry.playback == PlaybackType::Video)
            .collect(),
        PlaybackMode::AudioOnly => ties
            .filter(|entry| entry.playback != PlaybackType::Video)
            .collect(),
        _ => ties.collect(),
    };

    let Some(selected) = pool.choose(rng) else {
        tracing::debug!(?mode, confidence = best, "no tied result satisfies the playback mode");
        return None;
    };
    tracing::debug!(
        provider_id = %selected.provider_id,
        confidence = selected.match_confidence,
        ties = pool.len(),
        "selected best result"
    );
    Some((*selected).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn result(uri: &str, confidence: u32, playback: PlaybackType) -> MediaEntry {
        MediaEntry {
            match_confidence: confidence,
            playback,
            ..MediaEntry::from_uri(uri)
        }
    }

    #[test]
    fn empty_results_select_nothing() {
        assert!(select_best(&[], PlaybackMode::Auto).is_none());
    }

    #[test]
    fn single_best_wins() {
        let results = [
            result("a", 40, PlaybackType::Audio),
            result("b", 95, PlaybackType::Audio),
            result("c", 70, PlaybackType::Video),
        ];
        let best = select_best(&results, PlaybackMode::Auto).unwrap();
        assert_eq!(best.uri.as_deref(), Some("b"));
    }

    #[test]
    fn selection_is_confidence_maximal() {
        let results = [
            result("a", 80, PlaybackType::Audio),
            result("b", 80, PlaybackType::Video),
            result("c", 79, PlaybackType::Audio),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let best = select_best_with(&results, PlaybackMode::Auto, &mut rng).unwrap();
            assert_eq!(best.match_confidence, 80);
        }
    }

    #[test]
    fn ties_are_broken_at_random() {
        let results = [
            result("a", 80, PlaybackType::Audio),
            result("b", 80, PlaybackType::Audio),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        let seen: HashSet<_> = (0..64)
            .filter_map(|_| select_best_with(&results, PlaybackMode::Auto, &mut rng))
            .filter_map(|entry| entry.uri)
            .collect();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn video_only_never_returns_audio() {
        let results = [
            result("a", 90, PlaybackType::Audio),
            result("v", 90, PlaybackType::Video),
            result("w", 50, PlaybackType::Video),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let best = select_best_with(&results, PlaybackMode::VideoOnly, &mut rng).unwrap();
            assert_eq!(best.uri.as_deref(), Some("v"));
        }
    }

    #[test]
    fn video_only_without_video_ties_selects_nothing() {
        let results = [
            result("a", 90, PlaybackType::Audio),
            result("v", 60, PlaybackType::Video),
        ];
        assert!(select_best(&results, PlaybackMode::VideoOnly).is_none());
    }

    #[test]
    fn audio_only_skips_video_ties() {
        let results = [
            result("v", 90, PlaybackType::Video),
            result("s", 90, PlaybackType::Skill),
        ];
        let best = select_best(&results, PlaybackMode::AudioOnly).unwrap();
        assert_eq!(best.uri.as_deref(), Some("s"));
        assert!(select_best(&results[..1], PlaybackMode::AudioOnly).is_none());
    }
}
