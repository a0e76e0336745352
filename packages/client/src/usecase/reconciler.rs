//! Derivation of what the room shows from the server snapshot and local state.
//!
//! Everything here is a pure function of its inputs; callers recompute on every change of
//! the snapshot, the tombstones, the optimistic additions or the search results.

use std::collections::{HashMap, HashSet};

use crate::domain::{MapMarker, Place, PlaceCandidate, PlaceId};

/// Drop the tombstoned ids from a snapshot, keeping its order.
pub fn apply_tombstones(
    snapshot: &[PlaceCandidate],
    tombstones: &HashSet<PlaceId>,
) -> Vec<PlaceCandidate> {
    snapshot
        .iter()
        .filter(|candidate| !tombstones.contains(&candidate.id()))
        .cloned()
        .collect()
}

/// Final candidate list: the snapshot minus tombstones, followed by local additions the
/// snapshot does not carry yet (unless tombstoned).
pub fn reconcile_candidates(
    snapshot: &[PlaceCandidate],
    tombstones: &HashSet<PlaceId>,
    optimistic: &[PlaceCandidate],
) -> Vec<PlaceCandidate> {
    let in_snapshot: HashSet<PlaceId> = snapshot.iter().map(PlaceCandidate::id).collect();
    let mut seen = HashSet::new();
    let mut result = apply_tombstones(snapshot, tombstones);
    for candidate in optimistic {
        let id = candidate.id();
        if in_snapshot.contains(&id) || tombstones.contains(&id) || !seen.insert(id) {
            continue;
        }
        result.push(candidate.clone());
    }
    result
}

/// Overlay the store's vote state on reconciled candidates.
///
/// Only places the store knows a count for are touched; the rest keep the snapshot's.
pub fn overlay_votes(
    candidates: &mut [PlaceCandidate],
    vote_counts: &HashMap<PlaceId, u32>,
    voted: &HashSet<PlaceId>,
) {
    for candidate in candidates {
        let id = candidate.id();
        if let Some(count) = vote_counts.get(&id) {
            candidate.vote_count = *count;
            candidate.voted_by_current_user = voted.contains(&id);
        }
    }
}

/// Map markers for search results and candidates, one per place id.
///
/// A place that is both a search result and a candidate gets the candidate marker, at
/// the search result's position. Remaining candidates follow in their own order. Places
/// without valid coordinates get no marker.
pub fn merge_markers(search_results: &[Place], candidates: &[PlaceCandidate]) -> Vec<MapMarker> {
    let by_id: HashMap<PlaceId, &PlaceCandidate> =
        candidates.iter().map(|c| (c.id(), c)).collect();
    let mut emitted = HashSet::new();
    let mut markers = Vec::with_capacity(search_results.len() + candidates.len());

    for place in search_results {
        if !emitted.insert(place.id) {
            continue;
        }
        let marker = match by_id.get(&place.id) {
            Some(candidate) => MapMarker::for_candidate(candidate),
            None => MapMarker::for_search_result(place),
        };
        markers.push(marker);
    }
    for candidate in candidates {
        if emitted.insert(candidate.id()) {
            markers.push(MapMarker::for_candidate(candidate));
        }
    }

    markers.retain(|marker| {
        let valid = marker.coordinates.is_valid();
        if !valid {
            tracing::trace!("Skipping marker without coordinates: {}", marker.place_id);
        }
        valid
    });
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coordinates;

    fn place(id: i64, name: &str, latitude: f64) -> Place {
        Place {
            id: PlaceId::new(id),
            name: name.to_string(),
            category: None,
            address: None,
            coordinates: Coordinates::new(latitude, 127.0),
        }
    }

    fn candidate(id: i64, name: &str) -> PlaceCandidate {
        PlaceCandidate {
            place: place(id, name, 37.5),
            vote_count: 0,
            voted_by_current_user: false,
        }
    }

    fn ids(candidates: &[PlaceCandidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.id().value()).collect()
    }

    #[test]
    fn test_tombstone_suppresses_candidate_until_removed() {
        // テスト項目: Tombstone が付いた候補は、スナップショットに含まれていても表示されない
        // given (前提条件):
        let snapshot = vec![candidate(41, "A"), candidate(42, "B"), candidate(43, "C")];
        let mut tombstones = HashSet::from([PlaceId::new(42)]);

        // when (操作):
        let hidden = reconcile_candidates(&snapshot, &tombstones, &[]);
        tombstones.remove(&PlaceId::new(42));
        let restored = reconcile_candidates(&snapshot, &tombstones, &[]);

        // then (期待する結果):
        assert_eq!(ids(&hidden), vec![41, 43]);
        assert_eq!(ids(&restored), vec![41, 42, 43]);
    }

    #[test]
    fn test_optimistic_additions_are_appended_once() {
        // テスト項目: スナップショットにない楽観的追加だけが末尾に 1 度ずつ追加される
        // given (前提条件):
        let snapshot = vec![candidate(1, "A")];
        let optimistic = vec![
            candidate(1, "A (local)"),
            candidate(2, "B"),
            candidate(2, "B"),
            candidate(3, "C"),
        ];
        let tombstones = HashSet::from([PlaceId::new(3)]);

        // when (操作):
        let result = reconcile_candidates(&snapshot, &tombstones, &optimistic);

        // then (期待する結果): スナップショット側のデータが優先され、Tombstone も適用される
        assert_eq!(ids(&result), vec![1, 2]);
        assert_eq!(result[0].place.name, "A");
    }

    #[test]
    fn test_local_votes_override_snapshot_counts() {
        // テスト項目: ストアが持つ投票数と投票状態が、スナップショットの値より優先される
        // given (前提条件):
        let mut candidates = vec![candidate(1, "A"), candidate(2, "B")];
        candidates[1].vote_count = 4;
        let vote_counts = HashMap::from([(PlaceId::new(1), 1)]);
        let voted = HashSet::from([PlaceId::new(1)]);

        // when (操作):
        overlay_votes(&mut candidates, &vote_counts, &voted);

        // then (期待する結果): ストアに記録の無い 2 はスナップショットのまま
        assert_eq!(candidates[0].vote_count, 1);
        assert!(candidates[0].voted_by_current_user);
        assert_eq!(candidates[1].vote_count, 4);
        assert!(!candidates[1].voted_by_current_user);
    }

    #[test]
    fn test_candidate_marker_wins_over_search_result() {
        // テスト項目: 検索結果と候補が同じ ID の場合、候補のマーカーだけが残る
        // given (前提条件):
        let search = vec![place(100, "search title", 37.5), place(101, "other", 37.6)];
        let candidates = vec![candidate(100, "candidate title")];

        // when (操作):
        let markers = merge_markers(&search, &candidates);

        // then (期待する結果):
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].place_id, PlaceId::new(100));
        assert!(markers[0].is_candidate);
        assert_eq!(markers[0].title, "candidate title");
        assert!(!markers[1].is_candidate);
    }

    #[test]
    fn test_markers_without_coordinates_are_skipped() {
        // テスト項目: 座標が NaN の場所にはマーカーを作らない
        // given (前提条件):
        let search = vec![place(1, "no coords", f64::NAN), place(2, "ok", 37.5)];
        let mut unplaced = candidate(3, "unplaced");
        unplaced.place.coordinates = Coordinates::invalid();

        // when (操作):
        let markers = merge_markers(&search, &[unplaced, candidate(4, "placed")]);

        // then (期待する結果):
        let ids: Vec<i64> = markers.iter().map(|m| m.place_id.value()).collect();
        assert_eq!(ids, vec![2, 4]);
    }
}
