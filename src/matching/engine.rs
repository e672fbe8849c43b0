//! Oldest-first fixed-size grouping with timeout and presence filtering

use crate::types::{Category, Match, UserId, WaitingEntry};
use crate::utils::generate_match_id;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Read-only presence answers for the users in one snapshot.
///
/// Users whose presence could not be determined must answer false.
pub trait PresenceView {
    fn is_online(&self, user_id: &UserId) -> bool;
}

impl PresenceView for HashSet<UserId> {
    fn is_online(&self, user_id: &UserId) -> bool {
        self.contains(user_id)
    }
}

impl<F> PresenceView for F
where
    F: Fn(&UserId) -> bool,
{
    fn is_online(&self, user_id: &UserId) -> bool {
        self(user_id)
    }
}

/// Decisions produced by one engine run over one category
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Formed groups in commit order (oldest members first)
    pub matches: Vec<Match>,
    /// Timed-out entries to remove from the pool
    pub evicted: Vec<WaitingEntry>,
    /// Not timed out but offline; left in the pool untouched
    pub skipped_offline: Vec<UserId>,
    /// Eligible but left over in a partial group
    pub waiting: Vec<UserId>,
}

impl RunOutcome {
    pub fn evicted_user_ids(&self) -> Vec<UserId> {
        self.evicted.iter().map(|e| e.user_id.clone()).collect()
    }

    pub fn matched_user_count(&self) -> usize {
        self.matches.iter().map(|m| m.user_ids.len()).sum()
    }
}

/// Groups eligible waiting entries into matches of `group_size`
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    group_size: usize,
}

impl MatchingEngine {
    /// `group_size` below 1 is raised to 1
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size: group_size.max(1),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Partition `snapshot` and group the eligible entries.
    ///
    /// An entry is eligible when it has not timed out and its user is online.
    /// Timed-out entries are evicted whatever their presence; offline entries
    /// that have not timed out are skipped for this run only. Eligible entries
    /// are consumed oldest first in consecutive groups; a trailing partial
    /// group keeps waiting.
    pub fn run_once(
        &self,
        category: &Category,
        snapshot: &[WaitingEntry],
        presence: &dyn PresenceView,
        now: DateTime<Utc>,
    ) -> RunOutcome {
        let mut ordered: Vec<&WaitingEntry> = snapshot
            .iter()
            .filter(|entry| &entry.category == category)
            .collect();
        ordered.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then(a.revision.cmp(&b.revision))
        });

        let mut outcome = RunOutcome::default();
        let mut seen: HashSet<&UserId> = HashSet::new();
        let mut eligible: Vec<&WaitingEntry> = Vec::new();

        for entry in ordered {
            if !seen.insert(&entry.user_id) {
                continue;
            }

            if entry.is_timed_out(now) {
                outcome.evicted.push(entry.clone());
            } else if !presence.is_online(&entry.user_id) {
                outcome.skipped_offline.push(entry.user_id.clone());
            } else {
                eligible.push(entry);
            }
        }

        let mut groups = eligible.chunks_exact(self.group_size);
        for group in groups.by_ref() {
            outcome.matches.push(Match {
                match_id: generate_match_id(),
                category: category.clone(),
                user_ids: group.iter().map(|e| e.user_id.clone()).collect(),
                formed_at: now,
            });
        }
        outcome.waiting = groups
            .remainder()
            .iter()
            .map(|e| e.user_id.clone())
            .collect();

        debug!(
            "Engine run for {}: {} matches, {} evicted, {} offline, {} left waiting",
            category,
            outcome.matches.len(),
            outcome.evicted.len(),
            outcome.skipped_offline.len(),
            outcome.waiting.len()
        );

        outcome
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn football() -> Category {
        Category::new("football").unwrap()
    }

    fn entry(id: &str, enqueued: i64, timeout_secs: u64, revision: u64) -> WaitingEntry {
        WaitingEntry {
            user_id: UserId::new(id).unwrap(),
            category: football(),
            enqueued_at: at(enqueued),
            timeout: Duration::from_secs(timeout_secs),
            revision,
        }
    }

    fn everyone_online(_: &UserId) -> bool {
        true
    }

    fn ids(users: &[UserId]) -> Vec<&str> {
        users.iter().map(|u| u.as_str()).collect()
    }

    #[test]
    fn test_pairs_oldest_first_and_leaves_remainder() {
        let engine = MatchingEngine::new(2);
        let snapshot = vec![entry("a", 0, 30, 1), entry("b", 1, 30, 2), entry("c", 2, 30, 3)];

        let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(2));

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(ids(&outcome.matches[0].user_ids), vec!["a", "b"]);
        assert_eq!(outcome.matches[0].formed_at, at(2));
        assert_eq!(ids(&outcome.waiting), vec!["c"]);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_enqueue_time() {
        let engine = MatchingEngine::new(2);
        let snapshot = vec![
            entry("late", 9, 30, 9),
            entry("early", 1, 30, 1),
            entry("mid", 5, 30, 5),
            entry("tie", 5, 30, 6),
        ];

        let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(10));

        assert_eq!(ids(&outcome.matches[0].user_ids), vec!["early", "mid"]);
        assert_eq!(ids(&outcome.matches[1].user_ids), vec!["tie", "late"]);
    }

    #[test]
    fn test_timed_out_entries_are_evicted_even_if_offline() {
        let engine = MatchingEngine::new(2);
        let snapshot = vec![entry("a", 0, 10, 1)];
        let nobody: HashSet<UserId> = HashSet::new();

        let outcome = engine.run_once(&football(), &snapshot, &nobody, at(11));

        assert!(outcome.matches.is_empty());
        assert_eq!(ids(&outcome.evicted_user_ids()), vec!["a"]);
        assert!(outcome.skipped_offline.is_empty());
    }

    #[test]
    fn test_offline_entries_are_skipped_not_evicted() {
        let engine = MatchingEngine::new(2);
        let snapshot = vec![entry("a", 0, 30, 1), entry("b", 1, 30, 2), entry("c", 2, 30, 3)];
        let online: HashSet<UserId> =
            HashSet::from([UserId::new("a").unwrap(), UserId::new("c").unwrap()]);

        let outcome = engine.run_once(&football(), &snapshot, &online, at(3));

        assert_eq!(ids(&outcome.matches[0].user_ids), vec!["a", "c"]);
        assert_eq!(ids(&outcome.skipped_offline), vec!["b"]);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn test_timeout_boundary_is_inclusive() {
        let engine = MatchingEngine::new(2);
        let snapshot = vec![entry("a", 0, 10, 1), entry("b", 0, 10, 2)];

        let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(10));
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn test_foreign_category_and_duplicates_are_ignored() {
        let engine = MatchingEngine::new(2);
        let mut foreign = entry("x", 0, 30, 1);
        foreign.category = Category::new("history").unwrap();
        let snapshot = vec![
            foreign,
            entry("a", 1, 30, 2),
            entry("a", 2, 30, 3),
            entry("b", 3, 30, 4),
        ];

        let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(4));

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(ids(&outcome.matches[0].user_ids), vec!["a", "b"]);
        assert!(outcome.waiting.is_empty());
    }

    #[test]
    fn test_larger_groups() {
        let engine = MatchingEngine::new(4);
        let snapshot: Vec<WaitingEntry> = (0..10)
            .map(|i| entry(&format!("u{}", i), i, 60, i as u64))
            .collect();

        let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(10));

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matched_user_count(), 8);
        assert_eq!(ids(&outcome.waiting), vec!["u8", "u9"]);
    }

    #[test]
    fn test_empty_snapshot() {
        let engine = MatchingEngine::default();
        let outcome = engine.run_once(&football(), &[], &everyone_online, at(0));
        assert!(outcome.matches.is_empty());
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn test_match_ids_are_unique() {
        let engine = MatchingEngine::new(2);
        let snapshot: Vec<WaitingEntry> = (0..6)
            .map(|i| entry(&format!("u{}", i), i, 60, i as u64))
            .collect();

        let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(6));
        let match_ids: HashSet<_> = outcome.matches.iter().map(|m| m.match_id).collect();
        assert_eq!(match_ids.len(), 3);
    }

    prop_compose! {
        fn arb_pool()(
            specs in prop::collection::vec((0i64..120, 1u64..60, any::<bool>()), 0..40)
        ) -> (Vec<WaitingEntry>, HashSet<UserId>) {
            let mut entries = Vec::new();
            let mut online = HashSet::new();
            for (i, (enqueued, timeout, is_online)) in specs.into_iter().enumerate() {
                let e = entry(&format!("user{}", i), enqueued, timeout, i as u64);
                if is_online {
                    online.insert(e.user_id.clone());
                }
                entries.push(e);
            }
            (entries, online)
        }
    }

    proptest! {
        #[test]
        fn matches_are_disjoint_and_respect_invariants(
            (snapshot, online) in arb_pool(),
            group_size in 2usize..5,
            now_secs in 0i64..180,
        ) {
            let engine = MatchingEngine::new(group_size);
            let now = at(now_secs);
            let outcome = engine.run_once(&football(), &snapshot, &online, now);

            let mut seen = HashSet::new();
            for m in &outcome.matches {
                prop_assert_eq!(m.user_ids.len(), group_size);
                for user_id in &m.user_ids {
                    // Disjointness
                    prop_assert!(seen.insert(user_id.clone()));
                    // Presence invariant
                    prop_assert!(online.contains(user_id));
                    // Timeout invariant
                    let e = snapshot.iter().find(|e| &e.user_id == user_id).unwrap();
                    prop_assert!(!e.is_timed_out(now));
                }
            }

            for evicted in &outcome.evicted {
                prop_assert!(evicted.is_timed_out(now));
                prop_assert!(!seen.contains(&evicted.user_id));
            }
            prop_assert!(outcome.waiting.len() < group_size);
        }

        #[test]
        fn grouping_consumes_in_enqueue_order(
            (snapshot, _online) in arb_pool(),
            group_size in 2usize..5,
        ) {
            let engine = MatchingEngine::new(group_size);
            let outcome = engine.run_once(&football(), &snapshot, &everyone_online, at(0));

            let consumed: Vec<&WaitingEntry> = outcome
                .matches
                .iter()
                .flat_map(|m| m.user_ids.iter())
                .map(|id| snapshot.iter().find(|e| &e.user_id == id).unwrap())
                .collect();

            for pair in consumed.windows(2) {
                prop_assert!(
                    (pair[0].enqueued_at, pair[0].revision) < (pair[1].enqueued_at, pair[1].revision)
                );
            }

            // Every leftover is younger than every matched entry
            if let Some(last) = consumed.last() {
                for id in &outcome.waiting {
                    let e = snapshot.iter().find(|e| &e.user_id == id).unwrap();
                    prop_assert!((last.enqueued_at, last.revision) < (e.enqueued_at, e.revision));
                }
            }
        }
    }
}
