//! Property-based tests for the merge and ranking stages.
//!
//! These use `proptest` to check the ordering and deduplication guarantees
//! over arbitrary candidate lists.

use proptest::prelude::*;
use std::collections::HashSet;

use pkgsift::merge::merge_candidates;
use pkgsift::rank::{exact_query_candidates, rank, round_robin_cap};
use pkgsift::{Candidate, KnownManagers};

fn manager() -> impl Strategy<Value = KnownManagers> {
    prop::sample::select(vec![
        KnownManagers::Apt,
        KnownManagers::Brew,
        KnownManagers::Npm,
        KnownManagers::Bun,
        KnownManagers::Snap,
    ])
}

fn candidate() -> impl Strategy<Value = Candidate> {
    (manager(), "[a-z][a-z0-9-]{0,8}", "[a-z ]{0,12}")
        .prop_map(|(manager, package, description)| Candidate::new(manager, package, description))
}

fn candidates() -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::vec(candidate(), 0..40)
}

fn lines(rows: &[Candidate]) -> Vec<String> {
    rows.iter().map(ToString::to_string).collect()
}

proptest! {
    #[test]
    fn merge_output_is_sorted_and_unique(rows in candidates()) {
        let merged = merge_candidates(rows);
        let mut seen = HashSet::new();
        for pair in merged.windows(2) {
            let a = (pair[0].manager.as_str(), pair[0].package.as_str());
            let b = (pair[1].manager.as_str(), pair[1].package.as_str());
            prop_assert!(a < b);
        }
        for row in &merged {
            prop_assert!(seen.insert((row.manager.clone(), row.package.clone())));
            prop_assert!(!row.description.is_empty());
        }
    }

    #[test]
    fn merge_ignores_arrival_order(rows in candidates()) {
        let mut reversed = rows.clone();
        reversed.reverse();
        prop_assert_eq!(lines(&merge_candidates(rows)), lines(&merge_candidates(reversed)));
    }

    #[test]
    fn merge_is_idempotent(rows in candidates()) {
        let once = merge_candidates(rows);
        let twice = merge_candidates(once.clone());
        prop_assert_eq!(lines(&once), lines(&twice));
    }

    #[test]
    fn rank_is_a_permutation(rows in candidates(), query in "[a-z]{1,6}( [a-z]{1,4})?") {
        let mut before = lines(&rows);
        let mut after = lines(&rank(&query, rows));
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn rank_of_merged_rows_ignores_input_order(rows in candidates(), query in "[a-z]{1,6}") {
        let merged = merge_candidates(rows);
        let mut reversed = merged.clone();
        reversed.reverse();
        prop_assert_eq!(lines(&rank(&query, merged)), lines(&rank(&query, reversed)));
    }

    #[test]
    fn round_robin_cap_respects_budget_and_order(rows in candidates(), budget in 1usize..50) {
        let capped = round_robin_cap(rows.clone(), budget);
        prop_assert_eq!(capped.len(), rows.len().min(budget));

        // each manager keeps a prefix of its own rows
        for manager in capped.iter().map(|row| row.manager.clone()).collect::<HashSet<_>>() {
            let original: Vec<String> = lines(&rows.iter().filter(|r| r.manager == manager).cloned().collect::<Vec<_>>());
            let kept: Vec<String> = lines(&capped.iter().filter(|r| r.manager == manager).cloned().collect::<Vec<_>>());
            prop_assert_eq!(&original[..kept.len()], &kept[..]);
        }
    }

    #[test]
    fn exact_candidates_start_with_compact_query(query in "[a-z]{1,5}( +[a-z]{1,5}){0,3}") {
        let variants = exact_query_candidates(&query);
        let compact = query.split_whitespace().collect::<Vec<_>>().join(" ");
        prop_assert_eq!(&variants[0], &compact);

        let unique: HashSet<&String> = variants.iter().collect();
        prop_assert_eq!(unique.len(), variants.len());
    }
}
