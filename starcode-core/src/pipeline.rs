//! End-to-end matching: deduplicate, pad, index, search, restore.

use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::{StarcodeError, StarcodeResult};
use crate::graph::{MatchGraph, MatchSink};
use crate::record::{auto_tau, pad_records, unpad_records, UniqueSeq};
use crate::schedule::{build_index, query_all};
use crate::sort::sort_unique;

/// Distinct records and the match graph over their indices.
#[derive(Debug)]
pub struct Matches {
    /// Sorted shortest first, unpadded, with duplicates merged.
    pub records: Vec<UniqueSeq>,
    pub graph: MatchGraph,
    /// Distance the search ran with.
    pub tau: u8,
    /// Input records folded into an earlier identical one.
    pub repeats: usize,
    /// Input records left out of the search, by input position.
    pub rejected: Vec<Rejected>,
}

/// An input record that cannot be padded safely.
#[derive(Debug)]
pub struct Rejected {
    pub input: usize,
    pub error: StarcodeError,
}

/// Shards for a thread count: odd, and about three per thread.
fn shard_count(threads: usize) -> usize {
    3 * threads + usize::from(threads % 2 == 0)
}

/// Finds every pair of records within the configured distance.
pub fn find_matches(records: Vec<UniqueSeq>, config: &SearchConfig) -> StarcodeResult<Matches> {
    config.validate()?;
    config.log();
    let mut threads = config.resolved_threads();

    let input = records.len();
    let mut rejected = Vec::new();
    let records: Vec<UniqueSeq> = records
        .into_iter()
        .enumerate()
        .filter_map(|(input, record)| match record.check_symbols() {
            Ok(()) => Some(record),
            Err(error) => {
                warn!(input, error = %error, "rejecting record");
                rejected.push(Rejected { input, error });
                None
            }
        })
        .collect();
    let (mut records, repeats) = sort_unique(records, threads);
    info!(
        input,
        rejected = rejected.len(),
        unique = records.len(),
        repeats,
        "sorted records"
    );

    if records.is_empty() {
        let tau = config.distance.unwrap_or_else(|| auto_tau(0));
        let graph = MatchSink::new(0, tau, config.mode).finish(Vec::new());
        return Ok(Matches {
            records,
            graph,
            tau,
            repeats,
            rejected,
        });
    }

    let mut n_shards = shard_count(threads);
    if records.len() < n_shards {
        n_shards = 1;
        threads = 1;
    }

    let padding = pad_records(&mut records);
    let tau = config.distance.unwrap_or_else(|| auto_tau(padding.median));
    debug!(height = padding.height, median = padding.median, tau, "padded records");

    let index = build_index(&records, padding.height, tau, n_shards)?;
    let graph = query_all(index, &records, tau, threads, config.mode)?;
    unpad_records(&mut records);
    info!(links = graph.link_count(), complete = graph.is_complete(), "search done");

    Ok(Matches {
        records,
        graph,
        tau,
        repeats,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LinkMode;
    use crate::testutil::{dna_strings, levenshtein};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn seqs(input: &[&str]) -> Vec<UniqueSeq> {
        input.iter().map(|s| UniqueSeq::new(s.as_bytes(), 1)).collect()
    }

    fn index_of(matches: &Matches, seq: &str) -> u32 {
        matches
            .records
            .iter()
            .position(|r| r.seq() == seq.as_bytes())
            .unwrap() as u32
    }

    #[test]
    fn shard_counts_are_odd() {
        assert_eq!(shard_count(1), 3);
        assert_eq!(shard_count(2), 7);
        assert_eq!(shard_count(3), 9);
        assert_eq!(shard_count(4), 13);
    }

    #[test]
    fn close_pair_and_an_outlier() {
        let config = SearchConfig::new(1, 1).unwrap();
        let matches = find_matches(seqs(&["CCCC", "AAAT", "AAAA"]), &config).unwrap();
        assert_eq!(matches.tau, 1);
        assert_eq!(matches.repeats, 0);
        let (a, t, c) = (
            index_of(&matches, "AAAA"),
            index_of(&matches, "AAAT"),
            index_of(&matches, "CCCC"),
        );
        assert_eq!(matches.graph.at(a, 1), &[t]);
        assert_eq!(matches.graph.at(t, 1), &[a]);
        assert_eq!(matches.graph.peers(c).count(), 0);
        assert!(matches.graph.is_complete());
    }

    #[test]
    fn duplicates_are_merged_before_search() {
        let config = SearchConfig::new(0, 2).unwrap();
        let matches = find_matches(seqs(&["ACGT", "ACGT", "TTTT", "ACGT"]), &config).unwrap();
        assert_eq!(matches.repeats, 2);
        assert_eq!(matches.records.len(), 2);
        let acgt = index_of(&matches, "ACGT");
        assert_eq!(matches.records[acgt as usize].count(), 3);
        assert_eq!(matches.graph.link_count(), 0);
    }

    #[test]
    fn records_come_back_unpadded() {
        let config = SearchConfig::new(1, 1).unwrap();
        let matches = find_matches(seqs(&["ACGTAC", "ACG", "ACGTAA"]), &config).unwrap();
        let lens: Vec<usize> = matches.records.iter().map(|r| r.seq().len()).collect();
        assert_eq!(lens, vec![3, 6, 6]);
        let (a, c) = (index_of(&matches, "ACGTAA"), index_of(&matches, "ACGTAC"));
        assert_eq!(matches.graph.at(a, 1), &[c]);
        assert_eq!(matches.graph.peers(index_of(&matches, "ACG")).count(), 0);
    }

    #[test]
    fn pad_led_records_are_rejected_alone() {
        let config = SearchConfig::new(1, 1).unwrap();
        let matches = find_matches(seqs(&["ACG", " ACG", "TTTT"]), &config).unwrap();
        assert_eq!(matches.rejected.len(), 1);
        assert_eq!(matches.rejected[0].input, 1);
        assert!(matches!(
            matches.rejected[0].error,
            StarcodeError::MalformedInput { pos: 0, .. }
        ));
        let kept: Vec<&[u8]> = matches.records.iter().map(UniqueSeq::seq).collect();
        assert_eq!(kept, vec![&b"ACG"[..], &b"TTTT"[..]]);

        let matches = find_matches(seqs(&["A", "\tC"]), &config).unwrap();
        assert_eq!(matches.rejected[0].input, 1);
        assert_eq!(matches.records.len(), 1);

        let matches = find_matches(seqs(&[" A"]), &config).unwrap();
        assert!(matches.records.is_empty());
        assert_eq!(matches.rejected.len(), 1);
    }

    #[test]
    fn distance_defaults_to_median_rule() {
        let config = SearchConfig {
            threads: 1,
            ..SearchConfig::default()
        };
        let matches = find_matches(seqs(&["ACGTACGTAC", "ACGTACGTAA"]), &config).unwrap();
        assert_eq!(matches.tau, 2);
        assert_eq!(matches.graph.link_count(), 2);
    }

    #[test]
    fn empty_input() {
        let config = SearchConfig::new(3, 4).unwrap();
        let matches = find_matches(Vec::new(), &config).unwrap();
        assert!(matches.records.is_empty());
        assert!(matches.graph.is_empty());
        assert_eq!(matches.tau, 3);
    }

    #[test]
    fn parent_child_mode_points_to_the_abundant_record() {
        let config = SearchConfig {
            distance: Some(1),
            threads: 1,
            mode: LinkMode::ParentChild { ratio: 5 },
        };
        let input = vec![UniqueSeq::new(b"GATTACA", 40), UniqueSeq::new(b"GATTACT", 2)];
        let matches = find_matches(input, &config).unwrap();
        let (parent, child) = (index_of(&matches, "GATTACA"), index_of(&matches, "GATTACT"));
        assert_eq!(matches.graph.at(child, 1), &[parent]);
        assert_eq!(matches.graph.peers(parent).count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn matches_agree_with_brute_force(
            input in prop::collection::vec(dna_strings(9), 1..80),
            tau in 0u8..=3,
            threads in 1usize..4,
        ) {
            let records = input.iter().map(|s| UniqueSeq::new(s, 1)).collect();
            let config = SearchConfig::new(tau, threads).unwrap();
            let matches = find_matches(records, &config).unwrap();

            let distinct: BTreeSet<&Vec<u8>> = input.iter().collect();
            prop_assert_eq!(matches.records.len(), distinct.len());
            prop_assert_eq!(matches.repeats, input.len() - distinct.len());

            let mut expected = BTreeSet::new();
            for (i, a) in matches.records.iter().enumerate() {
                for (j, b) in matches.records.iter().enumerate() {
                    let dist = levenshtein(a.seq(), b.seq());
                    if i != j && dist <= tau as usize {
                        expected.insert((i as u32, j as u32, dist));
                    }
                }
            }
            let mut found = BTreeSet::new();
            for i in 0..matches.records.len() as u32 {
                for (dist, peer) in matches.graph.peers(i) {
                    found.insert((i, peer, dist));
                }
            }
            prop_assert_eq!(found, expected);
            prop_assert!(matches.graph.is_complete());
            prop_assert!(matches.rejected.is_empty());
        }
    }
}
