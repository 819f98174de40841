//! Sharded all-pairs search.
//!
//! The sorted records are cut into an odd number of contiguous blocks and
//! every block gets its own trie (a shard). Shard `i` runs `(n + 1) / 2`
//! jobs: job 0 queries block `i` while inserting it, job `j` queries block
//! `(i + j) mod n`. With `n` odd this compares every pair of blocks exactly
//! once. A shard runs one job at a time; up to `threads` shards run at once.

use std::ops::Range;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::{StarcodeError, StarcodeResult};
use crate::graph::{Dispatch, LinkMode, MatchGraph, MatchSink};
use crate::lookup::Lookup;
use crate::record::{median_native_len, UniqueSeq};
use crate::sort::seq_order;
use crate::stack::Tower;
use crate::trie::{common_prefix, count_arena_nodes, Trie, MAX_TAU};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Job {
    pub block: usize,
    pub build: bool,
}

struct Shard {
    trie: Trie,
    // Dropped if an insert fails, since a partial filter could hide hits.
    lookup: Option<Lookup>,
}

/// Empty per-block tries and the job plan that fills and queries them.
pub struct ShardedIndex {
    shards: Vec<Mutex<Shard>>,
    jobs: Vec<Vec<Job>>,
    bounds: Vec<usize>,
    max_tau: u8,
}

impl ShardedIndex {
    pub fn n_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn max_tau(&self) -> u8 {
        self.max_tau
    }

    /// Records of block `i`.
    pub fn block(&self, i: usize) -> Range<usize> {
        self.bounds[i]..self.bounds[i + 1]
    }

    /// Jobs of shard `i`, in execution order.
    pub fn jobs(&self, i: usize) -> &[Job] {
        &self.jobs[i]
    }
}

/// `n_shards + 1` block boundaries; block sizes differ by at most one.
fn block_bounds(n: usize, n_shards: usize) -> Vec<usize> {
    let (q, r) = (n / n_shards, n % n_shards);
    (0..=n_shards).map(|i| q * i + i.min(r)).collect()
}

/// Plans the search of `records`, which must be padded to `height` and
/// sorted by [`seq_order`] without duplicates.
pub fn build_index(
    records: &[UniqueSeq],
    height: usize,
    max_tau: u8,
    n_shards: usize,
) -> StarcodeResult<ShardedIndex> {
    if max_tau > MAX_TAU {
        return Err(StarcodeError::DistanceTooLarge {
            tau: max_tau,
            max: MAX_TAU,
        });
    }
    if n_shards % 2 == 0 {
        return Err(StarcodeError::EvenShardCount { shards: n_shards });
    }
    if let Some(bad) = records.iter().find(|r| r.seq.len() != height) {
        return Err(StarcodeError::LengthMismatch {
            expected: height,
            found: bad.seq.len(),
        });
    }
    if let Some(index) = records
        .windows(2)
        .position(|w| seq_order(&w[0].seq, &w[1].seq).is_ge())
    {
        return Err(StarcodeError::UnsortedRecords { index: index + 1 });
    }

    let median = median_native_len(records);
    let bounds = block_bounds(records.len(), n_shards);
    let mut shards = Vec::with_capacity(n_shards);
    for i in 0..n_shards {
        let block = &records[bounds[i]..bounds[i + 1]];
        let capacity = count_arena_nodes(height, block.iter().map(|r| r.seq.as_slice()));
        let trie = Trie::with_arena(height, max_tau, capacity)?;
        let lookup = Lookup::new(median, height, max_tau)?;
        shards.push(Mutex::new(Shard {
            trie,
            lookup: Some(lookup),
        }));
    }

    let per_shard = (n_shards + 1) / 2;
    let jobs = (0..n_shards)
        .map(|i| {
            (0..per_shard)
                .map(|j| Job {
                    block: (i + j) % n_shards,
                    build: j == 0,
                })
                .collect()
        })
        .collect();

    info!(
        records = records.len(),
        height, max_tau, n_shards, median, "planned sharded index"
    );
    Ok(ShardedIndex {
        shards,
        jobs,
        bounds,
        max_tau,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShardState {
    Free,
    Busy,
    Done,
}

struct Board {
    states: Vec<ShardState>,
    next_job: Vec<usize>,
    active: usize,
    jobs_done: usize,
    dispatched: Vec<Dispatch>,
}

/// Hands the shard back to the scheduler when a job ends, even by unwinding.
struct JobGuard<'a> {
    board: &'a Mutex<Board>,
    wakeup: &'a Condvar,
    shard: usize,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        let mut board = self.board.lock();
        board.active -= 1;
        board.jobs_done += 1;
        board.states[self.shard] = ShardState::Free;
        self.wakeup.notify_one();
    }
}

/// Runs every planned job with at most `threads` jobs at a time.
///
/// Searches that fail or overflow are reported in the returned graph; an
/// error that leaves a shard unusable fails the whole call.
pub fn query_all(
    index: ShardedIndex,
    records: &[UniqueSeq],
    tau: u8,
    threads: usize,
    mode: LinkMode,
) -> StarcodeResult<MatchGraph> {
    if tau > index.max_tau {
        return Err(StarcodeError::DistanceTooLarge {
            tau,
            max: index.max_tau,
        });
    }
    if threads == 0 {
        return Err(StarcodeError::ZeroThreads);
    }
    let end = index.bounds.last().copied().unwrap_or(0);
    if end != records.len() {
        return Err(StarcodeError::BlockMismatch {
            end,
            records: records.len(),
        });
    }

    let n_shards = index.n_shards();
    let sink = MatchSink::new(records.len(), tau, mode);
    let errors: Mutex<Vec<StarcodeError>> = Mutex::new(Vec::new());
    let board = Mutex::new(Board {
        states: vec![ShardState::Free; n_shards],
        next_job: vec![0; n_shards],
        active: 0,
        jobs_done: 0,
        dispatched: Vec::new(),
    });
    let wakeup = Condvar::new();

    thread::scope(|scope| {
        let (board, wakeup, index, sink, errors) = (&board, &wakeup, &index, &sink, &errors);
        let mut state = board.lock();
        loop {
            for shard in 0..n_shards {
                if state.active >= threads {
                    break;
                }
                if state.states[shard] != ShardState::Free {
                    continue;
                }
                let job_id = state.next_job[shard];
                let Some(&job) = index.jobs[shard].get(job_id) else {
                    state.states[shard] = ShardState::Done;
                    continue;
                };
                state.states[shard] = ShardState::Busy;
                state.next_job[shard] += 1;
                state.active += 1;
                state.dispatched.push(Dispatch {
                    shard,
                    block: job.block,
                    build: job.build,
                });
                debug!(shard, job = job_id, block = job.block, build = job.build, "dispatching job");

                scope.spawn(move || {
                    let _guard = JobGuard {
                        board,
                        wakeup,
                        shard,
                    };
                    let mut target = index.shards[shard].lock();
                    let range = index.block(job.block);
                    if let Err(err) = run_job(&mut target, records, range, job.build, tau, sink) {
                        warn!(shard, job = job_id, error = %err, "job failed");
                        errors.lock().push(StarcodeError::JobFailed {
                            shard,
                            job: job_id,
                            source: Box::new(err),
                        });
                    }
                });
            }
            if state.states.iter().all(|&s| s == ShardState::Done) {
                break;
            }
            // Something is still running, so a finishing job will wake us.
            wakeup.wait(&mut state);
        }
        debug!(jobs = state.jobs_done, "all shards done");
    });

    if let Some(err) = errors.into_inner().into_iter().next() {
        return Err(err);
    }
    let dispatched = board.into_inner().dispatched;
    let graph = sink.finish(dispatched);
    if !graph.is_complete() {
        warn!(
            incomplete = graph.incomplete().len(),
            failed = graph.failures().len(),
            "some searches are incomplete"
        );
    }
    Ok(graph)
}

fn run_job(
    shard: &mut Shard,
    records: &[UniqueSeq],
    range: Range<usize>,
    build: bool,
    tau: u8,
    sink: &MatchSink,
) -> StarcodeResult<()> {
    let mut hits = Tower::for_tau(tau);
    let mut last: Option<&[u8]> = None;

    for idx in range.clone() {
        let query = records[idx].seq.as_slice();
        let record = idx as u32;

        let maybe = match &shard.lookup {
            Some(lookup) => lookup.search(query).unwrap_or_else(|err| {
                debug!(record, error = %err, "prefilter undecided, searching anyway");
                true
            }),
            None => true,
        };

        // The path goes in before the search so later queries resuming from
        // this search's pebbles see it; the leaf is written after so the
        // query does not find itself.
        let slot = if build {
            if let Some(lookup) = shard.lookup.as_mut() {
                if let Err(err) = lookup.insert(query) {
                    warn!(record, error = %err, "disabling prefilter for this shard");
                    shard.lookup = None;
                }
            }
            Some(shard.trie.insert_path(query)?)
        } else {
            None
        };

        if maybe {
            let start = last.map_or(0, |prev| common_prefix(query, prev));
            let seed = if idx + 1 < range.end {
                common_prefix(query, &records[idx + 1].seq)
            } else {
                0
            };
            hits.clear();
            match shard.trie.search(query, tau, &mut hits, start, seed) {
                Ok(()) => {
                    if hits.is_saturated() {
                        warn!(record, "hit list overflowed");
                        sink.mark_incomplete(record);
                    }
                    for (dist, level) in hits.iter() {
                        for &hit in level {
                            sink.link(records, record, hit, dist);
                        }
                    }
                    last = Some(query);
                }
                Err(err) => {
                    warn!(record, error = %err, "search failed");
                    sink.fail(record, err);
                    last = None;
                }
            }
        }

        if let Some(slot) = slot {
            // Distinct records can share a path when ambiguous symbols collapse.
            if let Err(err) = shard.trie.set_leaf(slot, record) {
                warn!(record, error = %err, "record not indexed");
                sink.fail(record, err);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::pad_records;
    use crate::sort::sort_unique;
    use crate::testutil::{dna_strings, levenshtein};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn prepared(seqs: &[Vec<u8>]) -> (Vec<UniqueSeq>, usize) {
        let input = seqs.iter().map(|s| UniqueSeq::new(s, 1)).collect();
        let (mut records, _) = sort_unique(input, 1);
        // Length-first order is already byte order once padded.
        let padding = pad_records(&mut records);
        (records, padding.height)
    }

    fn brute_force(records: &[UniqueSeq], tau: u8) -> BTreeSet<(u32, u32, usize)> {
        let mut edges = BTreeSet::new();
        for (i, a) in records.iter().enumerate() {
            for (j, b) in records.iter().enumerate() {
                let dist = levenshtein(&a.seq, &b.seq);
                if i != j && dist <= tau as usize {
                    edges.insert((i as u32, j as u32, dist));
                }
            }
        }
        edges
    }

    fn edges(graph: &MatchGraph) -> BTreeSet<(u32, u32, usize)> {
        (0..graph.len() as u32)
            .flat_map(|r| graph.peers(r).map(move |(dist, p)| (r, p, dist)))
            .collect()
    }

    #[test]
    fn bounds_split_evenly() {
        assert_eq!(block_bounds(10, 3), vec![0, 4, 7, 10]);
        assert_eq!(block_bounds(2, 5), vec![0, 1, 2, 2, 2, 2]);
        assert_eq!(block_bounds(0, 1), vec![0, 0]);
    }

    #[test]
    fn plan_is_diagonal() {
        let seqs: Vec<Vec<u8>> = (0..15u8)
            .map(|i| vec![b"ACGT"[(i % 4) as usize], b"ACGT"[(i / 4) as usize], b'A'])
            .collect();
        let (records, height) = prepared(&seqs);
        let index = build_index(&records, height, 1, 5).unwrap();
        assert_eq!(index.n_shards(), 5);
        assert_eq!(
            index.jobs(3),
            &[
                Job { block: 3, build: true },
                Job { block: 4, build: false },
                Job { block: 0, build: false },
            ]
        );
        assert_eq!(index.block(0), 0..3);
    }

    #[test]
    fn build_index_rejects_bad_input() {
        let (records, height) = prepared(&[b"ACGT".to_vec(), b"ACGA".to_vec()]);
        assert!(matches!(
            build_index(&records, height, 2, 2),
            Err(StarcodeError::EvenShardCount { shards: 2 })
        ));
        assert!(matches!(
            build_index(&records, height, 9, 1),
            Err(StarcodeError::DistanceTooLarge { tau: 9, .. })
        ));
        assert!(matches!(
            build_index(&records, height + 1, 2, 1),
            Err(StarcodeError::LengthMismatch { .. })
        ));

        let reversed: Vec<UniqueSeq> = records.iter().rev().cloned().collect();
        assert!(matches!(
            build_index(&reversed, height, 2, 1),
            Err(StarcodeError::UnsortedRecords { index: 1 })
        ));
    }

    #[test]
    fn query_all_rejects_bad_arguments() {
        let (records, height) = prepared(&[b"ACGT".to_vec(), b"ACGA".to_vec()]);
        let index = build_index(&records, height, 1, 1).unwrap();
        assert!(matches!(
            query_all(index, &records, 2, 1, LinkMode::Symmetric),
            Err(StarcodeError::DistanceTooLarge { tau: 2, max: 1 })
        ));
        let index = build_index(&records, height, 1, 1).unwrap();
        assert!(matches!(
            query_all(index, &records, 1, 0, LinkMode::Symmetric),
            Err(StarcodeError::ZeroThreads)
        ));
        let index = build_index(&records, height, 1, 1).unwrap();
        assert!(matches!(
            query_all(index, &records[..1], 1, 1, LinkMode::Symmetric),
            Err(StarcodeError::BlockMismatch { end: 2, records: 1 })
        ));
    }

    #[test]
    fn every_block_pair_is_compared_once() {
        let seqs: Vec<Vec<u8>> = (0..64u32)
            .map(|i| (0..6).map(|k| b"ACGT"[((i >> (k % 3 * 2)) & 3) as usize]).collect())
            .collect();
        let (records, height) = prepared(&seqs);
        for n_shards in [3, 5, 7] {
            for threads in [1, 2, 4] {
                let index = build_index(&records, height, 1, n_shards).unwrap();
                let graph = query_all(index, &records, 1, threads, LinkMode::Symmetric).unwrap();
                let mut pairs: Vec<(usize, usize)> = graph
                    .dispatched()
                    .iter()
                    .map(|d| (d.shard.min(d.block), d.shard.max(d.block)))
                    .collect();
                pairs.sort_unstable();
                let expected: Vec<(usize, usize)> = (0..n_shards)
                    .flat_map(|i| (i..n_shards).map(move |j| (i, j)))
                    .collect();
                assert_eq!(pairs, expected, "{n_shards} shards, {threads} threads");
                assert_eq!(
                    graph.dispatched().iter().filter(|d| d.build).count(),
                    n_shards
                );
            }
        }
    }

    #[test]
    fn parent_child_mode_links_towards_abundance() {
        let records = vec![
            UniqueSeq::new(b"AAAA", 1),
            UniqueSeq::new(b"AAAT", 10),
            UniqueSeq::new(b"CCCC", 1),
        ];
        let index = build_index(&records, 4, 1, 1).unwrap();
        let graph =
            query_all(index, &records, 1, 1, LinkMode::ParentChild { ratio: 5 }).unwrap();
        assert_eq!(graph.at(0, 1), &[1]);
        assert!(graph.at(1, 1).is_empty());
        assert_eq!(graph.link_count(), 1);
    }

    #[test]
    fn collapsed_ambiguity_is_reported_not_fatal() {
        let records = vec![UniqueSeq::new(b"ACNT", 1), UniqueSeq::new(b"ACRT", 1)];
        let index = build_index(&records, 4, 1, 1).unwrap();
        let graph = query_all(index, &records, 1, 1, LinkMode::Symmetric).unwrap();
        assert_eq!(graph.at(0, 1), &[1]);
        assert_eq!(graph.at(1, 1), &[0]);
        assert_eq!(graph.failures().len(), 1);
        assert_eq!(graph.failures()[0].record, 1);
        assert!(matches!(
            graph.failures()[0].error,
            StarcodeError::DuplicateSequence { record: 0 }
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn sharded_search_equals_brute_force(
            seqs in prop::collection::vec(dna_strings(8), 1..60),
            shards_half in 0usize..4,
            threads in 1usize..5,
            tau in 0u8..=3,
        ) {
            let (records, height) = prepared(&seqs);
            let n_shards = 2 * shards_half + 1;
            let index = build_index(&records, height, tau, n_shards).unwrap();
            let graph = query_all(index, &records, tau, threads, LinkMode::Symmetric).unwrap();
            let expected = brute_force(&records, tau);
            prop_assert!(graph.is_complete());
            prop_assert_eq!(graph.link_count(), expected.len());
            prop_assert_eq!(edges(&graph), expected);
        }
    }
}
