//! Match lists produced by the all-pairs search.

use parking_lot::Mutex;

use crate::error::StarcodeError;
use crate::record::UniqueSeq;

pub const DEFAULT_CLUSTER_RATIO: u32 = 5;

/// How a hit between a query and an indexed record is recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkMode {
    /// Both records list each other.
    #[default]
    Symmetric,
    /// Only the lower-count record lists the higher-count one, and only when
    /// the parent is at least `ratio` times as abundant. On equal counts the
    /// query is the parent.
    ParentChild { ratio: u32 },
}

/// A query whose search could not run or did not finish.
#[derive(Debug)]
pub struct QueryFailure {
    pub record: u32,
    pub error: StarcodeError,
}

/// One scheduler dispatch: `block` was queried against `shard`'s trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dispatch {
    pub shard: usize,
    pub block: usize,
    pub build: bool,
}

/// Per-distance peers of every record, `0..=tau`.
#[derive(Debug)]
pub struct MatchGraph {
    tau: u8,
    matches: Vec<Vec<Vec<u32>>>,
    incomplete: Vec<u32>,
    failures: Vec<QueryFailure>,
    dispatched: Vec<Dispatch>,
}

impl MatchGraph {
    pub fn tau(&self) -> u8 {
        self.tau
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Peers of `record` at exactly `dist`, in discovery order. Empty for an
    /// unknown record or a distance above tau.
    pub fn at(&self, record: u32, dist: usize) -> &[u32] {
        self.matches
            .get(record as usize)
            .and_then(|levels| levels.get(dist))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `(dist, peer)` pairs of `record`, closest first.
    pub fn peers(&self, record: u32) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.matches
            .get(record as usize)
            .into_iter()
            .flatten()
            .enumerate()
            .flat_map(|(dist, peers)| peers.iter().map(move |&p| (dist, p)))
    }

    /// Number of stored links. A symmetric hit counts twice.
    pub fn link_count(&self) -> usize {
        self.matches
            .iter()
            .flat_map(|levels| levels.iter().map(Vec::len))
            .sum()
    }

    /// Queries whose hit lists were truncated.
    pub fn incomplete(&self) -> &[u32] {
        &self.incomplete
    }

    pub fn failures(&self) -> &[QueryFailure] {
        &self.failures
    }

    pub fn dispatched(&self) -> &[Dispatch] {
        &self.dispatched
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty() && self.failures.is_empty()
    }
}

/// Concurrent builder for a [`MatchGraph`].
///
/// Each record has its own lock and a link only ever holds one of them.
pub(crate) struct MatchSink {
    tau: u8,
    mode: LinkMode,
    lists: Vec<Mutex<Vec<Vec<u32>>>>,
    incomplete: Mutex<Vec<u32>>,
    failures: Mutex<Vec<QueryFailure>>,
}

impl MatchSink {
    pub(crate) fn new(records: usize, tau: u8, mode: LinkMode) -> Self {
        Self {
            tau,
            mode,
            lists: (0..records)
                .map(|_| Mutex::new(vec![Vec::new(); tau as usize + 1]))
                .collect(),
            incomplete: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, from: u32, to: u32, dist: usize) {
        self.lists[from as usize].lock()[dist].push(to);
    }

    /// Records that `query` found `hit` at `dist`.
    pub(crate) fn link(&self, records: &[UniqueSeq], query: u32, hit: u32, dist: usize) {
        if query == hit {
            return;
        }
        match self.mode {
            LinkMode::Symmetric => {
                self.push(query, hit, dist);
                self.push(hit, query, dist);
            }
            LinkMode::ParentChild { ratio } => {
                let (qcount, hcount) = (records[query as usize].count, records[hit as usize].count);
                let (parent, child) = if hcount > qcount {
                    (hit, query)
                } else {
                    (query, hit)
                };
                let (max, min) = (qcount.max(hcount) as u64, qcount.min(hcount) as u64);
                if max < ratio as u64 * min {
                    return;
                }
                self.push(child, parent, dist);
            }
        }
    }

    pub(crate) fn mark_incomplete(&self, query: u32) {
        self.incomplete.lock().push(query);
    }

    pub(crate) fn fail(&self, record: u32, error: StarcodeError) {
        self.failures.lock().push(QueryFailure { record, error });
    }

    pub(crate) fn finish(self, mut dispatched: Vec<Dispatch>) -> MatchGraph {
        let mut incomplete = self.incomplete.into_inner();
        incomplete.sort_unstable();
        incomplete.dedup();
        let mut failures = self.failures.into_inner();
        failures.sort_by_key(|f| f.record);
        dispatched.sort_unstable();
        MatchGraph {
            tau: self.tau,
            matches: self.lists.into_iter().map(Mutex::into_inner).collect(),
            incomplete,
            failures,
            dispatched,
        }
    }
}
