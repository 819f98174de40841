use thiserror::Error;

#[derive(Debug, Error)]
pub enum StarcodeError {
    #[error("maximum distance {tau} exceeds the supported limit of {max}")]
    DistanceTooLarge { tau: u8, max: u8 },

    #[error("trie height {height} exceeds the supported limit of {max}")]
    HeightTooLarge { height: usize, max: usize },

    #[error("trie height must be at least 1")]
    HeightTooSmall,

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("k-mer windows need {needed} symbols but sequences have {len}")]
    LookupTooWide { needed: usize, len: usize },

    #[error("allocation failure while growing {what}")]
    AllocationFailure { what: &'static str },

    #[error("node arena exhausted (capacity {capacity})")]
    ArenaExhausted { capacity: usize },

    #[error("query of length {len} is longer than trie height {height}")]
    QueryTooLong { len: usize, height: usize },

    #[error("sequence length mismatch (expected={expected}, found={found})")]
    LengthMismatch { expected: usize, found: usize },

    #[error("malformed input at position {pos}: {msg}")]
    MalformedInput { msg: &'static str, pos: usize },

    #[error("start depth {depth} is beyond trie height {height}")]
    StartBeyondHeight { depth: usize, height: usize },

    #[error("hit tower has {levels} levels, too few for distance {tau}")]
    TowerTooShort { levels: usize, tau: u8 },

    #[error("shard count must be odd, got {shards}")]
    EvenShardCount { shards: usize },

    #[error("block bounds do not cover the records (bounds end={end}, records={records})")]
    BlockMismatch { end: usize, records: usize },

    #[error("records are not sorted at index {index}")]
    UnsortedRecords { index: usize },

    #[error("sequence inserted twice into the same trie (record {record})")]
    DuplicateSequence { record: u32 },

    #[error("job {job} on shard {shard} failed: {source}")]
    JobFailed {
        shard: usize,
        job: usize,
        #[source]
        source: Box<StarcodeError>,
    },
}

pub type StarcodeResult<T> = Result<T, StarcodeError>;
