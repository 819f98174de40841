#[macro_use]
mod par;

pub mod alphabet;
pub mod config;
pub mod error;
pub mod graph;
pub mod lookup;
pub mod pipeline;
pub mod record;
pub mod schedule;
pub mod sort;
pub mod stack;
pub mod trie;

pub use config::SearchConfig;
pub use error::{StarcodeError, StarcodeResult};
pub use graph::{LinkMode, MatchGraph};
pub use pipeline::{find_matches, Matches, Rejected};
pub use record::UniqueSeq;
pub use schedule::{build_index, query_all, ShardedIndex};
