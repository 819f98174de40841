//! Search configuration for [`crate::pipeline::find_matches`].

use std::num::NonZeroUsize;
use std::thread;

use crate::error::{StarcodeError, StarcodeResult};
use crate::graph::LinkMode;
use crate::trie::MAX_TAU;

/// Parameters of one all-pairs search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Maximum Levenshtein distance (`None` = chosen from the median length)
    pub distance: Option<u8>,

    /// Number of worker threads (0 = all available cores)
    pub threads: usize,

    /// How hits are recorded in the match graph
    pub mode: LinkMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            distance: None,
            threads: 0,
            mode: LinkMode::Symmetric,
        }
    }
}

impl SearchConfig {
    /// Configuration with a fixed distance and thread count.
    pub fn new(distance: u8, threads: usize) -> StarcodeResult<Self> {
        let config = Self {
            distance: Some(distance),
            threads,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StarcodeResult<()> {
        if let Some(tau) = self.distance {
            if tau > MAX_TAU {
                return Err(StarcodeError::DistanceTooLarge { tau, max: MAX_TAU });
            }
        }
        Ok(())
    }

    /// Thread count with 0 resolved to the available parallelism.
    pub fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }

    /// Log configuration parameters via tracing
    pub fn log(&self) {
        tracing::info!("Search Configuration:");
        match self.distance {
            Some(tau) => tracing::info!("  distance = {}", tau),
            None => tracing::info!("  distance = auto"),
        }
        if self.threads == 0 {
            tracing::info!("  threads = all available cores");
        } else {
            tracing::info!("  threads = {}", self.threads);
        }
        tracing::debug!("  mode = {:?}", self.mode);
    }
}
