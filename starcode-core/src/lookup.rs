//! K-mer prefilter run before each trie search.
//!
//! A sequence is cut into `tau + 1` right-aligned windows. Two sequences
//! within `tau` edits must share at least one window, possibly shifted by
//! the number of indels on its right, so a lookup miss on every window and
//! shift proves there is nothing to find.

use bit_set::BitSet;

use crate::alphabet::PAD_CHAR;
use crate::error::{StarcodeError, StarcodeResult};

/// Windows longer than this would need bitmaps of more than 4^14 bits.
pub const MAX_KMER: usize = 14;

#[derive(Debug, PartialEq, Eq)]
enum Kmer {
    Id(usize),
    Ambiguous,
    Terminated(usize),
}

fn kmer_id(window: &[u8]) -> Kmer {
    let mut id = 0usize;
    for (pos, &b) in window.iter().enumerate() {
        let base = match b {
            b'A' | b'a' | PAD_CHAR => 0,
            b'C' | b'c' => 1,
            b'G' | b'g' => 2,
            b'T' | b't' => 3,
            0 => return Kmer::Terminated(pos),
            _ => return Kmer::Ambiguous,
        };
        id = (id << 2) | base;
    }
    Kmer::Id(id)
}

#[derive(Clone, Debug)]
pub struct Lookup {
    slen: usize,
    klen: Vec<usize>,
    windows: Vec<BitSet>,
}

impl Lookup {
    /// Windows sized for sequences of `median` native symbols, padded to `slen`.
    pub fn new(median: usize, slen: usize, tau: u8) -> StarcodeResult<Self> {
        let kmers = tau as usize + 1;
        let k = median / kmers;
        let mut rem = tau as usize - median % kmers;
        let mut klen = Vec::with_capacity(kmers);
        for _ in 0..kmers {
            let len = if k > MAX_KMER {
                MAX_KMER
            } else if rem > 0 {
                rem -= 1;
                k.saturating_sub(1)
            } else {
                k
            };
            klen.push(len);
        }
        let needed: usize = klen.iter().sum();
        if needed > slen {
            return Err(StarcodeError::LookupTooWide { needed, len: slen });
        }
        let windows = klen
            .iter()
            .map(|&len| BitSet::with_capacity(1 << (2 * len)))
            .collect();
        Ok(Self {
            slen,
            klen,
            windows,
        })
    }

    pub fn window_lengths(&self) -> &[usize] {
        &self.klen
    }

    /// Records every window of `seq`.
    ///
    /// Windows running past the end of `seq` and windows holding a symbol
    /// other than `ACGT` or pad are skipped.
    pub fn insert(&mut self, seq: &[u8]) -> StarcodeResult<()> {
        let mut offset = self.slen;
        for (window, &len) in self.windows.iter_mut().zip(&self.klen).rev() {
            offset -= len;
            if offset + len > seq.len() {
                continue;
            }
            match kmer_id(&seq[offset..offset + len]) {
                Kmer::Id(id) => {
                    window.insert(id);
                }
                Kmer::Ambiguous => {}
                Kmer::Terminated(pos) => {
                    return Err(StarcodeError::MalformedInput {
                        msg: "embedded terminator in k-mer",
                        pos: offset + pos,
                    })
                }
            }
        }
        Ok(())
    }

    /// `false` only if no indexed sequence can be within `tau` of `seq`.
    ///
    /// An error means the answer is unknown and the caller must search anyway.
    pub fn search(&self, seq: &[u8]) -> StarcodeResult<bool> {
        let kmers = self.klen.len();
        let mut offset = self.slen;
        for (i, (window, &len)) in self.windows.iter().zip(&self.klen).enumerate().rev() {
            offset -= len;
            let reach = (kmers - 1 - i) as isize;
            for shift in -reach..=reach {
                let Some(start) = offset.checked_add_signed(shift) else {
                    continue;
                };
                if start + len > seq.len() {
                    return Err(StarcodeError::MalformedInput {
                        msg: "sequence shorter than k-mer window",
                        pos: seq.len(),
                    });
                }
                match kmer_id(&seq[start..start + len]) {
                    Kmer::Id(id) if window.contains(id) => return Ok(true),
                    Kmer::Id(_) | Kmer::Ambiguous => {}
                    Kmer::Terminated(pos) => {
                        return Err(StarcodeError::MalformedInput {
                            msg: "embedded terminator in k-mer",
                            pos: start + pos,
                        })
                    }
                }
            }
        }
        Ok(false)
    }
}
