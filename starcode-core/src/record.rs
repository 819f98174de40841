use crate::alphabet::PAD_CHAR;
use crate::error::{StarcodeError, StarcodeResult};

/// A distinct barcode and everything merged into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueSeq {
    pub(crate) seq: Vec<u8>,
    pub(crate) count: u32,
    pub(crate) info: Option<Box<str>>,
    pub(crate) ids: Vec<u32>,
    /// Representative record index, owned by the clustering stage.
    pub canonical: Option<u32>,
}

impl UniqueSeq {
    pub fn new(seq: &[u8], count: u32) -> Self {
        Self {
            seq: seq.to_ascii_uppercase(),
            count,
            info: None,
            ids: Vec::new(),
            canonical: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<Box<str>>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn with_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.ids = ids.into_iter().collect();
        self.ids.sort_unstable();
        self.ids.dedup();
        self
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Fails on a pad or control byte, which would sort below every symbol
    /// once records are padded.
    pub fn check_symbols(&self) -> StarcodeResult<()> {
        match self.seq.iter().position(|&b| b <= PAD_CHAR) {
            Some(pos) => Err(StarcodeError::MalformedInput {
                msg: "pad or control byte in sequence",
                pos,
            }),
            None => Ok(()),
        }
    }

    /// Length without leading pads.
    pub fn native_len(&self) -> usize {
        self.seq.len() - self.pad_len()
    }

    fn pad_len(&self) -> usize {
        self.seq.iter().take_while(|&&b| b == PAD_CHAR).count()
    }

    /// Takes over the count and source IDs of an identical sequence.
    pub(crate) fn absorb(&mut self, other: UniqueSeq) {
        self.count = self.count.saturating_add(other.count);
        if other.ids.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(self.ids.len() + other.ids.len());
        let (mut a, mut b) = (self.ids.iter().peekable(), other.ids.iter().peekable());
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(&&x), Some(&&y)) if x < y => a.next(),
                (Some(&&x), Some(&&y)) if x > y => b.next(),
                (Some(_), Some(_)) => {
                    b.next();
                    a.next()
                }
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            if let Some(&id) = next {
                merged.push(id);
            }
        }
        self.ids = merged;
    }

    fn pad_to(&mut self, height: usize) {
        let missing = height - self.seq.len();
        if missing > 0 {
            self.seq.splice(0..0, std::iter::repeat(PAD_CHAR).take(missing));
        }
    }

    fn unpad(&mut self) {
        let pad = self.pad_len();
        self.seq.drain(..pad);
    }
}

/// Uniform length and median native length of a padded record set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Padding {
    pub height: usize,
    pub median: usize,
}

/// Left-pads every sequence with spaces to the longest length.
pub fn pad_records(records: &mut [UniqueSeq]) -> Padding {
    let height = records.iter().map(|r| r.seq.len()).max().unwrap_or(0);
    let median = median_native_len(records);
    par_for_each_mut!(records, |r: &mut UniqueSeq| r.pad_to(height));
    Padding { height, median }
}

/// Smallest native length covering at least half of the records.
pub fn median_native_len(records: &[UniqueSeq]) -> usize {
    let longest = records.iter().map(UniqueSeq::native_len).max().unwrap_or(0);
    let mut by_len = vec![0usize; longest + 1];
    for r in records {
        by_len[r.native_len()] += 1;
    }
    let half = records.len().div_ceil(2);
    let mut seen = 0;
    for (len, &n) in by_len.iter().enumerate() {
        seen += n;
        if seen >= half {
            return len;
        }
    }
    0
}

/// Strips the leading pads added by [`pad_records`].
pub fn unpad_records(records: &mut [UniqueSeq]) {
    par_for_each_mut!(records, |r: &mut UniqueSeq| r.unpad());
}

/// Default search distance for a median sequence length.
pub fn auto_tau(median: usize) -> u8 {
    if median > 160 {
        8
    } else {
        2 + (median / 30) as u8
    }
}
