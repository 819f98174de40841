//! Symbol codes shared by the trie and its searches.
//!
//! Codes 1..=4 are `A`, `C`, `G`, `T`. Code 0 is the catch-all for ambiguous
//! symbols on the indexed side, code 5 is the pad, and code 6 only exists on
//! the query side: it is never stored in a trie so it can never match.

use std::sync::LazyLock;

pub const NUM_CHILDREN: usize = 6;

pub const WILDCARD: u8 = 0;
pub const PAD: u8 = 5;
pub const NO_MATCH: u8 = 6;

pub const PAD_CHAR: u8 = b' ';

const DECODE: &[u8; NUM_CHILDREN] = b"NACGT ";

static INSERT_MAP: LazyLock<[u8; 256]> = LazyLock::new(|| build_map(WILDCARD, WILDCARD));
static QUERY_MAP: LazyLock<[u8; 256]> = LazyLock::new(|| build_map(NO_MATCH, WILDCARD));

fn build_map(default: u8, dash: u8) -> [u8; 256] {
    let mut map = [default; 256];
    for (code, &b) in DECODE.iter().enumerate().skip(1).take(4) {
        map[b as usize] = code as u8;
        map[b.to_ascii_lowercase() as usize] = code as u8;
    }
    map[PAD_CHAR as usize] = PAD;
    map[b'-' as usize] = dash;
    map
}

/// Code used when storing `b` in a trie.
#[inline]
pub fn insert_code(b: u8) -> u8 {
    INSERT_MAP[b as usize]
}

/// Code used when `b` appears in a query.
#[inline]
pub fn query_code(b: u8) -> u8 {
    QUERY_MAP[b as usize]
}

/// Inverse of [`insert_code`]; the never-matching query code decodes as `N`.
pub fn decode(code: u8) -> u8 {
    DECODE.get(code as usize).copied().unwrap_or(b'N')
}
