#![allow(clippy::useless_conversion)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use starcode_core::{find_matches, LinkMode, SearchConfig, UniqueSeq};

/// Pairs of sequences within `dist` edits, as `(a, b, distance)`.
///
/// With `cluster_ratio` set, only `(child, parent)` pairs are returned where
/// the parent occurs at least `cluster_ratio` times as often as the child.
#[pyfunction]
#[pyo3(signature = (seqs, dist=None, threads=1, cluster_ratio=None))]
fn match_pairs(
    py: Python<'_>,
    seqs: Vec<String>,
    dist: Option<u8>,
    threads: usize,
    cluster_ratio: Option<u32>,
) -> PyResult<Vec<(String, String, usize)>> {
    let mode = match cluster_ratio {
        None => LinkMode::Symmetric,
        Some(0) => return Err(PyValueError::new_err("cluster_ratio must be >= 1")),
        Some(ratio) => LinkMode::ParentChild { ratio },
    };
    if let Some(pos) = seqs.iter().position(|s| !s.is_ascii()) {
        return Err(PyValueError::new_err(format!(
            "sequence at index {pos} is not ASCII"
        )));
    }
    let config = SearchConfig {
        distance: dist,
        threads,
        mode,
    };

    let matches = py
        .allow_threads(|| {
            let records = seqs
                .iter()
                .map(|s| UniqueSeq::new(s.as_bytes(), 1))
                .collect();
            find_matches(records, &config)
        })
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    if let Some(bad) = matches.rejected.first() {
        return Err(PyValueError::new_err(format!(
            "sequence at index {}: {}",
            bad.input, bad.error
        )));
    }

    let text = |i: u32| String::from_utf8_lossy(matches.records[i as usize].seq()).into_owned();
    let mut pairs = Vec::new();
    for record in 0..matches.records.len() as u32 {
        for (distance, peer) in matches.graph.peers(record) {
            if mode == LinkMode::Symmetric && peer < record {
                continue;
            }
            pairs.push((text(record), text(peer), distance));
        }
    }
    Ok(pairs)
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(match_pairs, m)?)?;
    Ok(())
}
