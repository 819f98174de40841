//! Merge sort that folds identical sequences together while merging.

use std::cmp::Ordering;

use crate::record::UniqueSeq;

/// Shorter sequences first, then bytewise.
pub fn seq_order(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Sorts `slots` by [`seq_order`], merging equal sequences into the first
/// occurrence and leaving `None` in their place. `None`s end up last.
///
/// Halves are sorted on separate threads for the first `log2(threads)`
/// levels of the recursion. Returns the number of merged duplicates.
pub fn dedup_sort(slots: &mut [Option<UniqueSeq>], threads: usize) -> usize {
    let mut scratch: Vec<Option<UniqueSeq>> = Vec::new();
    scratch.resize_with(slots.len(), || None);
    let levels = threads.max(1).ilog2();
    sort_range(slots, &mut scratch, levels)
}

/// Sorted distinct records and the number of duplicates merged away.
pub fn sort_unique(records: Vec<UniqueSeq>, threads: usize) -> (Vec<UniqueSeq>, usize) {
    let mut slots: Vec<Option<UniqueSeq>> = records.into_iter().map(Some).collect();
    let repeats = dedup_sort(&mut slots, threads);
    (slots.into_iter().flatten().collect(), repeats)
}

// `scratch` holds only `None`s on entry and on return.
fn sort_range(
    slots: &mut [Option<UniqueSeq>],
    scratch: &mut [Option<UniqueSeq>],
    levels: u32,
) -> usize {
    if slots.len() < 2 {
        return 0;
    }
    let mid = slots.len() / 2;
    let repeats = {
        let (left, right) = slots.split_at_mut(mid);
        let (left_buf, right_buf) = scratch.split_at_mut(mid);
        let (l, r) = if levels > 0 {
            par_join!(
                || sort_range(left, left_buf, levels - 1),
                || sort_range(right, right_buf, levels - 1)
            )
        } else {
            (
                sort_range(left, left_buf, 0),
                sort_range(right, right_buf, 0),
            )
        };
        l + r
    };
    repeats + merge(slots, mid, scratch)
}

fn merge(slots: &mut [Option<UniqueSeq>], mid: usize, scratch: &mut [Option<UniqueSeq>]) -> usize {
    let (mut i, mut j, mut k) = (0, mid, 0);
    let mut repeats = 0;
    loop {
        let left = slots[..mid].get(i).and_then(Option::as_ref);
        let right = slots.get(j).and_then(Option::as_ref);
        let order = match (left, right) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => seq_order(&a.seq, &b.seq),
        };
        match order {
            Ordering::Less => {
                scratch[k] = slots[i].take();
                i += 1;
                k += 1;
            }
            Ordering::Greater => {
                scratch[k] = slots[j].take();
                j += 1;
                k += 1;
            }
            Ordering::Equal => {
                let (head, tail) = slots.split_at_mut(j);
                if let (Some(keep), Some(dup)) = (head[i].as_mut(), tail[0].take()) {
                    keep.absorb(dup);
                }
                j += 1;
                repeats += 1;
            }
        }
    }
    slots.swap_with_slice(scratch);
    repeats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::dna_strings;
    use proptest::prelude::*;

    fn records(seqs: &[&str]) -> Vec<UniqueSeq> {
        seqs.iter()
            .enumerate()
            .map(|(i, s)| UniqueSeq::new(s.as_bytes(), 1).with_ids([i as u32]))
            .collect()
    }

    fn seqs_of(records: &[UniqueSeq]) -> Vec<&str> {
        records
            .iter()
            .map(|r| std::str::from_utf8(r.seq()).unwrap())
            .collect()
    }

    #[test]
    fn length_sorts_before_bytes() {
        let (sorted, repeats) = sort_unique(records(&["TT", "AAA", "A", "CA", "AC"]), 1);
        assert_eq!(seqs_of(&sorted), vec!["A", "AC", "CA", "TT", "AAA"]);
        assert_eq!(repeats, 0);
    }

    #[test]
    fn duplicates_fold_into_first() {
        let input = records(&["ACGT", "TTTT", "ACGT", "AAAA", "ACGT", "TTTT"]);
        let (sorted, repeats) = sort_unique(input, 1);
        assert_eq!(repeats, 3);
        assert_eq!(seqs_of(&sorted), vec!["AAAA", "ACGT", "TTTT"]);
        assert_eq!(sorted[1].count(), 3);
        assert_eq!(sorted[1].ids(), &[0, 2, 4]);
        assert_eq!(sorted[2].count(), 2);
        assert_eq!(sorted[2].ids(), &[1, 5]);
    }

    #[test]
    fn nones_go_last() {
        let mut slots = vec![
            None,
            Some(UniqueSeq::new(b"GG", 1)),
            None,
            Some(UniqueSeq::new(b"AA", 1)),
            Some(UniqueSeq::new(b"GG", 4)),
        ];
        let repeats = dedup_sort(&mut slots, 2);
        assert_eq!(repeats, 1);
        assert_eq!(slots[0].as_ref().map(UniqueSeq::seq), Some(&b"AA"[..]));
        assert_eq!(slots[1].as_ref().map(UniqueSeq::count), Some(5));
        assert!(slots[2..].iter().all(Option::is_none));
    }

    #[test]
    fn sorted_input_is_left_alone() {
        let (sorted, _) = sort_unique(records(&["C", "G", "AA", "AT", "GGG"]), 4);
        let before: Vec<UniqueSeq> = sorted.clone();
        let (again, repeats) = sort_unique(sorted, 4);
        assert_eq!(repeats, 0);
        assert_eq!(again, before);
    }

    proptest! {
        #[test]
        fn threads_do_not_change_result(
            seqs in prop::collection::vec(dna_strings(3), 0..200),
            threads in 1usize..9,
        ) {
            let input: Vec<UniqueSeq> = seqs
                .iter()
                .enumerate()
                .map(|(i, s)| UniqueSeq::new(s, 1).with_ids([i as u32]))
                .collect();
            let (serial, serial_repeats) = sort_unique(input.clone(), 1);
            let (parallel, parallel_repeats) = sort_unique(input, threads);
            prop_assert_eq!(&serial, &parallel);
            prop_assert_eq!(serial_repeats, parallel_repeats);

            let mut expected: Vec<Vec<u8>> = seqs.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(serial.len(), expected.len());
            prop_assert_eq!(serial_repeats, seqs.len() - expected.len());
            let total: u32 = serial.iter().map(UniqueSeq::count).sum();
            prop_assert_eq!(total as usize, seqs.len());
            prop_assert!(serial.windows(2).all(|w| seq_order(&w[0].seq, &w[1].seq).is_lt()));
        }
    }
}
