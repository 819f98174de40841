use super::{path_symbol, Node, Trie, CACHE_WIDTH, CENTER, EMPTY, INIT_CACHE, MAX_TAU, PATH_MASK};
use crate::alphabet::{query_code, NO_MATCH, PAD};
use crate::error::{StarcodeError, StarcodeResult};
use crate::stack::{Stack, Tower};

/// Highest code a literal suffix walk may follow.
const LAST_BASE: u8 = 4;

impl Trie {
    /// Collects into `hits[d]` every stored record at distance `d <= tau` from `query`.
    ///
    /// The walk resumes from the nodes the previous call left at
    /// `start_depth` and keeps the nodes it reaches up to `seed_depth` for the
    /// next call. Both must be the common prefix lengths of `query` with the
    /// previous and the next query; pass `0, 0` to search from scratch.
    ///
    /// Records whose leaf slot is still empty are not reported.
    pub fn search(
        &mut self,
        query: &[u8],
        tau: u8,
        hits: &mut Tower<u32>,
        start_depth: usize,
        seed_depth: usize,
    ) -> StarcodeResult<()> {
        if tau > self.max_tau {
            return Err(StarcodeError::DistanceTooLarge {
                tau,
                max: self.max_tau,
            });
        }
        if query.len() > self.height {
            return Err(StarcodeError::QueryTooLong {
                len: query.len(),
                height: self.height,
            });
        }
        if start_depth > self.height {
            return Err(StarcodeError::StartBeyondHeight {
                depth: start_depth,
                height: self.height,
            });
        }
        if hits.levels() <= tau as usize {
            return Err(StarcodeError::TowerTooShort {
                levels: hits.levels(),
                tau,
            });
        }
        self.ensure_pebbles()?;

        let seed_depth = seed_depth.min(self.height);
        for level in &mut self.pebbles[(start_depth + 1).min(seed_depth + 1)..=seed_depth] {
            level.clear();
        }

        // Index 0 is a sentinel so that symbol k of the query sits at k + 1.
        let mut codes = vec![NO_MATCH; self.height + 1];
        for (slot, &b) in codes[1..].iter_mut().zip(query) {
            *slot = query_code(b);
        }

        let starts = std::mem::take(&mut self.pebbles[start_depth]);
        let mut walk = Walk {
            nodes: &mut self.nodes,
            pebbles: &mut self.pebbles,
            query: &codes,
            hits,
            tau: tau as usize,
            height: self.height,
            seed_depth,
            pebble_overflow: false,
        };
        for &node in &starts {
            walk.poucet(node, start_depth + 1);
        }
        let overflow = walk.pebble_overflow;
        self.pebbles[start_depth] = starts;

        if overflow {
            return Err(StarcodeError::AllocationFailure { what: "pebbles" });
        }
        Ok(())
    }
}

struct Walk<'a> {
    nodes: &'a mut [Node],
    pebbles: &'a mut [Stack<u32>],
    query: &'a [u8],
    hits: &'a mut Tower<u32>,
    tau: usize,
    height: usize,
    seed_depth: usize,
    pebble_overflow: bool,
}

impl Walk<'_> {
    /// Aligns the children of `node`, which sit at `depth`.
    fn poucet(&mut self, node: u32, depth: usize) {
        let q = self.query;
        let tau = self.tau;
        let maxa = (depth - 1).min(tau);

        let Node {
            children,
            path,
            cache: pcache,
        } = self.nodes[node as usize].clone();

        // Vertical arm: the trie symbols above `depth` against query[depth].
        // It does not depend on the child, so it is computed once.
        let mut common = [0u8; CACHE_WIDTH];
        for (a, cell) in common.iter_mut().enumerate() {
            *cell = a as u8 + 1;
        }
        if maxa > 0 {
            let base = if q[depth - 1] == PAD {
                0
            } else {
                pcache[CENTER + maxa]
            };
            let mmatch = base + (path_symbol(path, maxa) != q[depth]) as u8;
            let shift = pcache[CENTER + maxa - 1].min(common[maxa]) + 1;
            common[maxa - 1] = mmatch.min(shift);
            for a in (1..maxa).rev() {
                let mmatch = pcache[CENTER + a] + (path_symbol(path, a) != q[depth]) as u8;
                let shift = pcache[CENTER + a - 1].min(common[a]) + 1;
                common[a - 1] = mmatch.min(shift);
            }
        }

        let leaves = depth == self.height;
        for (code, &child) in children.iter().enumerate() {
            if child == EMPTY {
                continue;
            }
            let code = code as u8;
            let mut cache = if leaves {
                INIT_CACHE
            } else {
                self.nodes[child as usize].cache
            };
            cache[CENTER + 1..].copy_from_slice(&common[..MAX_TAU as usize]);

            // Horizontal arm: this child's symbol against the query before `depth`.
            if maxa > 0 {
                let base = if path & PATH_MASK == PAD as u32 {
                    0
                } else {
                    pcache[CENTER - maxa]
                };
                let mmatch = base + (code != q[depth - maxa]) as u8;
                let shift = pcache[CENTER + 1 - maxa].min(maxa as u8 + 1) + 1;
                cache[CENTER - maxa] = mmatch.min(shift);
                for a in (1..maxa).rev() {
                    let mmatch = pcache[CENTER - a] + (code != q[depth - a]) as u8;
                    let shift = pcache[CENTER + 1 - a].min(cache[CENTER - a - 1]) + 1;
                    cache[CENTER - a] = mmatch.min(shift);
                }
            }

            let mmatch = pcache[CENTER] + (code != q[depth]) as u8;
            let shift = cache[CENTER - 1].min(cache[CENTER + 1]) + 1;
            cache[CENTER] = mmatch.min(shift);

            if !leaves {
                self.nodes[child as usize].cache = cache;
            }

            let dist = cache[CENTER] as usize;
            if dist > tau {
                continue;
            }
            if leaves {
                // A locked level is how the caller learns about dropped hits.
                let _ = self.hits.level_mut(dist).push(child);
                continue;
            }
            if depth <= self.seed_depth {
                if !self.pebbles[depth].push(child) {
                    self.pebble_overflow = true;
                }
            } else if cache[CENTER - maxa..=CENTER + maxa]
                .iter()
                .all(|&c| c as usize >= tau)
            {
                self.dash(child, depth);
                continue;
            }
            self.poucet(child, depth + 1);
        }
    }

    /// No edits left: follow the rest of the query literally from `node`.
    fn dash(&mut self, mut node: u32, depth: usize) {
        for &code in &self.query[depth + 1..] {
            if code > LAST_BASE {
                return;
            }
            let next = self.nodes[node as usize].children[code as usize];
            if next == EMPTY {
                return;
            }
            node = next;
        }
        let _ = self.hits.level_mut(self.tau).push(node);
    }
}
