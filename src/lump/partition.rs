use crate::error::{ImdpError, Result};

/// Refinable partition of the states `0..n` into blocks.
///
/// The states of block `b` are `block_states[from..to]` with
/// `(from, to) = block_bounds[b]`. Splitting a block only rewrites its own
/// slice: part 0 keeps the block number, the other parts get new numbers
/// appended after the existing blocks, their slices nested in the old one.
#[derive(Debug, Clone)]
pub struct Partition {
    state_to_block: Vec<usize>,
    block_states: Vec<usize>,
    block_bounds: Vec<(usize, usize)>,
    split_block: Option<usize>,
    marks: Vec<(usize, usize)>,
}

/// Renumber blocks to `0..k` keeping their relative order.
pub fn fill_gaps(blocks: &mut [usize]) {
    let mut used: Vec<usize> = blocks.to_vec();
    used.sort_unstable();
    used.dedup();
    for b in blocks.iter_mut() {
        // present by construction
        if let Ok(i) = used.binary_search(b) {
            *b = i;
        }
    }
}

impl Partition {
    /// Build a partition from a state to block map. Block numbers must be
    /// exactly `0..k` for some `k`.
    pub fn new(state_to_block: Vec<usize>) -> Result<Partition> {
        let num_blocks = state_to_block.iter().map(|b| b.saturating_add(1)).max().unwrap_or(0);
        // a gap free numbering has no more blocks than states
        if num_blocks > state_to_block.len() {
            return Err(ImdpError::invalid_model(format!(
                "block {} of the initial partition exceeds the {} states",
                num_blocks - 1,
                state_to_block.len()
            )));
        }
        let mut sizes = vec![0usize; num_blocks];
        for &b in state_to_block.iter() {
            sizes[b] += 1;
        }
        if let Some(b) = sizes.iter().position(|&s| s == 0) {
            return Err(ImdpError::invalid_model(format!("block {} of the initial partition is empty", b)));
        }
        let mut block_bounds = Vec::with_capacity(num_blocks);
        let mut from = 0;
        for size in sizes.iter() {
            block_bounds.push((from, from + size));
            from += size;
        }
        let mut write: Vec<usize> = block_bounds.iter().map(|(from, _)| *from).collect();
        let mut block_states = vec![0; state_to_block.len()];
        for (state, &b) in state_to_block.iter().enumerate() {
            block_states[write[b]] = state;
            write[b] += 1;
        }
        Ok(Partition {
            state_to_block,
            block_states,
            block_bounds,
            split_block: None,
            marks: Vec::new(),
        })
    }

    /// Partition with all states in block 0.
    pub fn single_block(num_states: usize) -> Partition {
        Partition {
            state_to_block: vec![0; num_states],
            block_states: (0..num_states).collect(),
            block_bounds: if num_states == 0 { Vec::new() } else { vec![(0, num_states)] },
            split_block: None,
            marks: Vec::new(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.state_to_block.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_bounds.len()
    }

    pub fn block_of(&self, state: usize) -> usize {
        self.state_to_block[state]
    }

    pub fn state_to_block(&self) -> &[usize] {
        &self.state_to_block
    }

    pub fn block_range(&self, block: usize) -> (usize, usize) {
        self.block_bounds[block]
    }

    pub fn block_states(&self, block: usize) -> &[usize] {
        let (from, to) = self.block_bounds[block];
        &self.block_states[from..to]
    }

    /// States in the slice `from..to` of the state permutation.
    pub fn states_in_range(&self, from: usize, to: usize) -> &[usize] {
        &self.block_states[from..to]
    }

    pub fn mark_block_for_split(&mut self, block: usize) {
        debug_assert!(block < self.num_blocks());
        debug_assert!(self.split_block.is_none(), "split of block {:?} still pending", self.split_block);
        self.split_block = Some(block);
        self.marks.clear();
    }

    /// Assign `state` of the marked block to `part`. Parts are numbered
    /// from 0 without gaps and every state of the block is assigned once.
    pub fn mark_state_for_split(&mut self, state: usize, part: usize) {
        debug_assert_eq!(Some(self.state_to_block[state]), self.split_block);
        self.marks.push((state, part));
    }

    /// Perform the pending split, returning whether the block was divided.
    pub fn split(&mut self) -> bool {
        let block = match self.split_block.take() {
            Some(block) => block,
            None => return false,
        };
        let (from, to) = self.block_bounds[block];
        debug_assert_eq!(self.marks.len(), to - from, "every state of block {} must be marked once", block);
        let num_parts = self.marks.iter().map(|(_, p)| p + 1).max().unwrap_or(0);
        let mut sizes = vec![0usize; num_parts];
        for &(_, part) in self.marks.iter() {
            sizes[part] += 1;
        }
        debug_assert!(sizes.iter().all(|&s| s > 0), "empty part in split of block {}", block);
        // number the non-empty parts, the first keeps the block
        let mut part_index = vec![usize::MAX; num_parts];
        let mut part_bounds: Vec<(usize, usize)> = Vec::new();
        let mut write = from;
        for (part, &size) in sizes.iter().enumerate() {
            if size > 0 {
                part_index[part] = part_bounds.len();
                part_bounds.push((write, write + size));
                write += size;
            }
        }
        if part_bounds.len() <= 1 {
            self.marks.clear();
            return false;
        }
        let first_new = self.block_bounds.len();
        let mut cursor: Vec<usize> = part_bounds.iter().map(|(from, _)| *from).collect();
        self.marks.sort_by_key(|&(state, part)| (part, state));
        for &(state, part) in self.marks.iter() {
            let index = part_index[part];
            self.block_states[cursor[index]] = state;
            cursor[index] += 1;
            self.state_to_block[state] = if index == 0 { block } else { first_new + index - 1 };
        }
        self.block_bounds[block] = part_bounds[0];
        self.block_bounds.extend_from_slice(&part_bounds[1..]);
        self.marks.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_consistent(p: &Partition) {
        let mut seen = vec![false; p.num_states()];
        for b in 0..p.num_blocks() {
            assert!(!p.block_states(b).is_empty());
            for &s in p.block_states(b) {
                assert_eq!(p.block_of(s), b);
                assert!(!seen[s]);
                seen[s] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn initial_blocks_follow_state_order() {
        let p = Partition::new(vec![1, 0, 1, 0, 2]).unwrap();
        assert_eq!(p.num_blocks(), 3);
        assert_eq!(p.block_states(0), &[1, 3]);
        assert_eq!(p.block_states(1), &[0, 2]);
        assert_eq!(p.block_states(2), &[4]);
        assert_consistent(&p);
    }

    #[test]
    fn gaps_are_rejected_and_fillable() {
        assert!(Partition::new(vec![0, 2]).is_err());
        assert!(matches!(Partition::new(vec![0, usize::MAX]), Err(ImdpError::InvalidModel { .. })));
        let mut blocks = vec![5, 2, 5, 9];
        fill_gaps(&mut blocks);
        assert_eq!(blocks, vec![1, 0, 1, 2]);
    }

    #[test]
    fn split_keeps_part_zero_and_appends_others() {
        let mut p = Partition::new(vec![0, 0, 0, 0, 1]).unwrap();
        p.mark_block_for_split(0);
        p.mark_state_for_split(0, 1);
        p.mark_state_for_split(1, 0);
        p.mark_state_for_split(2, 2);
        p.mark_state_for_split(3, 0);
        assert!(p.split());
        assert_eq!(p.num_blocks(), 4);
        assert_eq!(p.block_states(0), &[1, 3]);
        assert_eq!(p.block_states(1), &[4]);
        assert_eq!(p.block_states(2), &[0]);
        assert_eq!(p.block_states(3), &[2]);
        assert_eq!(p.block_range(2), (2, 3));
        assert_consistent(&p);
    }

    #[test]
    fn single_part_is_no_split() {
        let mut p = Partition::single_block(3);
        p.mark_block_for_split(0);
        for s in 0..3 {
            p.mark_state_for_split(s, 0);
        }
        assert!(!p.split());
        assert_eq!(p.num_blocks(), 1);
        assert_consistent(&p);
    }

    #[test]
    fn repeated_splits_preserve_union() {
        let mut p = Partition::single_block(6);
        p.mark_block_for_split(0);
        for s in 0..6 {
            p.mark_state_for_split(s, s % 2);
        }
        assert!(p.split());
        p.mark_block_for_split(1);
        for &s in p.block_states(1).to_vec().iter() {
            p.mark_state_for_split(s, if s == 1 { 0 } else { 1 });
        }
        assert!(p.split());
        assert_eq!(p.num_blocks(), 3);
        itertools::assert_equal((0..p.num_blocks()).map(|b| p.block_states(b).len()), vec![3, 1, 2]);
        assert_eq!(p.block_states(1), &[1]);
        assert_eq!(p.block_states(2), &[3, 5]);
        assert_consistent(&p);
    }

    #[test]
    fn random_splits_keep_blocks_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 40;
        let mut p = Partition::single_block(n);
        for _ in 0..200 {
            let block = rng.gen_range(0, p.num_blocks());
            let members = p.block_states(block).to_vec();
            let mut parts: Vec<usize> = members.iter().map(|_| rng.gen_range(0, 3)).collect();
            fill_gaps(&mut parts);
            let num_parts = parts.iter().max().map(|m| m + 1).unwrap_or(0);
            let old_blocks = p.num_blocks();
            let others: Vec<Vec<usize>> = (0..old_blocks)
                .filter(|&b| b != block)
                .map(|b| p.block_states(b).to_vec())
                .collect();

            p.mark_block_for_split(block);
            for (&state, &part) in members.iter().zip(parts.iter()) {
                p.mark_state_for_split(state, part);
            }
            assert_eq!(p.split(), num_parts > 1);
            assert_consistent(&p);
            assert_eq!(p.num_blocks(), old_blocks + num_parts - 1);

            let mut union: Vec<usize> = p.block_states(block).to_vec();
            for b in old_blocks..p.num_blocks() {
                union.extend_from_slice(p.block_states(b));
            }
            union.sort_unstable();
            let mut expected = members.clone();
            expected.sort_unstable();
            assert_eq!(union, expected);
            let untouched: Vec<Vec<usize>> = (0..old_blocks)
                .filter(|&b| b != block)
                .map(|b| p.block_states(b).to_vec())
                .collect();
            assert_eq!(untouched, others);
        }
        assert!(p.num_blocks() > 1);
    }
}
