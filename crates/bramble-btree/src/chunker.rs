use std::collections::VecDeque;

use crate::limits::ObjectSizeLimits;

struct Pending<T> {
    node: T,
    size: usize,
    hash: u64,
}

/// Splits a stream of nodes into chunks at content-defined boundaries.
///
/// Whether a chunk ends after a given node depends only on that node's
/// encoded bytes and the size accumulated since the previous cut, so equal
/// runs of nodes produce equal chunks regardless of what precedes them.
///
/// A chunk ends after node `i` when it holds at least `minimum_count`
/// nodes and either
/// - adding the next node would push it past the maximum size, or
/// - it holds at least the minimum size and node `i` is a boundary.
///
/// No cut is made that would leave fewer than `minimum_count` nodes behind.
pub struct ProllyChunker<T> {
    limits: ObjectSizeLimits,
    minimum_count: usize,
    pending: VecDeque<Pending<T>>,
    pending_size: usize,
}

impl<T> ProllyChunker<T> {
    pub fn new(limits: ObjectSizeLimits, minimum_count: usize) -> Self {
        Self {
            limits,
            minimum_count: minimum_count.max(1),
            pending: VecDeque::new(),
            pending_size: 0,
        }
    }

    /// Queue a node. `encoded` is the node's serialized form, used for its
    /// size and boundary hash.
    pub fn push(&mut self, node: T, encoded: &[u8]) {
        let digest = blake3::hash(encoded);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        self.pending_size += encoded.len();
        self.pending.push_back(Pending {
            node,
            size: encoded.len(),
            hash: u64::from_le_bytes(prefix),
        });
    }

    /// Remove the next complete chunk, if any. With `finalize` set, no more
    /// nodes will arrive and the remainder forms the last chunk.
    pub fn pop_chunk(&mut self, finalize: bool) -> Option<Vec<T>> {
        let count = self.find_cut(finalize)?;
        let chunk: Vec<T> = self
            .pending
            .drain(..count)
            .map(|pending| {
                self.pending_size -= pending.size;
                pending.node
            })
            .collect();
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Encoded size of all queued nodes.
    pub fn pending_size(&self) -> usize {
        self.pending_size
    }

    fn find_cut(&self, finalize: bool) -> Option<usize> {
        let total = self.pending.len();
        let mut size = 0usize;
        for (i, pending) in self.pending.iter().enumerate() {
            size += pending.size;
            let count = i + 1;
            let remaining = total - count;
            if remaining == 0 {
                return finalize.then_some(count);
            }
            if count < self.minimum_count || remaining < self.minimum_count {
                continue;
            }
            let next = &self.pending[count];
            if size + next.size > self.limits.maximum_size_bytes
                || (size >= self.limits.minimum_size_bytes && self.is_boundary(pending))
            {
                return Some(count);
            }
        }
        None
    }

    fn is_boundary(&self, pending: &Pending<T>) -> bool {
        let spread = self
            .limits
            .maximum_size_bytes
            .saturating_sub(self.limits.minimum_size_bytes)
            .max(1) as u64;
        pending.hash % spread < pending.size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(minimum: usize, maximum: usize) -> ObjectSizeLimits {
        ObjectSizeLimits::new(minimum, maximum).unwrap()
    }

    fn chunk_all(chunker: &mut ProllyChunker<u32>, values: &[u32]) -> Vec<Vec<u32>> {
        let mut chunks = Vec::new();
        for &value in values {
            chunker.push(value, &value.to_le_bytes());
            while let Some(chunk) = chunker.pop_chunk(false) {
                chunks.push(chunk);
            }
        }
        while let Some(chunk) = chunker.pop_chunk(true) {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn empty_chunker_yields_nothing() {
        let mut chunker: ProllyChunker<u32> = ProllyChunker::new(limits(0, 16), 1);
        assert!(chunker.pop_chunk(false).is_none());
        assert!(chunker.pop_chunk(true).is_none());
    }

    #[test]
    fn small_input_stays_in_one_chunk() {
        let mut chunker = ProllyChunker::new(limits(1024, 4096), 1);
        let chunks = chunk_all(&mut chunker, &[1, 2, 3]);
        assert_eq!(chunks, vec![vec![1, 2, 3]]);
        assert!(chunker.is_empty());
        assert_eq!(chunker.pending_size(), 0);
    }

    #[test]
    fn chunks_respect_maximum_size() {
        let mut chunker = ProllyChunker::new(limits(8, 16), 1);
        let values: Vec<u32> = (0..200).collect();
        let chunks = chunk_all(&mut chunker, &values);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() * 4 <= 16);
        }
        assert_eq!(chunks.concat(), values);
    }

    #[test]
    fn minimum_count_is_honored() {
        let mut chunker = ProllyChunker::new(limits(0, 1), 2);
        let values: Vec<u32> = (0..7).collect();
        let chunks = chunk_all(&mut chunker, &values);
        for chunk in &chunks {
            assert!(chunk.len() >= 2, "chunk {chunk:?} too small");
        }
        assert_eq!(chunks.concat(), values);
    }

    #[test]
    fn boundaries_resynchronize() {
        let tail: Vec<u32> = (1000..3000).collect();
        let mut with_prefix = vec![7, 8, 9];
        with_prefix.extend(&tail);

        let a = chunk_all(&mut ProllyChunker::new(limits(32, 256), 1), &tail);
        let b = chunk_all(&mut ProllyChunker::new(limits(32, 256), 1), &with_prefix);
        // After the first few chunks both streams share the same cut points.
        let shared = a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count();
        assert!(shared > a.len() / 2, "only {shared} of {} chunks shared", a.len());
    }
}
