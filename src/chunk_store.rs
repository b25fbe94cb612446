//! Ordered storage for the chunks of one asset
//!
//! Chunks arrive from an unreliable transport: out of order, duplicated, or
//! not at all. The store keeps each index exactly once (first writer wins) and
//! answers how much of the asset is available as a gap-free prefix starting at
//! index 0, without waiting for stragglers further along.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::AssembleError;

/// Result of a [`ChunkStore::put`] call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// Bytes were stored at the index
    Stored,
    /// Index already held data; the new bytes were dropped
    Duplicate,
    /// Empty payload; nothing was stored
    Empty,
}

/// Zero-based chunk index to payload bytes
#[derive(Debug, Default, Clone)]
pub struct ChunkStore {
    chunks: BTreeMap<u32, Bytes>,
}

impl ChunkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` at `index` unless the index is already filled or the payload is empty
    ///
    /// Never overwrites. Both rejections are protocol anomalies and are logged
    /// at `warn`, but neither is an error.
    pub fn put(&mut self, index: u32, bytes: Bytes) -> PutOutcome {
        if bytes.is_empty() {
            tracing::warn!(index, "Trying to store zero bytes of chunk data");
            return PutOutcome::Empty;
        }

        match self.chunks.get(&index) {
            Some(existing) if !existing.is_empty() => {
                tracing::warn!(
                    index,
                    stored_len = existing.len(),
                    dropped_len = bytes.len(),
                    "Already received chunk index, dropping duplicate"
                );
                PutOutcome::Duplicate
            }
            _ => {
                self.chunks.insert(index, bytes);
                PutOutcome::Stored
            }
        }
    }

    /// Chunks of the gap-free run 0, 1, 2, … in index order
    ///
    /// Lazy and side-effect free; call again to restart the scan.
    pub fn contiguous_chunks(&self) -> impl Iterator<Item = &Bytes> + '_ {
        self.chunks
            .iter()
            .zip(0u32..)
            .take_while(|((index, _), expected)| **index == *expected)
            .map(|((_, bytes), _)| bytes)
    }

    /// Number of bytes available from index 0 with no missing index
    pub fn contiguous_bytes(&self) -> u64 {
        self.contiguous_chunks().map(|c| c.len() as u64).sum()
    }

    /// Sum of the sizes of every stored chunk, contiguous or not
    pub fn total_bytes(&self) -> u64 {
        self.chunks.values().map(|c| c.len() as u64).sum()
    }

    /// Number of stored chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk has been stored
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether `index` holds data
    pub fn contains(&self, index: u32) -> bool {
        self.chunks.contains_key(&index)
    }

    /// Copy the contiguous prefix, in index order, into `target`
    ///
    /// `target` must be exactly [`contiguous_bytes`](Self::contiguous_bytes) long.
    pub fn assemble_into(&self, target: &mut [u8]) -> Result<(), AssembleError> {
        let expected = self.contiguous_bytes();
        if target.len() as u64 != expected {
            return Err(AssembleError::LengthMismatch {
                expected,
                actual: target.len() as u64,
            });
        }

        let mut offset = 0;
        for chunk in self.contiguous_chunks() {
            target[offset..offset + chunk.len()].copy_from_slice(chunk);
            offset += chunk.len();
        }
        Ok(())
    }

    /// Allocate and return the contiguous prefix as one buffer
    pub fn assemble(&self) -> Bytes {
        let mut buffer = Vec::with_capacity(self.contiguous_bytes() as usize);
        for chunk in self.contiguous_chunks() {
            buffer.extend_from_slice(chunk);
        }
        Bytes::from(buffer)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(fill: u8, len: usize) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    /// All orderings of `items` (small inputs only)
    fn permutations(items: &[(u32, usize)]) -> Vec<Vec<(u32, usize)>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn empty_store_has_no_contiguous_bytes() {
        let store = ChunkStore::new();
        assert_eq!(store.contiguous_bytes(), 0);
        assert!(store.is_empty());
        assert_eq!(store.assemble(), Bytes::new());
    }

    #[test]
    fn contiguous_bytes_stops_at_first_gap() {
        let mut store = ChunkStore::new();
        store.put(0, chunk(1, 4));
        store.put(1, chunk(2, 3));
        store.put(3, chunk(4, 10));

        assert_eq!(store.contiguous_bytes(), 7);
        assert_eq!(store.total_bytes(), 17);
    }

    #[test]
    fn missing_index_zero_means_no_prefix() {
        let mut store = ChunkStore::new();
        store.put(1, chunk(1, 5));
        store.put(2, chunk(2, 5));

        assert_eq!(store.contiguous_bytes(), 0);
        assert_eq!(store.total_bytes(), 10);
    }

    #[test]
    fn contiguous_bytes_is_permutation_invariant() {
        // Indices 0..=2 contiguous, 4 and 5 after a gap at 3.
        let inserts = [(0, 3), (1, 5), (2, 1), (4, 7), (5, 2)];

        for order in permutations(&inserts) {
            let mut store = ChunkStore::new();
            for (index, len) in &order {
                store.put(*index, chunk(*index as u8, *len));
            }
            assert_eq!(
                store.contiguous_bytes(),
                9,
                "insertion order {order:?} changed the contiguous prefix"
            );
        }
    }

    #[test]
    fn first_write_wins_on_duplicate_index() {
        let mut store = ChunkStore::new();
        assert_eq!(store.put(0, Bytes::from_static(b"first")), PutOutcome::Stored);
        assert_eq!(
            store.put(0, Bytes::from_static(b"second!")),
            PutOutcome::Duplicate
        );

        assert_eq!(store.assemble(), Bytes::from_static(b"first"));
        assert_eq!(store.total_bytes(), 5);
    }

    #[test]
    fn empty_payload_is_rejected_without_claiming_index() {
        let mut store = ChunkStore::new();
        assert_eq!(store.put(0, Bytes::new()), PutOutcome::Empty);
        assert!(!store.contains(0));

        assert_eq!(store.put(0, Bytes::from_static(b"data")), PutOutcome::Stored);
        assert_eq!(store.contiguous_bytes(), 4);
    }

    #[test]
    fn assemble_orders_by_index_not_arrival() {
        let mut store = ChunkStore::new();
        store.put(1, Bytes::from_static(b"world"));
        store.put(0, Bytes::from_static(b"hello"));

        assert_eq!(store.assemble(), Bytes::from_static(b"helloworld"));
    }

    #[test]
    fn assemble_into_requires_exact_prefix_length() {
        let mut store = ChunkStore::new();
        store.put(0, Bytes::from_static(b"abc"));
        store.put(1, Bytes::from_static(b"de"));
        store.put(5, Bytes::from_static(b"zzz"));

        let mut too_small = [0u8; 4];
        assert_eq!(
            store.assemble_into(&mut too_small),
            Err(AssembleError::LengthMismatch {
                expected: 5,
                actual: 4
            })
        );

        let mut exact = [0u8; 5];
        store.assemble_into(&mut exact).unwrap();
        assert_eq!(&exact, b"abcde");
    }

    #[test]
    fn contiguous_scan_is_restartable() {
        let mut store = ChunkStore::new();
        store.put(0, chunk(1, 2));
        store.put(1, chunk(2, 2));

        let first: Vec<_> = store.contiguous_chunks().collect();
        let second: Vec<_> = store.contiguous_chunks().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
