//! Page and chunk partitioning for bulk indexing.

use serde::{Deserialize, Serialize};

/// Default number of ids fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Default number of documents per bulk write request.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;

/// Splits id sets into pages and documents into bulk write chunks.
///
/// Sizes of zero are clamped to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBatcher {
    page_size: usize,
    chunk_size: usize,
}

impl Default for IndexBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_CHUNK_SIZE)
    }
}

impl IndexBatcher {
    /// Creates a batcher with the given page and chunk sizes.
    pub fn new(page_size: usize, chunk_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Ids fetched per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Documents per bulk write.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Yields id batches of at most `page_size`.
    pub fn pages<'a, T>(&self, ids: &'a [T]) -> impl Iterator<Item = &'a [T]> + 'a {
        ids.chunks(self.page_size)
    }

    /// Splits fetched records into owned batches of at most `chunk_size`.
    pub fn chunks<T>(&self, records: Vec<T>) -> Vec<Vec<T>> {
        let mut chunks = Vec::with_capacity(records.len().div_ceil(self.chunk_size));
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            chunks.push(records.by_ref().take(self.chunk_size).collect());
        }
        chunks
    }

    /// Number of pages for `total` ids.
    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes() {
        let batcher = IndexBatcher::default();
        assert_eq!(batcher.page_size(), 10_000);
        assert_eq!(batcher.chunk_size(), 1_000);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let batcher = IndexBatcher::new(0, 0);
        assert_eq!(batcher.page_size(), 1);
        assert_eq!(batcher.chunk_size(), 1);
        assert_eq!(batcher.chunks(vec![1, 2, 3]).len(), 3);
    }

    #[test]
    fn test_pages_and_chunks_of_12345() {
        let batcher = IndexBatcher::default();
        let ids: Vec<u32> = (0..12_345).collect();

        let pages: Vec<&[u32]> = batcher.pages(&ids).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 10_000);
        assert_eq!(pages[1].len(), 2_345);
        assert_eq!(batcher.page_count(ids.len()), 2);

        let chunk_total: usize = pages
            .iter()
            .map(|page| batcher.chunks(page.to_vec()).len())
            .sum();
        assert_eq!(chunk_total, 13);
    }

    #[test]
    fn test_empty_input() {
        let batcher = IndexBatcher::default();
        let ids: Vec<u32> = Vec::new();
        assert_eq!(batcher.pages(&ids).count(), 0);
        assert!(batcher.chunks(ids).is_empty());
    }

    #[test]
    fn test_chunks_preserve_order() {
        let batcher = IndexBatcher::new(10, 2);
        assert_eq!(batcher.chunks(vec![1, 2, 3, 4, 5]), vec![vec![1, 2], vec![3, 4], vec![5]]);
    }
}
