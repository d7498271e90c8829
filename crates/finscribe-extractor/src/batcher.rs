//! Partitioning of source texts into fixed-size batches

use crate::error::ExtractorError;
use finscribe_domain::SourceText;
use std::iter::Enumerate;
use std::slice::Chunks;

/// A consecutive group of source texts submitted in one service request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Zero-based position of the batch in the run
    pub index: usize,
    /// Source texts in input order
    pub sources: &'a [SourceText],
}

impl<'a> Batch<'a> {
    /// Identifiers of the source files in this batch, in order
    pub fn file_identifiers(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| s.file_identifier.clone())
            .collect()
    }

    /// Number of source texts in the batch
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the batch holds no source texts
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Splits an ordered sequence of source texts into batches of `batch_size`.
///
/// Batching is lazy and restartable: [`Batcher::batches`] can be called any
/// number of times and always yields the same sequence. Concatenating the
/// batches reproduces the input exactly; every batch but the last holds
/// exactly `batch_size` sources.
#[derive(Debug, Clone, Copy)]
pub struct Batcher<'a> {
    sources: &'a [SourceText],
    batch_size: usize,
}

impl<'a> Batcher<'a> {
    /// Create a batcher, rejecting a batch size of zero
    pub fn new(sources: &'a [SourceText], batch_size: usize) -> Result<Self, ExtractorError> {
        if batch_size < 1 {
            return Err(ExtractorError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            sources,
            batch_size,
        })
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches the input produces
    pub fn batch_count(&self) -> usize {
        self.sources.len().div_ceil(self.batch_size)
    }

    /// Iterate over the batches from the start
    pub fn batches(&self) -> Batches<'a> {
        Batches {
            inner: self.sources.chunks(self.batch_size).enumerate(),
        }
    }

    /// The batch at `index`, if any
    pub fn batch(&self, index: usize) -> Option<Batch<'a>> {
        self.batches().nth(index)
    }
}

/// Iterator over the batches of a [`Batcher`]
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    inner: Enumerate<Chunks<'a, SourceText>>,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(index, sources)| Batch { index, sources })
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.inner
            .nth(n)
            .map(|(index, sources)| Batch { index, sources })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sources(n: usize) -> Vec<SourceText> {
        (0..n)
            .map(|i| SourceText::new(format!("file_{i}.pdf"), format!("text {i}")))
            .collect()
    }

    #[test]
    fn test_seven_by_three() {
        let input = sources(7);
        let batcher = Batcher::new(&input, 3).unwrap();
        let sizes: Vec<usize> = batcher.batches().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batcher.batch_count(), 3);

        let last = batcher.batch(2).unwrap();
        assert_eq!(last.index, 2);
        assert_eq!(last.file_identifiers(), vec!["file_6.pdf"]);
        assert!(batcher.batch(3).is_none());
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        let input = sources(4);
        let result = Batcher::new(&input, 0);
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }

    #[test]
    fn test_empty_input_has_no_batches() {
        let batcher = Batcher::new(&[], 5).unwrap();
        assert_eq!(batcher.batches().count(), 0);
        assert_eq!(batcher.batch_count(), 0);
    }

    #[test]
    fn test_batches_are_restartable() {
        let input = sources(5);
        let batcher = Batcher::new(&input, 2).unwrap();
        let first: Vec<_> = batcher.batches().collect();
        let second: Vec<_> = batcher.batches().collect();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_batches_partition_input(n in 0usize..60, k in 1usize..12) {
            let input = sources(n);
            let batcher = Batcher::new(&input, k).unwrap();
            let batches: Vec<_> = batcher.batches().collect();

            prop_assert_eq!(batches.len(), n.div_ceil(k));
            prop_assert_eq!(batcher.batches().len(), batches.len());

            let rejoined: Vec<SourceText> = batches
                .iter()
                .flat_map(|b| b.sources.iter().cloned())
                .collect();
            prop_assert_eq!(&rejoined, &input);

            for (i, batch) in batches.iter().enumerate() {
                prop_assert_eq!(batch.index, i);
                if i + 1 < batches.len() {
                    prop_assert_eq!(batch.len(), k);
                } else {
                    prop_assert!(batch.len() >= 1 && batch.len() <= k);
                }
            }
        }
    }
}
