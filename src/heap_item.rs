use std::cmp::Ordering;

use crate::key_spec::LineComparator;

/// Next unconsumed record of one chunk, as held by the merge queue.
///
/// Ordered by the line comparator, then by sequence number, so equal keys leave the queue in the order
/// their records were read.
pub(crate) struct HeapItem<'a> {
    comparator: &'a LineComparator,
    line: String,
    record: Vec<u8>,
    chunk_index: usize,
    sequence: u64,
}

impl<'a> HeapItem<'a> {
    pub(crate) fn new(comparator: &'a LineComparator, line: String, record: Vec<u8>, chunk_index: usize, sequence: u64) -> HeapItem<'a> {
        HeapItem {
            comparator,
            line,
            record,
            chunk_index,
            sequence,
        }
    }

    pub(crate) fn record(&self) -> &Vec<u8> {
        &self.record
    }

    pub(crate) fn chunk_index(&self) -> usize {
        self.chunk_index
    }
}

impl Eq for HeapItem<'_> {}

impl PartialEq<Self> for HeapItem<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for HeapItem<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator.compare(&self.line, &other.line)
            .then(self.sequence.cmp(&other.sequence))
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    use crate::heap_item::HeapItem;
    use crate::key_spec::{KeySpec, LineComparator};
    use crate::segment::Segment;

    #[test]
    fn test_min_heap_with_sequence_tie_break() -> Result<(), anyhow::Error> {
        let comparator = LineComparator::new(KeySpec::new(vec![Segment::range(0, 4)?])?);
        let mut heap = BinaryHeap::new();
        for (sequence, line) in ["0002;a", "0001;b", "0001;a", "0003;c"].iter().enumerate() {
            heap.push(Reverse(HeapItem::new(&comparator, line.to_string(), line.as_bytes().to_vec(), sequence, sequence as u64)));
        }
        let mut order = vec![];
        while let Some(Reverse(item)) = heap.pop() {
            order.push(item.chunk_index());
        }
        assert_eq!(order, vec![1, 2, 0, 3]);
        Ok(())
    }
}
