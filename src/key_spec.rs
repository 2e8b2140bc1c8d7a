use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::error::SortError;
use crate::segment::{RangeSegment, Segment};

/// Comparator over materialized keys, see [LineComparator::with_key_comparator]
pub type KeyComparator = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Ordered, non empty list of [Segment]s forming a composite key.
///
/// # Examples
/// ```
/// use std::cmp::Ordering;
/// use record_split_sort::key_spec::KeySpec;
/// use record_split_sort::segment::Segment;
///
/// // sort by the 3 characters after the first '|', then by the first 3 characters
/// let key_spec = KeySpec::new(vec![
///     Segment::after_delimiter('|', 0, Some(3)).unwrap(),
///     Segment::range(0, 3).unwrap(),
/// ]).unwrap();
/// assert_eq!(key_spec.compare("ZZZ|123", "AAA|124"), Ordering::Less);
/// assert_eq!(key_spec.extract_key("ABC|123|HELLO"), "123ABC");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySpec {
    segments: Vec<Segment>,
}

impl KeySpec {
    pub fn new(segments: Vec<Segment>) -> Result<KeySpec, anyhow::Error> {
        if segments.is_empty() {
            return Err(SortError::invalid_config("at least one segment is required"));
        }
        Ok(KeySpec { segments })
    }

    /// Key spec comparing the whole line
    pub fn whole_line() -> KeySpec {
        KeySpec {
            segments: vec![Segment::Range(RangeSegment::whole_line())],
        }
    }

    pub fn segments(&self) -> &Vec<Segment> {
        &self.segments
    }

    /// Lexicographic comparison segment by segment, no allocation
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        for segment in &self.segments {
            let ordering = segment.compare(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Concatenation of all segments' key portions. Allocates.
    pub fn extract_key(&self, line: &str) -> String {
        let mut key = String::new();
        for segment in &self.segments {
            segment.append_key(line, &mut key);
        }
        key
    }
}

/// Line ordering used by the in-memory sort and the merge.
///
/// Compares with [KeySpec::compare] unless a [KeyComparator] is attached, in which case the keys are
/// materialized with [KeySpec::extract_key] and handed to it.
#[derive(Clone)]
pub struct LineComparator {
    key_spec: KeySpec,
    key_comparator: Option<KeyComparator>,
}

impl LineComparator {
    pub fn new(key_spec: KeySpec) -> LineComparator {
        LineComparator {
            key_spec,
            key_comparator: None,
        }
    }

    /// Compare materialized keys with `key_comparator`
    ///
    /// # Examples
    /// ```
    /// use std::cmp::Ordering;
    /// use std::sync::Arc;
    /// use record_split_sort::key_spec::{KeySpec, LineComparator};
    /// use record_split_sort::segment::Segment;
    ///
    /// // numeric order of the first field
    /// let comparator = LineComparator::new(KeySpec::new(vec![Segment::after_delimiter(';', 0, None).unwrap()]).unwrap())
    ///     .with_key_comparator(Arc::new(|a: &str, b: &str| {
    ///         a.parse::<i64>().unwrap_or(0).cmp(&b.parse::<i64>().unwrap_or(0))
    ///     }));
    /// assert_eq!(comparator.compare("x;9", "y;10"), Ordering::Less);
    /// ```
    pub fn with_key_comparator(mut self, key_comparator: KeyComparator) -> LineComparator {
        self.key_comparator = Some(key_comparator);
        self
    }

    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match &self.key_comparator {
            None => self.key_spec.compare(a, b),
            Some(key_comparator) => {
                key_comparator(&self.key_spec.extract_key(a), &self.key_spec.extract_key(b))
            }
        }
    }
}

impl From<KeySpec> for LineComparator {
    fn from(key_spec: KeySpec) -> Self {
        LineComparator::new(key_spec)
    }
}

impl Debug for LineComparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineComparator")
            .field("key_spec", &self.key_spec)
            .field("key_comparator", &self.key_comparator.is_some())
            .finish()
    }
}
