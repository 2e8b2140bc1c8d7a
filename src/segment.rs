use std::cmp::Ordering;

use crate::error::SortError;

/// Fixed, character based key range `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSegment {
    start: usize,
    end: usize,
}

impl RangeSegment {
    /// Create a new [RangeSegment] over the 0 based half open character range `[start, end)`
    ///
    /// # Examples
    /// ```
    /// use record_split_sort::segment::RangeSegment;
    /// // the first four characters of each line
    /// let segment = RangeSegment::new(0, 4).unwrap();
    /// assert_eq!(segment.width(), 4);
    /// ```
    pub fn new(start: usize, end: usize) -> Result<RangeSegment, anyhow::Error> {
        if end <= start {
            return Err(
                SortError::invalid_config(format!("invalid segment range: start={start}, end={end}"))
            );
        }
        Ok(RangeSegment { start, end })
    }

    /// Create a [RangeSegment] from 1 based inclusive positions, e.g. columns 3 to 5
    pub fn from_inclusive(first: usize, last: usize) -> Result<RangeSegment, anyhow::Error> {
        if first == 0 || last < first {
            return Err(
                SortError::invalid_config(format!("invalid 1-based inclusive range: {first} to {last}"))
            );
        }
        RangeSegment::new(first - 1, last)
    }

    /// Segment covering every character of a line
    pub fn whole_line() -> RangeSegment {
        RangeSegment {
            start: 0,
            end: usize::MAX,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of characters covered by this segment
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    fn resolve<'a>(&self, line: &'a str) -> &'a str {
        let from = char_offset(line, self.start);
        let rest = &line[from..];
        &rest[..char_offset(rest, self.width())]
    }
}

/// Key range that follows the n-th occurrence of a delimiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelimitedSegment {
    delimiter: char,
    occurrence: usize,
    length_after: Option<usize>,
}

impl DelimitedSegment {
    /// Create a new [DelimitedSegment]
    ///
    /// # Arguments
    /// * `delimiter` - the delimiter character
    /// * `occurrence` - 0 based index of the delimiter occurrence the key starts after
    /// * `length_after` - key length in characters. When `None` the key runs to the next delimiter or
    ///   to the end of the line
    ///
    /// # Examples
    /// ```
    /// use record_split_sort::segment::DelimitedSegment;
    /// // three characters after the first '|'
    /// let segment = DelimitedSegment::new('|', 0, Some(3)).unwrap();
    /// ```
    pub fn new(delimiter: char, occurrence: usize, length_after: Option<usize>) -> Result<DelimitedSegment, anyhow::Error> {
        if length_after == Some(0) {
            return Err(SortError::invalid_config("length_after must be > 0 when specified"));
        }
        Ok(
            DelimitedSegment {
                delimiter,
                occurrence,
                length_after,
            }
        )
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn occurrence(&self) -> usize {
        self.occurrence
    }

    pub fn length_after(&self) -> Option<usize> {
        self.length_after
    }

    // a missing delimiter resolves to the empty range at the end of the line
    fn resolve<'a>(&self, line: &'a str) -> &'a str {
        let start = match line.match_indices(self.delimiter).nth(self.occurrence) {
            Some((i, d)) => i + d.len(),
            None => return &line[line.len()..],
        };
        let rest = &line[start..];
        let end = match self.length_after {
            None => rest.find(self.delimiter).unwrap_or(rest.len()),
            Some(length) => char_offset(rest, length),
        };
        &rest[..end]
    }
}

/// One component of a composite sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Range(RangeSegment),
    Delimited(DelimitedSegment),
}

impl Segment {
    /// Shorthand for a [RangeSegment]
    pub fn range(start: usize, end: usize) -> Result<Segment, anyhow::Error> {
        Ok(Segment::Range(RangeSegment::new(start, end)?))
    }

    /// Shorthand for a [DelimitedSegment]
    pub fn after_delimiter(delimiter: char, occurrence: usize, length_after: Option<usize>) -> Result<Segment, anyhow::Error> {
        Ok(Segment::Delimited(DelimitedSegment::new(delimiter, occurrence, length_after)?))
    }

    /// Compare the key portions of two lines without allocating.
    ///
    /// Characters missing from the shorter portion compare as `'\0'`.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        compare_padded(self.resolve(a), self.resolve(b))
    }

    /// Append this segment's key portion of `line` to `out`
    pub fn append_key(&self, line: &str, out: &mut String) {
        out.push_str(self.resolve(line));
    }

    fn resolve<'a>(&self, line: &'a str) -> &'a str {
        match self {
            Segment::Range(segment) => segment.resolve(line),
            Segment::Delimited(segment) => segment.resolve(line),
        }
    }
}

impl From<RangeSegment> for Segment {
    fn from(segment: RangeSegment) -> Self {
        Segment::Range(segment)
    }
}

impl From<DelimitedSegment> for Segment {
    fn from(segment: DelimitedSegment) -> Self {
        Segment::Delimited(segment)
    }
}

/// Byte offset of the `n`-th char of `s`, clipped to `s.len()`
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn compare_padded(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();
    loop {
        match (a_chars.next(), b_chars.next()) {
            (None, None) => return Ordering::Equal,
            (ca, cb) => {
                let ordering = ca.unwrap_or('\0').cmp(&cb.unwrap_or('\0'));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}
