/// Terminator a line had in its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineEnding {
    /// no terminator, only valid for the line physically at the end of a stream
    None,
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::Cr => b"\r",
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_none(&self) -> bool {
        *self == LineEnding::None
    }
}

/// A decoded line together with the exact terminator it had.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRecord {
    line: String,
    ending: LineEnding,
}

impl LineRecord {
    pub fn new(line: String, ending: LineEnding) -> LineRecord {
        LineRecord {
            line,
            ending,
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }

    pub fn into_parts(self) -> (String, LineEnding) {
        (self.line, self.ending)
    }
}
