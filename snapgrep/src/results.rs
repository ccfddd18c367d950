use serde::Serialize;

use crate::errors::{SearchError, SearchResult};

/// A matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineMatch {
    /// Zero-based line number
    pub line_number: usize,
    /// The full text of the line
    pub preview: String,
    /// `(offset, length)` of each match, counted in characters, left to right
    pub offset_and_lengths: Vec<(usize, usize)>,
    /// More matches on this line were not reported
    pub limit_hit: bool,
}

/// A matching file. `line_matches` is empty when only the path matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub path: String,
    pub line_matches: Vec<LineMatch>,
    /// More matching lines in this file were not reported
    pub limit_hit: bool,
}

impl FileMatch {
    /// A match on the path alone
    pub fn path_only(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line_matches: Vec::new(),
            limit_hit: false,
        }
    }

    /// Number of individual match offsets across all lines
    pub fn match_count(&self) -> usize {
        self.line_matches
            .iter()
            .map(|lm| lm.offset_and_lengths.len())
            .sum()
    }
}

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Every eligible file was examined
    #[default]
    Completed,
    /// The file match limit was reached; more matches may exist
    LimitReached,
    /// The caller cancelled the scan
    Cancelled,
    /// The scan ran out of time; matches are partial
    DeadlineExceeded,
}

/// Files considered by a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScanStats {
    /// Files that passed the path filter and were searched
    pub files_searched: u64,
    /// Files rejected by the path filter
    pub files_skipped: u64,
}

/// Everything a scan produced. Whatever the status, `matches` holds every
/// valid match gathered before the scan stopped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutput {
    /// Matching files, in no particular order but unique by path
    pub matches: Vec<FileMatch>,
    pub limit_hit: bool,
    pub status: ScanStatus,
    pub stats: ScanStats,
}

impl ScanOutput {
    pub fn new() -> Self {
        Default::default()
    }

    /// Total number of individual matches across all files
    pub fn match_count(&self) -> usize {
        self.matches.iter().map(FileMatch::match_count).sum()
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        self.status == ScanStatus::DeadlineExceeded
    }

    /// Orders matches by path for stable output
    pub fn sort_by_path(&mut self) {
        self.matches.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Turns a timed-out scan into [`SearchError::DeadlineExceeded`] for
    /// callers that have no use for partial results
    pub fn deadline_error(self) -> SearchResult<Self> {
        if self.is_deadline_exceeded() {
            Err(SearchError::DeadlineExceeded)
        } else {
            Ok(self)
        }
    }
}
