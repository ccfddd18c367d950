//! Line matching within a single file.
//!
//! Most files do not match, so the expensive per-line work is only done after
//! two cheap whole-file checks: a substring search for the required literal
//! and one regex search. The position of that first match also lets us skip
//! every line that ends before it.

use memchr::{memchr, memmem};
use tracing::trace;

use super::pattern::CompiledMatcher;
use crate::archive::ArchiveFile;
use crate::config::{EncodingMode, ScanConfig};
use crate::errors::{SearchError, SearchResult};
use crate::results::{FileMatch, LineMatch};

/// Per-file reporting limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    pub max_line_matches: usize,
    pub max_offsets: usize,
    pub max_line_size: usize,
    pub encoding_mode: EncodingMode,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for MatchLimits {
    fn from(config: &ScanConfig) -> Self {
        Self {
            max_line_matches: config.max_line_matches,
            max_offsets: config.max_offsets,
            max_line_size: config.max_line_size,
            encoding_mode: config.encoding_mode,
        }
    }
}

impl CompiledMatcher {
    /// Returns the matching lines of `file` and whether the per-file limit cut
    /// the list short.
    ///
    /// `max_len` is the length of the largest file in the archive and sizes
    /// the scratch buffer once, so it is not reallocated per file.
    pub fn find(
        &mut self,
        file: &ArchiveFile,
        max_len: usize,
        limits: &MatchLimits,
    ) -> SearchResult<(Vec<LineMatch>, bool)> {
        let Some(re) = &self.regex else {
            return Ok((Vec::new(), false));
        };

        // Match against a lowercased copy but keep the original bytes for
        // previews. The fold is ASCII-only so both have the same length.
        let data = file.data.as_slice();
        let match_data: &[u8] = if self.ignore_case {
            if self.transform_buf.len() < data.len() {
                self.transform_buf.resize(max_len.max(data.len()), 0);
            }
            let buf = &mut self.transform_buf[..data.len()];
            buf.copy_from_slice(data);
            buf.make_ascii_lowercase();
            &*buf
        } else {
            data
        };

        if !self.literal_substring.is_empty()
            && memmem::find(match_data, &self.literal_substring).is_none()
        {
            return Ok((Vec::new(), false));
        }
        let Some(first) = re.find(match_data) else {
            return Ok((Vec::new(), false));
        };
        let first_start = first.start();

        let mut matches = Vec::new();
        let mut rest = data;
        let mut rest_match = match_data;
        let mut consumed = 0;
        let mut line_number = 0;

        while matches.len() < limits.max_line_matches && !rest.is_empty() {
            let (advance, line) = split_line(rest);
            let match_line = &rest_match[..line.len()];

            rest = &rest[advance..];
            rest_match = &rest_match[advance..];
            consumed += advance;
            let current = line_number;
            line_number += 1;

            if consumed < first_start {
                continue;
            }

            if line.len() > limits.max_line_size {
                trace!(
                    "Skipping line {} of {} ({} bytes)",
                    current,
                    file.path,
                    line.len()
                );
                continue;
            }

            let offsets: Vec<(usize, usize)> = re
                .find_iter(match_line)
                .take(limits.max_offsets)
                .map(|m| {
                    (
                        rune_count(&line[..m.start()]),
                        rune_count(&line[m.start()..m.end()]),
                    )
                })
                .collect();
            if offsets.is_empty() {
                continue;
            }

            matches.push(LineMatch {
                line_number: current,
                preview: decode_line(line, &file.path, limits.encoding_mode)?,
                limit_hit: offsets.len() == limits.max_offsets,
                offset_and_lengths: offsets,
            });
        }

        let limit_hit = matches.len() == limits.max_line_matches;
        Ok((matches, limit_hit))
    }

    /// Runs [`find`](Self::find) and wraps the result for `file`
    pub fn find_file(
        &mut self,
        file: &ArchiveFile,
        max_len: usize,
        limits: &MatchLimits,
    ) -> SearchResult<FileMatch> {
        let (line_matches, limit_hit) = self.find(file, max_len, limits)?;
        Ok(FileMatch {
            path: file.path.clone(),
            line_matches,
            limit_hit,
        })
    }
}

/// Splits off the first line of `data`, returning the bytes consumed and the
/// line without its terminator. A trailing `\r` before `\n` is dropped.
fn split_line(data: &[u8]) -> (usize, &[u8]) {
    match memchr(b'\n', data) {
        Some(i) => (i + 1, drop_cr(&data[..i])),
        None => (data.len(), drop_cr(data)),
    }
}

fn drop_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Number of characters in `bytes`; each byte of an invalid sequence counts
/// as one character.
fn rune_count(mut bytes: &[u8]) -> usize {
    let mut count = 0;
    loop {
        match std::str::from_utf8(bytes) {
            Ok(s) => return count + s.chars().count(),
            Err(e) => {
                let valid = e.valid_up_to();
                count += std::str::from_utf8(&bytes[..valid]).map_or(0, |s| s.chars().count());
                let invalid = e.error_len().unwrap_or(bytes.len() - valid);
                count += invalid;
                bytes = &bytes[valid + invalid..];
            }
        }
    }
}

fn decode_line(line: &[u8], path: &str, encoding_mode: EncodingMode) -> SearchResult<String> {
    match encoding_mode {
        EncodingMode::Lossy => Ok(String::from_utf8_lossy(line).into_owned()),
        EncodingMode::FailFast => {
            String::from_utf8(line.to_vec()).map_err(|e| SearchError::encoding_error(path, e))
        }
    }
}
