use regex::bytes::Regex;
use regex_syntax::ParserBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::casefold::lower_regex_ascii;
use super::literal::{literal_prefix, longest_literal};
use crate::errors::SearchResult;
use crate::pathfilter::{compile_path_filter, PathFilter, PathPatternOptions};

/// What to search for and where, as sent by the request layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSpec {
    /// Pattern text; empty means "every file's content matches"
    pub pattern: String,
    pub is_regexp: bool,
    pub is_case_sensitive: bool,
    pub is_word_match: bool,
    /// A path must match all of these
    pub include_patterns: Vec<String>,
    /// A path must not match this
    pub exclude_pattern: Option<String>,
    pub path_patterns_are_regexps: bool,
    pub path_patterns_are_case_sensitive: bool,
    /// Zero, negative or oversized means the configured ceiling
    pub file_match_limit: i64,
    /// Report files whose content matches
    pub pattern_matches_content: bool,
    /// Report files whose path matches
    pub pattern_matches_path: bool,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            is_regexp: false,
            is_case_sensitive: false,
            is_word_match: false,
            include_patterns: Vec::new(),
            exclude_pattern: None,
            path_patterns_are_regexps: true,
            path_patterns_are_case_sensitive: false,
            file_match_limit: 0,
            pattern_matches_content: true,
            pattern_matches_path: false,
        }
    }
}

impl PatternSpec {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }
}

/// A pattern ready to run against file contents.
///
/// Matching reuses a scratch buffer, so every entry point that matches content
/// takes `&mut self`. Give each concurrent worker its own copy from
/// [`CompiledMatcher::duplicate`].
#[derive(Debug)]
pub struct CompiledMatcher {
    /// `None` when the pattern was empty
    pub(super) regex: Option<Regex>,
    /// Input is ASCII-lowercased before matching; the pattern already is
    pub(super) ignore_case: bool,
    /// Lowercased copy of the current file, sized to the largest file seen
    pub(super) transform_buf: Vec<u8>,
    pub(super) path_filter: Box<dyn PathFilter>,
    /// Present in every match; empty when none was worth extracting
    pub(super) literal_substring: Arc<[u8]>,
}

impl CompiledMatcher {
    /// Compiles the content pattern and the path filter described by `spec`
    pub fn compile(spec: &PatternSpec) -> SearchResult<Self> {
        let mut regex = None;
        let mut literal_substring = Vec::new();

        if !spec.pattern.is_empty() {
            let mut expr = if spec.is_regexp {
                spec.pattern.clone()
            } else {
                regex::escape(&spec.pattern)
            };
            if spec.is_word_match {
                expr = format!(r"\b(?:{expr})\b");
            }
            if spec.is_regexp {
                // Files are matched as a whole, so ^ and $ must see line breaks
                expr = format!("(?m:{expr})");
            }
            if !spec.is_case_sensitive {
                expr = lower_regex_ascii(&expr)?;
            }

            let re = Regex::new(&expr)?;
            let hir = ParserBuilder::new().utf8(false).build().parse(&expr)?;
            if literal_prefix(&hir).is_empty() {
                literal_substring = longest_literal(&hir);
            }
            debug!(
                "Compiled pattern {:?} as {:?} (literal {:?})",
                spec.pattern,
                expr,
                String::from_utf8_lossy(&literal_substring)
            );
            regex = Some(re);
        }

        let path_filter = compile_path_filter(
            &spec.include_patterns,
            spec.exclude_pattern.as_deref(),
            PathPatternOptions {
                regexp: spec.path_patterns_are_regexps,
                case_sensitive: spec.path_patterns_are_case_sensitive,
            },
        )?;

        Ok(Self {
            regex,
            ignore_case: !spec.is_case_sensitive,
            transform_buf: Vec::new(),
            path_filter,
            literal_substring: literal_substring.into(),
        })
    }

    /// Replaces the path filter
    pub fn with_path_filter(mut self, path_filter: Box<dyn PathFilter>) -> Self {
        self.path_filter = path_filter;
        self
    }

    /// Returns an independent matcher for another worker. The literal is
    /// shared; the regex and path filter are copied and the scratch buffer
    /// starts empty.
    pub fn duplicate(&self) -> Self {
        Self {
            regex: self.regex.clone(),
            ignore_case: self.ignore_case,
            transform_buf: Vec::new(),
            path_filter: self.path_filter.duplicate(),
            literal_substring: Arc::clone(&self.literal_substring),
        }
    }

    /// Whether a content pattern was given
    pub fn has_pattern(&self) -> bool {
        self.regex.is_some()
    }

    /// The pattern as handed to the regex engine
    pub fn regex_source(&self) -> Option<&str> {
        self.regex.as_ref().map(Regex::as_str)
    }

    pub fn literal_substring(&self) -> &[u8] {
        &self.literal_substring
    }

    pub fn is_case_folding(&self) -> bool {
        self.ignore_case
    }

    pub fn path_filter(&self) -> &dyn PathFilter {
        self.path_filter.as_ref()
    }

    /// Whether `path` passes the include/exclude rules
    pub fn matches_path(&self, path: &str) -> bool {
        self.path_filter.matches(path)
    }

    /// Whether the content pattern matches the path text itself. An absent
    /// pattern matches every path.
    pub fn matches_path_text(&self, path: &str) -> bool {
        let Some(re) = &self.regex else {
            return true;
        };
        if self.ignore_case {
            re.is_match(path.to_ascii_lowercase().as_bytes())
        } else {
            re.is_match(path.as_bytes())
        }
    }
}
