use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use std::fmt::Debug;

use crate::errors::{SearchError, SearchResult};

/// Decides whether a file path is eligible for searching.
///
/// Each worker holds its own copy obtained from [`PathFilter::duplicate`] so
/// that no filter state is shared between threads.
pub trait PathFilter: Send + Sync + Debug {
    /// Reports whether `path` passes the include/exclude rules
    fn matches(&self, path: &str) -> bool;

    /// Returns an independent copy for another worker
    fn duplicate(&self) -> Box<dyn PathFilter>;

    /// Human readable form for logs and traces
    fn describe(&self) -> String;
}

/// Accepts every path
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl PathFilter for MatchAll {
    fn matches(&self, _path: &str) -> bool {
        true
    }

    fn duplicate(&self) -> Box<dyn PathFilter> {
        Box::new(*self)
    }

    fn describe(&self) -> String {
        "*".to_string()
    }
}

/// How path patterns are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathPatternOptions {
    /// Patterns are regular expressions instead of globs
    pub regexp: bool,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone)]
enum CompiledPathPattern {
    Regex(Regex),
    Glob(Pattern, MatchOptions),
}

impl CompiledPathPattern {
    fn compile(pattern: &str, options: PathPatternOptions) -> SearchResult<Self> {
        if options.regexp {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(!options.case_sensitive)
                .build()
                .map_err(|e| SearchError::invalid_path_pattern(e.to_string()))?;
            Ok(Self::Regex(re))
        } else {
            let glob = Pattern::new(pattern)
                .map_err(|e| SearchError::invalid_path_pattern(format!("{pattern}: {e}")))?;
            let match_options = MatchOptions {
                case_sensitive: options.case_sensitive,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            };
            Ok(Self::Glob(glob, match_options))
        }
    }

    fn is_match(&self, path: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(path),
            Self::Glob(glob, options) => glob.matches_with(path, *options),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Regex(re) => re.as_str(),
            Self::Glob(glob, _) => glob.as_str(),
        }
    }
}

/// Include/exclude rules compiled from path patterns.
///
/// A path matches when it matches every include pattern and does not match
/// the exclude pattern.
#[derive(Debug, Clone)]
pub struct PathPatterns {
    include: Vec<CompiledPathPattern>,
    exclude: Option<CompiledPathPattern>,
    options: PathPatternOptions,
}

impl PathPatterns {
    pub fn compile(
        include: &[String],
        exclude: Option<&str>,
        options: PathPatternOptions,
    ) -> SearchResult<Self> {
        let include = include
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| CompiledPathPattern::compile(p, options))
            .collect::<SearchResult<Vec<_>>>()?;
        let exclude = exclude
            .filter(|p| !p.is_empty())
            .map(|p| CompiledPathPattern::compile(p, options))
            .transpose()?;
        Ok(Self {
            include,
            exclude,
            options,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_none()
    }
}

impl PathFilter for PathPatterns {
    fn matches(&self, path: &str) -> bool {
        self.include.iter().all(|p| p.is_match(path))
            && !self.exclude.as_ref().is_some_and(|p| p.is_match(path))
    }

    fn duplicate(&self) -> Box<dyn PathFilter> {
        Box::new(self.clone())
    }

    fn describe(&self) -> String {
        let kind = if self.options.regexp { "regexp" } else { "glob" };
        let case = if self.options.case_sensitive {
            "case-sensitive"
        } else {
            "case-insensitive"
        };
        let include: Vec<&str> = self.include.iter().map(|p| p.as_str()).collect();
        match &self.exclude {
            Some(exclude) => format!(
                "{kind}({case}) include={include:?} exclude={:?}",
                exclude.as_str()
            ),
            None => format!("{kind}({case}) include={include:?}"),
        }
    }
}

/// Compiles include/exclude patterns, falling back to [`MatchAll`] when
/// there are none
pub fn compile_path_filter(
    include: &[String],
    exclude: Option<&str>,
    options: PathPatternOptions,
) -> SearchResult<Box<dyn PathFilter>> {
    let patterns = PathPatterns::compile(include, exclude, options)?;
    if patterns.is_empty() {
        Ok(Box::new(MatchAll))
    } else {
        Ok(Box::new(patterns))
    }
}
