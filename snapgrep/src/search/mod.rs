//! Pattern compilation and the concurrent scan over an archive.
//!
//! # Pipeline
//!
//! 1. [`CompiledMatcher::compile`] turns a [`PatternSpec`] into a byte regex,
//!    an optional required literal and a path filter. Case-insensitive
//!    patterns are lowercased up front so the input only needs an ASCII fold.
//! 2. [`CompiledMatcher::find`] walks one file: a `memmem` probe for the
//!    literal, then a single regex pass to locate the first match, then a
//!    line-by-line pass from there on that records character offsets.
//! 3. [`Scanner::scan`] hands out the archive's files to a fixed set of
//!    workers, each with its own matcher copy, and stops early on the file
//!    match limit, the first error or the time budget.
//!
//! ```rust,ignore
//! let scanner = Scanner::new(ScanConfig::default())?;
//! let ctx = SearchContext::with_timeout(Duration::from_secs(2));
//! let output = scanner.search(&ctx, &PatternSpec::new("foo"), &archive)?;
//! ```
mod casefold;
mod literal;

pub mod finder;
pub mod pattern;
pub mod scanner;

pub use finder::MatchLimits;
pub use pattern::{CompiledMatcher, PatternSpec};
pub use scanner::Scanner;
