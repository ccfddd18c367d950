pub mod archive;
pub mod config;
pub mod context;
pub mod errors;
pub mod metrics;
pub mod pathfilter;
pub mod results;
pub mod search;

pub use archive::{Archive, ArchiveFile};
pub use config::{CliOverrides, EncodingMode, ScanConfig};
pub use context::{ContextError, SearchContext};
pub use errors::{SearchError, SearchResult};
pub use metrics::{MetricsSnapshot, ScanMetrics};
pub use pathfilter::{compile_path_filter, PathFilter, PathPatternOptions};
pub use results::{FileMatch, LineMatch, ScanOutput, ScanStats, ScanStatus};
pub use search::{CompiledMatcher, MatchLimits, PatternSpec, Scanner};
