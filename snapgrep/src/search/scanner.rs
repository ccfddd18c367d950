use once_cell::sync::OnceCell;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info_span, trace, warn};

use super::finder::MatchLimits;
use super::pattern::{CompiledMatcher, PatternSpec};
use crate::archive::Archive;
use crate::config::ScanConfig;
use crate::context::{ContextError, SearchContext};
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;
use crate::results::{FileMatch, ScanOutput, ScanStats, ScanStatus};

/// Matches collected by the workers, guarded together
#[derive(Debug, Default)]
struct Collected {
    matches: Vec<FileMatch>,
    limit_hit: bool,
}

/// Runs compiled patterns over archives with a fixed pool of workers.
///
/// The pool is built once and reused by every scan. Each scan hands every
/// worker its own copy of the matcher; the workers pull files from a shared
/// queue until it is empty, the match limit is reached, a file fails, or the
/// time budget runs out.
pub struct Scanner {
    config: ScanConfig,
    limits: MatchLimits,
    pool: ThreadPool,
    metrics: ScanMetrics,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> SearchResult<Self> {
        Self::with_metrics(config, ScanMetrics::new())
    }

    /// Creates a scanner reporting into `metrics`
    pub fn with_metrics(config: ScanConfig, metrics: ScanMetrics) -> SearchResult<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .thread_name(|i| format!("snapgrep-worker-{i}"))
            .build()
            .map_err(|e| SearchError::config_error(format!("failed to start workers: {e}")))?;
        Ok(Self {
            limits: MatchLimits::from(&config),
            config,
            pool,
            metrics,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Compiles `spec` and scans `archive` with it
    pub fn search(
        &self,
        ctx: &SearchContext,
        spec: &PatternSpec,
        archive: &Archive,
    ) -> SearchResult<ScanOutput> {
        let matcher = CompiledMatcher::compile(spec)?;
        self.scan(
            ctx,
            &matcher,
            archive,
            spec.file_match_limit,
            spec.pattern_matches_content,
            spec.pattern_matches_path,
        )
    }

    /// Finds the files of `archive` that match.
    ///
    /// A worker error discards the partial results and is returned as the
    /// error. Running out of time is not an error: the matches found so far
    /// come back with [`ScanStatus::DeadlineExceeded`].
    pub fn scan(
        &self,
        ctx: &SearchContext,
        matcher: &CompiledMatcher,
        archive: &Archive,
        file_match_limit: i64,
        match_content: bool,
        match_paths: bool,
    ) -> SearchResult<ScanOutput> {
        let span = info_span!(
            "concurrent_find",
            re = matcher.regex_source().unwrap_or(""),
            path = %matcher.path_filter().describe(),
        );
        let _enter = span.enter();

        let result = self.run(ctx, matcher, archive, file_match_limit, match_content, match_paths);
        match &result {
            Ok(output) => {
                debug!(
                    files_searched = output.stats.files_searched,
                    files_skipped = output.stats.files_skipped,
                    "Scan finished with {} matching files ({:?})",
                    output.matches.len(),
                    output.status
                );
                self.metrics.record_scan(output);
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
                self.metrics.record_error();
            }
        }
        result
    }

    fn run(
        &self,
        ctx: &SearchContext,
        matcher: &CompiledMatcher,
        archive: &Archive,
        file_match_limit: i64,
        mut match_content: bool,
        match_paths: bool,
    ) -> SearchResult<ScanOutput> {
        if !match_content && !match_paths {
            match_content = true;
        }
        let limit = self.config.effective_file_match_limit(file_match_limit);

        if match_paths && (!match_content || !matcher.has_pattern()) {
            debug!("Matching paths only over {} files", archive.len());
            return Ok(match_paths_only(matcher, archive, limit));
        }

        // Leave the caller time to ship the results before its own deadline
        let work_ctx = match ctx.remaining() {
            Some(remaining) => {
                let timeout = remaining.mul_f64(self.config.deadline_fraction);
                debug!("Scan timeout {:?} of {:?} remaining", timeout, remaining);
                ctx.child_with_timeout(timeout)
            }
            None => ctx.child(),
        };

        let queue = Mutex::new(archive.files().iter());
        let collected = Mutex::new(Collected::default());
        let first_error: OnceCell<SearchError> = OnceCell::new();
        let files_skipped = AtomicU64::new(0);
        let files_searched = AtomicU64::new(0);
        let max_len = archive.max_len();
        let limits = &self.limits;

        self.pool.scope(|s| {
            for _ in 0..self.config.num_workers {
                let mut worker = matcher.duplicate();
                let (work_ctx, queue, collected) = (&work_ctx, &queue, &collected);
                let (first_error, files_skipped, files_searched) =
                    (&first_error, &files_skipped, &files_searched);

                s.spawn(move |_| loop {
                    if work_ctx.is_done() {
                        return;
                    }

                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                    let Some(file) = next else {
                        return;
                    };

                    if !worker.matches_path(&file.path) {
                        files_skipped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    files_searched.fetch_add(1, Ordering::Relaxed);
                    trace!("Searching {}", file.path);

                    let file_match = match worker.find_file(file, max_len, limits) {
                        Ok(file_match) => file_match,
                        Err(e) => {
                            if first_error.set(e).is_ok() {
                                work_ctx.cancel();
                            }
                            return;
                        }
                    };

                    let matched = !file_match.line_matches.is_empty()
                        || !worker.has_pattern()
                        || (match_paths && worker.matches_path_text(&file.path));
                    if !matched {
                        continue;
                    }

                    let mut guard = collected.lock().unwrap_or_else(PoisonError::into_inner);
                    if guard.matches.len() < limit {
                        guard.matches.push(file_match);
                    } else {
                        guard.limit_hit = true;
                        work_ctx.cancel();
                    }
                });
            }
        });

        if let Some(e) = first_error.into_inner() {
            return Err(e);
        }

        let collected = collected
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let status = match work_ctx.err() {
            Some(ContextError::DeadlineExceeded) => ScanStatus::DeadlineExceeded,
            _ if collected.limit_hit => ScanStatus::LimitReached,
            Some(ContextError::Cancelled) => ScanStatus::Cancelled,
            None => ScanStatus::Completed,
        };

        Ok(ScanOutput {
            matches: collected.matches,
            limit_hit: collected.limit_hit,
            status,
            stats: ScanStats {
                files_searched: files_searched.into_inner(),
                files_skipped: files_skipped.into_inner(),
            },
        })
    }
}

/// Sequential path matching. Cheap enough that workers are not worth it.
fn match_paths_only(matcher: &CompiledMatcher, archive: &Archive, limit: usize) -> ScanOutput {
    let mut output = ScanOutput::new();
    for file in archive.files() {
        if !matcher.matches_path(&file.path) {
            output.stats.files_skipped += 1;
            continue;
        }
        output.stats.files_searched += 1;
        if !matcher.matches_path_text(&file.path) {
            continue;
        }
        if output.matches.len() < limit {
            output.matches.push(FileMatch::path_only(file.path.as_str()));
        } else {
            output.limit_hit = true;
            output.status = ScanStatus::LimitReached;
            break;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncodingMode;
    use crate::pathfilter::PathFilter;
    use std::collections::BTreeSet;
    use std::thread;
    use std::time::{Duration, Instant};

    fn scanner() -> Scanner {
        Scanner::new(ScanConfig::default()).unwrap()
    }

    fn paths(output: &ScanOutput) -> BTreeSet<String> {
        output.matches.iter().map(|m| m.path.clone()).collect()
    }

    #[test]
    fn test_scan_finds_matching_files() {
        let archive = Archive::from_files([
            ("a.go", "foo bar\nbaz foo\n"),
            ("b.go", "qux\n"),
            ("c.go", "FOO\n"),
        ]);
        let spec = PatternSpec {
            is_case_sensitive: true,
            ..PatternSpec::new("foo")
        };
        let output = scanner()
            .search(&SearchContext::background(), &spec, &archive)
            .unwrap();
        assert_eq!(paths(&output), BTreeSet::from(["a.go".to_string()]));
        assert_eq!(output.status, ScanStatus::Completed);
        assert_eq!(output.stats.files_searched, 3);
        assert_eq!(output.stats.files_skipped, 0);
    }

    #[test]
    fn test_neither_mode_defaults_to_content() {
        let archive = Archive::from_files([("foo.go", "nothing"), ("x.go", "foo")]);
        let spec = PatternSpec {
            pattern_matches_content: false,
            pattern_matches_path: false,
            ..PatternSpec::new("foo")
        };
        let output = scanner()
            .search(&SearchContext::background(), &spec, &archive)
            .unwrap();
        assert_eq!(paths(&output), BTreeSet::from(["x.go".to_string()]));
    }

    #[test]
    fn test_content_or_path_match() {
        let archive = Archive::from_files([
            ("foo.go", "nothing here"),
            ("bar.go", "foo inside"),
            ("baz.go", "nothing"),
        ]);
        let spec = PatternSpec {
            pattern_matches_path: true,
            ..PatternSpec::new("foo")
        };
        let mut output = scanner()
            .search(&SearchContext::background(), &spec, &archive)
            .unwrap();
        output.sort_by_path();
        assert_eq!(output.matches.len(), 2);
        assert_eq!(output.matches[0].path, "bar.go");
        assert_eq!(output.matches[0].line_matches.len(), 1);
        assert_eq!(output.matches[1].path, "foo.go");
        assert!(output.matches[1].line_matches.is_empty());
    }

    #[test]
    fn test_empty_pattern_matches_every_file() {
        let archive = Archive::from_files([("a.rs", "x"), ("b.go", "y"), ("c.rs", "")]);
        let spec = PatternSpec {
            include_patterns: vec![r"\.rs$".to_string()],
            ..PatternSpec::default()
        };
        let output = scanner()
            .search(&SearchContext::background(), &spec, &archive)
            .unwrap();
        assert_eq!(
            paths(&output),
            BTreeSet::from(["a.rs".to_string(), "c.rs".to_string()])
        );
        assert_eq!(output.stats.files_skipped, 1);
        assert_eq!(output.stats.files_searched, 2);
    }

    #[test]
    fn test_path_only_fast_path_limit() {
        let archive = Archive::from_files((0..5).map(|i| (format!("src/f{i}.go"), "")));
        let spec = PatternSpec {
            pattern_matches_content: false,
            pattern_matches_path: true,
            file_match_limit: 3,
            ..PatternSpec::new("src/")
        };
        let output = scanner()
            .search(&SearchContext::background(), &spec, &archive)
            .unwrap();
        assert_eq!(output.matches.len(), 3);
        assert!(output.limit_hit);
        assert_eq!(output.status, ScanStatus::LimitReached);
    }

    #[test]
    fn test_limit_is_clamped_to_ceiling() {
        let config = ScanConfig {
            max_file_matches: 4,
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(config).unwrap();
        let archive = Archive::from_files((0..10).map(|i| (format!("f{i}"), "hit")));
        for requested in [0, -1, 100] {
            let spec = PatternSpec {
                file_match_limit: requested,
                ..PatternSpec::new("hit")
            };
            let output = scanner
                .search(&SearchContext::background(), &spec, &archive)
                .unwrap();
            assert_eq!(output.matches.len(), 4);
            assert!(output.limit_hit);
        }
    }

    #[test]
    fn test_worker_error_cancels_scan() {
        let mut archive = Archive::new();
        for i in 0..50 {
            archive.push(format!("ok{i}.txt"), "foo");
        }
        archive.push("bad.txt", b"foo \xff".to_vec());
        let config = ScanConfig {
            encoding_mode: EncodingMode::FailFast,
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(config).unwrap();
        let err = scanner
            .search(&SearchContext::background(), &PatternSpec::new("foo"), &archive)
            .unwrap_err();
        assert!(matches!(err, SearchError::EncodingError { .. }));
        assert_eq!(scanner.metrics().get_stats().errors, 1);
    }

    #[test]
    fn test_cancelled_context() {
        let archive = Archive::from_files([("a", "foo"), ("b", "foo")]);
        let ctx = SearchContext::background();
        ctx.cancel();
        let output = scanner()
            .search(&ctx, &PatternSpec::new("foo"), &archive)
            .unwrap();
        assert!(output.matches.is_empty());
        assert_eq!(output.status, ScanStatus::Cancelled);
    }

    #[derive(Debug, Clone)]
    struct SlowFilter(Duration);

    impl PathFilter for SlowFilter {
        fn matches(&self, _path: &str) -> bool {
            thread::sleep(self.0);
            true
        }

        fn duplicate(&self) -> Box<dyn PathFilter> {
            Box::new(self.clone())
        }

        fn describe(&self) -> String {
            format!("slow({:?})", self.0)
        }
    }

    #[test]
    fn test_deadline_returns_partial_results() {
        let archive = Archive::from_files((0..5000).map(|i| (format!("f{i}"), "foo")));
        let matcher = CompiledMatcher::compile(&PatternSpec::new("foo"))
            .unwrap()
            .with_path_filter(Box::new(SlowFilter(Duration::from_millis(3))));

        let scanner = scanner();
        let ctx = SearchContext::with_timeout(Duration::from_millis(200));
        let deadline = ctx.deadline().unwrap();
        let output = scanner
            .scan(&ctx, &matcher, &archive, 0, true, false)
            .unwrap();

        assert!(Instant::now() < deadline, "scan overran the caller's deadline");
        assert_eq!(output.status, ScanStatus::DeadlineExceeded);
        assert!(!output.matches.is_empty());
        assert!(output.matches.len() < 1000);
        assert!(output.deadline_error().unwrap_err().is_deadline_exceeded());
    }

    #[test]
    fn test_metrics_are_injected() {
        let metrics = ScanMetrics::new();
        let scanner = Scanner::with_metrics(ScanConfig::default(), metrics.clone()).unwrap();
        let archive = Archive::from_files([("a", "foo"), ("b", "bar")]);
        scanner
            .search(&SearchContext::background(), &PatternSpec::new("foo"), &archive)
            .unwrap();

        let stats = metrics.get_stats();
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.files_searched, 2);
        assert_eq!(stats.files_matched, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ScanConfig {
            num_workers: 0,
            ..ScanConfig::default()
        };
        assert!(matches!(
            Scanner::new(config),
            Err(SearchError::ConfigError(_))
        ));
    }
}
