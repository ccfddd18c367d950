use anyhow::Result;
use snapgrep::{
    Archive, EncodingMode, FileMatch, LineMatch, PatternSpec, ScanConfig, ScanStatus, Scanner,
    SearchContext, SearchError,
};
use std::collections::{BTreeMap, BTreeSet};

fn scanner() -> Result<Scanner> {
    Ok(Scanner::new(ScanConfig::default())?)
}

fn scenario_archive() -> Archive {
    Archive::from_files([("a.go", "foo bar\nbaz foo\n"), ("b.go", "qux\n")])
}

fn line(line_number: usize, preview: &str, offsets: Vec<(usize, usize)>) -> LineMatch {
    LineMatch {
        line_number,
        preview: preview.to_string(),
        offset_and_lengths: offsets,
        limit_hit: false,
    }
}

fn expected_scenario_a() -> Vec<FileMatch> {
    vec![FileMatch {
        path: "a.go".to_string(),
        line_matches: vec![
            line(0, "foo bar", vec![(0, 3)]),
            line(1, "baz foo", vec![(4, 3)]),
        ],
        limit_hit: false,
    }]
}

/// Matches keyed by path, with line matches in a comparable order
fn by_path(matches: &[FileMatch]) -> BTreeMap<String, Vec<(usize, String, Vec<(usize, usize)>)>> {
    matches
        .iter()
        .map(|m| {
            let mut lines: Vec<_> = m
                .line_matches
                .iter()
                .map(|l| (l.line_number, l.preview.clone(), l.offset_and_lengths.clone()))
                .collect();
            lines.sort();
            (m.path.clone(), lines)
        })
        .collect()
}

#[test]
fn test_literal_case_sensitive() -> Result<()> {
    let spec = PatternSpec {
        is_case_sensitive: true,
        file_match_limit: 10,
        ..PatternSpec::new("foo")
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &scenario_archive())?;

    assert_eq!(output.matches, expected_scenario_a());
    assert!(!output.limit_hit);
    assert_eq!(output.status, ScanStatus::Completed);
    Ok(())
}

#[test]
fn test_case_insensitive_matches_same_lines() -> Result<()> {
    let spec = PatternSpec {
        file_match_limit: 10,
        ..PatternSpec::new("FOO")
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &scenario_archive())?;

    assert_eq!(output.matches, expected_scenario_a());
    assert!(!output.limit_hit);
    Ok(())
}

#[test]
fn test_path_only_mode() -> Result<()> {
    let archive = Archive::from_files([("foo/bar.go", ""), ("baz.go", "")]);
    let spec = PatternSpec {
        pattern_matches_content: false,
        pattern_matches_path: true,
        include_patterns: vec!["foo/".to_string()],
        ..PatternSpec::default()
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &archive)?;

    assert_eq!(output.matches, vec![FileMatch::path_only("foo/bar.go")]);
    assert_eq!(output.stats.files_skipped, 1);
    Ok(())
}

#[test]
fn test_file_match_limit() -> Result<()> {
    let archive = Archive::from_files((0..5).map(|i| (format!("f{i}.go"), "one match here")));
    let spec = PatternSpec {
        file_match_limit: 2,
        ..PatternSpec::new("match")
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &archive)?;

    assert_eq!(output.matches.len(), 2);
    assert!(output.limit_hit);
    assert_eq!(output.status, ScanStatus::LimitReached);
    Ok(())
}

#[test]
fn test_line_and_offset_limits() -> Result<()> {
    let many_lines = "x\n".repeat(150);
    let many_offsets = "x ".repeat(20);
    let archive = Archive::from_files([
        ("lines.txt", many_lines),
        ("offsets.txt", many_offsets),
        ("few.txt", "x x\n".to_string()),
    ]);
    let mut output = scanner()?.search(
        &SearchContext::background(),
        &PatternSpec::new("x"),
        &archive,
    )?;
    output.sort_by_path();

    let few = &output.matches[0];
    assert_eq!(few.path, "few.txt");
    assert!(!few.limit_hit);
    assert!(!few.line_matches[0].limit_hit);

    let lines = &output.matches[1];
    assert_eq!(lines.line_matches.len(), 100);
    assert!(lines.limit_hit);

    let offsets = &output.matches[2];
    assert_eq!(offsets.line_matches.len(), 1);
    assert_eq!(offsets.line_matches[0].offset_and_lengths.len(), 10);
    assert!(offsets.line_matches[0].limit_hit);
    assert!(!offsets.limit_hit);
    Ok(())
}

#[test]
fn test_long_lines_are_excluded() -> Result<()> {
    let long = format!("{}needle\nshort needle\n", "a".repeat(501));
    let exactly = format!("{}needle\n", "a".repeat(494));
    let archive = Archive::from_files([("long.txt", long), ("exact.txt", exactly)]);
    let mut output = scanner()?.search(
        &SearchContext::background(),
        &PatternSpec::new("needle"),
        &archive,
    )?;
    output.sort_by_path();

    assert_eq!(output.matches.len(), 2);
    assert_eq!(output.matches[0].path, "exact.txt");
    assert_eq!(output.matches[0].line_matches[0].offset_and_lengths, vec![(494, 6)]);
    assert_eq!(output.matches[1].path, "long.txt");
    assert_eq!(
        output.matches[1].line_matches,
        vec![line(1, "short needle", vec![(6, 6)])]
    );
    Ok(())
}

#[test]
fn test_offsets_count_characters() -> Result<()> {
    let archive = Archive::from_files([("u.txt", "héllo wörld\n")]);
    let spec = PatternSpec {
        is_regexp: true,
        ..PatternSpec::new("w.rld")
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &archive)?;

    assert_eq!(output.matches[0].line_matches[0].offset_and_lengths, vec![(6, 5)]);
    Ok(())
}

#[test]
fn test_word_match_with_alternation() -> Result<()> {
    let archive = Archive::from_files([
        ("a.txt", "catalog\n"),
        ("b.txt", "a dog barks\n"),
        ("c.txt", "the cat\n"),
    ]);
    let spec = PatternSpec {
        is_regexp: true,
        is_word_match: true,
        ..PatternSpec::new("cat|dog")
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &archive)?;

    let paths: BTreeSet<_> = output.matches.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, BTreeSet::from(["b.txt", "c.txt"]));
    Ok(())
}

#[test]
fn test_include_and_exclude_globs() -> Result<()> {
    let archive = Archive::from_files([
        ("src/main.rs", "fn main() {}"),
        ("src/lib.rs", "fn lib() {}"),
        ("vendor/dep.rs", "fn dep() {}"),
        ("README.md", "fn in docs"),
    ]);
    let spec = PatternSpec {
        include_patterns: vec!["**/*.rs".to_string()],
        exclude_pattern: Some("vendor/**".to_string()),
        path_patterns_are_regexps: false,
        ..PatternSpec::new("fn")
    };
    let output = scanner()?.search(&SearchContext::background(), &spec, &archive)?;

    let paths: BTreeSet<_> = output.matches.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, BTreeSet::from(["src/lib.rs", "src/main.rs"]));
    assert_eq!(output.stats.files_skipped, 2);
    Ok(())
}

#[test]
fn test_scan_is_idempotent() -> Result<()> {
    let archive = Archive::from_files((0..200).map(|i| {
        (
            format!("dir{}/file{i}.txt", i % 7),
            format!("line one {i}\nTODO fix {i}\nnothing\ntodo later\n"),
        )
    }));
    let spec = PatternSpec {
        is_regexp: true,
        ..PatternSpec::new(r"todo \w+")
    };
    let scanner = scanner()?;
    let first = scanner.search(&SearchContext::background(), &spec, &archive)?;
    let second = scanner.search(&SearchContext::background(), &spec, &archive)?;

    assert_eq!(first.matches.len(), 200);
    assert_eq!(by_path(&first.matches), by_path(&second.matches));
    Ok(())
}

#[test]
fn test_fail_fast_encoding_error() -> Result<()> {
    let mut archive = scenario_archive();
    archive.push("broken.go", b"foo \xfe\xff\n".to_vec());
    let config = ScanConfig {
        encoding_mode: EncodingMode::FailFast,
        ..ScanConfig::default()
    };
    let result = Scanner::new(config)?.search(
        &SearchContext::background(),
        &PatternSpec::new("foo"),
        &archive,
    );

    match result {
        Err(SearchError::EncodingError { path, .. }) => {
            assert_eq!(path.to_string_lossy(), "broken.go")
        }
        other => panic!("expected an encoding error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_lossy_previews_by_default() -> Result<()> {
    let archive = Archive::from_files([("broken.go", b"foo \xff\n".to_vec())]);
    let output = scanner()?.search(
        &SearchContext::background(),
        &PatternSpec::new("foo"),
        &archive,
    )?;

    let line = &output.matches[0].line_matches[0];
    assert_eq!(line.preview, "foo \u{FFFD}");
    assert_eq!(line.offset_and_lengths, vec![(0, 3)]);
    Ok(())
}

#[test]
fn test_invalid_patterns_are_rejected() -> Result<()> {
    let archive = scenario_archive();
    let scanner = scanner()?;
    let bad_regex = PatternSpec {
        is_regexp: true,
        ..PatternSpec::new("(foo")
    };
    assert!(matches!(
        scanner.search(&SearchContext::background(), &bad_regex, &archive),
        Err(SearchError::InvalidPattern(_))
    ));

    let bad_include = PatternSpec {
        include_patterns: vec!["[".to_string()],
        ..PatternSpec::new("foo")
    };
    assert!(matches!(
        scanner.search(&SearchContext::background(), &bad_include, &archive),
        Err(SearchError::InvalidPathPattern(_))
    ));
    Ok(())
}
