use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use snapgrep::{
    CliOverrides, EncodingMode, FileMatch, LineMatch, PatternSpec, ScanConfig, ScanOutput,
    ScanStatus, Scanner, SearchContext,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod loader;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML), layered over the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliSearchConfig {
    /// Pattern to search for; empty matches every file
    #[arg(short = 'p', long = "pattern", default_value = "")]
    pattern: String,

    /// Treat the pattern as a regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Match case exactly
    #[arg(short = 's', long)]
    case_sensitive: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    word: bool,

    /// Only search paths matching this pattern (repeatable; all must match)
    #[arg(short = 'i', long)]
    include: Vec<String>,

    /// Skip paths matching this pattern
    #[arg(short = 'x', long)]
    exclude: Option<String>,

    /// Path patterns are regular expressions instead of globs
    #[arg(long)]
    path_regex: bool,

    /// Path patterns match case exactly
    #[arg(long)]
    path_case_sensitive: bool,

    /// Also report files whose path matches the pattern
    #[arg(long)]
    paths: bool,

    /// Do not match file contents (use with --paths)
    #[arg(long)]
    no_content: bool,

    /// Maximum number of matching files (0 for the configured ceiling)
    #[arg(short = 'l', long, default_value = "0")]
    limit: i64,

    /// Give up after this long, e.g. "2s" or "500ms"
    #[arg(short = 't', long)]
    timeout: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Show only statistics, not matches
    #[arg(long)]
    stats: bool,

    /// Root directory to search in
    #[arg(short = 'd', long, default_value = ".")]
    root: PathBuf,

    /// Number of workers
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// How to handle invalid UTF-8 in matched lines (failfast|lossy)
    #[arg(long)]
    encoding: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search files under a directory
    Search(Box<CliSearchConfig>),

    /// Print the effective configuration as YAML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ScanConfig::load_from(cli.config.as_deref())
        .with_context(|| "failed to load configuration")?;

    match cli.command {
        Commands::Search(args) => {
            let encoding_mode = args.encoding.as_deref().map(parse_encoding).transpose()?;
            let config = config.merge_with_cli(CliOverrides {
                num_workers: args.threads,
                timeout: args.timeout.clone(),
                encoding_mode,
                log_level: cli.log_level,
            });
            init_logging(&config.log_level);
            config.validate()?;
            search(config, &args)
        }
        Commands::Config => {
            let config = config.merge_with_cli(CliOverrides {
                log_level: cli.log_level,
                ..CliOverrides::default()
            });
            config.validate()?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_encoding(value: &str) -> anyhow::Result<EncodingMode> {
    match value.to_lowercase().as_str() {
        "lossy" => Ok(EncodingMode::Lossy),
        "failfast" => Ok(EncodingMode::FailFast),
        other => bail!("unknown encoding mode {other:?} (expected failfast or lossy)"),
    }
}

fn search(config: ScanConfig, args: &CliSearchConfig) -> anyhow::Result<()> {
    let ctx = match config.timeout_duration()? {
        Some(timeout) => SearchContext::with_timeout(timeout),
        None => SearchContext::background(),
    };

    let archive = loader::load_archive(&args.root, config.max_file_size)
        .with_context(|| format!("failed to read {}", args.root.display()))?;

    let spec = PatternSpec {
        pattern: args.pattern.clone(),
        is_regexp: args.regex,
        is_case_sensitive: args.case_sensitive,
        is_word_match: args.word,
        include_patterns: args.include.clone(),
        exclude_pattern: args.exclude.clone(),
        path_patterns_are_regexps: args.path_regex,
        path_patterns_are_case_sensitive: args.path_case_sensitive,
        file_match_limit: args.limit,
        pattern_matches_content: !args.no_content,
        pattern_matches_path: args.paths,
    };
    debug!("Searching {} files with {:?}", archive.len(), spec);

    let scanner = Scanner::new(config)?;
    let mut output = scanner.search(&ctx, &spec, &archive)?;
    output.sort_by_path();
    scanner.metrics().log_stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_search_results(&output, args.stats);
    }
    Ok(())
}

fn print_search_results(output: &ScanOutput, stats_only: bool) {
    if !stats_only {
        for file_match in &output.matches {
            print_file_match(file_match);
        }
    }

    println!(
        "\nFound {} matches in {} files",
        output.match_count(),
        output.matches.len()
    );
    match output.status {
        ScanStatus::Completed => {}
        ScanStatus::LimitReached => {
            eprintln!("{}", "File limit reached; more matches may exist".yellow())
        }
        ScanStatus::Cancelled => eprintln!("{}", "Search was cancelled".yellow()),
        ScanStatus::DeadlineExceeded => {
            eprintln!("{}", "Search timed out; results are partial".yellow())
        }
    }
}

fn print_file_match(file_match: &FileMatch) {
    println!("\n{}", file_match.path.blue());
    for line in &file_match.line_matches {
        println!(
            "{}: {}",
            (line.line_number + 1).to_string().green(),
            highlight(line)
        );
    }
    if file_match.limit_hit {
        println!("{}", "...".dimmed());
    }
}

/// Renders the preview with matched ranges highlighted. Offsets count
/// characters, not bytes.
fn highlight(line: &LineMatch) -> String {
    let chars: Vec<char> = line.preview.chars().collect();
    let mut out = String::with_capacity(line.preview.len());
    let mut pos = 0;
    for &(offset, len) in &line.offset_and_lengths {
        let start = offset.clamp(pos, chars.len());
        let end = (offset + len).clamp(start, chars.len());
        out.extend(&chars[pos..start]);
        let matched: String = chars[start..end].iter().collect();
        out.push_str(&matched.red().bold().to_string());
        pos = end;
    }
    out.extend(&chars[pos..]);
    out
}
