use clap::{ArgAction, Parser};
use srcgrep::output::Printer;
use srcgrep::types::TypeManager;
use srcgrep::{
    search_with, ColorChoice, RegexEngine, SearchConfig, SearchError, PROGRAM_NAME,
};
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Recursively search source trees for a regex pattern.
#[derive(Parser)]
#[command(name = "srcgrep", author, version, about, long_about = None)]
struct Cli {
    /// Pattern to search for
    #[arg(required_unless_present = "help_types")]
    pattern: Option<String>,

    /// Files or directories to search (default: current directory)
    paths: Vec<PathBuf>,

    /// Case-insensitive matching
    #[arg(short = 'i', long = "ignore-case")]
    ignore_case: bool,

    /// Match whole words only
    #[arg(short = 'w', long = "word-regexp")]
    word_regexp: bool,

    /// Treat the pattern as a literal string
    #[arg(short = 'Q', long = "literal")]
    literal: bool,

    /// Recurse into subdirectories (default)
    #[arg(short = 'r', long = "recurse")]
    #[allow(unused)]
    recurse: bool,

    /// Do not recurse into subdirectories
    #[arg(long = "norecurse")]
    norecurse: bool,

    /// Follow symbolic links
    #[arg(long = "follow")]
    follow: bool,

    /// Do not follow symbolic links (default)
    #[arg(long = "nofollow", conflicts_with = "follow")]
    nofollow: bool,

    /// Number of scanner threads (default: logical CPU count)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<NonZeroUsize>,

    /// Number of traversal threads
    #[arg(long = "dirjobs", value_name = "N")]
    dirjobs: Option<NonZeroUsize>,

    /// Only search files of this type (repeatable; abbreviations allowed)
    #[arg(long = "type", value_name = "NAME", action = ArgAction::Append)]
    types: Vec<String>,

    /// Do not search files of this type
    #[arg(long = "notype", value_name = "NAME", action = ArgAction::Append)]
    no_types: Vec<String>,

    /// Define a file type, replacing any previous definition
    #[arg(long = "type-set", value_name = "NAME:KIND:ARGS", action = ArgAction::Append)]
    type_sets: Vec<String>,

    /// Extend a file type definition
    #[arg(long = "type-add", value_name = "NAME:KIND:ARGS", action = ArgAction::Append)]
    type_adds: Vec<String>,

    /// Remove a file type entirely
    #[arg(long = "type-del", value_name = "NAME", action = ArgAction::Append)]
    type_dels: Vec<String>,

    /// Only search files matching this glob
    #[arg(long = "include", value_name = "GLOB", action = ArgAction::Append)]
    includes: Vec<String>,

    /// Skip files matching this glob
    #[arg(long = "exclude", value_name = "GLOB", action = ArgAction::Append)]
    excludes: Vec<String>,

    /// Skip files matching this filter spec (KIND:ARGS)
    #[arg(long = "ignore-file", value_name = "SPEC", action = ArgAction::Append)]
    ignore_files: Vec<String>,

    /// Skip directories with this base name
    #[arg(long = "ignore-dir", value_name = "NAME", action = ArgAction::Append)]
    ignore_dirs: Vec<String>,

    /// Force styled output
    #[arg(long = "color")]
    color: bool,

    /// Disable styled output
    #[arg(long = "nocolor", conflicts_with = "color")]
    nocolor: bool,

    /// Select the regex backend
    #[arg(long = "regex-engine", value_name = "NAME", default_value = "default")]
    regex_engine: String,

    /// List the known file types and exit
    #[arg(long = "help-types")]
    help_types: bool,

    /// Read options from this config file
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print a run summary to stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{PROGRAM_NAME}: error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool, SearchError> {
    if cli.help_types {
        let types = TypeManager::new();
        print!("{}", types.describe_types());
        return Ok(true);
    }

    let config = build_config(cli.config.as_deref(), &cli)?;
    let verbose = cli.verbose;
    let color = config.color.enabled();

    let stdout = io::stdout();
    let mut printer = Printer::new(BufWriter::new(stdout.lock()), color);
    let mut print_error: Option<io::Error> = None;

    let summary = search_with(&config, |group| {
        if print_error.is_none() {
            if let Err(e) = printer.print_group(&group) {
                print_error = Some(e);
            }
        }
    })?;
    if let Some(e) = print_error {
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(SearchError::Io(e));
        }
    } else {
        printer.flush().map_err(SearchError::Io)?;
    }

    if verbose {
        print_summary(&summary);
    }

    Ok(summary.any_matches())
}

fn build_config(config_path: Option<&std::path::Path>, cli: &Cli) -> Result<SearchConfig, SearchError> {
    let file_config = SearchConfig::load_from(config_path)
        .map_err(|e| SearchError::config_error(e.to_string()))?;

    let regex_engine: RegexEngine = cli
        .regex_engine
        .parse()
        .map_err(SearchError::Config)?;

    let mut cli_config = SearchConfig::default();
    cli_config.pattern = cli.pattern.clone().unwrap_or_default();
    if !cli.paths.is_empty() {
        cli_config.paths = cli.paths.clone();
    }
    cli_config.ignore_case = cli.ignore_case;
    cli_config.word_regexp = cli.word_regexp;
    cli_config.literal = cli.literal;
    cli_config.recurse = !cli.norecurse;
    cli_config.follow_symlinks = cli.follow && !cli.nofollow;
    if let Some(jobs) = cli.jobs {
        cli_config.jobs = jobs;
    }
    if let Some(dirjobs) = cli.dirjobs {
        cli_config.dir_jobs = dirjobs;
    }
    cli_config.types = cli.types.clone();
    cli_config.no_types = cli.no_types.clone();
    cli_config.type_sets = cli.type_sets.clone();
    cli_config.type_adds = cli.type_adds.clone();
    cli_config.type_dels = cli.type_dels.clone();
    cli_config.includes = cli.includes.clone();
    cli_config.excludes = cli.excludes.clone();
    cli_config.ignore_files = cli.ignore_files.clone();
    cli_config.ignore_dirs = cli.ignore_dirs.clone();
    cli_config.color = if cli.color {
        ColorChoice::Always
    } else if cli.nocolor {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    cli_config.regex_engine = regex_engine;

    Ok(file_config.merge_with_cli(cli_config))
}

fn print_summary(summary: &srcgrep::SearchSummary) {
    let mut err = io::stderr().lock();
    let _ = writeln!(err, "{PROGRAM_NAME}: summary:");
    let _ = writeln!(
        err,
        "  files scanned:   {} ({} bytes read)",
        summary.scan.files_scanned, summary.scan.bytes_read
    );
    let _ = writeln!(
        err,
        "  files matched:   {} ({} lines, {} matches)",
        summary.files_with_matches, summary.matched_lines, summary.total_matches
    );
    let _ = writeln!(
        err,
        "  dirs walked:     {} found, {} pruned ({} dot-dirs pruned)",
        summary.walk.dirs_found, summary.walk.dirs_rejected, summary.walk.dotdirs_rejected
    );
    let _ = writeln!(
        err,
        "  files filtered:  {} found, {} rejected",
        summary.walk.files_found, summary.walk.files_rejected
    );
    let _ = writeln!(
        err,
        "  stat calls:      {} required, {} avoided, {} first-line probes",
        summary.walk.stats_required, summary.walk.stats_avoided, summary.walk.first_line_probes
    );
    let _ = writeln!(
        err,
        "  elapsed:         {:.3}s",
        summary.elapsed.as_secs_f64()
    );
}
