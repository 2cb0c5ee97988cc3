use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use treefind::outline::load_outline;
use treefind::{
    AnchorKind, MatchMode, Outcome, SearchDirection, SearchOptions, SearchScope, SearchSession,
};

/// Find (and optionally replace) a pattern across a tab-indented outline of
/// notes: one node per line, `Name: text`, tabs for children.
#[derive(Debug, Parser)]
#[command(name = "treefind", version)]
struct Cli {
    /// Outline file to search
    file: PathBuf,

    /// Pattern to look for
    pattern: String,

    /// Treat the pattern as a regular expression
    #[arg(long)]
    regex: bool,

    /// Case-sensitive matching
    #[arg(long)]
    match_case: bool,

    /// Match whole words only (literal patterns)
    #[arg(long, conflicts_with = "start_word")]
    whole_word: bool,

    /// Match at word starts only (literal patterns)
    #[arg(long)]
    start_word: bool,

    /// Ignore diacritics on both pattern and text
    #[arg(long)]
    accent_insensitive: bool,

    /// Search backward through the tree
    #[arg(long)]
    backward: bool,

    /// Also match node names and tags
    #[arg(long)]
    names: bool,

    /// Search nodes flagged as excluded too
    #[arg(long)]
    override_exclusions: bool,

    /// Replace every hit with this text ($1-style groups with --regex)
    #[arg(long)]
    replace: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("treefind: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let mut tree = load_outline(&cli.file).map_err(|e| e.to_string())?;

    let mut options = SearchOptions::new(&cli.pattern);
    options.is_regex = cli.regex;
    options.match_case = cli.match_case;
    options.whole_word = cli.whole_word;
    options.start_word = cli.start_word;
    options.accent_insensitive = cli.accent_insensitive;
    options.node_name_and_tags = cli.names;
    options.override_exclusions = cli.override_exclusions;
    options.match_mode = MatchMode::AllMatches;
    options.direction = if cli.backward {
        SearchDirection::Backward
    } else {
        SearchDirection::Forward
    };

    let mut session = SearchSession::new();
    session.set_progress_callback(|processed, total, matches| {
        log::debug!("progress: {processed}/{total} nodes, {matches} matches");
    });

    let scope = SearchScope::WholeTree { start: None };
    let outcome = match &cli.replace {
        Some(replacement) => {
            options.replacement = replacement.clone();
            session.start_replace(&mut tree, options, scope)
        }
        None => session.start_search(&mut tree, options, scope),
    };

    match outcome {
        Outcome::NoMatches => {
            println!("the pattern '{}' was not found", cli.pattern);
            Ok(ExitCode::SUCCESS)
        }
        Outcome::AllFound(records) => {
            for record in &records {
                let location = match record.anchor_kind {
                    AnchorKind::None => format!("{}", record.line_number),
                    kind => format!("{} [{}]", record.line_number, kind.as_str()),
                };
                println!("{}:{}: {}", record.node_path, location, record.line_content);
            }
            println!("{} matches", records.len());
            Ok(ExitCode::SUCCESS)
        }
        Outcome::SingleFound(record) => {
            println!(
                "{}:{}: {}",
                record.node_path, record.line_number, record.line_content
            );
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Error(err) => Err(err.to_string()),
    }
}
