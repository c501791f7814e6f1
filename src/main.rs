use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hashline_patcher::summary::FileDiff;
use hashline_patcher::{
    compute_line_hash_with, discover_config, format_anchored, load_from_path, HashMode,
    PatchEngine, PatchSummary, WorkspaceGuard,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hashline-patcher")]
#[command(about = "Hash-anchored line patching for text files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a file with a `<line><hash>|` anchor on every line
    Read {
        /// File to read, relative to the working directory
        file: String,

        /// Working directory (defaults to the current directory)
        #[arg(short, long)]
        cwd: Option<PathBuf>,
    },

    /// Print the fingerprint of a single line of text
    Hash {
        text: String,

        /// Fold case before hashing
        #[arg(short, long)]
        ignore_case: bool,
    },

    /// Apply a patch file (.json or .toml)
    Apply {
        patch: PathBuf,

        /// Working directory (defaults to the current directory)
        #[arg(short, long)]
        cwd: Option<PathBuf>,

        /// Engine settings (defaults to <cwd>/.hashline.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Validate a patch file without touching any target file
    Check { patch: PathBuf },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Read { file, cwd } => cmd_read(&file, cwd),
        Commands::Hash { text, ignore_case } => {
            cmd_hash(&text, ignore_case);
            Ok(())
        }
        Commands::Apply {
            patch,
            cwd,
            config,
            json,
            diff,
        } => cmd_apply(patch, cwd, config, json, diff),
        Commands::Check { patch } => cmd_check(patch),
    }
}

// Logs go to stderr so stdout stays parseable.
fn init_logging() {
    let filter = EnvFilter::try_from_env("HASHLINE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_cwd(cwd: Option<PathBuf>) -> Result<PathBuf> {
    match cwd {
        Some(path) => Ok(path),
        None => env::current_dir().context("could not determine current directory"),
    }
}

fn cmd_read(file: &str, cwd: Option<PathBuf>) -> Result<()> {
    let cwd = resolve_cwd(cwd)?;
    let guard = WorkspaceGuard::new(&cwd, &[])?;
    let path = guard.resolve(file)?;
    let content =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    print!("{}", format_anchored(&content));
    Ok(())
}

fn cmd_hash(text: &str, ignore_case: bool) {
    let mode = if ignore_case {
        HashMode::CaseInsensitive
    } else {
        HashMode::CaseSensitive
    };
    println!("{}", compute_line_hash_with(text, mode));
}

fn cmd_apply(
    patch_file: PathBuf,
    cwd: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
    show_diff: bool,
) -> Result<()> {
    let cwd = resolve_cwd(cwd)?;
    let config = discover_config(config.as_deref(), &cwd)?;
    let patch = load_from_path(&patch_file)?;

    let engine = PatchEngine::new(&cwd, config)?;
    let summary = engine.apply(&patch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, show_diff);
    }

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_check(patch_file: PathBuf) -> Result<()> {
    let patch = load_from_path(&patch_file)?;

    let mut invalid = 0;
    for (idx, hunk) in patch.hunks.iter().enumerate() {
        match hunk.validate(idx) {
            Ok(()) => println!("{} {} {}", "✓".green(), hunk.kind(), hunk.file_path()),
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                invalid += 1;
            }
        }
    }

    println!();
    if invalid > 0 {
        eprintln!("{}", format!("{invalid} invalid hunk(s)").red().bold());
        std::process::exit(1);
    }
    println!(
        "{}",
        format!("{} hunk(s) OK", patch.hunks.len()).green().bold()
    );
    Ok(())
}

fn print_summary(summary: &PatchSummary, show_diff: bool) {
    for (status, path) in summary.statuses() {
        println!("{} {}", status.code().green(), path);
    }
    for path in &summary.live {
        println!(
            "{} {}: anchors drifted but were relocated; re-read before editing again",
            "live".yellow(),
            path
        );
    }
    for noop in &summary.noops {
        println!(
            "{} {}:{}: {}",
            "no-op".cyan(),
            noop.path,
            noop.line,
            noop.reason
        );
    }
    for failure in &summary.failed {
        let location = match failure.chunk {
            Some(chunk) => format!("hunk {}, chunk {}", failure.hunk, chunk),
            None => format!("hunk {}", failure.hunk),
        };
        eprintln!(
            "{} {} ({}): {}",
            "✗".red(),
            failure.path,
            location,
            failure.error
        );
        if let Some(expected) = &failure.expected {
            eprintln!("  {}", "expected:".dimmed());
            for line in expected {
                eprintln!("    {}", line.red());
            }
        }
        if let Some(actual) = &failure.actual {
            eprintln!("  {}", "actual:".dimmed());
            for line in actual {
                eprintln!("    {}", line.green());
            }
        }
        if let Some(suggest) = &failure.suggest {
            let anchors: Vec<String> = suggest.iter().map(ToString::to_string).collect();
            eprintln!("  {} {}", "suggest:".cyan(), anchors.join(" "));
        }
    }

    if show_diff {
        for diff in &summary.diffs {
            display_diff(diff);
        }
    }

    println!();
    println!("Summary:");
    println!(
        "  {} created, {} edited, {} moved, {} deleted",
        summary.created.len().to_string().green(),
        summary.edited.len().to_string().green(),
        summary.moved.len().to_string().green(),
        summary.deleted.len().to_string().green()
    );
    if !summary.failed.is_empty() {
        println!("  {} failed", summary.failed.len().to_string().red());
    }
}

fn display_diff(diff: &FileDiff) {
    println!();
    for line in diff.diff.lines() {
        let styled = if line.starts_with("---") || line.starts_with("+++") {
            line.dimmed()
        } else if line.starts_with("@@") {
            line.cyan()
        } else if line.starts_with('-') {
            line.red()
        } else if line.starts_with('+') {
            line.green()
        } else {
            line.normal()
        };
        println!("{}", styled);
    }
}
