mod config;
mod test_runner;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use engine::Pipeline;
use weave::SourceMap;

use config::Config;

const SUBCOMMANDS: &[&str] = &["expand", "check", "test", "help"];

/// Flags that take a separate value argument. Their values are not the input
/// document even though they do not start with `-`.
const VALUE_FLAGS: &[&str] = &[
    "--log-format",
    "-o",
    "--output",
    "--base-dir",
    "--config",
    "--artifact-dir",
    "--max-include-depth",
];

#[derive(Parser)]
#[command(name = "weave", version, about = "Expand executable Markdown documents")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve includes, run code blocks and write the expanded document
    Expand(ExpandArgs),

    /// Resolve and classify without executing (exit 0 if valid)
    Check(CheckArgs),

    /// Run .test.md test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Root Markdown document
    input: PathBuf,

    /// Directory the root document's includes resolve against
    /// (defaults to the document's own directory)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Config file (defaults to weave.toml next to the input)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum include nesting depth
    #[arg(long)]
    max_include_depth: Option<usize>,
}

impl SourceArgs {
    fn base_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.clone(),
            None => parent_dir(&self.input),
        }
    }

    /// Config file values with command-line overrides applied.
    fn config(&self) -> Result<Config, config::ConfigError> {
        let mut config = config::load(self.config.as_deref(), &self.input)?;
        if let Some(depth) = self.max_include_depth {
            config.expand.max_include_depth = depth;
        }
        Ok(config)
    }
}

#[derive(clap::Args)]
struct ExpandArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Artifact directory, relative to the output file
    #[arg(long)]
    artifact_dir: Option<String>,
}

#[derive(clap::Args)]
struct CheckArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// List every code block with its modifiers
    #[arg(long)]
    list_blocks: bool,

    /// Dump the classified document
    #[arg(long)]
    ast: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `weave doc.md` works like `weave expand doc.md`.
    let mut args: Vec<String> = std::env::args().collect();
    if needs_expand(&args) {
        // Options before the input belong to `expand`, so it goes first.
        args.insert(1, "expand".to_string());
    }

    let cli = Cli::parse_from(&args);
    init_tracing(cli.verbose, cli.log_format);

    let code = match cli.command {
        Command::Expand(expand_args) => do_expand(expand_args, cli.no_color),
        Command::Check(check_args) => do_check(check_args, cli.no_color),
        Command::Test(test_args) => {
            if test_args.list_categories {
                test_runner::list_categories(&test_args.path);
                0
            } else {
                test_runner::run_tests(&test_args.path, cli.no_color, &test_args.category)
            }
        }
    };
    process::exit(code);
}

fn needs_expand(args: &[String]) -> bool {
    match first_positional(args) {
        Some(pos) => !SUBCOMMANDS.contains(&args[pos].as_str()),
        None => false,
    }
}

fn first_positional(args: &[String]) -> Option<usize> {
    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if VALUE_FLAGS.contains(&arg.as_str()) {
            i += 2;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Logs go to stderr so stdout stays free for the expanded document.
fn init_tracing(verbose: u8, format: LogFormat) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn do_expand(args: ExpandArgs, no_color: bool) -> i32 {
    let mut config = match args.source.config() {
        Ok(config) => config,
        Err(e) => return report(&e),
    };
    if let Some(dir) = &args.artifact_dir {
        config.expand.artifact_dir = dir.clone();
    }
    let options = match config.options() {
        Ok(options) => options,
        Err(e) => return report(&e),
    };
    let mut executor = match config.executor() {
        Ok(executor) => executor,
        Err(e) => return report(&e),
    };

    let mut sources = SourceMap::new();
    let pipeline = Pipeline::new(options);
    let expansion = match pipeline.expand(
        &mut sources,
        &args.source.input,
        &args.source.base_dir(),
        &mut executor,
    ) {
        Ok(expansion) => expansion,
        Err(e) => {
            emit_error(&sources, &e, no_color);
            return 1;
        }
    };

    // Artifact references are relative to the output document, so the files
    // land next to it. With stdout they land in the working directory.
    let written = match &args.output {
        Some(output) => {
            let artifact_dir = parent_dir(output).join(&config.expand.artifact_dir);
            expansion.write(output, &artifact_dir)
        }
        None => expansion
            .write_artifacts(Path::new(&config.expand.artifact_dir))
            .map(|_| ()),
    };
    if let Err(e) = written {
        emit_error(&sources, &e, no_color);
        return 1;
    }

    if args.output.is_none() {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(expansion.markdown.as_bytes()) {
            eprintln!("error: cannot write to stdout: {e}");
            return 1;
        }
    }
    0
}

fn do_check(args: CheckArgs, no_color: bool) -> i32 {
    let config = match args.source.config() {
        Ok(config) => config,
        Err(e) => return report(&e),
    };
    let options = match config.options() {
        Ok(options) => options,
        Err(e) => return report(&e),
    };

    let mut sources = SourceMap::new();
    let classified = match Pipeline::new(options).check(
        &mut sources,
        &args.source.input,
        &args.source.base_dir(),
        &config.expand.language,
    ) {
        Ok(classified) => classified,
        Err(e) => {
            emit_error(&sources, &e, no_color);
            return 1;
        }
    };

    if args.ast {
        println!("{:#?}", classified.document());
        return 0;
    }

    if args.list_blocks {
        for block in classified.document().code_blocks() {
            let modifiers = if block.modifiers.is_empty() {
                String::new()
            } else {
                format!(" {}", block.modifiers)
            };
            println!(
                "{:>3}  {}{}  {}",
                block.index,
                block.language.as_deref().unwrap_or("-"),
                modifiers,
                sources.location(&block.span)
            );
        }
        return 0;
    }

    eprintln!(
        "ok: {} ({} blocks)",
        args.source.input.display(),
        classified.block_count()
    );
    0
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn report(error: &config::ConfigError) -> i32 {
    tracing::error!(%error, "configuration failed");
    eprintln!("error: {error}");
    1
}

fn emit_error(sources: &SourceMap, error: &engine::Error, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    let diagnostic = error.to_diagnostic();
    let _ = term::emit_to_write_style(&mut writer.lock(), &config, sources.files(), &diagnostic);
}
