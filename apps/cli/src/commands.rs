//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use chatsplit_core::pipeline::{ConversionRequest, ConversionResult, ProgressReporter};
use chatsplit_core::{ranges, writer};
use chatsplit_shared::{AppConfig, Warning, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// chatsplit: split saved chat conversations into linked Markdown notes.
#[derive(Parser)]
#[command(
    name = "chatsplit",
    version,
    about = "Split saved chat conversations (HTML/MHTML) into linked Markdown notes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert a saved conversation into Markdown pages.
    Convert {
        /// Saved conversation (.html, .mhtml or .mht).
        input: PathBuf,

        /// Output directory (defaults to settings.default_save_path).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Group questions into pages, e.g. "1-3,(8,11-13),5".
        #[arg(short, long)]
        ranges: Option<String>,

        /// Number of the first page.
        #[arg(short, long)]
        start: Option<String>,

        /// Page name prefix (defaults to settings.name_template).
        #[arg(short, long)]
        template: Option<String>,

        /// Write the whole conversation as one file instead of pages.
        #[arg(long)]
        single: bool,

        /// Print a JSON summary instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Check a range expression and print the groups it yields.
    Ranges {
        /// Range expression, e.g. "1-3,(8,11-13),5".
        expr: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "chatsplit=info",
        1 => "chatsplit=debug",
        _ => "chatsplit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert {
            input,
            out,
            ranges,
            start,
            template,
            single,
            json,
        } => cmd_convert(ConvertArgs {
            input,
            out,
            ranges,
            start,
            template,
            single,
            json,
        }),
        Command::Ranges { expr } => cmd_ranges(&expr),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

struct ConvertArgs {
    input: PathBuf,
    out: Option<PathBuf>,
    ranges: Option<String>,
    start: Option<String>,
    template: Option<String>,
    single: bool,
    json: bool,
}

/// Machine-readable result of `convert --json`.
#[derive(Serialize)]
struct ConvertSummary<'a> {
    output_dir: &'a Path,
    files: Vec<String>,
    turns: usize,
    pages: usize,
    start_number: u32,
    warnings: &'a [Warning],
}

fn cmd_convert(args: ConvertArgs) -> Result<()> {
    let config = load_config()?;

    let bytes = std::fs::read(&args.input)
        .map_err(|e| eyre!("cannot read '{}': {e}", args.input.display()))?;
    let html = chatsplit_archive::extract_html(&bytes)?;

    let request = build_request(&config, html, &args)?;
    let output_dir = args
        .out
        .clone()
        .unwrap_or_else(|| expand_home(&config.settings.default_save_path));

    info!(
        input = %args.input.display(),
        out = %output_dir.display(),
        ranges = %request.range_expression,
        "converting conversation"
    );

    let reporter = CliProgress::new(!args.json);
    let result = chatsplit_core::convert(&request, &reporter)?;

    let files = if args.single {
        vec![result.single_file(chrono::Local::now())]
    } else {
        result.page_files()
    };

    reporter.phase("Writing files");
    let published = writer::publish(&output_dir, &files, &reporter);
    reporter.finish();
    let published = published?;

    if args.json {
        let summary = ConvertSummary {
            output_dir: &output_dir,
            files: files.into_iter().map(|f| f.name).collect(),
            turns: result.turns.len(),
            pages: result.pages.len(),
            start_number: result.start_number,
            warnings: &result.warnings,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&result, &output_dir, published.len());
    Ok(())
}

fn build_request(config: &AppConfig, html: String, args: &ConvertArgs) -> Result<ConversionRequest> {
    Ok(ConversionRequest {
        document: html,
        range_expression: args.ranges.clone().unwrap_or_default(),
        keywords: config.keywords(),
        replacements: config.replacements()?,
        name_template: args
            .template
            .clone()
            .unwrap_or_else(|| config.settings.name_template.clone()),
        start_number: args.start.clone().unwrap_or_default(),
        tag_wrap_width: config.settings.tag_string_len,
    })
}

fn print_summary(result: &ConversionResult, output_dir: &Path, file_count: usize) {
    println!();
    println!("  Conversation converted!");
    println!("  Turns:  {}", result.turns.len());
    println!("  Pages:  {}", result.pages.len());
    println!("  Index:  {}.md", result.header_index.name);
    println!("  Files:  {file_count}");
    println!("  Path:   {}", output_dir.display());
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    println!();
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with(['/', '\\']) => &rest[1..],
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn file_written(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {name}"));
    }

    fn done(&self, result: &ConversionResult) {
        self.spinner
            .set_message(format!("Assembled {} pages", result.pages.len()));
    }
}

// ---------------------------------------------------------------------------
// ranges / config
// ---------------------------------------------------------------------------

fn cmd_ranges(expr: &str) -> Result<()> {
    let groups = ranges::parse(expr)?;

    if groups.is_empty() {
        println!("no grouping: one page per question");
        return Ok(());
    }

    for (n, group) in groups.iter().enumerate() {
        let indices: Vec<String> = group.indices().iter().map(usize::to_string).collect();
        println!("page {}: {}", n + 1, indices.join(", "));
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_convert_flags() {
        let cli = Cli::try_parse_from([
            "chatsplit", "-v", "convert", "chat.mhtml", "--ranges", "1-3,(5,7)", "--start", "4",
            "--single",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Command::Convert {
            input,
            ranges,
            start,
            single,
            json,
            ..
        } = cli.command
        else {
            panic!("expected convert");
        };
        assert_eq!(input, PathBuf::from("chat.mhtml"));
        assert_eq!(ranges.as_deref(), Some("1-3,(5,7)"));
        assert_eq!(start.as_deref(), Some("4"));
        assert!(single);
        assert!(!json);
    }

    #[test]
    fn request_prefers_flags_over_config() {
        let mut config = AppConfig::default();
        config.keywords.words = "infra/Server\n".into();
        let args = ConvertArgs {
            input: PathBuf::from("x.html"),
            out: None,
            ranges: Some("2".into()),
            start: None,
            template: Some("chat".into()),
            single: false,
            json: false,
        };

        let request = build_request(&config, "<p>x</p>".into(), &args).unwrap();
        assert_eq!(request.name_template, "chat");
        assert_eq!(request.range_expression, "2");
        assert_eq!(request.start_number, "");
        assert_eq!(request.tag_wrap_width, 5);
        assert_eq!(request.keywords.len(), 1);
    }

    #[test]
    fn expands_home_prefix() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/notes"), home.join("notes"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
    }
}
