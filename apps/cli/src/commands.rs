//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use glean_core::{
    CredentialStore, EnrichOutcome, EnrichmentClient, EnrichmentCoordinator, EnrichmentObserver,
    EnrichmentState, HighlightRepository,
};
use glean_shared::{AppConfig, Highlight, HighlightId, NewHighlight, init_config, load_config};
use glean_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Glean: keep the text worth keeping.
#[derive(Parser)]
#[command(
    name = "glean",
    version,
    about = "Save text highlights from the web and summarize them with Gemini.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `[storage] path`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

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
    /// Save a highlight.
    Save {
        /// The selected text.
        text: String,

        /// Absolute URL of the page the text came from.
        #[arg(short, long)]
        url: String,

        /// Title of the page.
        #[arg(short, long, default_value = "")]
        title: String,
    },

    /// List saved highlights, newest first.
    List {
        /// Print the stored records as JSON (oldest first).
        #[arg(long)]
        json: bool,
    },

    /// Delete a highlight.
    Delete {
        /// Highlight id.
        id: HighlightId,
    },

    /// Summarize a highlight in one sentence and store the summary.
    Summarize {
        /// Highlight id.
        id: HighlightId,
    },

    /// Manage the Gemini API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// API key subcommands.
#[derive(Subcommand)]
pub(crate) enum KeyAction {
    /// Store a Google Gemini API key.
    Set {
        /// The API key.
        key: String,
    },
    /// Forget the stored API key.
    Remove,
    /// Show whether a key is stored.
    Status,
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

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "glean=info",
        1 => "glean=debug",
        _ => "glean=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Save { text, url, title } => cmd_save(db, &text, &url, title).await,
        Command::List { json } => cmd_list(db, json).await,
        Command::Delete { id } => cmd_delete(db, id).await,
        Command::Summarize { id } => cmd_summarize(db, id).await,
        Command::Key { action } => match action {
            KeyAction::Set { key } => cmd_key_set(db, &key).await,
            KeyAction::Remove => cmd_key_remove(db).await,
            KeyAction::Status => cmd_key_status(db).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(db).await,
        },
    }
}

/// Loaded config plus the opened highlight database.
struct Session {
    config: AppConfig,
    store: Arc<Storage>,
}

impl Session {
    async fn open(db: Option<PathBuf>) -> Result<Self> {
        let config = resolved_config(db)?;
        let path = config.storage.resolved_path()?;
        let store = Arc::new(Storage::open(&path).await?);
        Ok(Self { config, store })
    }

    fn repository(&self) -> Arc<HighlightRepository<Storage>> {
        Arc::new(HighlightRepository::new(Arc::clone(&self.store)))
    }

    fn credentials(&self) -> CredentialStore<Storage> {
        CredentialStore::new(Arc::clone(&self.store))
    }
}

/// Config file values with CLI overrides applied.
fn resolved_config(db: Option<PathBuf>) -> Result<AppConfig> {
    Ok(apply_overrides(load_config()?, db))
}

fn apply_overrides(mut config: AppConfig, db: Option<PathBuf>) -> AppConfig {
    if let Some(path) = db {
        config.storage.path = path.to_string_lossy().into_owned();
    }
    config
}

// ---------------------------------------------------------------------------
// Highlight commands
// ---------------------------------------------------------------------------

async fn cmd_save(db: Option<PathBuf>, text: &str, url: &str, title: String) -> Result<()> {
    let date = chrono::Local::now().format("%-m/%-d/%Y").to_string();
    let new = NewHighlight::from_capture(text, url, title, date)?;

    let session = Session::open(db).await?;
    let highlight = session.repository().create(new).await?;

    println!("Saved highlight {}", highlight.id);
    Ok(())
}

async fn cmd_list(db: Option<PathBuf>, json: bool) -> Result<()> {
    let session = Session::open(db).await?;
    let highlights = session.repository().list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&highlights)?);
        return Ok(());
    }

    if highlights.is_empty() {
        println!("No highlights saved yet.");
        println!("Save one with: glean save \"<text>\" --url <page url>");
        return Ok(());
    }

    for highlight in highlights.iter().rev() {
        print_highlight(highlight);
    }
    Ok(())
}

fn print_highlight(highlight: &Highlight) {
    println!();
    for line in highlight_lines(highlight) {
        println!("  {line}");
    }
}

/// Display lines for one highlight in the list view.
fn highlight_lines(highlight: &Highlight) -> Vec<String> {
    let host = highlight.hostname().unwrap_or_else(|| highlight.url.clone());
    let mut lines = vec![format!("[{}] {host} · {}", highlight.id, highlight.date)];
    if !highlight.title.is_empty() {
        lines.push(highlight.title.clone());
    }
    lines.push(highlight.url.clone());
    lines.push(highlight.text.clone());
    if let Some(summary) = &highlight.summary {
        lines.push(format!("✨ {summary}"));
    }
    lines
}

async fn cmd_delete(db: Option<PathBuf>, id: HighlightId) -> Result<()> {
    let session = Session::open(db).await?;
    if session.repository().delete(id).await? {
        println!("Deleted highlight {id}");
    } else {
        println!("No highlight with id {id}");
    }
    Ok(())
}

async fn cmd_summarize(db: Option<PathBuf>, id: HighlightId) -> Result<()> {
    let session = Session::open(db).await?;
    let repository = session.repository();

    let highlight = repository
        .get(id)
        .await?
        .ok_or_else(|| eyre!("no highlight with id {id}"))?;

    let client = EnrichmentClient::new(&session.config.gemini)?;
    let coordinator = EnrichmentCoordinator::new(repository, client);

    info!(%id, "summarizing highlight");
    let observer = CliObserver::new();
    let outcome = coordinator.enrich(id, &highlight.text, &observer).await;
    observer.finish();

    match outcome? {
        EnrichOutcome::Succeeded { summary } => println!("✨ {summary}"),
        EnrichOutcome::Failed { message, .. } => {
            eprintln!("{message}");
            std::process::exit(1);
        }
        EnrichOutcome::AlreadyRequesting => {
            println!("A summary for {id} is already being generated.")
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI enrichment observer
// ---------------------------------------------------------------------------

/// Spinner shown while a summary is being generated.
struct CliObserver {
    spinner: ProgressBar,
}

impl CliObserver {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl EnrichmentObserver for CliObserver {
    fn state_changed(&self, _id: HighlightId, state: &EnrichmentState) {
        match state {
            EnrichmentState::Requesting => {
                self.spinner.set_message("Thinking...");
                self.spinner
                    .enable_steady_tick(std::time::Duration::from_millis(80));
            }
            EnrichmentState::Idle => {}
            EnrichmentState::Succeeded(_) | EnrichmentState::Failed(_) => {
                self.spinner.finish_and_clear();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Key commands
// ---------------------------------------------------------------------------

async fn cmd_key_set(db: Option<PathBuf>, key: &str) -> Result<()> {
    let session = Session::open(db).await?;
    session.credentials().set(key).await?;
    println!("API key saved.");
    Ok(())
}

async fn cmd_key_remove(db: Option<PathBuf>) -> Result<()> {
    let session = Session::open(db).await?;
    session.credentials().remove().await?;
    println!("API key removed.");
    Ok(())
}

async fn cmd_key_status(db: Option<PathBuf>) -> Result<()> {
    let session = Session::open(db).await?;
    if session.credentials().is_configured().await? {
        println!("API key: saved");
    } else {
        println!("API key: not set (glean key set <KEY>)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(db: Option<PathBuf>) -> Result<()> {
    let config = resolved_config(db)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_save() {
        let cli = Cli::try_parse_from([
            "glean",
            "save",
            "some text",
            "--url",
            "https://example.com/a",
            "--title",
            "A",
        ])
        .unwrap();
        match cli.command {
            Command::Save { text, url, title } => {
                assert_eq!(text, "some text");
                assert_eq!(url, "https://example.com/a");
                assert_eq!(title, "A");
            }
            _ => panic!("expected save"),
        }
    }

    #[test]
    fn parses_highlight_id_and_global_db() {
        let cli = Cli::try_parse_from(["glean", "summarize", "1700000000000", "--db", "/tmp/x.db"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Command::Summarize { id } => assert_eq!(id, HighlightId(1_700_000_000_000)),
            _ => panic!("expected summarize"),
        }
    }

    #[test]
    fn rejects_non_numeric_id() {
        assert!(Cli::try_parse_from(["glean", "delete", "abc"]).is_err());
    }

    #[test]
    fn db_flag_overrides_storage_path() {
        let config = apply_overrides(AppConfig::default(), Some(PathBuf::from("/tmp/override.db")));
        assert_eq!(config.storage.path, "/tmp/override.db");
    }

    #[test]
    fn list_lines_include_full_source_url() {
        let highlight = Highlight {
            id: HighlightId(1_700_000_000_000),
            text: "Ownership is checked at compile time.".into(),
            url: "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html#rules".into(),
            title: "The Rust Book".into(),
            date: "3/14/2025".into(),
            summary: Some("Rust checks ownership statically.".into()),
        };

        assert_eq!(
            highlight_lines(&highlight),
            vec![
                "[1700000000000] doc.rust-lang.org · 3/14/2025".to_owned(),
                "The Rust Book".into(),
                "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html#rules".into(),
                "Ownership is checked at compile time.".into(),
                "✨ Rust checks ownership statically.".into(),
            ]
        );
    }

    #[test]
    fn no_db_flag_keeps_configured_path() {
        let config = apply_overrides(AppConfig::default(), None);
        assert_eq!(config.storage.path, AppConfig::default().storage.path);
    }
}
