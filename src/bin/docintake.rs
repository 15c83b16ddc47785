//! CLI binary for docintake.
//!
//! A thin shim over the library crate: one-shot extraction, handoff token
//! inspection, and a line-based chat session against the dialog engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docintake::handoff::{decode_token_value, token_from_url};
use docintake::{
    extract_file, Attachment, DialogEngine, DialogProgressCallback, Event, FailureKind, FieldKey,
    HandoffEncoder, IntakeConfig, MemorySink, RecordSink, Reply, RestSink, Role, UserId,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Shows a spinner while a document is in the extraction pipeline.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn finish(&self, line: String) {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut b| b.take()) {
            bar.finish_and_clear();
        }
        eprintln!("{line}");
    }
}

impl DialogProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, _user_id: UserId, role: Role) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message(format!("⏳ Analysing document ({role} data)…"));
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_extraction_complete(&self, _user_id: UserId, filled: usize) {
        self.finish(format!("{} {} fields extracted", green("✓"), filled));
    }

    fn on_extraction_failed(&self, _user_id: UserId, kind: FailureKind) {
        self.finish(format!("{} {}", red("✗"), kind));
    }

    fn on_stale_result(&self, _user_id: UserId) {
        self.finish(dim("result discarded (session moved on)"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract the sender's company data from an invoice photo
  docintake extract invoice.jpg

  # Extract the client from a PDF, as JSON
  docintake extract --role client order.pdf --json

  # Show what a confirmation link carries
  docintake decode 'http://localhost:8080/settings.html?data=eyJjb21w...'

  # Interactive dialog, records kept in memory
  docintake chat

CHAT INPUT:
  /profile, /create, /settings, /cancel, /help   commands
  :doc <path>                                    send a photo or PDF
  :form <json>                                   submit the confirmation form
  :confirm                                       submit the last link's data unchanged
  :quit                                          leave

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (anthropic, openai, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  DOCINTAKE_STORE_URL     PostgREST base URL for the chat sink
  DOCINTAKE_STORE_KEY     PostgREST API key
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
"#;

/// Extract company details from invoices and documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docintake",
    version,
    about = "Extract company details from invoice photos and PDFs using LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM model ID.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama.
    #[arg(long, global = true, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "DOCINTAKE_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "DOCINTAKE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Profile confirmation form address.
    #[arg(long, global = true, env = "DOCINTAKE_PROFILE_FORM_URL")]
    profile_form_url: Option<String>,

    /// Invoice confirmation form address.
    #[arg(long, global = true, env = "DOCINTAKE_INVOICE_FORM_URL")]
    invoice_form_url: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCINTAKE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCINTAKE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the canonical fields from one photo or PDF.
    Extract {
        /// Image (jpeg, png, gif, webp) or PDF file.
        file: PathBuf,

        /// Whose details to extract.
        #[arg(long, value_enum, default_value = "sender")]
        role: RoleArg,

        /// Print the fields as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Decode a handoff token or link.
    Decode {
        /// Token or full confirmation URL.
        token: String,
    },
    /// Run the dialog on stdin/stdout.
    Chat {
        /// Chat user identifier.
        #[arg(long, default_value_t = 1)]
        user_id: UserId,

        /// Stop a flow after this many failed documents.
        #[arg(long, env = "DOCINTAKE_MAX_ATTEMPTS")]
        max_attempts: Option<u32>,

        /// PostgREST base URL; records stay in memory when unset.
        #[arg(long, env = "DOCINTAKE_STORE_URL")]
        store_url: Option<String>,

        /// PostgREST API key.
        #[arg(long, env = "DOCINTAKE_STORE_KEY", hide_env_values = true)]
        store_key: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Sender,
    Client,
}

impl From<RoleArg> for Role {
    fn from(v: RoleArg) -> Self {
        match v {
            RoleArg::Sender => Role::Sender,
            RoleArg::Client => Role::Client,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Decode { ref token } => decode(token),
        Command::Extract {
            ref file,
            role,
            json,
        } => {
            let config = build_config(&cli, None)?;
            extract(&cli, &config, file, role.into(), json).await
        }
        Command::Chat {
            user_id,
            max_attempts,
            ref store_url,
            ref store_key,
        } => {
            let config = build_config(&cli, max_attempts)?;
            let sink = build_sink(store_url.as_deref(), store_key.as_deref(), &config)?;
            chat(&cli, &config, sink, user_id).await
        }
    }
}

/// Map CLI args to `IntakeConfig`.
fn build_config(cli: &Cli, max_attempts: Option<u32>) -> Result<IntakeConfig> {
    let mut builder = IntakeConfig::builder()
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref url) = cli.profile_form_url {
        builder = builder.profile_form_url(url);
    }
    if let Some(ref url) = cli.invoice_form_url {
        builder = builder.invoice_form_url(url);
    }
    if let Some(n) = max_attempts {
        builder = builder.max_document_attempts(n);
    }
    builder.build().context("Invalid configuration")
}

fn build_sink(
    store_url: Option<&str>,
    store_key: Option<&str>,
    config: &IntakeConfig,
) -> Result<Arc<dyn RecordSink>> {
    match (store_url, store_key) {
        (Some(url), Some(key)) => {
            let sink = RestSink::new(url, key, Duration::from_secs(config.api_timeout_secs))
                .context("Failed to set up the record store")?;
            Ok(Arc::new(sink))
        }
        (Some(_), None) => bail!("--store-url needs --store-key (or DOCINTAKE_STORE_KEY)"),
        _ => Ok(Arc::new(MemorySink::new())),
    }
}

fn decode(input: &str) -> Result<()> {
    let token = token_from_url(input).unwrap_or_else(|| input.to_string());
    let value = decode_token_value(&token).context("Not a handoff token")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("Failed to serialise payload")?
    );
    Ok(())
}

async fn extract(
    cli: &Cli,
    config: &IntakeConfig,
    file: &Path,
    role: Role,
    json: bool,
) -> Result<()> {
    let spinner = (!cli.quiet && !json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_message(format!("Reading {role} data from {}…", file.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = extract_file(file, role, config).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let extraction = result.with_context(|| format!("Extraction failed for {}", file.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&extraction.fields)
                .context("Failed to serialise fields")?
        );
        return Ok(());
    }

    for key in FieldKey::ALL {
        match extraction.fields.get(key) {
            Some(v) => println!("{:<13} {}", key.as_str(), v),
            None => println!("{:<13} {}", key.as_str(), dim("—")),
        }
    }
    let encoder = HandoffEncoder::from_config(config).context("Invalid form URL")?;
    let link = match role {
        Role::Sender => encoder.profile_link(&extraction.fields),
        Role::Client => encoder.invoice_link(&extraction.fields, role),
    }
    .context("Failed to build confirmation link")?;
    println!("\n{} {}", cyan("↗"), link.url);

    if !cli.quiet {
        eprintln!(
            "{}  {}/{} fields  model {}ms  total {}ms",
            green("✔"),
            extraction.fields.filled(),
            FieldKey::ALL.len(),
            extraction.model_ms,
            extraction.total_ms
        );
    }
    Ok(())
}

async fn chat(
    cli: &Cli,
    config: &IntakeConfig,
    sink: Arc<dyn RecordSink>,
    user_id: UserId,
) -> Result<()> {
    let mut engine =
        DialogEngine::from_config(config, sink).context("Failed to set up the dialog engine")?;
    if !cli.quiet {
        engine = engine.with_progress(CliProgressCallback::new());
    }

    if !cli.quiet {
        eprintln!("{} {}", cyan("◆"), dim("type /help for commands, :quit to leave"));
    }

    let stdin = io::stdin();
    let mut last_link: Option<String> = None;
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match chat_event(line, last_link.as_deref()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{} {e:#}", red("✗"));
                continue;
            }
        };

        for reply in engine.handle(user_id, event).await {
            print_reply(&reply);
            if let Reply::Link { ref url, .. } = reply {
                last_link = Some(url.clone());
            }
        }
        io::stdout().flush().ok();
    }
    Ok(())
}

/// `Ok(None)` ends the session.
async fn chat_event(line: &str, last_link: Option<&str>) -> Result<Option<Event>> {
    if line == ":quit" {
        return Ok(None);
    }
    if let Some(path) = line.strip_prefix(":doc ") {
        let attachment = Attachment::from_path(path.trim())
            .await
            .with_context(|| format!("Cannot read {path}"))?;
        return Ok(Some(Event::Attachment(attachment)));
    }
    if let Some(json) = line.strip_prefix(":form ") {
        return Ok(Some(Event::FormSubmitted(json.trim().to_string())));
    }
    if line == ":confirm" {
        let token = last_link
            .and_then(token_from_url)
            .context("No confirmation link yet")?;
        let payload = decode_token_value(&token)?.to_string();
        return Ok(Some(Event::FormSubmitted(payload)));
    }
    Ok(Some(Event::from_text(line)))
}

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Text(text) => println!("{text}"),
        Reply::Link { text, url } => {
            println!("{text}");
            println!("  {} {}", cyan("↗"), url);
        }
        Reply::Failure { text, .. } => println!("{}", red(text)),
    }
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
    fn documented_env_vars_match_flags() {
        let command = Cli::command();
        for arg in command.get_arguments() {
            if let Some(env) = arg.get_env().and_then(|e| e.to_str()) {
                if env.starts_with("EDGEQUAKE_") {
                    assert!(AFTER_HELP.contains(env), "{env} missing from help text");
                }
            }
        }
        let provider = command
            .get_arguments()
            .find(|a| a.get_id().as_str() == "provider")
            .unwrap();
        assert_eq!(
            provider.get_env().and_then(|e| e.to_str()),
            Some("EDGEQUAKE_LLM_PROVIDER")
        );
    }

    #[tokio::test]
    async fn chat_commands_map_to_events() {
        assert!(chat_event(":quit", None).await.unwrap().is_none());
        assert!(matches!(
            chat_event(":form {\"a\":1}", None).await.unwrap(),
            Some(Event::FormSubmitted(_))
        ));
        assert!(chat_event(":confirm", None).await.is_err());
    }
}
