//! Command-line front-end: scan text for PII and optionally mask it.

use anyhow::{Context, Result};
use clap::Parser;
use spicy_mask::{DetectionContext, DetectionEngine, GuardConfig, Trigger};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Scan text for personally identifiable information
///
/// Reads text from a file or stdin, prints the detected spans as JSON, or
/// prints the masked text with --mask.
#[derive(Parser, Debug)]
#[command(name = "spicy-mask")]
#[command(version, about, long_about = None)]
struct Args {
    /// File to scan (stdin when omitted)
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, short, env = "SPICY_MASK_CONFIG")]
    config: Option<PathBuf>,

    /// Locale whose region is tried first for phone numbers (e.g. en-US)
    #[arg(long, env = "SPICY_MASK_LOCALE")]
    locale: Option<String>,

    /// Character written over masked text
    #[arg(long, env = "SPICY_MASK_CHAR")]
    mask_char: Option<char>,

    /// Literal to always flag (repeatable)
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Literal never to flag (repeatable)
    #[arg(long = "ignore")]
    ignored: Vec<String>,

    /// Print the masked text instead of the match list
    #[arg(long, default_value = "false")]
    mask: bool,

    /// Emit logs as JSON
    #[arg(long, env = "SPICY_MASK_LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Enable verbose debug logging
    #[arg(long, short, env = "VERBOSE", default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr so stdout stays machine-readable
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    if args.log_json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match &args.config {
        Some(path) => GuardConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GuardConfig::default(),
    };
    if let Some(locale) = args.locale.clone() {
        config.locale = Some(locale);
    }
    if let Some(mask_char) = args.mask_char {
        config.mask_char = mask_char;
    }

    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    info!("Scanning {} bytes", text.len());
    info!("  Locale: {:?}", config.locale);
    info!("  Rules: {}", args.rules.len());
    info!("  Ignored: {}", args.ignored.len());

    let engine = DetectionEngine::new(config);
    for rule in args.rules {
        engine.add_rule(rule).await;
    }
    for value in args.ignored {
        engine.ignore(value).await;
    }

    let context = DetectionContext::new("cli");
    let matches = engine.run(&text, &context, Trigger::Auto).await;
    info!("Found {} matches", matches.len());

    if args.mask {
        let masked = engine.mask_text(&text, &matches).await;
        print!("{}", masked.text);
    } else {
        println!("{}", serde_json::to_string_pretty(&matches)?);
    }

    Ok(())
}
