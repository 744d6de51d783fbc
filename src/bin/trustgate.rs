//! Trustgate CLI binary.
//!
//! # Commands
//!
//! - `sanitize` - Run content through the sanitization pipeline
//! - `extract` - Strip threat keys from a JSON payload and escalate
//! - `verify` - Validate a trust token
//! - `keygen` - Print a fresh `TRUST_TOKEN_SECRET`

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use trustgate::{
    audit::{AuditSink, TracingAuditSink},
    Classification, Config, RiskLevel, SanitizationPipeline, SanitizeMode, SanitizeOptions,
    SigningKey, ThreatKeyExtractor, TrustToken, TrustTokenIntegrity, VERSION,
};

#[derive(Parser)]
#[command(name = "trustgate")]
#[command(version = VERSION)]
#[command(about = "Trustgate - Zero-trust content sanitization", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/trustgate/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sanitize text or JSON
    Sanitize {
        /// Input (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Parse input as JSON and sanitize structurally
        #[arg(long)]
        json: bool,

        /// Destination classification (llm, non-llm, unclear)
        #[arg(long, default_value = "unclear")]
        classification: String,

        /// Caller risk level (low, medium, high, unset)
        #[arg(long, default_value = "unset")]
        risk_level: String,

        /// Caller confidence in [0, 1]
        #[arg(long, default_value_t = 0.0)]
        risk_score: f64,

        /// Trigger reasons (repeatable)
        #[arg(long = "trigger")]
        triggers: Vec<String>,

        /// Mode (standard, final)
        #[arg(long)]
        mode: Option<String>,

        /// Mint a trust token over the result
        #[arg(long)]
        token: bool,

        /// Trust token JSON file presented by an upstream stage
        #[arg(long, value_name = "FILE")]
        presented_token: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Show pipeline statistics on stderr
        #[arg(long)]
        stats: bool,
    },

    /// Extract threat keys and escalate
    Extract {
        /// JSON input (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Job id used for the escalation id
        #[arg(long, default_value = "cli")]
        job_id: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a trust token
    Verify {
        /// Token JSON (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Generate a random signing secret
    Keygen {
        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Sanitize {
            input,
            file,
            output,
            json,
            classification,
            risk_level,
            risk_score,
            triggers,
            mode,
            token,
            presented_token,
            pretty,
            stats,
        } => {
            let config = load_config(cli.config)?;
            let mut options = SanitizeOptions::new()
                .classification(classification.parse::<Classification>()?)
                .risk(risk_level.parse::<RiskLevel>()?, risk_score);
            options.triggers = triggers;
            if let Some(mode) = mode {
                options = options.mode(mode.parse::<SanitizeMode>()?);
            }
            if token {
                options = options.with_trust_token();
            }
            if let Some(path) = presented_token {
                options = options.presenting(TrustToken::from_json(&std::fs::read_to_string(path)?)?);
            }
            cmd_sanitize(config, read_input(input, file)?, output, json, &options, pretty, stats)
        },

        Commands::Extract {
            input,
            file,
            job_id,
            pretty,
        } => cmd_extract(read_input(input, file)?, &job_id, pretty),

        Commands::Verify { input, file } => {
            cmd_verify(&load_config(cli.config)?, &read_input(input, file)?)
        },

        Commands::Keygen { output } => write_output(output, &SigningKey::generate_secret()),
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            let merged = Config::from_file(path)?.merge(Config::from_env());
            merged.validate()?;
            merged
        },
        None => Config::load()?,
    };
    Ok(config)
}

fn cmd_sanitize(
    mut config: Config,
    content: String,
    output: Option<PathBuf>,
    json: bool,
    options: &SanitizeOptions,
    pretty: bool,
    stats: bool,
) -> anyhow::Result<()> {
    // Only demand a signing secret when a token is minted or checked
    if !options.generate_trust_token && options.trust_token.is_none() {
        config.trust_token.enabled = false;
    }

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let pipeline = SanitizationPipeline::from_config(&config, audit)?;

    let input = if json {
        serde_json::from_str::<Value>(&content)?
    } else {
        Value::String(content.trim_end_matches('\n').to_string())
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(pipeline.sanitize(&input, options))?;

    let rendered = match (result.trust_token(), result.value()) {
        (None, Value::String(text)) => text.clone(),
        _ if pretty => serde_json::to_string_pretty(&result)?,
        _ => serde_json::to_string(&result)?,
    };
    write_output(output, &rendered)?;

    if stats {
        let summary = pipeline.stats().summary();
        eprintln!();
        eprintln!("Sanitization Statistics:");
        eprintln!("  Rules:        {}", pipeline.rules().join(", "));
        eprintln!("  Bytes in:     {}", summary.bytes_in);
        eprintln!("  Bytes out:    {}", summary.bytes_out);
        eprintln!("  Tokens:       {}", summary.tokens_minted);
        if let Some(ms) = summary.mean_latency_ms {
            eprintln!("  Latency:      {ms:.3} ms");
        }
    }

    Ok(())
}

fn cmd_extract(content: String, job_id: &str, pretty: bool) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(&content)?;
    let extractor = ThreatKeyExtractor::new(Arc::new(TracingAuditSink));

    let runtime = tokio::runtime::Runtime::new()?;
    let triage = runtime.block_on(extractor.extract_and_escalate(job_id, value));

    let rendered = if pretty {
        serde_json::to_string_pretty(&triage)?
    } else {
        serde_json::to_string(&triage)?
    };
    println!("{rendered}");
    Ok(())
}

fn cmd_verify(config: &Config, content: &str) -> anyhow::Result<()> {
    let token = TrustToken::from_json(content)?;
    let integrity = TrustTokenIntegrity::from_config(&config.trust_token)?;

    let validation = integrity.validate(&token);
    println!("{}", serde_json::to_string_pretty(&validation)?);

    if !validation.is_valid() {
        std::process::exit(1);
    }
    Ok(())
}

// Helper functions

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(path)?)
    } else if let Some(s) = input {
        if s == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            Ok(s)
        }
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}

fn write_output(output: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}
