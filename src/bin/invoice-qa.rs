//! Server binary for invoice-qa.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig` and runs the HTTP server.

use anyhow::{Context, Result};
use clap::Parser;
use invoice_qa::config::{DEFAULT_API_BASE_URL, DEFAULT_BIND_ADDR, DEFAULT_MODEL, GEMINI_PROVIDER};
use invoice_qa::{serve, InvoiceAnalyzer, PdfiumExtractor, ServiceConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on http://127.0.0.1:8501 using GOOGLE_API_KEY from the environment or .env
  invoice-qa

  # Listen on all interfaces
  invoice-qa --bind 0.0.0.0:8080

  # Use a different Gemini model
  invoice-qa --model gemini-1.5-pro

  # Use another provider through edgequake-llm (reads OPENAI_API_KEY)
  invoice-qa --provider openai --model gpt-4.1-mini

ENVIRONMENT VARIABLES:
  GOOGLE_API_KEY          Gemini API key
  INVOICE_QA_BIND         Listen address
  INVOICE_QA_PROVIDER     Model provider (gemini, openai, anthropic, ollama, …)
  INVOICE_QA_MODEL        Model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides --verbose / --quiet

A .env file in the working directory is loaded before anything else.
"#;

/// Ask questions about invoice images and PDFs with a multimodal LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-qa",
    version,
    about = "Web tool to ask questions about invoice images and PDFs using a multimodal LLM",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "INVOICE_QA_BIND", default_value = DEFAULT_BIND_ADDR)]
    bind: SocketAddr,

    /// Model provider: gemini (built-in) or any edgequake-llm provider.
    #[arg(long, env = "INVOICE_QA_PROVIDER", default_value = GEMINI_PROVIDER)]
    provider: String,

    /// Model ID.
    #[arg(long, env = "INVOICE_QA_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Gemini API key.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API base URL.
    #[arg(long, env = "INVOICE_QA_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Sampling temperature (0.0–2.0). Model default if unset.
    #[arg(long, env = "INVOICE_QA_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max output tokens. Model default if unset.
    #[arg(long, env = "INVOICE_QA_MAX_OUTPUT_TOKENS")]
    max_output_tokens: Option<u32>,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "INVOICE_QA_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "INVOICE_QA_MAX_UPLOAD_MB", default_value_t = 20,
          value_parser = clap::value_parser!(u64).range(1..=512))]
    max_upload_mb: u64,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Path to a text file containing a custom system instruction.
    #[arg(long, env = "INVOICE_QA_SYSTEM_INSTRUCTION")]
    system_instruction: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_QA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_QA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads `env = …` fallbacks.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).await?;

    // pdfium is only needed for PDFs; warn now instead of on the first upload.
    if let Err(e) = PdfiumExtractor::new(config.pdfium_lib_path.clone()).probe() {
        warn!("{}", e);
        warn!("PDF uploads will fail until pdfium is available; images still work");
    }

    let analyzer = InvoiceAnalyzer::from_config(&config).context("Failed to set up the model client")?;

    serve(&config, Arc::new(analyzer))
        .await
        .context("Server failed")?;

    Ok(())
}

/// Map CLI args to `ServiceConfig`.
async fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let system_instruction = if let Some(ref path) = cli.system_instruction {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system instruction from {:?}", path))?,
        )
    } else {
        None
    };

    let max_upload_bytes = usize::try_from(cli.max_upload_mb * 1024 * 1024)
        .context("Upload limit does not fit in memory on this platform")?;

    let mut builder = ServiceConfig::builder()
        .bind_addr(cli.bind)
        .provider(&cli.provider)
        .model(&cli.model)
        .api_base_url(&cli.api_base_url)
        .api_timeout_secs(cli.api_timeout)
        .max_upload_bytes(max_upload_bytes);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_output_tokens {
        builder = builder.max_output_tokens(n);
    }
    if let Some(ref dir) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(dir);
    }
    if let Some(instruction) = system_instruction {
        builder = builder.system_instruction(instruction);
    }

    builder.build().context("Invalid configuration")
}
