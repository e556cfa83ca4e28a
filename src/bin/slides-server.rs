//! HTTP server for edgequake-slides.
//!
//! Upload a PDF, analyse it for an audience, fetch rendered slides.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_slides::server::{
    router, AppState, ServerSettings, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_RETAINED_RUNS,
};
use edgequake_slides::AnalysisConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Serve slide analysis over HTTP.
#[derive(Parser, Debug)]
#[command(name = "slides-server", version, about = "Serve slide analysis over HTTP")]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "SLIDES_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "SLIDES_PORT", default_value_t = 5000)]
    port: u16,

    /// Directory for uploaded PDFs.
    #[arg(long, env = "SLIDES_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Root directory for per-run rendered slides.
    #[arg(long, env = "SLIDES_OUTPUT_DIR", default_value = "output/slides")]
    output_root: PathBuf,

    /// Largest accepted upload, in bytes.
    #[arg(long, env = "SLIDES_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Run directories to keep under the output root; older ones are pruned.
    #[arg(long, env = "SLIDES_KEEP_RUNS", default_value_t = DEFAULT_RETAINED_RUNS)]
    keep_runs: usize,

    /// LLM model ID (default: gpt-4o-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per slide analysis.
    #[arg(long, env = "SLIDES_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Disable theme/concept extraction between slides.
    #[arg(long, env = "SLIDES_NO_CONTEXT")]
    no_context: bool,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "SLIDES_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Directory or file of libpdfium (default: system library).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("edgequake_slides=info,tower_http=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut builder = AnalysisConfig::builder()
        .max_tokens(cli.max_tokens)
        .extract_context(!cli.no_context)
        .api_timeout_secs(cli.api_timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    let config = builder.build().context("Invalid configuration")?;

    let settings = ServerSettings {
        upload_dir: cli.upload_dir.clone(),
        output_root: cli.output_root.clone(),
        max_upload_bytes: cli.max_upload_bytes,
        retained_runs: cli.keep_runs,
    };
    std::fs::create_dir_all(&settings.upload_dir)
        .with_context(|| format!("Failed to create {}", settings.upload_dir.display()))?;
    std::fs::create_dir_all(&settings.output_root)
        .with_context(|| format!("Failed to create {}", settings.output_root.display()))?;

    let state = AppState::new(config, settings).context("Failed to initialise LLM provider")?;
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("slides-server v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
