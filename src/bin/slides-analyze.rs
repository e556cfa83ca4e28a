//! CLI binary for edgequake-slides.
//!
//! Maps flags onto `AnalysisConfig`, runs one presentation and prints the
//! per-slide analyses (or the full JSON output).

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_slides::{
    analyze_document, analyze_to_file, AnalysisConfig, AnalysisOutput, AnalysisProgressCallback,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn paint(code: &str, s: &str) -> String {
    format!("\x1b[{code}m{s}\x1b[0m")
}
fn green(s: &str) -> String {
    paint("32", s)
}
fn red(s: &str) -> String {
    paint("31", s)
}
fn dim(s: &str) -> String {
    paint("2", s)
}
fn bold(s: &str) -> String {
    paint("1", s)
}
fn cyan(s: &str) -> String {
    paint("36", s)
}

// ── Terminal progress ────────────────────────────────────────────────────────

/// Progress bar plus one log line per finished slide.
struct CliProgress {
    bar: ProgressBar,
    slide_started: Mutex<Option<Instant>>,
    failures: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Rendering");
        bar.set_message("Rasterising slides…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            slide_started: Mutex::new(None),
            failures: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.slide_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgress {
    fn on_run_start(&self, total_slides: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_slides as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_slides} slides…"))
        ));
    }

    fn on_slide_start(&self, slide_number: usize, _total: usize) {
        if let Ok(mut t) = self.slide_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("slide {slide_number}"));
    }

    fn on_slide_complete(&self, slide_number: usize, total: usize, analysis_len: usize) {
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            slide_number,
            total,
            dim(&format!("{analysis_len:>5} chars")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_slide_error(&self, slide_number: usize, total: usize, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {}  {}",
            red("✗"),
            slide_number,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_slides: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} slides analysed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} slides analysed  ({} replaced by placeholders)",
                if failed == total_slides { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_slides,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a deck for a specific audience
  slides-analyze deck.pdf --audience "junior backend engineers"

  # Write the full JSON result (results + context + stats) to a file
  slides-analyze deck.pdf -a "executives" -o analysis.json

  # Analyse a deck straight from a URL with a stronger model
  slides-analyze https://example.com/talk.pdf --model gpt-4o --provider openai

  # Skip the context-extraction call (one VLM call per slide)
  slides-analyze deck.pdf --no-context

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium
  SLIDES_*                Every flag below has a SLIDES_ fallback
"#;

/// Analyse presentation slides for a target audience using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "slides-analyze",
    version,
    about = "Analyse presentation slides for a target audience using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Who the presentation is for (e.g. "junior engineers").
    #[arg(short, long, env = "SLIDES_AUDIENCE", default_value = "")]
    audience: String,

    /// Write JSON output to this file instead of printing to stdout.
    #[arg(short, long, env = "SLIDES_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for rendered slide_<n>.png files.
    #[arg(long, env = "SLIDES_OUTPUT_DIR", default_value = "output/slides")]
    output_dir: PathBuf,

    /// LLM model ID (default: gpt-4o-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Longest edge of a rendered slide, in pixels.
    #[arg(long, env = "SLIDES_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..=8000))]
    max_pixels: u32,

    /// Reject sources larger than this many MiB.
    #[arg(long, env = "SLIDES_MAX_SOURCE_MB", default_value_t = 50)]
    max_source_mb: u64,

    /// Max LLM output tokens per slide analysis.
    #[arg(long, env = "SLIDES_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Max LLM output tokens for the context-extraction call.
    #[arg(long, env = "SLIDES_CONTEXT_MAX_TOKENS", default_value_t = 256)]
    context_max_tokens: usize,

    /// Disable theme/concept extraction between slides.
    #[arg(long, env = "SLIDES_NO_CONTEXT")]
    no_context: bool,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SLIDES_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per slide on transient LLM failure.
    #[arg(long, env = "SLIDES_MAX_RETRIES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SLIDES_PASSWORD")]
    password: Option<String>,

    /// Directory or file of libpdfium (default: system library).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print the full JSON output instead of readable text.
    #[arg(long, env = "SLIDES_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SLIDES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SLIDES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SLIDES_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SLIDES_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "SLIDES_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Run analysis ─────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = analyze_to_file(&cli.input, &cli.audience, output_path, &config)
            .await
            .context("Analysis failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} slides  {}ms  →  {}",
                if stats.failed == 0 { green("✔") } else { cyan("⚠") },
                stats.succeeded,
                stats.total_slides,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&stats.input_tokens.to_string()),
                dim(&stats.output_tokens.to_string()),
            );
        }
    } else {
        let output = analyze_document(&cli.input, &cli.audience, &config)
            .await
            .context("Analysis failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            write_text(&output).context("Failed to write to stdout")?;
        }

        if !cli.quiet && !show_progress && !cli.json {
            eprintln!(
                "Analysed {}/{} slides in {}ms",
                output.stats.succeeded, output.stats.total_slides, output.stats.total_duration_ms
            );
        }
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .output_dir(&cli.output_dir)
        .max_rendered_pixels(cli.max_pixels)
        .max_source_bytes(cli.max_source_mb.saturating_mul(1024 * 1024))
        .max_tokens(cli.max_tokens)
        .context_max_tokens(cli.context_max_tokens)
        .extract_context(!cli.no_context)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Readable rendering: one heading per slide, then the accumulated context.
fn write_text(output: &AnalysisOutput) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for result in &output.results {
        let marker = if result.success { "" } else { " (failed)" };
        writeln!(out, "## Slide {}{}\n", result.slide_number, marker)?;
        out.write_all(result.analysis.as_bytes())?;
        if !result.analysis.ends_with('\n') {
            writeln!(out)?;
        }
        writeln!(out)?;
    }

    let ctx = &output.context;
    if ctx.has_signals() {
        writeln!(out, "---")?;
        writeln!(out, "Audience: {}", ctx.audience_description)?;
        writeln!(out, "Themes:   {}", ctx.themes.join(", "))?;
        writeln!(out, "Concepts: {}", ctx.concepts.join(", "))?;
    }
    Ok(())
}
