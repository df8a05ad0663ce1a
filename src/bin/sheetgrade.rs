//! CLI binary for sheetgrade.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`, picks
//! an OCR backend, and optionally grades and stores the result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sheetgrade::backends::{LlmOcr, LlmOcrConfig, VisionOcr, VisionOcrConfig};
use sheetgrade::transcribe::write_transcript;
use sheetgrade::{
    inspect, resolve_provider, transcribe, DocumentTranscript, Feedback, FeedbackConfig,
    GradedResult, Grader, JsonlStore, LeadingFragment, OcrEngine, OcrFailurePolicy,
    PageDegradation, PipelineConfig, PipelineObserver, RecordId, ResultStore, StudentIdentity,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress observer using indicatif ────────────────────────────────────────

/// Live progress bar plus one log line per page. Pages may finish out of
/// order when `--concurrency` > 1.
struct CliObserver {
    bar: ProgressBar,
    label: String,
    start_times: Mutex<HashMap<usize, Instant>>,
    degraded: AtomicUsize,
}

impl CliObserver {
    fn new(label: &str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix(label.to_string());
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            label: label.to_string(),
            start_times: Mutex::new(HashMap::new()),
            degraded: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineObserver for CliObserver {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{}: {total_pages} pages", self.label))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_degraded(&self, _page_num: usize, _total: usize, degradation: &PageDegradation) {
        self.degraded.fetch_add(1, Ordering::SeqCst);
        self.bar
            .println(format!("    {} {}", yellow("!"), dim(&degradation.to_string())));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, sections: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{sections:>3} sections")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, degraded_pages: usize) {
        self.bar.finish_and_clear();
        if degraded_pages == 0 {
            eprintln!(
                "{} {} pages transcribed",
                green("✔"),
                bold(&total_pages.to_string())
            );
        } else {
            eprintln!(
                "{} {} pages transcribed  ({} with lost text)",
                yellow("⚠"),
                bold(&total_pages.to_string()),
                degraded_pages
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe to stdout with Cloud Vision
  sheetgrade answers.pdf

  # Transcribe to a file, keep sheet headers, LLM OCR
  sheetgrade --ocr llm --keep-preamble answers.pdf -o answers.txt

  # Grade the submission on its own
  sheetgrade --grade answers.pdf

  # Grade against a question paper and record the result
  sheetgrade --compare questions.pdf --store results.jsonl \
      --name Asha --register-no 21CS042 --class XII-B answers.pdf

  # Look up the latest stored result for a student
  sheetgrade --lookup --store results.jsonl --name Asha --register-no 21CS042 --class XII-B

  # Inspect PDF metadata (no API key needed)
  sheetgrade --inspect-only answers.pdf

ENVIRONMENT VARIABLES:
  GOOGLE_VISION_API_KEY   Cloud Vision API key (--ocr vision)
  OPENAI_API_KEY          OpenAI API key (--ocr llm, grading)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium or the directory containing it
  RUST_LOG                Log filter, e.g. sheetgrade=debug
"#;

/// OCR scanned answer sheets into structured transcripts and grade them.
#[derive(Parser, Debug)]
#[command(
    name = "sheetgrade",
    version,
    about = "OCR scanned PDF answer sheets into structured transcripts and grade them",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Answer-sheet PDF.
    #[arg(required_unless_present = "lookup")]
    input: Option<PathBuf>,

    /// Write the transcript to this file instead of stdout.
    #[arg(short, long, env = "SHEETGRADE_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "SHEETGRADE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages OCR'd concurrently.
    #[arg(short, long, env = "SHEETGRADE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SHEETGRADE_PASSWORD")]
    password: Option<String>,

    /// Keep text before a page's first question marker as an "Unlabeled" section.
    #[arg(long)]
    keep_preamble: bool,

    /// Abort on the first OCR failure instead of leaving the page empty.
    #[arg(long)]
    fail_fast: bool,

    /// Per-page OCR deadline in seconds.
    #[arg(long, env = "SHEETGRADE_OCR_TIMEOUT")]
    ocr_timeout: Option<u64>,

    /// OCR backend.
    #[arg(long, value_enum, default_value = "vision")]
    ocr: OcrArg,

    /// Cloud Vision API key.
    #[arg(long, env = "GOOGLE_VISION_API_KEY", hide_env_values = true)]
    vision_api_key: Option<String>,

    /// LLM provider for --ocr llm and grading: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Ask the LLM for a grade and feedback on the transcript.
    #[arg(long)]
    grade: bool,

    /// Grade against this question paper / model answer PDF.
    #[arg(long, value_name = "QUESTION_PDF")]
    compare: Option<PathBuf>,

    /// JSON-lines result store; with a PDF input, the graded result is appended.
    #[arg(long, value_name = "JSONL", requires_all = ["name", "register_no", "class"])]
    store: Option<PathBuf>,

    /// Student name.
    #[arg(long)]
    name: Option<String>,

    /// Student register number.
    #[arg(long)]
    register_no: Option<String>,

    /// Student class.
    #[arg(long)]
    class: Option<String>,

    /// Print the latest stored result for the student and exit.
    #[arg(long, requires = "store")]
    lookup: bool,

    /// Output JSON (transcript, feedback, record id) instead of text.
    #[arg(long)]
    json: bool,

    /// Print PDF metadata only, no OCR.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "SHEETGRADE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    /// Google Cloud Vision text detection.
    Vision,
    /// Vision language model via edgequake-llm.
    Llm,
}

#[derive(Serialize)]
struct Report<'a> {
    transcript: &'a DocumentTranscript,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a DocumentTranscript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback: Option<&'a Feedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<RecordId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back.
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

    // ── Lookup mode ──────────────────────────────────────────────────────
    if cli.lookup {
        return lookup(&cli).await;
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", input.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    let grading = cli.grade || cli.compare.is_some() || cli.store.is_some();

    // ── Transcribe ───────────────────────────────────────────────────────
    let ocr = build_ocr(&cli)?;

    let observer = show_progress.then(|| CliObserver::new("Answer sheet"));
    let config = build_config(&cli, observer.map(|o| o as Arc<dyn PipelineObserver>))?;
    let transcript = transcribe(&input, &ocr, &config)
        .await
        .with_context(|| format!("Transcription of {} failed", input.display()))?;

    let reference = match cli.compare {
        Some(ref question_pdf) => {
            let observer = show_progress.then(|| CliObserver::new("Question paper"));
            let config = build_config(&cli, observer.map(|o| o as Arc<dyn PipelineObserver>))?;
            Some(
                transcribe(question_pdf, &ocr, &config)
                    .await
                    .with_context(|| {
                        format!("Transcription of {} failed", question_pdf.display())
                    })?,
            )
        }
        None => None,
    };

    if let Some(ref output_path) = cli.output {
        write_transcript(output_path, &transcript.text)
            .await
            .context("Failed to write transcript")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} pages  {}ms  →  {}",
                green("✔"),
                transcript.stats.total_pages,
                transcript.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    }

    // ── Grade ────────────────────────────────────────────────────────────
    let feedback = if grading {
        if transcript.is_blank() {
            bail!(
                "No question sections were found in {}; nothing to grade",
                input.display()
            );
        }
        let provider = resolve_provider(cli.provider.as_deref(), cli.model.as_deref())
            .context("No LLM provider available for grading")?;
        let grader = Grader::from_provider(provider, FeedbackConfig::default());
        let fb = match reference {
            Some(ref r) => grader.compare(&r.text, &transcript.text).await,
            None => grader.feedback(&transcript.text).await,
        }
        .context("Grading failed")?;
        Some(fb)
    } else {
        None
    };

    // ── Store ────────────────────────────────────────────────────────────
    let record_id = match (cli.store.as_ref(), feedback.as_ref()) {
        (Some(store_path), Some(fb)) => {
            let record = GradedResult::new(
                file_label(&input),
                fb.grade_or_na(),
                fb.text.clone(),
                student_identity(&cli)?,
            );
            let id = JsonlStore::new(store_path)
                .store(&record)
                .await
                .context("Failed to store graded result")?;
            if !cli.quiet {
                eprintln!(
                    "{} Stored result #{} in {}",
                    green("✔"),
                    id.0,
                    store_path.display()
                );
            }
            Some(id)
        }
        _ => None,
    };

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        let report = Report {
            transcript: &transcript,
            reference: reference.as_ref(),
            feedback: feedback.as_ref(),
            record_id,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
        return Ok(());
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.output.is_none() {
        handle
            .write_all(transcript.text.as_bytes())
            .context("Failed to write to stdout")?;
    }
    if let Some(ref fb) = feedback {
        writeln!(handle, "\n=== Feedback (grade: {}) ===\n{}", fb.grade_or_na(), fb.text)
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Transcribed {} pages ({} sections, {} degraded) in {}ms",
            transcript.stats.total_pages,
            transcript.stats.total_sections,
            transcript.stats.degraded_pages,
            transcript.stats.total_duration_ms
        );
    }

    Ok(())
}

/// Print the latest stored result for the student given on the command line.
async fn lookup(cli: &Cli) -> Result<()> {
    let store_path = cli.store.as_ref().context("--lookup requires --store")?;
    let student = student_identity(cli)?;
    let found = JsonlStore::new(store_path)
        .find(&student)
        .await
        .context("Failed to read result store")?;

    match found {
        Some(record) if cli.json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("Failed to serialise record")?
            );
        }
        Some(record) => {
            println!("File:      {}", record.filename);
            println!("Grade:     {}", record.grade);
            println!("Feedback:\n{}", record.feedback);
        }
        None => bail!(
            "No result found for {} ({}, {})",
            student.name,
            student.register_no,
            student.student_class
        ),
    }
    Ok(())
}

/// Build the OCR backend selected by `--ocr`.
fn build_ocr(cli: &Cli) -> Result<Arc<dyn OcrEngine>> {
    let ocr: Arc<dyn OcrEngine> = match cli.ocr {
        OcrArg::Vision => {
            let key = cli.vision_api_key.clone().context(
                "Cloud Vision needs an API key: pass --vision-api-key or set GOOGLE_VISION_API_KEY",
            )?;
            Arc::new(VisionOcr::new(VisionOcrConfig::new(key))?)
        }
        OcrArg::Llm => {
            let provider = resolve_provider(cli.provider.as_deref(), cli.model.as_deref())
                .context("No LLM provider available for OCR")?;
            Arc::new(LlmOcr::new(provider, LlmOcrConfig::default()))
        }
    };
    Ok(ocr)
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<dyn PipelineObserver>>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .leading_fragment(if cli.keep_preamble {
            LeadingFragment::Keep
        } else {
            LeadingFragment::Discard
        })
        .ocr_failure(if cli.fail_fast {
            OcrFailurePolicy::FailFast
        } else {
            OcrFailurePolicy::DegradeToEmpty
        });

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(secs) = cli.ocr_timeout {
        builder = builder.ocr_timeout_secs(secs);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

fn student_identity(cli: &Cli) -> Result<StudentIdentity> {
    match (&cli.name, &cli.register_no, &cli.class) {
        (Some(name), Some(reg), Some(class)) => Ok(StudentIdentity::new(
            name.clone(),
            reg.clone(),
            class.clone(),
        )),
        _ => bail!("--name, --register-no and --class are all required"),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
