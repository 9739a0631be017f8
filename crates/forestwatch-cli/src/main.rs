use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use forestwatch_contracts::events::AnalysisLog;
use forestwatch_contracts::{RawModelReply, ResponseDecoder};
use forestwatch_engine::{AnalyzerConfig, ComparisonRequest, VegetationAnalyzer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_LOG_FILTER: &str = "forestwatch=info";

#[derive(Debug, Parser)]
#[command(
    name = "forestwatch",
    version,
    about = "Compare forest imagery with a vision model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a saved model reply into a vegetation comparison.
    Decode(DecodeArgs),
    /// Compare a before and after image with Gemini.
    Compare(CompareArgs),
    /// Check that the Gemini API answers.
    Ping(ProviderArgs),
}

#[derive(Debug, Parser)]
struct DecodeArgs {
    /// Reply text file; stdin when omitted or `-`.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Subject named in generated analyses, e.g. "Amazon - Point 4".
    #[arg(long, default_value = "")]
    context: String,
    /// Seed for the generated-analysis fallback.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ProviderArgs {
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    #[arg(long)]
    before: PathBuf,
    #[arg(long)]
    after: PathBuf,
    #[arg(long)]
    area: String,
    #[arg(long)]
    point: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    receipts: Option<PathBuf>,
    #[command(flatten)]
    provider: ProviderArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("forestwatch error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Decode(args) => run_decode(args),
        Command::Compare(args) => run_compare(args),
        Command::Ping(args) => run_ping(args),
    }
}

fn run_decode(args: DecodeArgs) -> Result<i32> {
    let text = read_reply_text(args.input.as_deref())?;
    print_json(&decode_report(&text, &args.context, args.seed))?;
    Ok(0)
}

fn run_compare(args: CompareArgs) -> Result<i32> {
    let config = analyzer_config(&args.provider);
    let mut analyzer = VegetationAnalyzer::gemini(&config);
    if let Some(events) = args.events.as_ref() {
        let session_id = Uuid::new_v4().to_string();
        info!(events = %events.display(), session_id = %session_id, "appending analysis events");
        analyzer = analyzer.with_log(AnalysisLog::new(events, session_id));
    }
    if let Some(dir) = args.receipts.as_ref() {
        analyzer = analyzer.with_receipts_dir(dir);
    }

    let request = ComparisonRequest {
        before: args.before,
        after: args.after,
        area: args.area,
        point_name: args.point,
    };
    match analyzer.analyze(&request) {
        Ok(outcome) => {
            let mut report = json!({
                "success": true,
                "analysis_id": outcome.analysis_id,
                "strategy": outcome.strategy,
                "data": outcome.payload(),
            });
            if let Some(path) = outcome.receipt_path.as_ref() {
                report["receipt"] = json!(path.display().to_string());
            }
            print_json(&report)?;
            Ok(0)
        }
        Err(err) => {
            let rendered = format!("{err:#}");
            warn!(error = %rendered, "comparison failed");
            print_json(&json!({
                "success": false,
                "error": "Gemini analysis failed",
                "details": rendered,
            }))?;
            Ok(1)
        }
    }
}

fn run_ping(args: ProviderArgs) -> Result<i32> {
    let analyzer = VegetationAnalyzer::gemini(&analyzer_config(&args));
    let status = analyzer.test_connection();
    print_json(&serde_json::to_value(&status)?)?;
    Ok(if status.success { 0 } else { 1 })
}

fn analyzer_config(args: &ProviderArgs) -> AnalyzerConfig {
    AnalyzerConfig::from_env()
        .with_api_key(args.api_key.clone())
        .with_model(args.model.clone())
}

fn read_reply_text(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed reading reply from {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed reading reply from stdin")?;
            Ok(text)
        }
    }
}

fn decode_report(text: &str, context: &str, seed: Option<u64>) -> Value {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let reply = RawModelReply::new(text, context);
    let outcome = ResponseDecoder::default().decode_outcome(&reply, &mut rng);
    json!({
        "success": true,
        "strategy": outcome.strategy,
        "degraded": outcome.record.degraded,
        "data": outcome.record.to_payload(),
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
