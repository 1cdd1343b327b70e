//! Manual-run CLI: load configured searches, run the batch once, emit
//! observations as NDJSON. Scheduling and persistence live outside this
//! binary; it only drives the engine and reports outcomes.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use farewatch::{
    CancelToken, EngineConfig, ExtractionOutcome, Orchestrator, SearchSpec, SessionManager,
};

struct CliArgs {
    searches_path: String,
    out_path: Option<String>,
}

fn parse_args() -> CliArgs {
    let mut searches_path = "searches.json".to_string();
    let mut out_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--out" {
            out_path = args.next();
        } else if let Some(rest) = a.strip_prefix("--out=") {
            out_path = Some(rest.to_string());
        } else if !a.starts_with("--") {
            searches_path = a;
        }
    }
    CliArgs {
        searches_path,
        out_path,
    }
}

/// Tolerant search-list loader: a missing or malformed file downgrades to an
/// empty list with a warning, so a bad deploy never crash-loops the runner.
fn load_searches(path: &str) -> Vec<SearchSpec> {
    if !Path::new(path).exists() {
        warn!(path, "searches file not found");
        return Vec::new();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path, error = %e, "failed to read searches file");
            return Vec::new();
        }
    };
    let specs: Vec<SearchSpec> = match serde_json::from_str(&raw) {
        Ok(specs) => specs,
        Err(e) => {
            warn!(path, error = %e, "searches file is not a valid JSON list");
            return Vec::new();
        }
    };

    specs
        .into_iter()
        .filter(|spec| match spec.validate() {
            Ok(()) => true,
            Err(msg) => {
                warn!(%msg, "skipping invalid search");
                false
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = parse_args();
    let specs = load_searches(&args.searches_path);
    if specs.is_empty() {
        warn!("no valid searches configured, nothing to do");
        return Ok(());
    }
    info!(searches = specs.len(), "starting extraction run");

    let config = EngineConfig::from_env();
    let Some(manager) = SessionManager::new_auto(&config) else {
        anyhow::bail!(
            "no Chromium-family browser found; install one or set FAREWATCH_BROWSER"
        );
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let orchestrator = Orchestrator::new(config);
    let outcomes = orchestrator.run_batch(&manager, &specs, &cancel).await;
    manager.shutdown().await;

    let mut sink: Box<dyn Write> = match &args.out_path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    let mut fatal = false;
    let mut succeeded = 0usize;
    let mut emitted = 0usize;
    for outcome in &outcomes {
        match outcome {
            ExtractionOutcome::Success { observations } => {
                succeeded += 1;
                for obs in observations {
                    writeln!(sink, "{}", serde_json::to_string(obs)?)?;
                    emitted += 1;
                }
            }
            ExtractionOutcome::Failure {
                kind,
                message,
                search_id,
            } => {
                warn!(search = %search_id, %kind, %message, "search failed");
                if *kind == farewatch::FailureKind::SessionStart {
                    fatal = true;
                }
            }
        }
    }
    sink.flush()?;

    info!(
        searches = outcomes.len(),
        succeeded,
        observations = emitted,
        "extraction run complete"
    );

    if fatal {
        anyhow::bail!("run aborted: browser session could not be started");
    }
    Ok(())
}
