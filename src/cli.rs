use crate::{
    analyzer::{Analyzer, ProcessAnalyzer},
    config::Config,
    report::{Report, ReportId},
    service::AnalysisService,
    store::{FileStore, ReportStore},
    suggest::{LlmSettings, Suggester, SuggestionGenerator},
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "a11y-relay")]
#[command(about = "Accessibility analysis relay (job queue + sandboxed axe runner + LLM suggestions)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./a11y-relay.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the analyzer runtime starts and the LLM is configured.
    Doctor {},
    /// Analyze one page by URL or from an HTML file and wait for the result.
    Analyze {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        html_file: Option<PathBuf>,
        #[arg(long, default_value = "local")]
        user: String,
        /// Skip LLM suggestions.
        #[arg(long)]
        no_suggest: bool,
    },
    /// Queue every URL in a file (one per line, `#` comments) and drain.
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(long)]
        no_suggest: bool,
    },
    /// Generate suggestions for a saved analyzer result document.
    Suggest {
        #[arg(long)]
        results: PathBuf,
    },
    /// List stored reports for a user, newest first.
    Reports {
        #[arg(long, default_value = "local")]
        user: String,
    },
    Show {
        id: ReportId,
    },
    Suggestions {
        id: ReportId,
    },
    Delete {
        id: ReportId,
    },
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = if cfg_path.exists() {
        Config::load(&cfg_path)?
    } else {
        Config::default()
    };

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
    if !cfg_path.exists() {
        warn!(path = %cfg_path.display(), "config file not found; using defaults");
    }

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg).await,
        Command::Analyze {
            url,
            html_file,
            user,
            no_suggest,
        } => analyze(&cfg, url.as_deref(), html_file.as_deref(), user, *no_suggest).await,
        Command::Batch {
            input,
            user,
            no_suggest,
        } => batch(&cfg, input, user, *no_suggest).await,
        Command::Suggest { results } => suggest(&cfg, results).await,
        Command::Reports { user } => {
            let store = open_store(&cfg).await?;
            print_json(&store.list_reports_by_user(user).await?)
        }
        Command::Show { id } => {
            let store = open_store(&cfg).await?;
            print_json(&store.load_report(*id).await?)
        }
        Command::Suggestions { id } => {
            let store = open_store(&cfg).await?;
            print_json(&store.load_suggestion_set(*id).await?)
        }
        Command::Delete { id } => {
            let store = open_store(&cfg).await?;
            store.delete_report(*id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> PathBuf {
    if let Some(p) = user {
        return p.to_path_buf();
    }
    let default = PathBuf::from("a11y-relay.toml");
    if default.exists() {
        default
    } else {
        PathBuf::from("a11y-relay.example.toml")
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        // Every command shares one log file, so earlier runs are kept.
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.store.dir).join("a11y-relay.log"))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_store(cfg: &Config) -> Result<FileStore> {
    FileStore::open(&cfg.store.dir)
        .await
        .with_context(|| format!("opening report store: {}", cfg.store.dir))
}

fn build_suggester(cfg: &Config, disabled: bool) -> Option<Arc<dyn Suggester>> {
    if disabled || !cfg.llm.enabled {
        return None;
    }
    let settings = LlmSettings::from_config(&cfg.llm);
    if let Err(e) = settings.check() {
        warn!(error = %e, "LLM suggestions disabled");
        return None;
    }
    Some(Arc::new(SuggestionGenerator::new(settings)))
}

fn start_service(cfg: &Config, store: Arc<FileStore>, no_suggest: bool) -> AnalysisService {
    let analyzer: Arc<dyn Analyzer> = Arc::new(ProcessAnalyzer::new(&cfg.analyzer));
    AnalysisService::start(
        &cfg.queue,
        store,
        analyzer,
        build_suggester(cfg, no_suggest),
    )
}

async fn doctor(cfg: &Config) -> Result<()> {
    let analyzer = ProcessAnalyzer::new(&cfg.analyzer);
    let diag = analyzer.doctor().await;
    let settings = LlmSettings::from_config(&cfg.llm);
    let llm = match settings.check() {
        Ok(()) => json!({ "ok": true, "api_url": settings.api_url, "model": settings.model }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    };
    print_json(&json!({
        "analyzer": diag,
        "llm": llm,
        "store_dir": cfg.store.dir,
    }))
}

async fn analyze(
    cfg: &Config,
    url: Option<&str>,
    html_file: Option<&Path>,
    user: &str,
    no_suggest: bool,
) -> Result<()> {
    let html = match html_file {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("reading html: {}", p.display()))?,
        None => String::new(),
    };
    let url = url.unwrap_or_default();

    let store = Arc::new(open_store(cfg).await?);
    let service = start_service(cfg, store.clone(), no_suggest);
    let submitted = service.submit(user, url, &html).await;
    service.shutdown().await;

    let report = store.load_report(submitted?.id).await?;
    print_json(&outcome_json(store.as_ref(), &report).await)
}

async fn batch(cfg: &Config, input: &Path, user: &str, no_suggest: bool) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("reading batch input: {}", input.display()))?;
    let urls: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let started = now_rfc3339();
    let store = Arc::new(open_store(cfg).await?);
    let service = start_service(cfg, store.clone(), no_suggest);

    let mut ids = Vec::with_capacity(urls.len());
    for url in &urls {
        match service.submit(user, url, "").await {
            Ok(report) => ids.push(report.id),
            Err(e) => warn!(url, error = %e, "skipping batch entry"),
        }
    }
    info!(queued = ids.len(), "batch submitted; waiting for workers");
    let processed = service.shutdown().await;

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let report = store.load_report(id).await?;
        results.push(outcome_json(store.as_ref(), &report).await);
    }
    print_json(&json!({
        "started": started,
        "finished": now_rfc3339(),
        "processed": processed,
        "reports": results,
    }))
}

async fn suggest(cfg: &Config, results: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(results)
        .with_context(|| format!("reading results: {}", results.display()))?;
    let doc: Value = serde_json::from_str(&raw).with_context(|| "parsing results JSON")?;
    let generator = SuggestionGenerator::new(LlmSettings::from_config(&cfg.llm));
    let items = generator.generate(&doc).await?;
    print_json(&items)
}

async fn outcome_json(store: &dyn ReportStore, report: &Report) -> Value {
    let violations = report
        .analysis_results
        .as_ref()
        .and_then(|r| r.get("violations"))
        .and_then(Value::as_array)
        .map(Vec::len);
    let suggestions = store
        .load_suggestion_set(report.id)
        .await
        .ok()
        .map(|s| s.suggestions.len());
    json!({
        "id": report.id,
        "url": report.url,
        "domain": report.domain,
        "status": report.status,
        "violations": violations,
        "suggestions": suggestions,
        "error": report.error_message(),
        "suggestion_error": report.suggestion_error,
    })
}
