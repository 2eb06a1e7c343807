//! peco entrypoint: an interactive, streaming fuzzy line selector.
//!
//! Input lines arrive on stdin (or from a file) while the user narrows
//! them down with a live query; accepted lines are printed on stdout. The
//! UI draws on stderr so the selector composes inside shell pipelines.

mod actions;
mod app;
mod view;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use app::{App, AppParams, LoopEnd};
use clap::Parser;
use core_buffer::MemoryBuffer;
use core_config::{Config, ConfigLocator, Layout, OnCancel};
use core_filter::{ExternalCmdFilter, FilterSet};
use core_hub::HUB_CHANNEL_CAP;
use core_input::{spawn_event_task, spawn_reader_task, ReaderConfig};
use core_model::IdGen;
use core_pipeline::Scope;
use core_terminal::{stderr_is_terminal, stdin_is_pipe, CrosstermBackend};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "peco", version, about = "Simplistic interactive filtering tool")]
struct Args {
    /// File to filter; standard input when omitted.
    file: Option<PathBuf>,
    /// Initial query.
    #[arg(long)]
    query: Option<String>,
    /// Config file path, overriding discovery.
    #[arg(long)]
    rcfile: Option<PathBuf>,
    /// Split lines on NUL: text before is matched, text after is emitted.
    #[arg(long = "null")]
    null: bool,
    /// Parse ANSI color sequences in the input.
    #[arg(long = "ansi")]
    ansi: bool,
    /// Line to position the cursor on at startup.
    #[arg(long = "initial-index", default_value_t = 0)]
    initial_index: usize,
    /// Name of the filter to start with.
    #[arg(long = "initial-filter")]
    initial_filter: Option<String>,
    /// Prompt string.
    #[arg(long)]
    prompt: Option<String>,
    /// Layout: top-down, bottom-up or top-down-query-bottom.
    #[arg(long)]
    layout: Option<String>,
    /// Finish immediately when exactly one candidate remains at EOF.
    #[arg(long = "select-1")]
    select_1: bool,
    /// Exit status on cancel: success or error.
    #[arg(long = "on-cancel")]
    on_cancel: Option<String>,
    /// String prefixed to marked lines.
    #[arg(long = "selection-prefix")]
    selection_prefix: Option<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("peco: {err:#}");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run() -> Result<u8> {
    let args = Args::parse();
    let _log_guard = init_logging();
    install_panic_hook();

    let config = load_config(&args)?;
    if args.file.is_none() && !stdin_is_pipe() {
        bail!("no input: pipe data into peco or pass a file");
    }
    if !stderr_is_terminal() {
        bail!("cannot run interactively: stderr is not a terminal");
    }

    let idgen = Arc::new(IdGen::new());
    let root_scope = Scope::root();
    let (hub, hub_rx) = core_hub::channel(HUB_CHANNEL_CAP);
    let source = Arc::new(MemoryBuffer::new());
    let filters = build_filters(&args, &config, idgen.clone())?;

    let reader_config = ReaderConfig {
        idgen,
        enable_sep: args.null,
        parse_ansi: args.ansi,
        max_line_bytes: config.max_scan_buffer_size,
    };
    match &args.file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            spawn_reader_task(
                BufReader::new(file),
                source.clone(),
                hub.clone(),
                root_scope.child(""),
                reader_config,
            );
        }
        None => {
            spawn_reader_task(
                BufReader::new(tokio::io::stdin()),
                source.clone(),
                hub.clone(),
                root_scope.child(""),
                reader_config,
            );
        }
    }

    let size = crossterm::terminal::size().unwrap_or((80, 24));
    let on_cancel = config.on_cancel;
    let (results_tx, results_rx) = mpsc::channel(4);
    let app = App::new(AppParams {
        hub,
        source,
        filters,
        config,
        root_scope: root_scope.clone(),
        results_tx,
        size,
        initial_query: args.query.clone(),
        initial_index: args.initial_index,
        select_one: args.select_1,
    })?;

    let mut backend = CrosstermBackend::new();
    let guard = backend.enter_guard()?;
    let (term_tx, term_rx) = mpsc::channel(256);
    spawn_event_task(term_tx, root_scope.child(""));
    info!(target: "runtime", "startup complete");

    let outcome = app.run(hub_rx, term_rx, results_rx).await;
    drop(guard);
    root_scope.cancel();

    let output = outcome?;
    let mut stdout = std::io::stdout().lock();
    for line in &output.lines {
        writeln!(stdout, "{line}")?;
    }
    stdout.flush()?;

    Ok(match output.end {
        LoopEnd::Collect => 0,
        LoopEnd::Ignorable => match on_cancel {
            OnCancel::Success => 0,
            OnCancel::Error => 1,
        },
    })
}

/// Load and validate configuration: the rcfile override or the discovered
/// file, with CLI flags layered on top. Validation failures are fatal.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.rcfile {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&ConfigLocator::from_env())?,
    };
    if let Some(prompt) = &args.prompt {
        config.prompt = prompt.clone();
    }
    if let Some(prefix) = &args.selection_prefix {
        config.selection_prefix = prefix.clone();
    }
    if let Some(layout) = &args.layout {
        config.layout = match layout.as_str() {
            "top-down" => Layout::TopDown,
            "bottom-up" => Layout::BottomUp,
            "top-down-query-bottom" => Layout::TopDownQueryBottom,
            other => bail!("unknown layout {other:?}"),
        };
    }
    if let Some(on_cancel) = &args.on_cancel {
        config.on_cancel = match on_cancel.as_str() {
            "success" => OnCancel::Success,
            "error" => OnCancel::Error,
            other => bail!("unknown on-cancel policy {other:?}"),
        };
    }
    Ok(config)
}

/// The built-in strategies plus the config's custom external filters.
fn build_filters(args: &Args, config: &Config, idgen: Arc<IdGen>) -> Result<Arc<FilterSet>> {
    let mut set = FilterSet::standard(config.fuzzy_longest_sort);
    for (name, custom) in &config.custom_filter {
        set.push(Arc::new(ExternalCmdFilter::new(
            name.clone(),
            custom.cmd.clone(),
            custom.args.clone(),
            custom.buffer_threshold,
            idgen.clone(),
            args.null,
        )));
    }
    let set = Arc::new(set);
    if let Some(name) = args.initial_filter.as_ref().or(config.initial_filter.as_ref()) {
        set.select(name)
            .map_err(|err| anyhow!("--initial-filter: {err}"))?;
    }
    Ok(set)
}

/// File logging when `PECO_TRACE` names a path; the UI owns stderr, so
/// there is no console logging at all otherwise.
fn init_logging() -> Option<WorkerGuard> {
    let path = std::env::var_os("PECO_TRACE")?;
    let path = PathBuf::from(path);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let filter = tracing_subscriber::EnvFilter::try_from_env("PECO_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Restore the terminal before the default panic output so a crash never
/// leaves the user's shell in raw mode.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(
            std::io::stderr(),
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::cursor::Show
        );
        default_hook(panic_info);
    }));
}
