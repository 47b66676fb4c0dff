//! `kiln watch`: Recompile on every change until interrupted.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use kiln_common::types::CompilationResult;
use kiln_core::host::{RenderAction, RenderPayload, RenderTracker};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};

use super::{ProjectArgs, Session};
use crate::output;
use crate::project::{FileChange, ProjectFiles};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// How long to wait for the Ctrl+C flag between file events.
const TICK: Duration = Duration::from_millis(200);

/// Quiet period that merges a burst of events into one attempt.
const DEBOUNCE: Duration = Duration::from_millis(50);

type EventSender = mpsc::UnboundedSender<notify::Result<Event>>;

/// Arguments for the `watch` command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Output directory, `<DIR>/dist` by default.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Poll the file system instead of using native change events.
    #[arg(long)]
    pub poll: bool,

    /// Polling interval in milliseconds, used with `--poll` or when native
    /// events are unavailable.
    #[arg(long, default_value_t = 300)]
    pub interval: u64,
}

/// Executes the `watch` command.
///
/// Compiles the project once, then listens for file system events. Each
/// batch of changes starts a new attempt, which cancels the one still
/// running; published snapshots are written to the output directory as the
/// render tracker decides.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the project cannot be
/// read, or the watcher or the Ctrl+C handler cannot be installed.
pub async fn execute(args: WatchArgs) -> anyhow::Result<()> {
    let config = args.project.config()?;
    let out = args.project.out_dir(args.out.as_deref());
    std::fs::create_dir_all(&out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut project = ProjectFiles::load(&args.project.dir, Some(&out))?;
    let session = Arc::new(super::new_session(config));

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let writer = tokio::spawn(write_snapshots(session.subscribe(), out.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = start_watcher(project.root(), tx, args.poll, args.interval)?;

    eprintln!();
    eprintln!(
        "  Watching {} -> {}. Press {BOLD}Ctrl+C{RESET} to stop.",
        args.project.dir.display(),
        out.display()
    );

    for (filename, content) in project.files() {
        session.notify_change(filename, content);
    }
    start_attempt(&session, project.files().len(), 0);

    while running.load(Ordering::SeqCst) {
        let first = match tokio::time::timeout(TICK, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => continue,
        };
        let mut paths = BTreeSet::new();
        collect_paths(first, &mut paths);
        tokio::time::sleep(DEBOUNCE).await;
        while let Ok(event) = rx.try_recv() {
            collect_paths(event, &mut paths);
        }

        let (mut changed, mut removed) = (0, 0);
        for path in &paths {
            for change in project.refresh(path) {
                match change {
                    FileChange::Changed { filename, content } => {
                        session.notify_change(&filename, &content);
                        changed += 1;
                    }
                    FileChange::Removed { filename } => {
                        session.remove_file(&filename);
                        removed += 1;
                    }
                }
            }
        }
        if changed + removed > 0 {
            start_attempt(&session, changed, removed);
        }
    }

    writer.abort();
    eprintln!();
    eprintln!("  Stopped.");
    Ok(())
}

/// Starts a native watcher on `root`, falling back to polling.
fn start_watcher(root: &Path, tx: EventSender, poll: bool, interval: u64) -> anyhow::Result<Box<dyn Watcher>> {
    let native = if poll {
        None
    } else {
        match notify::recommended_watcher(forward(tx.clone())) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "native file events unavailable, polling instead");
                None
            }
        }
    };
    let polling = native.is_none();
    let mut watcher: Box<dyn Watcher> = match native {
        Some(watcher) => Box::new(watcher),
        None => Box::new(
            PollWatcher::new(
                forward(tx),
                notify::Config::default().with_poll_interval(Duration::from_millis(interval.max(1))),
            )
            .context("failed to start poll watcher")?,
        ),
    };
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;
    tracing::debug!(root = %root.display(), polling, "watching project");
    Ok(watcher)
}

fn forward(tx: EventSender) -> impl Fn(notify::Result<Event>) + Send + 'static {
    move |event| {
        let _ = tx.send(event);
    }
}

/// Adds the paths of a content-relevant event to `paths`.
fn collect_paths(event: notify::Result<Event>, paths: &mut BTreeSet<PathBuf>) {
    match event {
        Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
        Ok(event) => paths.extend(event.paths),
        Err(e) => tracing::warn!(error = %e, "watch error"),
    }
}

fn start_attempt(session: &Arc<Session>, changed: usize, removed: usize) {
    let attempt = session.begin_attempt();
    tracing::info!(attempt = attempt.number, changed, removed, "change detected");
    let session = Arc::clone(session);
    drop(tokio::spawn(async move {
        let _ = session.run_attempt(attempt).await;
    }));
}

async fn write_snapshots(mut updates: watch::Receiver<Arc<CompilationResult>>, out: PathBuf) {
    let mut tracker = RenderTracker::new();
    while updates.changed().await.is_ok() {
        let result = Arc::clone(&updates.borrow_and_update());
        let payload = RenderPayload::from_result(&result);
        let written = match tracker.apply(&payload) {
            RenderAction::Remount => output::write_bundle(&out, &payload, &result),
            RenderAction::Restyle => output::write_styles(&out, &payload.final_css),
            RenderAction::Keep => Ok(()),
        };
        if let Err(e) = written {
            tracing::error!(error = %e, "failed to write output");
        }
        output::print_diagnostics(&result);
        eprintln!("  {}", output::summary(&result));
    }
}
