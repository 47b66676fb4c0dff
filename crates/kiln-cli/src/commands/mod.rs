//! CLI command definitions and dispatch.

pub mod build;
pub mod graph;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kiln_common::capability::TypeSink;
use kiln_common::config::KilnConfig;
use kiln_core::capability::BuiltinCapabilities;
use kiln_core::session::CompilationSession;
use kiln_graph::declarations::TypeDeclarationStore;
use kiln_graph::resolver::ImportTable;

/// kiln: incremental compiler for script and stylesheet projects.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the project once and write the bundle.
    Build(build::BuildArgs),
    /// Print the module graph in processing order.
    Graph(graph::GraphArgs),
    /// Recompile on every change until interrupted.
    Watch(watch::WatchArgs),
}

/// Project location and configuration overrides shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project directory.
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Entry script, overriding `kiln.yaml`.
    #[arg(long, env = "KILN_ENTRY")]
    pub entry: Option<String>,

    /// Entry stylesheet, overriding `kiln.yaml`.
    #[arg(long, env = "KILN_STYLE")]
    pub style: Option<String>,
}

impl ProjectArgs {
    /// Loads `kiln.yaml` from the project directory and applies flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is invalid.
    pub fn config(&self) -> anyhow::Result<KilnConfig> {
        let mut config = KilnConfig::load(&self.dir)
            .with_context(|| format!("failed to load configuration from {}", self.dir.display()))?;
        if let Some(entry) = &self.entry {
            config.entry_script.clone_from(entry);
        }
        if let Some(style) = &self.style {
            config.entry_style.clone_from(style);
        }
        Ok(config)
    }

    /// Output directory: `out` if given, `<DIR>/dist` otherwise.
    #[must_use]
    pub fn out_dir(&self, out: Option<&Path>) -> PathBuf {
        out.map_or_else(|| self.dir.join(DEFAULT_OUT_DIR), Path::to_path_buf)
    }
}

/// Output directory used when `--out` is not given.
pub const DEFAULT_OUT_DIR: &str = "dist";

/// Session over the built-in capabilities.
pub type Session = CompilationSession<
    kiln_script::EsmTransform,
    kiln_style::builder::PassthroughStylesheet,
    kiln_graph::cdn::CdnResolver,
>;

/// Creates a session with a fresh import table and type declaration store.
pub fn new_session(config: KilnConfig) -> Session {
    let types: Arc<dyn TypeSink> = Arc::new(TypeDeclarationStore::new());
    let capabilities = BuiltinCapabilities::builtin(&config, Arc::new(ImportTable::new()), Some(types));
    CompilationSession::new(config, Arc::new(capabilities))
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Build(args) => build::execute(args).await,
        Command::Graph(args) => graph::execute(args).await,
        Command::Watch(args) => watch::execute(args).await,
    }
}
