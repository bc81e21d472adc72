use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use metaflux::biochem::BiochemIndex;
use metaflux::cobra::media::load_media_dir;
use metaflux::config::Config;
use metaflux::session::SessionStore;
use metaflux::state;
use metaflux::template::TemplateRegistry;

/// In-flight tool calls get this long to finish after an interrupt.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "metaflux",
    version,
    about = "Genome-scale metabolic modeling MCP server (stdio JSON-RPC)"
)]
struct Cli {
    /// Directory containing compounds.tsv and reactions.tsv
    /// (overrides METAFLUX_BIOCHEM_DIR).
    #[arg(long)]
    biochem_dir: Option<PathBuf>,

    /// Directory containing template JSON files (overrides
    /// METAFLUX_TEMPLATE_DIR).
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Directory containing predefined media JSON files (overrides
    /// METAFLUX_MEDIA_DIR).
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "metaflux=debug" (overrides METAFLUX_LOG).
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.biochem_dir {
        config.biochem_dir = dir;
    }
    if let Some(dir) = cli.template_dir {
        config.template_dir = dir;
    }
    if let Some(dir) = cli.media_dir {
        config.media_dir = dir;
    }
    if let Some(filter) = cli.log {
        config.log_filter = filter;
    }

    // stdout belongs to the JSON-RPC transport; all logging goes to stderr.
    let filter =
        EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let biochem = match BiochemIndex::load(&config.compounds_file(), &config.reactions_file()) {
        Ok(index) => index,
        Err(e) => {
            error!(%e, "startup failed: biochemistry index");
            return ExitCode::FAILURE;
        }
    };
    info!(
        compounds = biochem.num_compounds(),
        reactions = biochem.num_reactions(),
        "biochemistry index ready"
    );

    let templates = match TemplateRegistry::load(&config.template_dir) {
        Ok(registry) => registry,
        Err(e) => {
            error!(%e, "startup failed: template registry");
            return ExitCode::FAILURE;
        }
    };

    let mut sessions = SessionStore::new(config.max_models, config.max_media);
    sessions.install_predefined_media(load_media_dir(&config.media_dir));
    info!(media = sessions.num_media(), "predefined media installed");

    // Globals must exist before the tool router serves its first request.
    state::init(biochem, templates, sessions);

    let mut server = tokio::spawn(metaflux::mcp::serve_stdio());
    let status = tokio::select! {
        result = &mut server => match result {
            Ok(Ok(())) => {
                info!("client disconnected");
                ExitCode::SUCCESS
            }
            Ok(Err(e)) => {
                error!(%e, "server error");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!(%e, "server task panicked");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!(grace_seconds = SHUTDOWN_GRACE.as_secs(), "interrupt received; draining");
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await;
            ExitCode::SUCCESS
        }
    };

    if let Ok(mut store) = state::sessions() {
        store.shutdown();
    }
    status
}
