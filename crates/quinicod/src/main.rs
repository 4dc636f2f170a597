use std::path::Path;

use anyhow::{Context, Result};
use quinico_config::{QuinicoConfig, config_path, ensure_config, validate_config};
use quinico_dashboard::{AppState, router};
use quinico_store::SqliteStore;
use quinicod::cli::{Commands, ServeArgs, parse_cli};
use quinicod::logging::init_logging;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_logging(cli.log_format).context("failed to install tracing subscriber")?;

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("failed to resolve root path {}", cli.root.display()))?;
    let config = prepare(&root)?;

    match cli.command() {
        Commands::Init => {
            tracing::info!(root = %root.display(), "quinico initialised");
            Ok(())
        }
        Commands::Serve(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            runtime.block_on(serve(&root, config, args))
        }
    }
}

/// Loads or writes the config, reports its warnings, and brings the
/// database schema up to date.
fn prepare(root: &Path) -> Result<QuinicoConfig> {
    let config = ensure_config(root).with_context(|| {
        format!(
            "failed to load or create config at {}",
            config_path(root).display()
        )
    })?;
    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "{}", warning.message);
    }

    let database_path = config.database_path(root);
    SqliteStore::open(&database_path)
        .with_context(|| format!("failed to open database {}", database_path.display()))?;
    tracing::debug!(path = %database_path.display(), "database ready");
    Ok(config)
}

async fn serve(root: &Path, config: QuinicoConfig, args: ServeArgs) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    tracing::info!(addr = %local_addr, root = %root.display(), "dashboard listening");

    let app = router(AppState::new(root, config));
    axum::serve(listener, app)
        .await
        .context("dashboard server exited with error")?;
    Ok(())
}
