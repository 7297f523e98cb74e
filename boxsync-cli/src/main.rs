use anyhow::{anyhow, bail, Context, Result};
use boxsync_core::{spawn_engine, EngineState, RemoteCfg, SyncConfig};
use boxsync_remote_sftp::SftpStore;
use clap::Parser;
use std::{fs, path::Path};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boxsync", version, about = "BoxSync – directory/remote store sync")]
struct Cli {
    /// Path to config file (YAML / JSON)
    #[arg(short, long, default_value = "boxsync.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let text = fs::read_to_string(&cli.config)
        .map_err(|e| anyhow!("read config {} failed: {e}", cli.config))?;

    // Detect format by extension
    let ext = Path::new(&cli.config)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let cfg: SyncConfig = match ext {
        "json" => serde_json::from_str(&text)?,
        _ => serde_yaml::from_str(&text)?, // default to yaml
    };

    let RemoteCfg::Sftp {
        host,
        user,
        password,
        fingerprints,
    } = &cfg.remote;
    let store = SftpStore::connect(host, user, password.as_deref(), fingerprints.clone())
        .await
        .context("connecting to remote store")?;

    info!(
        local = %cfg.local_root.display(),
        remote = %cfg.remote_root,
        "starting sync (Ctrl+C to stop)"
    );
    let mut handle = spawn_engine(cfg, store);

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, draining in-flight actions");
                handle.stop();
            }
        });
    }

    match handle.wait_stopped().await {
        EngineState::Failed(e) => bail!("{e}"),
        state => {
            info!(?state, "sync stopped");
            Ok(())
        }
    }
}
