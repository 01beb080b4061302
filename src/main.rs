mod backup;
mod config;
mod error;
mod log;
mod remote;
mod status;

use backup::{LocalDirCleanup, UploadPipeline};
use clap::{Parser, Subcommand};
use config::{AppConfig, ConfigStore, FileSettings, RemoteEndpointConfig, Scheme, SettingsProvider};
use error::Result;
use remote::{BackupKind, RemoteLayout, WebdavConnector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use status::StatusRegister;
use tracing::info;

#[derive(Parser)]
#[command(name = "nc-backup-uploader", version, about = "Upload backup archives to a WebDAV store")]
struct Cli {
    /// Application config (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the remote endpoint credentials
    Configure {
        #[arg(long, default_value = "https")]
        scheme: Scheme,
        #[arg(long)]
        host: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Connect to the remote store and create the backup folders
    Check,
    /// Upload `<temp_dir>/<ARTIFACT_ID>.tar`
    Upload {
        artifact_id: String,
        /// Store under the manual folder instead of the automatic one
        #[arg(long)]
        manual: bool,
        /// Remote file name, defaults to `<ARTIFACT_ID>.tar`
        #[arg(long)]
        name: Option<String>,
    },
    /// Apply remote retention to the automatic folder
    Clean {
        #[arg(long)]
        keep: Option<usize>,
    },
    /// List a backup folder
    List {
        #[arg(long)]
        manual: bool,
    },
}

fn build_pipeline(app: &AppConfig, config_path: PathBuf) -> UploadPipeline {
    let layout = RemoteLayout::new(&app.remote_root);
    let connector = WebdavConnector::new(
        &app.webdav_root,
        layout.clone(),
        app.request_timeout_secs.map(Duration::from_secs),
    );
    let settings: Arc<dyn SettingsProvider> = Arc::new(FileSettings::new(config_path));

    let pipeline = UploadPipeline::new(
        ConfigStore::new(&app.endpoint_config),
        Arc::new(connector),
        StatusRegister::new(),
        settings,
        layout,
        &app.temp_dir,
    );
    match &app.local_backup_dir {
        Some(dir) => pipeline.with_local_cleanup(Arc::new(LocalDirCleanup::new(dir))),
        None => pipeline,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(config::config_path);
    let app = config::load_from(&config_path)?;
    let pipeline = build_pipeline(&app, config_path);

    match cli.command {
        Command::Configure {
            scheme,
            host,
            username,
            password,
        } => {
            let store = ConfigStore::new(&app.endpoint_config);
            store.save(&RemoteEndpointConfig::new(scheme, &host, &username, &password))?;
            println!("Endpoint saved to {}", store.path().display());
        }
        Command::Check => {
            let session = pipeline.ensure_session().await?;
            println!("Connected to {}", session.describe());
        }
        Command::Upload {
            artifact_id,
            manual,
            name,
        } => {
            let kind = if manual { BackupKind::Manual } else { BackupKind::Auto };
            let name = name.unwrap_or_else(|| format!("{}.tar", artifact_id));
            let remote_path = pipeline.layout().file_path(kind, &name);

            let outcome = pipeline.upload(&artifact_id, &remote_path).await?;
            if let Some(cleanup) = outcome.cleanup {
                if let Err(e) = cleanup.await {
                    tracing::warn!("Post-upload cleanup task aborted: {}", e);
                }
            }
            info!(
                "Backup stored at {} ({})",
                outcome.remote_path,
                outcome.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Command::Clean { keep } => {
            pipeline.ensure_session().await?;
            let removed = pipeline.clean_now(keep).await?;
            println!("Removed {} old backup(s)", removed);
        }
        Command::List { manual } => {
            pipeline.ensure_session().await?;
            let kind = if manual { BackupKind::Manual } else { BackupKind::Auto };
            let mut files = pipeline.list_directory(&pipeline.layout().folder(kind)).await?;
            files.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
            for file in files {
                println!("{}  {}", file.last_modified.format("%Y-%m-%d %H:%M:%S UTC"), file.path);
            }
        }
    }

    let status = pipeline.status().get().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    log::init();

    info!("WebDAV backup uploader starting...");

    match run(Cli::parse()).await {
        Ok(_) => {
            info!("Application exited normally");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
