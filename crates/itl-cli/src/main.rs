//! ITL CLI - Command-line interface
//!
//! Usage:
//!   itl import <archive.zip> [--manifest data.json]
//!   itl export <out.zip>
//!   itl add <manifest.json> [--image <file> --target <id>]
//!   itl edit <edit.json> [--image <file> --target <id>]
//!   itl image <id>

use anyhow::Context;
use clap::{Parser, Subcommand};
use itl_core::AppConfig;
use itl_sync::{ImageStore, ImageUpload, SyncOptions, SyncPipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "itl")]
#[command(about = "IT landscape catalog bulk sync CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true, env = "ITL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wipe the graph and load an export archive
    Import {
        /// ZIP archive (data.json plus images, or images only with --manifest)
        archive: PathBuf,
        /// Separate manifest; the archive must then hold one image per node
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Write the graph and content directory to a ZIP archive
    Export {
        /// Output path
        output: PathBuf,
    },
    /// Add nodes and relationships without touching existing ones
    Add {
        /// Manifest JSON
        file: PathBuf,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Rename nodes and apply relationship diffs
    Edit {
        /// Edit payload JSON
        file: PathBuf,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Print the public URL of an entity's image
    Image {
        /// Entity id
        id: String,
    },
}

#[derive(clap::Args)]
struct ImageArgs {
    /// Image file to store for the target entity
    #[arg(long, requires = "target")]
    image: Option<PathBuf>,
    /// Id of the entity the image belongs to
    #[arg(long)]
    target: Option<String>,
}

impl ImageArgs {
    async fn into_upload(self) -> anyhow::Result<Option<ImageUpload>> {
        let Some(path) = self.image else {
            return Ok(None);
        };
        let bytes = read(&path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Some(ImageUpload {
            target_entity_id: self.target,
            file_name,
            bytes,
        }))
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "itl_sync=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let images = ImageStore::from_config(&config.content, &config.server.public_base_url);

    if let Commands::Image { id } = &cli.command {
        println!("{}", images.resolve(id).await);
        return Ok(());
    }

    let store = itl_graph::open_store(&config.database).await?;
    let pipeline = SyncPipeline::new(store, images, SyncOptions::from(&config.sync));

    match cli.command {
        Commands::Import { archive, manifest } => {
            let archive = read(&archive).await?;
            let summary = match manifest {
                Some(manifest) => pipeline.import_split(&read(&manifest).await?, &archive).await?,
                None => pipeline.import_archive(&archive).await?,
            };
            print_json(&summary)?;
        }
        Commands::Export { output } => {
            let bytes = pipeline.export_archive().await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(path = %output.display(), bytes = bytes.len(), "Export written");
        }
        Commands::Add { file, image } => {
            let manifest = read(&file).await?;
            let summary = pipeline.add(&manifest, image.into_upload().await?).await?;
            print_json(&summary)?;
        }
        Commands::Edit { file, image } => {
            let payload = read(&file).await?;
            let summary = pipeline.edit(&payload, image.into_upload().await?).await?;
            print_json(&summary)?;
        }
        Commands::Image { .. } => {}
    }

    Ok(())
}
