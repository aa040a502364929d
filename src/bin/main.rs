use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info};
use receipt_uploader::file_config::FileConfig;
use receipt_uploader::{
    Compression, Config, ProgressReporter, SourceFile, StoredFileDescriptor, TransactionType,
    UploadOptions, prepare, upload_file,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "receipt-uploader")]
#[command(about = "Compress receipt photos and upload them to the ledger image store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more receipt images
    Upload {
        /// Images to upload (each one is a separate upload)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Image store API base URL
        #[arg(long, env = "RECEIPTS_API_URL")]
        api_url: Option<String>,

        /// API key sent as `x-api-key`
        #[arg(long, env = "RECEIPTS_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Config file (defaults to ./receipts.json, then the user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Ledger side the receipts belong to (`expense` or `income`)
        #[arg(short, long, value_parser = clap::value_parser!(TransactionType))]
        transaction_type: Option<TransactionType>,

        /// MIME type to use instead of guessing from the extension
        #[arg(long)]
        mime_type: Option<String>,

        /// Number of files uploaded at the same time (1-8, default: 2)
        #[arg(long, default_value = "2")]
        parallel: usize,

        /// Print stored file descriptors as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Compress an image the way an upload would, without sending it
    Compress {
        /// Image to compress
        input: PathBuf,

        /// Where to write the result
        #[arg(short, long)]
        output: PathBuf,

        /// MIME type to use instead of guessing from the extension
        #[arg(long)]
        mime_type: Option<String>,
    },
}

fn progress_bar(multi: &MultiProgress) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(100));
    #[allow(clippy::expect_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("Failed to set progress bar template")
            .progress_chars("#>-"),
    );
    pb
}

async fn upload_one(
    config: &Config,
    path: &Path,
    mime_type: Option<&str>,
    options: &UploadOptions,
) -> receipt_uploader::Result<StoredFileDescriptor> {
    let file = SourceFile::from_path(path, mime_type).await?;
    upload_file(config, file, options).await
}

#[allow(clippy::too_many_arguments)]
async fn run_upload(
    files: Vec<PathBuf>,
    api_url: Option<String>,
    api_key: Option<String>,
    config_path: Option<PathBuf>,
    transaction_type: Option<TransactionType>,
    mime_type: Option<String>,
    parallel: usize,
    json: bool,
) -> Result<()> {
    if !(1..=8).contains(&parallel) {
        return Err(anyhow::anyhow!(
            "Parallel value must be between 1 and 8, got {parallel}"
        ));
    }

    let from_cli = FileConfig {
        api_url,
        api_key,
        transaction_type,
    };
    let resolved = from_cli.merge_with(&FileConfig::load_with_fallback(config_path.as_deref())?);

    let api_url = resolved.api_url.ok_or_else(|| {
        anyhow::anyhow!(
            "No API URL configured. Pass --api-url, set RECEIPTS_API_URL or add api_url to receipts.json"
        )
    })?;
    let transaction_type = resolved.transaction_type.unwrap_or_default();

    info!("Using API URL: {api_url}");
    info!("Transaction type: {}", transaction_type.as_str());
    let config = Config::new(api_url, resolved.api_key)?;

    let multi = MultiProgress::new();

    // Each file is its own invocation with its own progress and session
    let results: Vec<(PathBuf, receipt_uploader::Result<StoredFileDescriptor>)> =
        stream::iter(files)
            .map(|path| {
                let config = config.clone();
                let mime_type = mime_type.clone();
                let options = UploadOptions {
                    transaction_type,
                    progress: ProgressReporter::with_bar(progress_bar(&multi)),
                };

                async move {
                    let result = upload_one(&config, &path, mime_type.as_deref(), &options).await;
                    match &result {
                        Ok(_) => options.progress.finish("Upload complete"),
                        Err(_) => options.progress.abandon("Upload failed"),
                    }
                    (path, result)
                }
            })
            .buffered(parallel)
            .collect()
            .await;

    let mut stored = Vec::new();
    let mut errors = Vec::new();

    for (path, result) in results {
        match result {
            Ok(descriptor) => {
                info!(
                    "✅ {} uploaded successfully - File ID: {}",
                    path.display(),
                    descriptor.file_id
                );
                stored.push((path, descriptor));
            }
            Err(e) => {
                errors.push(format!("{}: {e}", path.display()));
            }
        }
    }

    if json {
        for (_, descriptor) in &stored {
            println!("{}", serde_json::to_string(descriptor)?);
        }
    } else if !stored.is_empty() {
        println!("\n✅ Successfully uploaded {} receipt(s):", stored.len());
        for (path, descriptor) in &stored {
            println!(
                "  {} → {} ({})",
                path.display(),
                descriptor.file_id,
                descriptor.primary_link().unwrap_or("no link")
            );
        }
    }

    if !errors.is_empty() {
        eprintln!("\n❌ Failed to upload {} receipt(s):", errors.len());
        for error in &errors {
            eprintln!("  {error}");
        }
        return Err(anyhow::anyhow!(
            "{} receipt(s) failed to upload",
            errors.len()
        ));
    }

    Ok(())
}

async fn run_compress(input: &Path, output: &Path, mime_type: Option<&str>) -> Result<()> {
    let file = SourceFile::from_path(input, mime_type).await?;
    let original_size = file.size();

    let compression = prepare(file).await?;
    match &compression {
        Compression::Skipped(_) => {
            println!("{} is small enough, copied unchanged", input.display());
        }
        Compression::Degraded(_) => {
            println!(
                "{} could not be decoded, copied unchanged",
                input.display()
            );
        }
        Compression::Compressed { report, .. } => {
            println!(
                "{} → {}: {original_size} → {} bytes, {}x{}, quality {}, {} attempt(s)",
                input.display(),
                output.display(),
                report.compressed_size,
                report.width,
                report.height,
                report.quality,
                report.attempts
            );
        }
    }

    tokio::fs::write(output, &compression.file().data).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            debug!("Error loading .env file: {e}");
        }
    } else {
        debug!("Loaded environment from .env file");
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Another crate in the tree may have installed one already.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Upload {
            files,
            api_url,
            api_key,
            config,
            transaction_type,
            mime_type,
            parallel,
            json,
        } => {
            run_upload(
                files,
                api_url,
                api_key,
                config,
                transaction_type,
                mime_type,
                parallel,
                json,
            )
            .await
        }
        Commands::Compress {
            input,
            output,
            mime_type,
        } => run_compress(&input, &output, mime_type.as_deref()).await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
