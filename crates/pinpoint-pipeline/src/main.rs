//! Pinpoint command line client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pinpoint_firestore::{FirestoreClient, PostRepository};
use pinpoint_inference::{AnalysisOutcome, InferenceClient, ResilientUploader};
use pinpoint_media::FfmpegMediaPreparer;
use pinpoint_models::{AnalysisRequest, PinpointSelection, PostDraft};
use pinpoint_pipeline::{
    AnalysisPipeline, EventBus, PipelineConfig, PipelineError, PostPersister, StaticIdentity,
};
use pinpoint_storage::R2Client;

#[derive(Parser)]
#[command(name = "pinpoint", version, about = "Analyze rally videos and publish them as posts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a video and print the action counts
    Analyze(VideoArgs),
    /// Analyze a video and publish it as a post
    Publish {
        #[command(flatten)]
        video: VideoArgs,
        #[arg(long, default_value = "")]
        caption: String,
        /// Hide the post from other users
        #[arg(long)]
        private: bool,
        /// Match date, YYYY-MM-DD
        #[arg(long)]
        match_date: Option<NaiveDate>,
    },
}

#[derive(Args)]
struct VideoArgs {
    /// Local video file
    video: PathBuf,
    /// Pinpointed player x, in source frame pixels
    #[arg(long)]
    x: f64,
    /// Pinpointed player y, in source frame pixels
    #[arg(long)]
    y: f64,
    /// Source frame width; defaults to the probed video width
    #[arg(long)]
    width: Option<u32>,
    /// Source frame height; defaults to the probed video height
    #[arg(long)]
    height: Option<u32>,
    /// Declared MIME type; inferred from the extension when omitted
    #[arg(long)]
    mime: Option<String>,
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();
    debug!("Pipeline config: {:?}", config);

    if let Err(e) = run(cli.command, config).await {
        error!("{:#}", e);
        match e.downcast_ref::<PipelineError>() {
            Some(pipeline_error) => eprintln!("{}", pipeline_error.user_message()),
            None => eprintln!("{:#}", e),
        }
        std::process::exit(1);
    }
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("pinpoint=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run(command: Command, config: PipelineConfig) -> anyhow::Result<()> {
    let (video, publish) = match command {
        Command::Analyze(video) => (video, None),
        Command::Publish {
            video,
            caption,
            private,
            match_date,
        } => {
            if config.author_id.is_none() {
                return Err(PipelineError::AuthenticationMissing.into());
            }
            (video, Some((caption, private, match_date)))
        }
    };

    let mut pipeline = build_pipeline(&config).await?;
    if publish.is_some() {
        pipeline = pipeline.with_persister(build_persister(&config).await?);
    }

    let prepared = pipeline
        .prepare(&video.video, video.mime.as_deref())
        .await?;
    info!(
        "Prepared {} ({}x{}, {:.1}s)",
        prepared.asset.file_name(),
        prepared.info.width,
        prepared.info.height,
        prepared.info.duration
    );

    let selection = PinpointSelection::new(
        video.x,
        video.y,
        video.width.unwrap_or(prepared.info.width),
        video.height.unwrap_or(prepared.info.height),
    )
    .map_err(|e| anyhow!("Invalid pinpoint: {}", e))?;
    let request = AnalysisRequest::new(prepared.asset.clone(), selection);

    let outcome = analyze_with_status(&pipeline, &request).await?;
    print_result(&outcome);

    let Some((caption, is_private, match_date)) = publish else {
        return Ok(());
    };

    let mut created = pipeline
        .persister()
        .map(|p| p.events().subscribe())
        .context("publishing is not configured")?;

    let post = pipeline
        .publish(PostDraft {
            video: request.asset().clone(),
            thumbnail: prepared.thumbnail.bytes,
            result: outcome.result,
            caption,
            is_private,
            match_date,
        })
        .await?;

    if let Ok(event) = created.try_recv() {
        debug!(post_id = %event.post.id, "Post created event received");
    }
    println!("Published post {}", post.id);
    println!("  video:     {}", post.video_url);
    println!("  thumbnail: {}", post.thumbnail_url);
    Ok(())
}

async fn build_pipeline(config: &PipelineConfig) -> anyhow::Result<AnalysisPipeline> {
    let inference = InferenceClient::from_env()?;
    let healthy = inference.health_check().await?;
    if !healthy {
        bail!(
            "Analysis service at {} is not healthy",
            inference.config().base_url
        );
    }

    let inference_config = inference.config().clone();
    let uploader =
        ResilientUploader::from_config(Arc::new(inference), &inference_config, config.spool_dir());
    let preparer = Arc::new(FfmpegMediaPreparer::new(config.thumbnail_dir()));

    Ok(AnalysisPipeline::new(preparer, uploader, config.event_capacity))
}

async fn build_persister(config: &PipelineConfig) -> anyhow::Result<PostPersister> {
    let objects = R2Client::from_env()
        .await
        .context("Failed to create R2 client")?;
    let documents = FirestoreClient::from_env()
        .await
        .context("Failed to create Firestore client")?;

    Ok(PostPersister::new(
        Arc::new(objects),
        PostRepository::new(Arc::new(documents)),
        Arc::new(StaticIdentity::from_config(config)),
        EventBus::new(config.event_capacity),
        config.storage_retry.clone(),
    ))
}

/// Run the analysis while printing session status lines. Ctrl-C cancels.
async fn analyze_with_status(
    pipeline: &AnalysisPipeline,
    request: &AnalysisRequest,
) -> anyhow::Result<AnalysisOutcome> {
    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    println!("[{:>3.0}%] {}", event.progress * 100.0, event.status);
                    if event.phase.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Status printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, cancelling analysis");
                cancel.cancel();
            }
        }
    });

    let result = pipeline.analyze(request, &cancel).await;

    interrupt.abort();
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        debug!("Status printer did not finish");
    }

    Ok(result?)
}

fn print_result(outcome: &AnalysisOutcome) {
    println!();
    for stat in outcome.result.stats() {
        println!(
            "{:<8} {:>4} / {}",
            stat.category.label(),
            stat.count,
            stat.display_max
        );
    }
    println!("{:<8} {:>4}", "Total", outcome.result.total());
    if let Some(url) = &outcome.crops_url {
        println!("Crops: {}", url);
    }
}
