//! `lumo` -- command-line client for the generation backend.
//!
//! Submits a generation job, polls it to completion, and prints the
//! resulting asset URL. Also lists history and shows the credit balance.
//!
//! # Environment variables
//!
//! | Variable                    | Required | Default                     | Description                          |
//! |-----------------------------|----------|-----------------------------|--------------------------------------|
//! | `LUMO_API_URL`              | no       | `http://localhost:8000/api` | Backend API base URL                 |
//! | `LUMO_ASSET_BASE_URL`       | no       | --                          | Base for relative asset paths        |
//! | `LUMO_ACCESS_TOKEN`         | no       | --                          | Bearer token for the session         |
//! | `LUMO_POLL_INTERVAL_MS`     | no       | `3000`                      | Delay between status polls           |
//! | `LUMO_REQUEST_TIMEOUT_SECS` | no       | `30`                        | Per-request timeout                  |
//! | `LUMO_MAX_JOBS`             | no       | `50`                        | Jobs kept in the list                |
//! | `LUMO_REFRESH_HISTORY`      | no       | `true`                      | Refetch history after a completion   |

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lumo_client::{ApiClient, ClientConfig, ClientError, Session};
use lumo_core::job::{GenerationRequest, JobStatus, MediaKind};
use lumo_core::problem::{map_problem_to_ui, UiActionKind};
use lumo_events::{EventBus, StudioEvent};
use lumo_jobs::Studio;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Model used when `--model` is not given.
const DEFAULT_MODEL: &str = "flux-dev";

#[derive(Parser)]
#[command(name = "lumo")]
#[command(version)]
#[command(about = "Generate images and videos from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a generation job and wait for the result
    Generate {
        /// Text prompt
        prompt: String,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        /// Generate a video instead of an image
        #[arg(long)]
        video: bool,
        /// Aspect ratio, e.g. `16:9`
        #[arg(long)]
        aspect_ratio: Option<String>,
        /// Source image for image-to-image or image-to-video
        #[arg(long)]
        image_url: Option<String>,
        /// Number of outputs (1-4)
        #[arg(long)]
        num_outputs: Option<u8>,
    },
    /// List past jobs, newest first
    History,
    /// Show the current credit balance
    Credits,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumo=info,lumo_jobs=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    tracing::info!(
        api_url = %config.api_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Starting lumo",
    );

    let session = match &config.access_token {
        Some(token) => Session::with_token(token.clone()),
        None => Session::new(),
    };
    let client = Arc::new(ApiClient::new(&config, Arc::new(session))?);

    match cli.command {
        Commands::Generate {
            prompt,
            model,
            video,
            aspect_ratio,
            image_url,
            num_outputs,
        } => {
            let mut request = GenerationRequest::new(prompt, model);
            if video {
                request = request.with_kind(MediaKind::Video);
            }
            if let Some(ratio) = aspect_ratio {
                request = request.with_aspect_ratio(ratio);
            }
            if let Some(url) = image_url {
                request = request.with_image_url(url);
            }
            if let Some(n) = num_outputs {
                request = request.with_num_outputs(n);
            }
            generate(client, &config, request).await
        }
        Commands::History => history(client, &config).await,
        Commands::Credits => {
            let balance = client.fetch_credits().await.map_err(report)?;
            println!("{} credits", balance.credits);
            Ok(())
        }
    }
}

async fn generate(
    client: Arc<ApiClient>,
    config: &ClientConfig,
    request: GenerationRequest,
) -> Result<()> {
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let studio = Studio::new(client.clone(), events, config);

    let job_id = studio.submit(&request).await.map_err(report)?;
    println!("Submitted job {job_id}");

    let job = tokio::select! {
        job = studio.wait_for(&job_id) => job,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job_id = %job_id, "Interrupted, stopping polling");
            None
        }
    };
    studio.shutdown().await;

    let Some(job) = job else {
        anyhow::bail!("Stopped waiting for job {job_id}");
    };

    match job.status {
        JobStatus::Done => {
            for url in job.urls.iter().skip(1) {
                println!("  also: {url}");
            }
            match &job.url {
                Some(url) => println!("Done: {url}"),
                None => println!("Done (no asset URL returned)"),
            }
        }
        _ => {
            let reason = job.error.as_deref().unwrap_or("no reason given");
            anyhow::bail!("Job {job_id} failed: {reason}");
        }
    }

    let mut credits_changed = false;
    while let Ok(event) = rx.try_recv() {
        credits_changed |= matches!(event, StudioEvent::CreditsChanged { .. });
    }
    if credits_changed {
        match client.fetch_credits().await {
            Ok(balance) => println!("{} credits remaining", balance.credits),
            Err(e) => tracing::warn!(error = %e, "Could not refresh credit balance"),
        }
    }
    Ok(())
}

async fn history(client: Arc<ApiClient>, config: &ClientConfig) -> Result<()> {
    let studio = Studio::new(client, Arc::new(EventBus::default()), config);
    let count = studio.load_history().await.map_err(report)?;
    studio.shutdown().await;

    if count == 0 {
        println!("No jobs yet");
        return Ok(());
    }
    for job in studio.jobs().await {
        let when = job
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let url = job.url.as_deref().unwrap_or("-");
        let status = format!("{:?}", job.status).to_lowercase();
        println!("{when}  {status:<10}  {}  {url}", job.id);
    }
    Ok(())
}

/// Turn a client error into the user-facing message its problem maps to.
fn report(err: ClientError) -> anyhow::Error {
    tracing::debug!(error = %err, "Request failed");
    let action = map_problem_to_ui(&err.problem());
    let mut message = action.message;
    if let Some(cta) = action.cta {
        message = format!("{message}\n  {}: {}", cta.label, cta.href);
    }
    if action.kind == UiActionKind::Redirect {
        message = format!("{message}\n  (set LUMO_ACCESS_TOKEN to sign in)");
    }
    anyhow::anyhow!(message)
}
