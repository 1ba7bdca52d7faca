//! press-post - publish a blog post to the X platform

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use libpresscast::media::{ImageOptimizer, DERIVED_MAX_AGE};
use libpresscast::workflow::{FixedImageResolver, PublishWorkflow, TokioRetryScheduler};
use libpresscast::{
    ApiEndpoints, Config, Database, FileCredentialStore, PostEvent, PresscastError, PublishResult,
    Result, TokenStore, XApiClient,
};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "press-post")]
#[command(about = "Publish a blog post to the X platform", long_about = None)]
struct Cli {
    /// Post title (omit with --history)
    title: Option<String>,

    /// Canonical URL of the post
    #[arg(short = 'l', long)]
    permalink: Option<String>,

    /// Post body; read from stdin if not provided
    #[arg(long)]
    content: Option<String>,

    /// Explicit excerpt (defaults to the first words of the content)
    #[arg(short, long)]
    excerpt: Option<String>,

    /// Post author name
    #[arg(short, long, default_value = "")]
    author: String,

    /// Host content type of the post
    #[arg(long, default_value = "post")]
    content_type: String,

    /// Stable post identifier; generated when omitted
    #[arg(long)]
    post_id: Option<String>,

    /// Image to attach
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Treat this as the retry of a previously failed publish
    #[arg(long)]
    retry: bool,

    /// Stay running and perform the delayed retry if the publish fails
    #[arg(long)]
    wait_retry: bool,

    /// Print the most recent publish log entries and exit
    #[arg(long, value_name = "N")]
    history: Option<i64>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        libpresscast::logging::init_default();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load().unwrap_or_else(|_| Config::default_config()),
    };

    let db = Database::new(&config.database.path).await?;

    if let Some(limit) = cli.history {
        return print_history(&db, limit, &cli.format).await;
    }

    let title = cli
        .title
        .clone()
        .ok_or_else(|| PresscastError::InvalidInput("post title is required".to_string()))?;
    let permalink = cli
        .permalink
        .clone()
        .ok_or_else(|| PresscastError::InvalidInput("--permalink is required".to_string()))?;

    let content = match cli.content.clone() {
        Some(c) => c,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| PresscastError::InvalidInput(format!("failed to read stdin: {}", e)))?;
            buf
        }
    };

    let event = PostEvent {
        post_id: cli
            .post_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        title,
        permalink,
        excerpt: cli.excerpt.clone(),
        content,
        author: cli.author.clone(),
        content_type: cli.content_type.clone(),
    };

    let store = FileCredentialStore::from_config_path(&config.credentials.path)?;
    let tokens = Arc::new(TokenStore::new(Arc::new(store), ApiEndpoints::default())?);
    let client = XApiClient::new(ApiEndpoints::default())?;
    let (scheduler, mut retry_rx) = TokioRetryScheduler::new();

    let workflow = PublishWorkflow::new(
        config.publish.clone(),
        tokens,
        client,
        db,
        Box::new(FixedImageResolver::new(cli.image.clone())),
        Box::new(scheduler),
    );

    let mut result = if cli.retry {
        workflow.handle_retry(&event).await
    } else {
        workflow.handle_published(&event).await
    };

    // One-shot invocations exit before the delayed retry would fire; with
    // --wait-retry the process stays up for it.
    if cli.wait_retry && result.is_failure() {
        report(&result, &cli.format);
        eprintln!("Waiting for scheduled retry...");
        if let Some(post_id) = retry_rx.recv().await {
            debug_assert_eq!(post_id, event.post_id);
            result = workflow.handle_retry(&event).await;
        }
    }

    sweep_derived(cli.image.as_deref());

    report(&result, &cli.format);
    if result.is_failure() {
        // Already reported; the log carries the detail
        std::process::exit(1);
    }
    Ok(())
}

fn report(result: &PublishResult, format: &str) {
    if format == "json" {
        let value = match result {
            PublishResult::Success { remote_post_id } => serde_json::json!({
                "status": "success",
                "remote_post_id": remote_post_id,
            }),
            PublishResult::Failure { reason } => serde_json::json!({
                "status": "failure",
                "reason": reason,
            }),
            PublishResult::Skipped { reason } => serde_json::json!({
                "status": "skipped",
                "reason": reason,
            }),
        };
        println!("{}", value);
        return;
    }

    match result {
        PublishResult::Success { remote_post_id } => {
            println!("Published: {}", remote_post_id)
        }
        PublishResult::Failure { reason } => println!("Failed: {}", reason),
        PublishResult::Skipped { reason } => println!("Skipped: {}", reason),
    }
}

async fn print_history(db: &Database, limit: i64, format: &str) -> Result<()> {
    let logs = db.recent_logs(limit).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&logs)
                .map_err(|e| PresscastError::InvalidInput(e.to_string()))?
        );
        return Ok(());
    }

    for record in logs {
        let when = chrono::DateTime::from_timestamp(record.timestamp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.timestamp.to_string());
        let status = if record.success { "ok" } else { "failed" };
        println!(
            "{} [{}] {} - {}",
            when, status, record.post_id, record.response_text
        );
    }
    Ok(())
}

/// Best-effort sweep of stale derived images next to the attached one.
fn sweep_derived(image: Option<&std::path::Path>) {
    let Some(dir) = image.and_then(|p| p.parent()) else {
        return;
    };
    let optimizer = ImageOptimizer::new();
    match optimizer.cleanup_derived(dir, DERIVED_MAX_AGE) {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "removed stale derived images"),
        Err(e) => warn!("derived image sweep failed: {}", e),
    }
}
