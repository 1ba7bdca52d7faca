//! Publish workflow
//!
//! Orchestrates a "post published" event end to end: gate, compose the
//! message from the template, resolve and optimize the image, refresh
//! tokens, upload, post, then record the outcome. Failures schedule exactly
//! one delayed retry per post.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::client::XApiClient;
use crate::config::PublishConfig;
use crate::db::Database;
use crate::media::{ImageOptimizer, OptimizeOutcome};
use crate::types::{LogRecord, PostEvent, PublishResult, PublishStatus};

/// Delay before the single automatic retry of a failed publish
pub const RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Word count for excerpts derived from post content
const EXCERPT_WORDS: usize = 20;

/// Finds the image to attach for a post. The host knows where featured
/// images live; the workflow does not.
pub trait ImageResolver: Send + Sync {
    fn resolve(&self, event: &PostEvent) -> Option<PathBuf>;
}

/// Resolver for hosts that hand the image path alongside the event.
pub struct FixedImageResolver {
    path: Option<PathBuf>,
}

impl FixedImageResolver {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ImageResolver for FixedImageResolver {
    fn resolve(&self, _event: &PostEvent) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Schedules the delayed retry of a failed publish.
///
/// `is_scheduled` must reflect pending retries so a post failing twice in
/// quick succession gets one retry, not two.
pub trait RetryScheduler: Send + Sync {
    fn is_scheduled(&self, post_id: &str) -> bool;
    fn schedule(&self, post_id: &str, delay: Duration);
}

/// Tokio-backed scheduler. Due post ids arrive on the returned receiver;
/// the host drains it and calls [`PublishWorkflow::handle_retry`].
pub struct TokioRetryScheduler {
    pending: Arc<Mutex<HashSet<String>>>,
    tx: mpsc::UnboundedSender<String>,
}

impl TokioRetryScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Arc::new(Mutex::new(HashSet::new())),
                tx,
            },
            rx,
        )
    }
}

impl RetryScheduler for TokioRetryScheduler {
    fn is_scheduled(&self, post_id: &str) -> bool {
        self.pending.lock().unwrap().contains(post_id)
    }

    fn schedule(&self, post_id: &str, delay: Duration) {
        if !self.pending.lock().unwrap().insert(post_id.to_string()) {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let post_id = post_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.lock().unwrap().remove(&post_id);
            // Receiver gone means the host is shutting down
            let _ = tx.send(post_id);
        });
    }
}

pub struct PublishWorkflow {
    config: PublishConfig,
    tokens: Arc<crate::auth::TokenStore>,
    client: XApiClient,
    optimizer: ImageOptimizer,
    db: Database,
    resolver: Box<dyn ImageResolver>,
    scheduler: Box<dyn RetryScheduler>,
}

impl PublishWorkflow {
    pub fn new(
        config: PublishConfig,
        tokens: Arc<crate::auth::TokenStore>,
        client: XApiClient,
        db: Database,
        resolver: Box<dyn ImageResolver>,
        scheduler: Box<dyn RetryScheduler>,
    ) -> Self {
        Self {
            config,
            tokens,
            client,
            optimizer: ImageOptimizer::new(),
            db,
            resolver,
            scheduler,
        }
    }

    /// React to a newly published post.
    ///
    /// Never returns an error: every outcome, including internal failures,
    /// comes back as a [`PublishResult`] and is logged.
    #[instrument(skip(self, event), fields(post_id = %event.post_id))]
    pub async fn handle_published(&self, event: &PostEvent) -> PublishResult {
        if !self.config.enabled {
            debug!("publishing disabled, skipping");
            return PublishResult::Skipped {
                reason: "publishing disabled".to_string(),
            };
        }
        if !self.config.content_types.contains(&event.content_type) {
            debug!(content_type = %event.content_type, "content type not configured");
            return PublishResult::Skipped {
                reason: format!("content type '{}' not configured", event.content_type),
            };
        }

        self.attempt(event, true).await
    }

    /// Re-run a previously failed publish.
    ///
    /// Consults the recorded status first: a post that has since succeeded
    /// (or was never attempted) is skipped. The retry itself never schedules
    /// another retry.
    #[instrument(skip(self, event), fields(post_id = %event.post_id))]
    pub async fn handle_retry(&self, event: &PostEvent) -> PublishResult {
        match self.db.get_status(&event.post_id).await {
            Ok(Some(PublishStatus::Failed)) => {}
            Ok(_) => {
                debug!("no failed attempt on record, skipping retry");
                return PublishResult::Skipped {
                    reason: "no failed attempt on record".to_string(),
                };
            }
            Err(e) => {
                warn!("could not read publish status: {}", e);
                return PublishResult::Skipped {
                    reason: "publish status unavailable".to_string(),
                };
            }
        }

        info!("retrying failed publish");
        self.attempt(event, false).await
    }

    async fn attempt(&self, event: &PostEvent, schedule_on_failure: bool) -> PublishResult {
        let message = self.build_message(event);

        let image_path = if self.config.include_image {
            match self.resolve_image(event) {
                Ok(path) => path,
                Err(reason) => {
                    return self
                        .finish(event, &message, None, Err(reason), schedule_on_failure)
                        .await;
                }
            }
        } else {
            None
        };
        let image_str = image_path
            .as_ref()
            .map(|p| p.display().to_string());

        if !self.tokens.is_configured() {
            return self
                .finish(
                    event,
                    &message,
                    image_str,
                    Err("credentials not configured".to_string()),
                    schedule_on_failure,
                )
                .await;
        }
        if let Err(e) = self.tokens.ensure_fresh().await {
            return self
                .finish(
                    event,
                    &message,
                    image_str,
                    Err(format!("token refresh failed: {}", e)),
                    schedule_on_failure,
                )
                .await;
        }
        let access_token = match self.tokens.access_token() {
            Ok(t) => t,
            Err(e) => {
                return self
                    .finish(
                        event,
                        &message,
                        image_str,
                        Err(e.to_string()),
                        schedule_on_failure,
                    )
                    .await;
            }
        };

        let media_id = match &image_path {
            Some(path) => match self.client.upload_media(&access_token, path).await {
                Ok(id) => Some(id),
                Err(e) if self.config.require_image => {
                    return self
                        .finish(
                            event,
                            &message,
                            image_str,
                            Err(format!("media upload failed: {}", e)),
                            schedule_on_failure,
                        )
                        .await;
                }
                Err(e) => {
                    warn!("media upload failed, posting without image: {}", e);
                    None
                }
            },
            None => None,
        };

        let outcome = self
            .client
            .create_post(&access_token, &message, media_id.as_deref())
            .await
            .map_err(|e| e.to_string());

        self.finish(event, &message, image_str, outcome, schedule_on_failure)
            .await
    }

    /// Resolve and optimize the image for a post.
    ///
    /// Optimization failures degrade to the unmodified source; a missing
    /// image is only an error when the configuration requires one.
    fn resolve_image(&self, event: &PostEvent) -> Result<Option<PathBuf>, String> {
        let source = match self.resolver.resolve(event) {
            Some(path) => path,
            None => {
                if self.config.require_image {
                    return Err("no image available for post".to_string());
                }
                return Ok(None);
            }
        };

        match self.optimizer.optimize(&source) {
            Ok(OptimizeOutcome::Original(path)) => Ok(Some(path)),
            Ok(OptimizeOutcome::Optimized(path)) => {
                info!(derived = %path.display(), "image optimized for upload");
                Ok(Some(path))
            }
            Err(e) => {
                warn!("image optimization failed, using source as-is: {}", e);
                Ok(Some(source))
            }
        }
    }

    /// Record the outcome, update per-post status, and schedule the retry
    /// for failures. Database problems are logged, never propagated.
    async fn finish(
        &self,
        event: &PostEvent,
        message: &str,
        image_path: Option<String>,
        outcome: Result<String, String>,
        schedule_on_failure: bool,
    ) -> PublishResult {
        let record = LogRecord {
            id: None,
            post_id: event.post_id.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            message: message.to_string(),
            image_path,
            success: outcome.is_ok(),
            response_text: match &outcome {
                Ok(id) => format!("published as {}", id),
                Err(reason) => reason.clone(),
            },
            remote_post_id: outcome.as_ref().ok().cloned(),
        };
        if let Err(e) = self.db.append_log(&record).await {
            warn!("could not append publish log: {}", e);
        }

        match outcome {
            Ok(remote_post_id) => {
                info!(remote_post_id = %remote_post_id, "post published");
                if let Err(e) = self
                    .db
                    .set_status(&event.post_id, PublishStatus::Succeeded, Some(&remote_post_id))
                    .await
                {
                    warn!("could not record publish status: {}", e);
                }
                PublishResult::Success { remote_post_id }
            }
            Err(reason) => {
                warn!(reason = %reason, "publish failed");
                if let Err(e) = self
                    .db
                    .set_status(&event.post_id, PublishStatus::Failed, None)
                    .await
                {
                    warn!("could not record publish status: {}", e);
                }
                if schedule_on_failure && !self.scheduler.is_scheduled(&event.post_id) {
                    info!(delay_secs = RETRY_DELAY.as_secs(), "scheduling retry");
                    self.scheduler.schedule(&event.post_id, RETRY_DELAY);
                }
                PublishResult::Failure { reason }
            }
        }
    }

    /// Compose the message from the configured template.
    fn build_message(&self, event: &PostEvent) -> String {
        let excerpt = match &event.excerpt {
            Some(e) if !e.is_empty() => trim_words(e, EXCERPT_WORDS),
            _ => trim_words(&event.content, EXCERPT_WORDS),
        };

        let message = self
            .config
            .template
            .replace("{POST_TITLE}", &event.title)
            .replace("{PERMALINK}", &event.permalink)
            .replace("{EXCERPT}", &excerpt)
            .replace("{AUTHOR}", &event.author);

        truncate_chars(&message, self.config.char_limit)
    }
}

/// First `max_words` words of `text`, tags stripped, with an ellipsis when
/// anything was dropped.
fn trim_words(text: &str, max_words: usize) -> String {
    let plain = strip_tags(text);
    let words: Vec<&str> = plain.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

/// Remove markup segments so excerpts read as plain text.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Cap `text` at `limit` characters, ending with "..." when truncated.
fn truncate_chars(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, MemoryCredentialStore, TokenStore};
    use crate::client::ApiEndpoints;
    use crate::config::Config;

    struct NoImage;
    impl ImageResolver for NoImage {
        fn resolve(&self, _event: &PostEvent) -> Option<PathBuf> {
            None
        }
    }

    /// Scheduler test double recording every schedule call.
    struct RecordingScheduler {
        scheduled: Mutex<Vec<String>>,
    }

    impl RecordingScheduler {
        fn new() -> Self {
            Self {
                scheduled: Mutex::new(Vec::new()),
            }
        }
    }

    impl RetryScheduler for RecordingScheduler {
        fn is_scheduled(&self, post_id: &str) -> bool {
            self.scheduled
                .lock()
                .unwrap()
                .iter()
                .any(|p| p == post_id)
        }

        fn schedule(&self, post_id: &str, _delay: Duration) {
            self.scheduled.lock().unwrap().push(post_id.to_string());
        }
    }

    fn event() -> PostEvent {
        PostEvent {
            post_id: "post-1".to_string(),
            title: "Hello World".to_string(),
            permalink: "https://x.test/p/1".to_string(),
            excerpt: None,
            content: "<p>Some longer content body for the excerpt.</p>".to_string(),
            author: "Alex".to_string(),
            content_type: "post".to_string(),
        }
    }

    async fn workflow_with(config: PublishConfig) -> PublishWorkflow {
        let store = Arc::new(MemoryCredentialStore::new());
        let tokens = Arc::new(TokenStore::new(store, ApiEndpoints::default()).unwrap());
        PublishWorkflow::new(
            config,
            tokens,
            XApiClient::new(ApiEndpoints::default()).unwrap(),
            Database::in_memory().await.unwrap(),
            Box::new(NoImage),
            Box::new(RecordingScheduler::new()),
        )
    }

    #[tokio::test]
    async fn test_disabled_publishing_is_skipped() {
        let mut config = Config::default_config().publish;
        config.enabled = false;
        let workflow = workflow_with(config).await;

        let result = workflow.handle_published(&event()).await;
        assert!(matches!(result, PublishResult::Skipped { .. }));
        // Skips leave no trace in the log
        assert!(workflow.db.recent_logs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_content_type_is_skipped() {
        let workflow = workflow_with(Config::default_config().publish).await;

        let mut page = event();
        page.content_type = "page".to_string();
        let result = workflow.handle_published(&page).await;
        assert!(matches!(result, PublishResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_and_schedule_retry() {
        let store = Arc::new(MemoryCredentialStore::new());
        let tokens = Arc::new(TokenStore::new(store, ApiEndpoints::default()).unwrap());
        let scheduler = Arc::new(RecordingScheduler::new());
        let workflow = PublishWorkflow {
            config: Config::default_config().publish,
            tokens,
            client: XApiClient::new(ApiEndpoints::default()).unwrap(),
            optimizer: ImageOptimizer::new(),
            db: Database::in_memory().await.unwrap(),
            resolver: Box::new(NoImage),
            scheduler: Box::new(SharedScheduler(Arc::clone(&scheduler))),
        };

        let result = workflow.handle_published(&event()).await;
        assert!(matches!(result, PublishResult::Failure { .. }));

        // Failure was logged, status recorded, one retry queued
        let logs = workflow.db.recent_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
        assert_eq!(
            workflow.db.get_status("post-1").await.unwrap(),
            Some(PublishStatus::Failed)
        );
        assert_eq!(scheduler.scheduled.lock().unwrap().len(), 1);

        // A second failure does not queue a second retry
        workflow.handle_published(&event()).await;
        assert_eq!(scheduler.scheduled.lock().unwrap().len(), 1);
    }

    struct SharedScheduler(Arc<RecordingScheduler>);
    impl RetryScheduler for SharedScheduler {
        fn is_scheduled(&self, post_id: &str) -> bool {
            self.0.is_scheduled(post_id)
        }
        fn schedule(&self, post_id: &str, delay: Duration) {
            self.0.schedule(post_id, delay)
        }
    }

    #[tokio::test]
    async fn test_retry_skipped_without_failed_status() {
        let workflow = workflow_with(Config::default_config().publish).await;

        // Nothing on record
        let result = workflow.handle_retry(&event()).await;
        assert!(matches!(result, PublishResult::Skipped { .. }));

        // Already succeeded
        workflow
            .db
            .set_status("post-1", PublishStatus::Succeeded, Some("1"))
            .await
            .unwrap();
        let result = workflow.handle_retry(&event()).await;
        assert!(matches!(result, PublishResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_message_from_default_template() {
        let workflow = workflow_with(Config::default_config().publish).await;
        let message = workflow.build_message(&event());
        assert_eq!(message, "Hello World - https://x.test/p/1");
    }

    #[tokio::test]
    async fn test_message_with_excerpt_and_author() {
        let mut config = Config::default_config().publish;
        config.template = "{AUTHOR}: {EXCERPT}".to_string();
        let workflow = workflow_with(config).await;

        let message = workflow.build_message(&event());
        assert_eq!(message, "Alex: Some longer content body for the excerpt.");
    }

    #[tokio::test]
    async fn test_explicit_excerpt_takes_precedence() {
        let mut config = Config::default_config().publish;
        config.template = "{EXCERPT}".to_string();
        let workflow = workflow_with(config).await;

        let mut ev = event();
        ev.excerpt = Some("Hand-written summary".to_string());
        assert_eq!(workflow.build_message(&ev), "Hand-written summary");
    }

    #[tokio::test]
    async fn test_message_truncated_to_char_limit() {
        let mut config = Config::default_config().publish;
        config.char_limit = 10;
        let workflow = workflow_with(config).await;

        let message = workflow.build_message(&event());
        assert_eq!(message.chars().count(), 10);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 280), "short");
        let exactly = "a".repeat(280);
        assert_eq!(truncate_chars(&exactly, 280), exactly);

        let long = "a".repeat(300);
        let truncated = truncate_chars(&long, 280);
        assert_eq!(truncated.chars().count(), 280);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "é".repeat(20);
        let truncated = truncate_chars(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
    }

    #[test]
    fn test_trim_words() {
        assert_eq!(trim_words("one two three", 20), "one two three");
        assert_eq!(trim_words("one two three", 2), "one two...");
        assert_eq!(
            trim_words("<p>Hello <b>bold</b> world</p>", 20),
            "Hello bold world"
        );
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("plain text"), "plain text");
        assert_eq!(strip_tags("<p>wrapped</p>"), "wrapped");
        assert_eq!(strip_tags("a <a href=\"x\">link</a> here"), "a link here");
    }

    #[tokio::test]
    async fn test_tokio_scheduler_delivers_after_delay() {
        let (scheduler, mut rx) = TokioRetryScheduler::new();

        scheduler.schedule("post-9", Duration::from_millis(10));
        assert!(scheduler.is_scheduled("post-9"));
        // Duplicate schedule is a no-op
        scheduler.schedule("post-9", Duration::from_millis(10));

        let due = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(due, "post-9");
        assert!(!scheduler.is_scheduled("post-9"));

        // Exactly one delivery
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }
}
