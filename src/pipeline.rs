use crate::adapters::{LLMAdapter, LLMRequest};
use crate::config::Config;
use crate::core::prompt::REVIEW_SYSTEM_PROMPT;
use crate::core::{DiffParser, PromptFormatter, ReviewMode, ReviewReport};
use crate::github::{GitHubClient, PullRequestEvent};
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Settings shared by every review job.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub mode: ReviewMode,
    pub system_prompt: Option<String>,
    pub min_changes: usize,
}

impl ReviewSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.review_mode,
            system_prompt: config.system_prompt.clone(),
            min_changes: config.min_changes,
        }
    }
}

/// The pull request a review job works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewJob {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub description: String,
}

impl ReviewJob {
    /// Builds a job from the `GET /pulls/{n}` JSON of a pull request.
    pub fn from_pull_request_info(owner: &str, repo: &str, number: u64, info: &Value) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
            title: info["title"].as_str().unwrap_or_default().to_string(),
            description: info["body"].as_str().unwrap_or_default().to_string(),
        }
    }

    fn label(&self) -> String {
        format!("{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl From<&PullRequestEvent> for ReviewJob {
    fn from(event: &PullRequestEvent) -> Self {
        Self {
            owner: event.repository.owner.login.clone(),
            repo: event.repository.name.clone(),
            number: event.pull_request.number,
            title: event.pull_request.title.clone(),
            description: event.pull_request.body.clone().unwrap_or_default(),
        }
    }
}

/// Result of a review that produced something to post.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub report: ReviewReport,
    pub comment: String,
}

/// Fetches the diff, asks the model for a review and renders the comment.
///
/// Returns `Ok(None)` when the pull request has no diff to review.
pub async fn generate_review(
    github: &GitHubClient,
    llm: &dyn LLMAdapter,
    settings: &ReviewSettings,
    job: &ReviewJob,
) -> Result<Option<ReviewOutcome>> {
    info!("Processing PR review for {}", job.label());

    let diff_content = github
        .get_pull_request_diff(&job.owner, &job.repo, job.number)
        .await?;
    if diff_content.trim().is_empty() {
        warn!("Empty diff for PR {}, nothing to review", job.label());
        return Ok(None);
    }

    let files = DiffParser::parse_unified_diff(&diff_content);
    let extensions: Vec<String> = DiffParser::file_extensions(&files).into_iter().collect();
    let significant = DiffParser::filter_significant_changes(&files, settings.min_changes);
    info!(
        "Parsed {} file diffs ({} with at least {} changed lines)",
        files.len(),
        significant.len(),
        settings.min_changes
    );
    let unreadable_hunks = files
        .iter()
        .flat_map(|file| &file.hunks)
        .filter(|hunk| hunk.info.is_empty())
        .count();
    if unreadable_hunks > 0 {
        warn!(
            "{} hunk headers in PR {} could not be read",
            unreadable_hunks,
            job.label()
        );
    }

    let prompt = PromptFormatter::build_prompt(
        settings.mode,
        &diff_content,
        &job.title,
        &job.description,
        &extensions,
    );
    debug!("Built {} prompt of {} chars", settings.mode, prompt.len());

    let report = request_review(llm, settings, prompt).await?;
    let comment = report.to_markdown();
    Ok(Some(ReviewOutcome { report, comment }))
}

pub async fn request_review(
    llm: &dyn LLMAdapter,
    settings: &ReviewSettings,
    prompt: String,
) -> Result<ReviewReport> {
    let request = LLMRequest {
        system_prompt: settings
            .system_prompt
            .clone()
            .unwrap_or_else(|| REVIEW_SYSTEM_PROMPT.to_string()),
        user_prompt: prompt,
        temperature: None,
        max_tokens: None,
    };

    let response = llm
        .complete(request)
        .await
        .with_context(|| format!("Review request to {} failed", llm.model_name()))?;
    ReviewReport::from_llm_output(settings.mode, &response.content)
}

/// Background entry point for a webhook delivery. Never fails: every error is
/// logged and the job ends.
pub async fn process_pull_request_review(
    github: &GitHubClient,
    llm: &dyn LLMAdapter,
    settings: &ReviewSettings,
    job: ReviewJob,
) {
    let outcome = match generate_review(github, llm, settings, &job).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => return,
        Err(err) => {
            error!("Error processing PR review for {}: {:#}", job.label(), err);
            return;
        }
    };

    match github
        .post_review_comment(&job.owner, &job.repo, job.number, &outcome.comment)
        .await
    {
        Ok(()) => info!(
            "Successfully posted {} review for PR {}",
            outcome.report.mode(),
            job.label()
        ),
        Err(err) => error!("Failed to post review for PR {}: {:#}", job.label(), err),
    }
}
