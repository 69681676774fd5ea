use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

const JSON_MEDIA_TYPE: &str = "application/vnd.github.v3+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";
const BOT_USER_AGENT: &str = "PR-Reviewer-Bot";

/// Minimal GitHub REST v3 client for the calls the reviewer makes.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    base_url: String,
}

#[derive(Serialize)]
struct ReviewBody<'a> {
    body: &'a str,
    event: &'a str,
}

#[derive(Serialize)]
struct InlineCommentBody<'a> {
    body: &'a str,
    commit_id: &'a str,
    path: &'a str,
    line: usize,
    side: &'a str,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn pulls_url(&self, owner: &str, repo: &str, pr_number: u64) -> String {
        format!("{}/repos/{}/{}/pulls/{}", self.base_url, owner, repo, pr_number)
    }

    fn authorized(&self, builder: RequestBuilder, accept: &str) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("token {}", self.token))
            .header(ACCEPT, accept)
            .header(USER_AGENT, BOT_USER_AGENT)
    }

    /// Raw `git diff` text of the pull request.
    pub async fn get_pull_request_diff(&self, owner: &str, repo: &str, pr_number: u64) -> Result<String> {
        let url = self.pulls_url(owner, repo, pr_number);
        let response = self
            .authorized(self.client.get(&url), DIFF_MEDIA_TYPE)
            .send()
            .await
            .context("Failed to fetch PR diff")?;

        let response = ensure_success(response, "fetch PR diff").await?;
        Ok(response.text().await?)
    }

    pub async fn get_pull_request_info(&self, owner: &str, repo: &str, pr_number: u64) -> Result<Value> {
        let url = self.pulls_url(owner, repo, pr_number);
        self.get_json(&url, "fetch PR info").await
    }

    pub async fn get_pull_request_files(&self, owner: &str, repo: &str, pr_number: u64) -> Result<Value> {
        let url = format!("{}/files", self.pulls_url(owner, repo, pr_number));
        self.get_json(&url, "fetch PR files").await
    }

    async fn get_json(&self, url: &str, action: &str) -> Result<Value> {
        let response = self
            .authorized(self.client.get(url), JSON_MEDIA_TYPE)
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;

        let response = ensure_success(response, action).await?;
        Ok(response.json().await?)
    }

    /// Posts `comment_body` as a non-blocking `COMMENT` review.
    pub async fn post_review_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        comment_body: &str,
    ) -> Result<()> {
        let url = format!("{}/reviews", self.pulls_url(owner, repo, pr_number));
        let review = ReviewBody {
            body: comment_body,
            event: "COMMENT",
        };

        let response = self
            .authorized(self.client.post(&url), JSON_MEDIA_TYPE)
            .json(&review)
            .send()
            .await
            .context("Failed to post review comment")?;
        ensure_success(response, "post review comment").await?;

        info!("Successfully posted review comment for PR #{}", pr_number);
        Ok(())
    }

    /// Comments on one line of the new side of the diff.
    #[allow(clippy::too_many_arguments)]
    pub async fn post_inline_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        commit_sha: &str,
        file_path: &str,
        line_number: usize,
        comment_body: &str,
    ) -> Result<()> {
        let url = format!("{}/comments", self.pulls_url(owner, repo, pr_number));
        let comment = InlineCommentBody {
            body: comment_body,
            commit_id: commit_sha,
            path: file_path,
            line: line_number,
            side: "RIGHT",
        };

        let response = self
            .authorized(self.client.post(&url), JSON_MEDIA_TYPE)
            .json(&comment)
            .send()
            .await
            .context("Failed to post inline comment")?;
        ensure_success(response, "post inline comment").await?;

        info!("Successfully posted inline comment for PR #{}", pr_number);
        Ok(())
    }
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("GitHub API error while trying to {} ({}): {}", action, status, body)
}
