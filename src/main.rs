mod adapters;
mod config;
mod core;
mod github;
mod pipeline;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prscope")]
#[command(about = "Reviews GitHub pull requests with an LLM and posts the review back", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "OpenAI model name (overrides OPENAI_MODEL)")]
    model: Option<String>,

    #[arg(long, global = true, value_enum, help = "Review prompt to use")]
    mode: Option<core::ReviewMode>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the webhook server")]
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
    #[command(about = "Render the review prompt for a diff")]
    Prompt {
        #[arg(long, help = "Path to diff file (reads from stdin if not provided)")]
        diff: Option<PathBuf>,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma separated file extensions (derived from the diff if omitted)"
        )]
        extensions: Vec<String>,
    },
    #[command(about = "Print the structured form of a diff as JSON")]
    Parse {
        #[arg(long, help = "Path to diff file (reads from stdin if not provided)")]
        diff: Option<PathBuf>,

        #[arg(long)]
        min_changes: Option<usize>,

        #[arg(long)]
        context_lines: Option<usize>,
    },
    #[command(about = "Review one pull request from the terminal")]
    Review {
        #[arg(long, help = "Repository as owner/name")]
        repo: String,

        #[arg(long)]
        number: u64,

        #[arg(long, help = "Post the review to the pull request")]
        post: bool,

        #[arg(long, help = "List the changed files reported by GitHub")]
        files: bool,

        #[arg(long, value_enum, default_value = "markdown")]
        output_format: OutputFormat,
    },
    #[command(about = "Comment on one line of a pull request")]
    Comment {
        #[arg(long, help = "Repository as owner/name")]
        repo: String,

        #[arg(long)]
        number: u64,

        #[arg(long, help = "Commit SHA the comment refers to")]
        commit: String,

        #[arg(long)]
        path: String,

        #[arg(long)]
        line: usize,

        #[arg(long)]
        body: String,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::load()?;
    config.merge_with_cli(cli.model.clone(), cli.mode);

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve_command(config).await?;
        }
        Commands::Prompt {
            diff,
            title,
            description,
            extensions,
        } => {
            prompt_command(config, diff, &title, &description, &extensions).await?;
        }
        Commands::Parse {
            diff,
            min_changes,
            context_lines,
        } => {
            parse_command(config, diff, min_changes, context_lines).await?;
        }
        Commands::Review {
            repo,
            number,
            post,
            files,
            output_format,
        } => {
            review_command(config, &repo, number, post, files, output_format).await?;
        }
        Commands::Comment {
            repo,
            number,
            commit,
            path,
            line,
            body,
        } => {
            comment_command(config, &repo, number, &commit, &path, line, &body).await?;
        }
    }

    Ok(())
}

async fn serve_command(config: config::Config) -> Result<()> {
    config.validate_for_server()?;
    info!(
        "Environment: {}, review mode: {}, model: {}",
        config.environment, config.review_mode, config.openai_model
    );
    if config.is_development() {
        warn!("Running in development mode");
    }

    let (github, llm) = build_clients(&config)?;
    let state = Arc::new(server::AppState::new(config, github, llm));
    server::serve(state).await
}

async fn prompt_command(
    config: config::Config,
    diff_path: Option<PathBuf>,
    title: &str,
    description: &str,
    extensions: &[String],
) -> Result<()> {
    let diff_content = read_diff_input(diff_path).await?;

    let extensions: Vec<String> = if extensions.is_empty() {
        let files = core::DiffParser::parse_unified_diff(&diff_content);
        core::DiffParser::file_extensions(&files).into_iter().collect()
    } else {
        extensions.iter().map(|ext| ext.trim().to_lowercase()).collect()
    };

    let prompt = core::PromptFormatter::build_prompt(
        config.review_mode,
        &diff_content,
        title,
        description,
        &extensions,
    );
    println!("{}", prompt);
    Ok(())
}

#[derive(Serialize)]
struct DiffReport<'a> {
    files: &'a [core::FileChange],
    files_modified: usize,
    total_additions: usize,
    total_deletions: usize,
    extensions: Vec<String>,
    significant_files: Vec<&'a str>,
    context: BTreeMap<String, Vec<core::HunkContext>>,
}

fn build_diff_report(
    files: &[core::FileChange],
    min_changes: usize,
    context_lines: usize,
) -> DiffReport<'_> {
    let (total_additions, total_deletions) = core::DiffParser::total_changes(files);
    DiffReport {
        files,
        files_modified: files.len(),
        total_additions,
        total_deletions,
        extensions: core::DiffParser::file_extensions(files).into_iter().collect(),
        significant_files: core::DiffParser::filter_significant_changes(files, min_changes)
            .into_iter()
            .map(|file| file.display_path())
            .collect(),
        context: core::DiffParser::extract_context_lines(files, context_lines),
    }
}

async fn parse_command(
    config: config::Config,
    diff_path: Option<PathBuf>,
    min_changes: Option<usize>,
    context_lines: Option<usize>,
) -> Result<()> {
    let diff_content = read_diff_input(diff_path).await?;
    let files = core::DiffParser::parse_unified_diff(&diff_content);
    info!("Parsed {} file diffs", files.len());

    let report = build_diff_report(
        &files,
        min_changes.unwrap_or(config.min_changes),
        context_lines.unwrap_or(config.context_lines),
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn review_command(
    config: config::Config,
    repo: &str,
    number: u64,
    post: bool,
    list_files: bool,
    format: OutputFormat,
) -> Result<()> {
    let (owner, name) = split_repo(repo)?;

    info!("Reviewing PR {}#{} with model: {}", repo, number, config.openai_model);
    let (github, llm) = build_clients(&config)?;
    let settings = pipeline::ReviewSettings::from_config(&config);

    let info = github.get_pull_request_info(owner, name, number).await?;
    let job = pipeline::ReviewJob::from_pull_request_info(owner, name, number, &info);

    if list_files {
        let files = github.get_pull_request_files(owner, name, number).await?;
        print!("{}", format_file_listing(&files));
    }

    let Some(outcome) = pipeline::generate_review(&github, llm.as_ref(), &settings, &job).await? else {
        println!("No changes in PR");
        return Ok(());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.report)?),
        OutputFormat::Markdown => println!("{}", outcome.comment),
    }

    if post {
        github
            .post_review_comment(owner, name, number, &outcome.comment)
            .await?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn comment_command(
    config: config::Config,
    repo: &str,
    number: u64,
    commit: &str,
    path: &str,
    line: usize,
    body: &str,
) -> Result<()> {
    let (owner, name) = split_repo(repo)?;
    let token = config
        .github_token
        .context("GitHub token not found. Set GITHUB_TOKEN environment variable or provide in config")?;
    let github = github::GitHubClient::new(token, config.github_api_url)?;
    github
        .post_inline_comment(owner, name, number, commit, path, line, body)
        .await
}

fn split_repo(repo: &str) -> Result<(&str, &str)> {
    repo.split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
        .with_context(|| format!("Invalid repository {:?}, expected owner/name", repo))
}

/// One `status path (+a -d)` line per entry of the `/pulls/{n}/files` response.
fn format_file_listing(files: &serde_json::Value) -> String {
    let mut output = String::new();
    for file in files.as_array().into_iter().flatten() {
        output.push_str(&format!(
            "{:<9} {} (+{} -{})\n",
            file["status"].as_str().unwrap_or("changed"),
            file["filename"].as_str().unwrap_or_default(),
            file["additions"].as_u64().unwrap_or(0),
            file["deletions"].as_u64().unwrap_or(0),
        ));
    }
    output
}

fn build_clients(
    config: &config::Config,
) -> Result<(github::GitHubClient, Arc<dyn adapters::LLMAdapter>)> {
    let token = config
        .github_token
        .clone()
        .context("GitHub token not found. Set GITHUB_TOKEN environment variable or provide in config")?;
    let github = github::GitHubClient::new(token, config.github_api_url.clone())?;
    let llm: Arc<dyn adapters::LLMAdapter> =
        Arc::new(adapters::OpenAIAdapter::new(config.model_config())?);
    Ok((github, llm))
}

async fn read_diff_input(diff_path: Option<PathBuf>) -> Result<String> {
    if let Some(path) = diff_path {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read diff from {}", path.display()));
    }

    if std::io::stdin().is_terminal() {
        anyhow::bail!("No diff provided. Pass --diff <file> or pipe a diff on stdin.");
    }

    use std::io::Read;
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}
