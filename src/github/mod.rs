pub mod client;
pub mod webhook;

pub use client::GitHubClient;
pub use webhook::{verify_signature, PullRequestEvent};
