use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Pull request actions that trigger a review.
pub const REVIEWED_ACTIONS: [&str; 2] = ["opened", "synchronize"];

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    pub avatar_url: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: GitHubUser,
    pub html_url: String,
    pub clone_url: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub user: GitHubUser,
    pub html_url: String,
    pub diff_url: String,
    pub patch_url: String,
    pub head: Value,
    pub base: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `pull_request` webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    pub sender: GitHubUser,
}

impl PullRequestEvent {
    pub fn should_review(&self) -> bool {
        REVIEWED_ACTIONS.contains(&self.action.as_str())
    }
}

/// Checks an `X-Hub-Signature-256` header (`sha256=<hex>`) against the
/// HMAC-SHA256 of `payload`. The comparison is constant time.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: Option<&str>) -> bool {
    let Some(signature_hex) = signature_header.and_then(|s| s.strip_prefix("sha256=")) else {
        return false;
    };

    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}


#[cfg(test)]
mod tests {
    use super::fixtures::sign_payload;
    use super::*;

    #[test]
    fn accepts_matching_signature() {
        let payload = br#"{"action":"opened"}"#;
        let header = sign_payload("topsecret", payload);
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("topsecret", payload, Some(&header)));
    }

    #[test]
    fn rejects_wrong_secret_or_tampered_body() {
        let payload = br#"{"action":"opened"}"#;
        let header = sign_payload("topsecret", payload);
        assert!(!verify_signature("other", payload, Some(&header)));
        assert!(!verify_signature("topsecret", br#"{"action":"closed"}"#, Some(&header)));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let payload = b"{}";
        assert!(!verify_signature("s", payload, None));
        assert!(!verify_signature("s", payload, Some("sha1=abcd")));
        assert!(!verify_signature("s", payload, Some("sha256=not-hex")));
    }

    #[test]
    fn parses_pull_request_event() {
        let event: PullRequestEvent =
            serde_json::from_value(fixtures::pull_request_payload("opened")).unwrap();
        assert_eq!(event.repository.owner.login, "octo");
        assert_eq!(event.pull_request.number, 42);
        assert!(event.pull_request.body.is_none());
        assert_eq!(event.pull_request.head["sha"], "abc123");
        assert!(event.should_review());
    }

    #[test]
    fn only_opened_and_synchronize_are_reviewed() {
        for (action, expected) in [
            ("opened", true),
            ("synchronize", true),
            ("closed", false),
            ("edited", false),
        ] {
            let event: PullRequestEvent =
                serde_json::from_value(fixtures::pull_request_payload(action)).unwrap();
            assert_eq!(event.should_review(), expected, "action {}", action);
        }
    }
}
