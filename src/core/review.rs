use crate::core::prompt::ReviewMode;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn icon(self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => anyhow::bail!("unknown severity: {}", other),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Answer to the general review prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReview {
    pub review_summary: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub severity: Severity,
    pub requires_changes: bool,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReview {
    pub security_assessment: String,
    #[serde(default)]
    pub vulnerabilities_found: Vec<String>,
    pub severity: Severity,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub compliance_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReview {
    pub performance_assessment: String,
    #[serde(default)]
    pub bottlenecks_identified: Vec<String>,
    #[serde(default)]
    pub optimizations: Vec<String>,
    #[serde(default)]
    pub complexity_analysis: String,
    #[serde(default)]
    pub scalability_impact: String,
}

/// A parsed LLM answer, shaped by the prompt mode that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReviewReport {
    General(CodeReview),
    Security(SecurityReview),
    Performance(PerformanceReview),
}

impl ReviewReport {
    /// Reads the JSON object out of a model reply. Accepts a ```json fenced
    /// block, a bare object surrounded by prose, or the raw object.
    pub fn from_llm_output(mode: ReviewMode, content: &str) -> Result<Self> {
        let report = match mode {
            ReviewMode::General => ReviewReport::General(parse_json_payload(content)?),
            ReviewMode::Security => ReviewReport::Security(parse_json_payload(content)?),
            ReviewMode::Performance => ReviewReport::Performance(parse_json_payload(content)?),
        };
        Ok(report)
    }

    pub fn mode(&self) -> ReviewMode {
        match self {
            ReviewReport::General(_) => ReviewMode::General,
            ReviewReport::Security(_) => ReviewMode::Security,
            ReviewReport::Performance(_) => ReviewMode::Performance,
        }
    }

    /// Markdown body posted to the pull request.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        match self {
            ReviewReport::General(review) => {
                output.push_str("## 🤖 AI Code Review\n\n");
                output.push_str(&format!("{}\n\n", review.review_summary.trim()));
                output.push_str(&format!(
                    "**Severity:** {} {}\n",
                    review.severity.icon(),
                    review.severity.label()
                ));
                let verdict = if review.requires_changes {
                    "⚠️ Changes requested"
                } else {
                    "✅ Looks good to merge"
                };
                output.push_str(&format!("**Verdict:** {}\n\n", verdict));
                push_section(&mut output, "✨ Strengths", &review.strengths);
                push_section(&mut output, "💡 Suggestions", &review.suggestions);
                push_section(&mut output, "🚨 Risks", &review.risks);
            }
            ReviewReport::Security(review) => {
                output.push_str("## 🔒 AI Security Review\n\n");
                output.push_str(&format!("{}\n\n", review.security_assessment.trim()));
                output.push_str(&format!(
                    "**Severity:** {} {}\n\n",
                    review.severity.icon(),
                    review.severity.label()
                ));
                push_section(
                    &mut output,
                    "🐞 Vulnerabilities Found",
                    &review.vulnerabilities_found,
                );
                push_section(&mut output, "🛠️ Recommendations", &review.recommendations);
                push_paragraph(&mut output, "📋 Compliance Notes", &review.compliance_notes);
            }
            ReviewReport::Performance(review) => {
                output.push_str("## ⚡ AI Performance Review\n\n");
                output.push_str(&format!("{}\n\n", review.performance_assessment.trim()));
                push_section(
                    &mut output,
                    "🐢 Bottlenecks Identified",
                    &review.bottlenecks_identified,
                );
                push_section(&mut output, "🚀 Optimizations", &review.optimizations);
                push_paragraph(&mut output, "📈 Complexity", &review.complexity_analysis);
                push_paragraph(&mut output, "🌐 Scalability", &review.scalability_impact);
            }
        }

        output.push_str("---\n*This review was generated automatically and may be incomplete.*\n");
        output
    }
}

fn parse_json_payload<T: DeserializeOwned>(content: &str) -> Result<T> {
    let payload = extract_json(content);
    serde_json::from_str(payload).with_context(|| {
        let preview: String = content.chars().take(200).collect();
        format!("LLM response is not a valid review object: {}", preview)
    })
}

fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let body = &content[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content.trim(),
    }
}

fn push_section(output: &mut String, title: &str, items: &[String]) {
    let items: Vec<&str> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return;
    }

    output.push_str(&format!("### {}\n", title));
    for item in items {
        output.push_str(&format!("- {}\n", item));
    }
    output.push('\n');
}

fn push_paragraph(output: &mut String, title: &str, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    output.push_str(&format!("### {}\n{}\n\n", title, text));
}
