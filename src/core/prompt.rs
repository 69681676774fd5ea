use crate::core::diff_parser::DiffParser;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const NO_DESCRIPTION: &str = "No description provided";
const MIXED_EXTENSIONS: &str = "Mixed";

pub const REVIEW_SYSTEM_PROMPT: &str = "You are an expert code reviewer. Review pull request diffs carefully and respond only with the JSON object requested by the user, without any surrounding prose.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    #[default]
    General,
    Security,
    Performance,
}

impl std::fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReviewMode::General => "general",
            ReviewMode::Security => "security",
            ReviewMode::Performance => "performance",
        };
        f.write_str(name)
    }
}

type TopicTable = HashMap<&'static str, &'static [&'static str]>;

static SECURITY_CHECKS: Lazy<TopicTable> = Lazy::new(|| {
    HashMap::from([
        (
            "py",
            &["SQL injection", "XSS", "CSRF", "Input validation", "Authentication"][..],
        ),
        (
            "js",
            &["XSS", "CSRF", "Input validation", "Authentication", "Prototype pollution"][..],
        ),
        (
            "java",
            &["SQL injection", "XSS", "Deserialization", "Authentication", "Authorization"][..],
        ),
        (
            "php",
            &["SQL injection", "XSS", "File inclusion", "Authentication", "Input validation"][..],
        ),
        (
            "go",
            &["SQL injection", "XSS", "Authentication", "Memory safety", "Concurrency issues"][..],
        ),
        (
            "rs",
            &["Memory safety", "Authentication", "Input validation", "Concurrency issues"][..],
        ),
    ])
});

static PERFORMANCE_CONCERNS: Lazy<TopicTable> = Lazy::new(|| {
    HashMap::from([
        (
            "py",
            &["Algorithm complexity", "Database queries", "Memory usage", "I/O operations"][..],
        ),
        (
            "js",
            &["DOM manipulation", "Event handling", "Memory leaks", "Bundle size"][..],
        ),
        (
            "java",
            &["Memory allocation", "Garbage collection", "Thread safety", "Database connections"][..],
        ),
        (
            "sql",
            &["Query optimization", "Index usage", "Join performance", "Data volume"][..],
        ),
        (
            "go",
            &["Goroutine management", "Memory allocation", "Concurrency", "I/O operations"][..],
        ),
        (
            "rs",
            &["Memory allocation", "Concurrency", "Zero-copy operations", "Async handling"][..],
        ),
    ])
});

/// Renders the review prompts sent to the LLM.
///
/// Every function here is pure: the same arguments always produce the same
/// bytes.
pub struct PromptFormatter;

impl PromptFormatter {
    /// Renders the prompt for `mode`. The PR title and description only
    /// appear in the general review.
    pub fn build_prompt(
        mode: ReviewMode,
        diff_content: &str,
        pr_title: &str,
        pr_description: &str,
        file_extensions: &[String],
    ) -> String {
        match mode {
            ReviewMode::General => Self::code_review_prompt(
                diff_content,
                pr_title,
                pr_description,
                Some(file_extensions),
            ),
            ReviewMode::Security => Self::security_focused_prompt(diff_content, file_extensions),
            ReviewMode::Performance => {
                Self::performance_focused_prompt(diff_content, file_extensions)
            }
        }
    }

    /// The general review prompt.
    ///
    /// File count and totals always come from `diff_content`. The extension
    /// list comes from the caller when given and non-empty, otherwise from the
    /// parsed diff.
    pub fn code_review_prompt(
        diff_content: &str,
        pr_title: &str,
        pr_description: &str,
        file_extensions: Option<&[String]>,
    ) -> String {
        let files = DiffParser::parse_unified_diff(diff_content);
        let (total_additions, total_deletions) = DiffParser::total_changes(&files);

        let extensions: Vec<String> = match file_extensions {
            Some(given) if !given.is_empty() => given.to_vec(),
            _ => DiffParser::file_extensions(&files).into_iter().collect(),
        };
        let extensions = if extensions.is_empty() {
            MIXED_EXTENSIONS.to_string()
        } else {
            extensions.join(", ")
        };

        let description = if pr_description.is_empty() {
            NO_DESCRIPTION
        } else {
            pr_description
        };

        format!(
            r#"
# Code Review Request

## Pull Request Information
**Title:** {pr_title}
**Description:** {description}

## Change Summary
- **Files Modified:** {files_modified}
- **Total Additions:** {total_additions}
- **Total Deletions:** {total_deletions}
- **Languages/Extensions:** {extensions}

## Code Changes
```diff
{diff_content}
```

## Review Guidelines
Please provide a thorough code review focusing on:

### 1. Code Quality
- Code style and consistency
- Best practices for the identified programming languages
- Code organization and structure
- Naming conventions

### 2. Functionality & Logic
- Correctness of the implementation
- Edge cases and error handling
- Algorithm efficiency
- Business logic accuracy

### 3. Security
- Input validation
- Authentication/authorization
- Data sanitization
- Potential vulnerabilities

### 4. Performance
- Time complexity considerations
- Memory usage
- Database query optimization (if applicable)
- Caching opportunities

### 5. Maintainability
- Code readability
- Documentation and comments
- Test coverage
- Modularity and reusability

### 6. Dependencies & Integration
- New dependencies introduced
- API compatibility
- Breaking changes
- Migration considerations

## Response Format
Please structure your response as a JSON object with the following format:

```json
{{
    "review_summary": "Brief overall assessment (2-3 sentences)",
    "suggestions": [
        "Specific, actionable suggestions for improvement",
        "Focus on the most important issues first"
    ],
    "severity": "low|medium|high",
    "requires_changes": true/false,
    "strengths": [
        "Positive aspects of the code changes"
    ],
    "risks": [
        "Potential risks or concerns"
    ]
}}
```

## Additional Context
- Focus on significant issues rather than minor style preferences
- Provide specific line references when possible
- Consider the impact on existing codebase
- Be constructive and educational in your feedback
"#,
            files_modified = files.len(),
        )
    }

    pub fn security_focused_prompt(diff_content: &str, file_extensions: &[String]) -> String {
        let checks = bullet_list(&Self::security_checks(file_extensions));
        let file_types = file_extensions.join(", ");

        format!(
            r#"
# Security-Focused Code Review

## Code Changes
```diff
{diff_content}
```

## Security Assessment Required
Please perform a security-focused review of the above code changes.

### Priority Security Checks
Based on the file types ({file_types}), pay special attention to:
{checks}

### General Security Concerns
- Input validation and sanitization
- Authentication and authorization mechanisms
- Data exposure and information leakage
- Injection vulnerabilities (SQL, XSS, Command, etc.)
- Insecure direct object references
- Security misconfigurations
- Cryptographic issues
- Error handling that might leak information

### Response Format
```json
{{
    "security_assessment": "Overall security posture of the changes",
    "vulnerabilities_found": [
        "List of specific security issues identified"
    ],
    "severity": "low|medium|high|critical",
    "recommendations": [
        "Specific security improvements needed"
    ],
    "compliance_notes": "Any compliance considerations (OWASP, etc.)"
}}
```

Focus on actionable security improvements and provide specific remediation steps.
"#
        )
    }

    pub fn performance_focused_prompt(diff_content: &str, file_extensions: &[String]) -> String {
        let concerns = bullet_list(&Self::performance_concerns(file_extensions));
        let file_types = file_extensions.join(", ");

        format!(
            r#"
# Performance-Focused Code Review

## Code Changes
```diff
{diff_content}
```

## Performance Analysis Required
Please analyze the performance implications of these code changes.

### Key Performance Areas
Based on the file types ({file_types}), focus on:
{concerns}

### Performance Checklist
- Time complexity analysis (Big O notation)
- Space complexity considerations
- Database query efficiency
- Caching strategies
- Resource utilization
- Scalability implications
- Bottleneck identification

### Response Format
```json
{{
    "performance_assessment": "Overall performance impact analysis",
    "bottlenecks_identified": [
        "Specific performance bottlenecks found"
    ],
    "optimizations": [
        "Recommended performance improvements"
    ],
    "complexity_analysis": "Time/space complexity assessment",
    "scalability_impact": "How changes affect system scalability"
}}
```

Provide specific, measurable recommendations for performance improvements.
"#
        )
    }

    /// Union of the security topics for `file_extensions`, in first-seen
    /// order. Unknown extensions contribute nothing.
    pub fn security_checks(file_extensions: &[String]) -> Vec<&'static str> {
        topic_union(&SECURITY_CHECKS, file_extensions)
    }

    pub fn performance_concerns(file_extensions: &[String]) -> Vec<&'static str> {
        topic_union(&PERFORMANCE_CONCERNS, file_extensions)
    }
}

fn topic_union(table: &TopicTable, file_extensions: &[String]) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    file_extensions
        .iter()
        .filter_map(|ext| table.get(ext.as_str()))
        .flat_map(|topics| topics.iter().copied())
        .filter(|topic| seen.insert(*topic))
        .collect()
}

fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
