//! Keyword classification of documents by domain and document type.
//!
//! Both classifiers walk an ordered candidate list and return the first hit, so the result is a
//! pure function of the inputs and the configured order. The lists are tuning data rather than a
//! correctness contract; [`ClassifierRules`] can be replaced wholesale from a rules file.

use serde::{Deserialize, Serialize};

/// Characters of leading text inspected by [`classify_domain`].
pub const DOMAIN_SCAN_CHARS: usize = 1000;
/// Characters of leading text inspected by [`classify_type`].
pub const TYPE_SCAN_CHARS: usize = 2000;

/// Document-type label paired with the keywords that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTypeRule {
    /// Label reported when a keyword matches.
    pub label: String,
    /// Lowercase keywords; any substring hit selects the label.
    pub keywords: Vec<String>,
}

impl DocTypeRule {
    /// Build a rule from a label and keyword list.
    pub fn new(label: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            label: label.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// Ordered label lists consumed by the classifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRules {
    /// Known domain labels in priority order.
    pub domains: Vec<String>,
    /// Label returned when no domain matches.
    pub default_domain: String,
    /// Document-type rules in priority order.
    pub doc_types: Vec<DocTypeRule>,
    /// Label returned when no document type matches.
    pub default_doc_type: String,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        let domains = [
            "bedrock",
            "lambda",
            "apigateway",
            "dynamodb",
            "s3",
            "ec2",
            "ecs",
            "eks",
            "waf",
            "cloudfront",
            "route53",
            "sagemaker",
            "cognito",
            "amplify",
            "appsync",
        ];
        Self {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            default_domain: "general".into(),
            doc_types: vec![
                DocTypeRule::new(
                    "api_reference",
                    &["api reference", "api documentation", "method", "endpoint"],
                ),
                DocTypeRule::new(
                    "user_guide",
                    &["user guide", "getting started", "how to", "tutorial"],
                ),
                DocTypeRule::new(
                    "troubleshooting",
                    &["troubleshooting", "error", "problem", "issue", "solution"],
                ),
                DocTypeRule::new(
                    "best_practices",
                    &["best practice", "recommendation", "optimization"],
                ),
                DocTypeRule::new(
                    "tutorial",
                    &["tutorial", "example", "walkthrough", "step-by-step"],
                ),
            ],
            default_doc_type: "general".into(),
        }
    }
}

/// Infer the domain category of a document.
///
/// Each label is checked against the lowercased filename and the lowercased first
/// [`DOMAIN_SCAN_CHARS`] characters of text with equal priority; the first label in list order
/// that matches either wins.
pub fn classify_domain<'a>(rules: &'a ClassifierRules, text: &str, filename: &str) -> &'a str {
    let filename = filename.to_lowercase();
    let head = leading_lowercase(text, DOMAIN_SCAN_CHARS);

    rules
        .domains
        .iter()
        .find(|label| {
            let label = label.to_lowercase();
            !label.is_empty() && (filename.contains(&label) || head.contains(&label))
        })
        .map_or(rules.default_domain.as_str(), String::as_str)
}

/// Infer the document type from the first [`TYPE_SCAN_CHARS`] characters of text.
///
/// The filename is accepted for interface symmetry with [`classify_domain`] but does not affect
/// the result.
pub fn classify_type<'a>(rules: &'a ClassifierRules, text: &str, _filename: &str) -> &'a str {
    let head = leading_lowercase(text, TYPE_SCAN_CHARS);

    rules
        .doc_types
        .iter()
        .find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| !keyword.is_empty() && head.contains(&keyword.to_lowercase()))
        })
        .map_or(rules.default_doc_type.as_str(), |rule| rule.label.as_str())
}

fn leading_lowercase(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect::<String>().to_lowercase()
}
