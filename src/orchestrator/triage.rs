//! Intake triage: infer priority and department from the opening message.

use crate::config::TriageConfig;
use crate::models::conversation::Priority;

/// Keyword-based classifier applied when the caller leaves fields blank.
#[derive(Debug, Clone, Default)]
pub struct Triage {
    config: TriageConfig,
}

impl Triage {
    /// Create a classifier from configured keyword lists.
    #[must_use]
    pub fn new(config: TriageConfig) -> Self {
        Self { config }
    }

    /// Priority implied by `text`; `normal` when nothing matches.
    #[must_use]
    pub fn priority(&self, text: Option<&str>) -> Priority {
        let Some(text) = text.map(str::to_lowercase) else {
            return Priority::Normal;
        };
        if contains_any(&text, &self.config.urgent_keywords) {
            Priority::Urgent
        } else if contains_any(&text, &self.config.high_keywords) {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    /// Department implied by `text`; the configured default otherwise.
    #[must_use]
    pub fn department(&self, text: Option<&str>) -> String {
        text.map(str::to_lowercase)
            .and_then(|text| {
                self.config
                    .department_keywords
                    .iter()
                    .find(|rule| contains_any(&text, &rule.keywords))
                    .map(|rule| rule.department.clone())
            })
            .unwrap_or_else(|| self.config.default_department.clone())
    }
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
}
