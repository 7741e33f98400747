//! Retrieved context snippets and their prompt rendering

use serde::{Deserialize, Serialize};

/// One retrieval result, opaque to the orchestrator beyond formatting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Source label (e.g. company or document name)
    pub source: Option<String>,
    /// Section within the source
    pub section: Option<String>,
    /// Short summary
    pub summary: Option<String>,
    /// Key facts
    #[serde(default)]
    pub facts: Vec<String>,
    /// Verbatim quote
    pub quote: Option<String>,
}

/// Render snippets as a prompt block; empty input renders as an empty string
pub fn format_context_for_prompt(snippets: &[ContextSnippet]) -> String {
    if snippets.is_empty() {
        return String::new();
    }

    let mut parts = vec!["\n--- Relevant Context ---".to_string()];

    for (idx, item) in snippets.iter().enumerate() {
        parts.push(format!(
            "\nSource {}: {} - {}",
            idx + 1,
            non_empty(&item.source).unwrap_or("Unknown"),
            non_empty(&item.section).unwrap_or("General"),
        ));
        if let Some(summary) = non_empty(&item.summary) {
            parts.push(format!("Summary: {}", summary));
        }
        if !item.facts.is_empty() {
            parts.push("Key Facts:".to_string());
            parts.extend(item.facts.iter().map(|fact| format!("  - {}", fact)));
        }
        if let Some(quote) = non_empty(&item.quote) {
            parts.push(format!("Quote: \"{}\"", quote));
        }
    }

    parts.push("--- End of Context ---\n".to_string());
    parts.join("\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
