//! Assistant personality and system prompt compilation

use serde::{Deserialize, Serialize};

/// Prompt used when no personality is active
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Elias, a helpful AI assistant. Keep responses concise and conversational.";

const GUARDRAILS: [&str; 5] = [
    "Keep responses under 3 sentences unless more detail is requested.",
    "Never provide specific stock picks or financial advice.",
    "Stay in character and maintain conversational tone.",
    "If unsure, admit it honestly.",
    "Reference context naturally when relevant.",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instructions: String,
}

/// Personality instructions followed by the numbered guardrails
pub fn compile_system_prompt(personality: Option<&Personality>) -> String {
    let Some(personality) = personality else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };

    let mut prompt = personality.instructions.clone();
    prompt.push_str("\n\nGUARDRAILS:");
    for (i, rule) in GUARDRAILS.iter().enumerate() {
        prompt.push_str(&format!("\n{}. {}", i + 1, rule));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_without_personality() {
        assert_eq!(compile_system_prompt(None), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_guardrails_appended() {
        let personality = Personality {
            instructions: "You are Nova.".into(),
            ..Default::default()
        };
        let prompt = compile_system_prompt(Some(&personality));
        assert!(prompt.starts_with("You are Nova.\n\nGUARDRAILS:\n1. Keep responses under 3"));
        assert!(prompt.ends_with("\n5. Reference context naturally when relevant."));
    }

    #[test]
    fn test_personality_row_ignores_extra_columns() {
        let p: Personality = serde_json::from_str(
            r#"{"id":"p1","name":"Nova","instructions":"Hi","is_active":true,"voice":"x"}"#,
        )
        .unwrap();
        assert_eq!(p.name.as_deref(), Some("Nova"));
    }
}
