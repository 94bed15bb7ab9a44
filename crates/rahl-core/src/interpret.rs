//! Response interpreter — turns the model's raw reply into a [`ChatReply`].
//!
//! Coding-mode replies are asked to be JSON, but the model is untrusted:
//! anything that does not parse is shown to the user as plain text.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::message::ChatReply;
use crate::session::Mode;

/// The JSON object coding-mode replies are asked to produce.
///
/// Every field is optional; absent or `null` fields take empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub files: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "shouldUpdateCode")]
    pub should_update: Option<bool>,
    #[serde(default)]
    pub is_coding_mode: Option<bool>,
}

/// What the model sent back, after an attempt at parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutput {
    Structured(StructuredReply),
    Text(String),
}

impl ModelOutput {
    /// Parse a raw reply as [`StructuredReply`], falling back to text.
    ///
    /// A reply wrapped in a single markdown code fence is unwrapped first.
    /// Valid JSON that is not an object counts as text.
    pub fn parse(raw: &str) -> Self {
        // Derived struct impls also accept JSON arrays, so insist on an object.
        let parsed = serde_json::from_str::<serde_json::Value>(strip_code_fence(raw))
            .ok()
            .filter(serde_json::Value::is_object)
            .and_then(|value| serde_json::from_value::<StructuredReply>(value).ok());

        match parsed {
            Some(reply) => Self::Structured(reply),
            None => Self::Text(raw.to_string()),
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // An opening line without a brace is an info string ("json").
    match body.split_once('\n') {
        Some((info, inner)) if !info.contains('{') => inner.trim(),
        _ => body.trim(),
    }
}

/// Outcome of interpreting one raw reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub reply: ChatReply,
    /// A coding-mode reply was not valid structured output.
    pub fell_back: bool,
}

/// Map the raw model reply into the caller-facing structure.
///
/// `mode` is the session mode the prompt was composed in. Never fails.
pub fn interpret(mode: &Mode, raw: &str) -> Interpretation {
    if !mode.is_coding() {
        return Interpretation {
            reply: ChatReply::text(raw, false),
            fell_back: false,
        };
    }

    match ModelOutput::parse(raw) {
        ModelOutput::Structured(parsed) => Interpretation {
            reply: ChatReply {
                message: parsed.message.unwrap_or_default(),
                code: parsed.code.unwrap_or_default(),
                files: parsed.files.unwrap_or_default(),
                should_update: parsed.should_update.unwrap_or(false),
                is_coding_mode: parsed.is_coding_mode.unwrap_or(true),
            },
            fell_back: false,
        },
        ModelOutput::Text(text) => Interpretation {
            reply: ChatReply::text(&text, true),
            fell_back: true,
        },
    }
}
