//! Token counting, model registries, and context-window truncation.
//!
//! Token counts are a four-characters-per-token heuristic rather than a
//! tokenizer-exact count: good enough to budget a prompt against a model's
//! context window and to estimate cost, without pulling in a
//! provider-specific tokenizer crate for a number that's advisory either way.

use crate::io::unicode::{last_word_boundary_before, truncate_bytes};

const CHARS_PER_TOKEN: usize = 4;

/// Per-model context window and pricing, used by the truncation step and
/// the Cost Estimator.
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    /// Maximum input + output tokens the model accepts.
    pub context_limit: u32,
    /// USD per million input tokens.
    pub input_price_per_million: f64,
    /// USD per million output tokens.
    pub output_price_per_million: f64,
}

/// Looks up context limit and pricing for a known model. Unknown models
/// (including local/custom deployments named with a `/`) return `None`;
/// callers that need a hard limit should treat that as
/// [`crate::error::ProviderError::UnknownModel`].
#[must_use]
pub fn model_info(model: &str) -> Option<ModelInfo> {
    Some(match model {
        "gpt-4" => ModelInfo {
            context_limit: 8_192,
            input_price_per_million: 30.00,
            output_price_per_million: 60.00,
        },
        "gpt-4o" => ModelInfo {
            context_limit: 128_000,
            input_price_per_million: 2.50,
            output_price_per_million: 10.00,
        },
        "gpt-4o-mini" => ModelInfo {
            context_limit: 128_000,
            input_price_per_million: 0.15,
            output_price_per_million: 0.60,
        },
        "gpt-4.1" => ModelInfo {
            context_limit: 1_047_576,
            input_price_per_million: 2.00,
            output_price_per_million: 8.00,
        },
        "gpt-4.1-mini" => ModelInfo {
            context_limit: 1_047_576,
            input_price_per_million: 0.40,
            output_price_per_million: 1.60,
        },
        "gemini-2.0-flash" => ModelInfo {
            context_limit: 1_048_576,
            input_price_per_million: 0.10,
            output_price_per_million: 0.40,
        },
        "gemini-1.5-pro" => ModelInfo {
            context_limit: 2_097_152,
            input_price_per_million: 1.25,
            output_price_per_million: 5.00,
        },
        "gemini-1.5-flash" => ModelInfo {
            context_limit: 1_048_576,
            input_price_per_million: 0.075,
            output_price_per_million: 0.30,
        },
        _ => return None,
    })
}

/// Approximate token count for `text`.
#[must_use]
pub fn count_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    (chars / CHARS_PER_TOKEN).max(1) as u32
}

/// Truncates `text` to fit within `max_tokens`, cutting at the nearest
/// trailing word boundary within the last 20% of the budget and appending
/// a `[TRUNCATED]` marker. Returns `text` unchanged if it already
/// fits.
#[must_use]
pub fn truncate_to_fit(text: &str, max_tokens: u32) -> String {
    let max_chars = (max_tokens as usize) * CHARS_PER_TOKEN;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let max_bytes = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(byte_idx, _)| byte_idx);
    let hard_cut = truncate_bytes(text, max_bytes);

    let search_window_start = hard_cut.len().saturating_sub(hard_cut.len() / 5);
    let boundary = last_word_boundary_before(hard_cut, hard_cut.len());
    let cut_at = if boundary >= search_window_start {
        boundary
    } else {
        hard_cut.len()
    };

    format!("{}\n[TRUNCATED]", &hard_cut[..cut_at])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_returns_info() {
        let info = model_info("gpt-4o-mini").unwrap();
        assert_eq!(info.context_limit, 128_000);
    }

    #[test]
    fn unknown_model_returns_none() {
        assert!(model_info("local/llama-3").is_none());
    }

    #[test]
    fn count_tokens_uses_four_chars_heuristic() {
        assert_eq!(count_tokens("abcd"), 1);
        assert_eq!(count_tokens("abcdefgh"), 2);
    }

    #[test]
    fn truncate_to_fit_leaves_short_text_untouched() {
        let text = "short text";
        assert_eq!(truncate_to_fit(text, 1000), text);
    }

    #[test]
    fn truncate_to_fit_appends_marker_when_cutting() {
        let text = "word ".repeat(1000);
        let truncated = truncate_to_fit(&text, 10);
        assert!(truncated.ends_with("[TRUNCATED]"));
        assert!(truncated.len() < text.len());
    }

    #[test]
    fn truncate_to_fit_never_splits_a_multibyte_character() {
        let text = "世界".repeat(200);
        let truncated = truncate_to_fit(&text, 10);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }
}
