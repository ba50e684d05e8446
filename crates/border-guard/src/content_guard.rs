//! Structural admissibility of fetched content: binary sniffing, then the
//! character budget derived from the classifier model's context window.

use thiserror::Error;

pub const DEFAULT_CONTEXT_WINDOW_TOKENS: u64 = 256_000;
pub const DEFAULT_RESERVED_TOKENS: u64 = 1_000;
pub const DEFAULT_OUTPUT_RESERVE_RATIO: f64 = 0.5;
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;
pub const DEFAULT_BINARY_SAMPLE_BYTES: usize = 8 * 1024;

/// Sampled characters above this share of control/replacement characters are binary.
const BINARY_CONTROL_RATIO_THRESHOLD: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelBudget {
    pub context_window_tokens: u64,
    pub reserved_tokens: u64,
    pub output_reserve_ratio: f64,
    pub chars_per_token: f64,
}

impl Default for ModelBudget {
    fn default() -> Self {
        Self {
            context_window_tokens: DEFAULT_CONTEXT_WINDOW_TOKENS,
            reserved_tokens: DEFAULT_RESERVED_TOKENS,
            output_reserve_ratio: DEFAULT_OUTPUT_RESERVE_RATIO,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl ModelBudget {
    /// `(context_window_tokens - reserved_tokens) * output_reserve_ratio * chars_per_token`, floored.
    pub fn max_inspectable_chars(&self) -> usize {
        let usable_tokens = self
            .context_window_tokens
            .saturating_sub(self.reserved_tokens) as f64;
        let chars = usable_tokens * self.output_reserve_ratio * self.chars_per_token;
        if !chars.is_finite() || chars <= 0.0 {
            return 0;
        }
        chars.floor() as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentGuardConfig {
    pub budget: ModelBudget,
    pub binary_sample_bytes: usize,
}

impl Default for ContentGuardConfig {
    fn default() -> Self {
        Self {
            budget: ModelBudget::default(),
            binary_sample_bytes: DEFAULT_BINARY_SAMPLE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentViolation {
    #[error("binary content detected ({0})")]
    Binary(String),
    #[error(
        "content too large: {chars} chars exceeds the inspectable budget of {max_chars} chars"
    )]
    Oversized { chars: usize, max_chars: usize },
}

/// Runs the binary check, then the size budget. The first failure wins.
pub fn check_content(content: &str, config: &ContentGuardConfig) -> Result<(), ContentViolation> {
    if let Some(signal) = detect_binary(content, config.binary_sample_bytes) {
        return Err(ContentViolation::Binary(signal));
    }

    let max_chars = config.budget.max_inspectable_chars();
    // Byte length bounds char count from above.
    if content.len() <= max_chars {
        return Ok(());
    }
    let chars = content.chars().count();
    if chars > max_chars {
        return Err(ContentViolation::Oversized { chars, max_chars });
    }
    Ok(())
}

/// Returns a short description of the binary signal found in the sampled prefix.
pub fn detect_binary(content: &str, sample_bytes: usize) -> Option<String> {
    if let Some(format) = binary_signature(content) {
        return Some(format!("{format} file signature"));
    }

    let mut sampled = 0_usize;
    let mut suspicious = 0_usize;
    for (offset, ch) in content.char_indices() {
        if offset >= sample_bytes {
            break;
        }
        if ch == '\0' {
            return Some(format!("NUL byte at offset {offset}"));
        }
        sampled += 1;
        if is_suspicious_char(ch) {
            suspicious += 1;
        }
    }
    if sampled == 0 {
        return None;
    }

    let ratio = suspicious as f64 / sampled as f64;
    if ratio > BINARY_CONTROL_RATIO_THRESHOLD {
        return Some(format!(
            "{suspicious} of {sampled} sampled characters are non-printable"
        ));
    }
    None
}

fn is_suspicious_char(ch: char) -> bool {
    ch == '\u{FFFD}' || (ch.is_control() && !matches!(ch, '\t' | '\n' | '\r' | '\u{0C}' | '\u{1B}'))
}

/// High bytes of a signature may arrive as their Latin-1 code point or as U+FFFD.
fn is_high_byte(ch: char, byte: u8) -> bool {
    ch == '\u{FFFD}' || ch as u32 == u32::from(byte)
}

fn binary_signature(content: &str) -> Option<&'static str> {
    let mut chars = content.chars();
    let first = chars.next()?;
    let rest = chars.as_str();

    if is_high_byte(first, 0x89) && rest.starts_with("PNG") {
        return Some("PNG");
    }
    if content.starts_with("GIF87a") || content.starts_with("GIF89a") {
        return Some("GIF");
    }
    if content.starts_with("%PDF-") {
        return Some("PDF");
    }
    if content.starts_with("PK\u{3}\u{4}") {
        return Some("ZIP");
    }
    let mut head = content.chars();
    match (head.next(), head.next(), head.next()) {
        (Some('\u{1F}'), Some(second), _) if is_high_byte(second, 0x8B) => Some("gzip"),
        (Some(a), Some(b), Some(c))
            if is_high_byte(a, 0xFF) && is_high_byte(b, 0xD8) && is_high_byte(c, 0xFF) =>
        {
            Some("JPEG")
        }
        _ => None,
    }
}
