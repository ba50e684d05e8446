//! Admission control for tool results crossing into an agent's context.
//!
//! A post-tool-use hook hands over the raw event; the guard parses it, checks
//! the fetched URL and content structurally, asks a classifier about prompt
//! injection, and produces an allow/block verdict. Blocked content is written
//! to a quarantine directory for later review.

mod classifier;
mod content_guard;
mod payload;
mod pipeline;
mod quarantine;
mod url_guard;
mod verdict;

pub use classifier::{
    build_llm_classifier, missing_credential_message, ClassifierConfig, ClassifierError,
    ClassifierFactory, ClassifierFinding, InjectionClassifier, LlmInjectionClassifier,
    DEFAULT_CLASSIFIER_API_BASE, DEFAULT_CLASSIFIER_MODEL, DEFAULT_CLASSIFIER_TIMEOUT_MS,
    DEFAULT_CREDENTIAL_ENV,
};
pub use content_guard::{
    check_content, detect_binary, ContentGuardConfig, ContentViolation, ModelBudget,
    DEFAULT_BINARY_SAMPLE_BYTES, DEFAULT_CHARS_PER_TOKEN, DEFAULT_CONTEXT_WINDOW_TOKENS,
    DEFAULT_OUTPUT_RESERVE_RATIO, DEFAULT_RESERVED_TOKENS,
};
pub use payload::{
    parse_hook_payload, GuardedTools, ParsedPayload, PayloadParseError, ToolUseEvent,
    DEFAULT_GUARDED_TOOL,
};
pub use pipeline::{
    check_content_stage, check_url_stage, classify_stage, decide, parse_stage, BorderGuard,
    Evaluation, GuardConfig, GuardOutcome,
};
pub use quarantine::{
    new_quarantine_id, QuarantineRecord, QuarantineWriter, DEFAULT_QUARANTINE_DIR,
};
pub use url_guard::{UrlGuard, UrlGuardConfig, UrlViolation, DEFAULT_DNS_TIMEOUT_MS};
pub use verdict::{
    AdmissionOutcome, AdmissionReason, AdmissionVerdict, BLOCKED_AT_BORDER, EXIT_CODE_ALLOW,
    EXIT_CODE_BLOCK,
};
