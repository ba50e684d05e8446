//! Terminal admission verdict produced once per hook invocation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Literal every block diagnostic carries so hosts can grep for it.
pub const BLOCKED_AT_BORDER: &str = "blocked at border";

pub const EXIT_CODE_ALLOW: i32 = 0;
pub const EXIT_CODE_BLOCK: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionOutcome {
    Allow,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Stable machine-readable reason attached to a verdict.
pub enum AdmissionReason {
    None,
    UrlInadmissible,
    BinaryContent,
    OversizedContent,
    InjectionDetected,
    MissingCredentials,
    ParseError,
    ClassifierError,
    InternalError,
}

impl AdmissionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::UrlInadmissible => "url_inadmissible",
            Self::BinaryContent => "binary_content",
            Self::OversizedContent => "oversized_content",
            Self::InjectionDetected => "injection_detected",
            Self::MissingCredentials => "missing_credentials",
            Self::ParseError => "parse_error",
            Self::ClassifierError => "classifier_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for AdmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionVerdict {
    pub outcome: AdmissionOutcome,
    pub reason: AdmissionReason,
    pub message: String,
}

impl AdmissionVerdict {
    pub fn allow() -> Self {
        Self {
            outcome: AdmissionOutcome::Allow,
            reason: AdmissionReason::None,
            message: String::new(),
        }
    }

    /// Builds a block verdict whose message is prefixed with [`BLOCKED_AT_BORDER`].
    pub fn block(reason: AdmissionReason, detail: impl AsRef<str>) -> Self {
        Self {
            outcome: AdmissionOutcome::Block,
            reason,
            message: format!("{BLOCKED_AT_BORDER}: {}", detail.as_ref()),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.outcome == AdmissionOutcome::Allow
    }

    pub fn is_block(&self) -> bool {
        self.outcome == AdmissionOutcome::Block
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            AdmissionOutcome::Allow => EXIT_CODE_ALLOW,
            AdmissionOutcome::Block => EXIT_CODE_BLOCK,
        }
    }
}
