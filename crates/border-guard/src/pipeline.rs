//! Decision executor: `parse -> url -> content -> classify -> decide`.
//!
//! Each stage either lets the event through or returns the terminal block
//! verdict; the first block short-circuits everything after it. Filesystem side
//! effects happen only in [`BorderGuard::run`], after the verdict is final.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::{
    build_llm_classifier, check_content, missing_credential_message, parse_hook_payload,
    AdmissionReason, AdmissionVerdict, ClassifierConfig, ClassifierError, ClassifierFactory,
    ClassifierFinding,
    ContentGuardConfig, ContentViolation, GuardedTools, InjectionClassifier, ParsedPayload,
    QuarantineRecord, QuarantineWriter, ToolUseEvent, UrlGuard, UrlGuardConfig,
    DEFAULT_QUARANTINE_DIR,
};

type StageResult<T = ()> = Result<T, AdmissionVerdict>;

#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    pub guarded_tools: GuardedTools,
    pub url: UrlGuardConfig,
    pub content: ContentGuardConfig,
    pub classifier: ClassifierConfig,
    pub quarantine_dir: PathBuf,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            guarded_tools: GuardedTools::default(),
            url: UrlGuardConfig::default(),
            content: ContentGuardConfig::default(),
            classifier: ClassifierConfig::default(),
            quarantine_dir: PathBuf::from(DEFAULT_QUARANTINE_DIR),
        }
    }
}

/// Verdict plus the event it was reached for, when parsing got that far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: AdmissionVerdict,
    pub event: Option<ToolUseEvent>,
}

#[derive(Debug)]
pub struct GuardOutcome {
    pub verdict: AdmissionVerdict,
    pub quarantine_path: Option<PathBuf>,
    pub quarantine_error: Option<String>,
}

impl GuardOutcome {
    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }
}

pub struct BorderGuard {
    guarded_tools: GuardedTools,
    url_guard: UrlGuard,
    content: ContentGuardConfig,
    classifier: ClassifierConfig,
    classifier_factory: Arc<ClassifierFactory>,
    quarantine: QuarantineWriter,
}

impl BorderGuard {
    /// Guard using the OpenAI-compatible classifier described by `config.classifier`.
    pub fn new(config: GuardConfig) -> Self {
        Self::with_classifier_factory(config, Arc::new(build_llm_classifier))
    }

    /// Guard using a fixed classifier; the credential precondition still applies.
    pub fn with_classifier(config: GuardConfig, classifier: Arc<dyn InjectionClassifier>) -> Self {
        Self::with_classifier_factory(
            config,
            Arc::new(
                move |_: &ClassifierConfig,
                      _: &str|
                      -> Result<Arc<dyn InjectionClassifier>, ClassifierError> {
                    Ok(classifier.clone())
                },
            ),
        )
    }

    pub fn with_classifier_factory(config: GuardConfig, factory: Arc<ClassifierFactory>) -> Self {
        Self {
            guarded_tools: config.guarded_tools,
            url_guard: UrlGuard::new(config.url),
            content: config.content,
            classifier: config.classifier,
            classifier_factory: factory,
            quarantine: QuarantineWriter::new(config.quarantine_dir),
        }
    }

    /// Runs every stage without touching the filesystem.
    pub async fn evaluate(&self, raw: &[u8]) -> Evaluation {
        let event = match parse_stage(raw, &self.guarded_tools) {
            Err(verdict) => {
                return Evaluation {
                    verdict,
                    event: None,
                }
            }
            Ok(ParsedPayload::PassThrough { tool_name }) => {
                info!(tool_name = %tool_name, "tool outside guarded class; passing through");
                return Evaluation {
                    verdict: AdmissionVerdict::allow(),
                    event: None,
                };
            }
            Ok(ParsedPayload::Guarded(event)) => event,
        };

        let stages = self.run_event_stages(&event).await;
        Evaluation {
            verdict: decide(stages),
            event: Some(event),
        }
    }

    async fn run_event_stages(&self, event: &ToolUseEvent) -> StageResult {
        debug!(
            tool_use_id = %event.tool_use_id,
            session_id = %event.session_id,
            url = %event.url,
            content_bytes = event.content.len(),
            "evaluating guarded tool result"
        );
        check_url_stage(&self.url_guard, event).await?;
        check_content_stage(event, &self.content)?;
        classify_stage(&self.classifier, self.classifier_factory.as_ref(), event).await
    }

    /// Evaluates `raw` and, on block, writes its quarantine record.
    pub async fn run(&self, raw: &[u8]) -> GuardOutcome {
        let evaluation = self.evaluate(raw).await;
        self.finish(raw, evaluation)
    }

    /// Applies the side effects for an evaluation (or any externally built block verdict).
    pub fn finish(&self, raw: &[u8], evaluation: Evaluation) -> GuardOutcome {
        if evaluation.verdict.is_allow() {
            return GuardOutcome {
                verdict: evaluation.verdict,
                quarantine_path: None,
                quarantine_error: None,
            };
        }

        warn!(
            reason = %evaluation.verdict.reason,
            tool_use_id = evaluation.event.as_ref().map(|event| event.tool_use_id.as_str()),
            "tool result blocked"
        );
        match self.quarantine(raw, &evaluation) {
            Ok(path) => {
                info!(path = %path.display(), "quarantine record written");
                GuardOutcome {
                    verdict: evaluation.verdict,
                    quarantine_path: Some(path),
                    quarantine_error: None,
                }
            }
            Err(quarantine_error) => {
                error!(error = %format!("{quarantine_error:#}"), "quarantine write failed");
                GuardOutcome {
                    verdict: evaluation.verdict,
                    quarantine_path: None,
                    quarantine_error: Some(format!("{quarantine_error:#}")),
                }
            }
        }
    }

    fn quarantine(&self, raw: &[u8], evaluation: &Evaluation) -> Result<PathBuf> {
        let record = match evaluation.event.as_ref() {
            Some(event) => QuarantineRecord::for_event(event, &evaluation.verdict),
            None => QuarantineRecord::for_raw_payload(raw, &evaluation.verdict),
        };
        self.quarantine.write(&record)
    }
}

pub fn parse_stage(raw: &[u8], guarded: &GuardedTools) -> StageResult<ParsedPayload> {
    parse_hook_payload(raw, guarded).map_err(|error| {
        AdmissionVerdict::block(
            AdmissionReason::ParseError,
            format!("hook payload could not be parsed: {error}"),
        )
    })
}

pub async fn check_url_stage(guard: &UrlGuard, event: &ToolUseEvent) -> StageResult {
    guard.check(&event.url).await.map(|_| ()).map_err(|violation| {
        debug!(reason_code = violation.reason_code, "url rejected");
        AdmissionVerdict::block(
            AdmissionReason::UrlInadmissible,
            format!("url not admissible: {}", violation.detail),
        )
    })
}

pub fn check_content_stage(event: &ToolUseEvent, config: &ContentGuardConfig) -> StageResult {
    check_content(&event.content, config).map_err(|violation| {
        let reason = match violation {
            ContentViolation::Binary(_) => AdmissionReason::BinaryContent,
            ContentViolation::Oversized { .. } => AdmissionReason::OversizedContent,
        };
        AdmissionVerdict::block(reason, violation.to_string())
    })
}

/// Fails closed before any network work when the credential is missing.
pub async fn classify_stage(
    config: &ClassifierConfig,
    factory: &ClassifierFactory,
    event: &ToolUseEvent,
) -> StageResult {
    let Some(api_key) = config.credential() else {
        return Err(AdmissionVerdict::block(
            AdmissionReason::MissingCredentials,
            missing_credential_message(&config.credential_name),
        ));
    };

    let classifier = factory(config, api_key).map_err(|error| {
        AdmissionVerdict::block(
            AdmissionReason::ClassifierError,
            format!("injection classifier unavailable, failing closed: {error}"),
        )
    })?;

    match classifier.classify(&event.url, &event.content).await {
        Ok(ClassifierFinding::Clean) => Ok(()),
        Ok(ClassifierFinding::Injection { rationale }) => Err(AdmissionVerdict::block(
            AdmissionReason::InjectionDetected,
            format!(
                "prompt injection detected in content fetched from {}: {rationale}",
                event.url
            ),
        )),
        Err(error) => Err(AdmissionVerdict::block(
            AdmissionReason::ClassifierError,
            format!("injection classifier failed, failing closed: {error}"),
        )),
    }
}

pub fn decide(stages: StageResult) -> AdmissionVerdict {
    match stages {
        Ok(()) => AdmissionVerdict::allow(),
        Err(verdict) => verdict,
    }
}
