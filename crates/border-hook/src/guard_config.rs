//! Maps parsed CLI flags onto the guard's runtime configuration.

use anyhow::Result;
use border_cli::{validate_guard_cli, Cli};
use border_guard::{
    ClassifierConfig, ContentGuardConfig, GuardConfig, GuardedTools, ModelBudget,
    UrlGuardConfig, DEFAULT_CREDENTIAL_ENV,
};

pub(crate) fn build_guard_config(cli: &Cli) -> Result<GuardConfig> {
    validate_guard_cli(cli)?;
    Ok(GuardConfig {
        guarded_tools: GuardedTools::new(&cli.guarded_tools),
        url: UrlGuardConfig {
            resolve_dns: cli.url_dns_check,
            dns_timeout_ms: cli.url_dns_timeout_ms,
        },
        content: ContentGuardConfig {
            budget: ModelBudget {
                context_window_tokens: cli.context_window_tokens,
                reserved_tokens: cli.reserved_tokens,
                output_reserve_ratio: cli.output_reserve_ratio,
                chars_per_token: cli.chars_per_token,
            },
            binary_sample_bytes: cli.binary_sample_bytes,
        },
        classifier: ClassifierConfig {
            credential_name: DEFAULT_CREDENTIAL_ENV.to_string(),
            api_key: cli.classifier_api_key.clone(),
            api_base: cli.classifier_api_base.trim().to_string(),
            model: cli.classifier_model.trim().to_string(),
            timeout_ms: cli.classifier_timeout_ms,
        },
        quarantine_dir: cli.quarantine_dir.clone(),
    })
}
