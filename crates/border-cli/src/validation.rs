use anyhow::{bail, Result};

use crate::Cli;

/// Cross-flag checks clap cannot express per argument.
pub fn validate_guard_cli(cli: &Cli) -> Result<()> {
    if cli.reserved_tokens >= cli.context_window_tokens {
        bail!(
            "--reserved-tokens ({}) must be smaller than --context-window-tokens ({})",
            cli.reserved_tokens,
            cli.context_window_tokens
        );
    }

    let api_base = cli.classifier_api_base.trim();
    if !(api_base.starts_with("https://") || api_base.starts_with("http://")) {
        bail!("--classifier-api-base must be an http(s) URL, got '{api_base}'");
    }
    if cli.classifier_model.trim().is_empty() {
        bail!("--classifier-model must not be empty");
    }
    Ok(())
}
