use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_f64(value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err("value must be a finite number greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_ratio(value: &str) -> Result<f64, String> {
    let parsed = parse_positive_f64(value)?;
    if parsed > 1.0 {
        return Err("value must be in range (0, 1]".to_string());
    }
    Ok(parsed)
}

fn parse_tool_name(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("tool name must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "border-hook",
    about = "Post-tool-use hook that blocks inadmissible fetched content before it reaches the agent",
    long_about = "Reads one post-tool-use hook event as JSON on stdin. Exits 0 to admit the tool \
                  result and 2 to block it, with a 'blocked at border' diagnostic on stderr. \
                  Blocked content is written to the quarantine directory.",
    version
)]
pub struct Cli {
    #[arg(
        long = "guarded-tool",
        env = "BORDER_GUARDED_TOOLS",
        value_delimiter = ',',
        default_value = "WebFetch",
        value_parser = parse_tool_name,
        help = "Tool names whose results are screened. Other tools pass through unchanged."
    )]
    pub guarded_tools: Vec<String>,

    #[arg(
        long = "context-window-tokens",
        env = "BORDER_CONTEXT_WINDOW_TOKENS",
        default_value_t = 256_000,
        value_parser = parse_positive_u64,
        help = "Context window of the classifier model, in tokens"
    )]
    pub context_window_tokens: u64,

    #[arg(
        long = "reserved-tokens",
        env = "BORDER_RESERVED_TOKENS",
        default_value_t = 1_000,
        help = "Tokens held back from the window for the classifier prompt scaffolding"
    )]
    pub reserved_tokens: u64,

    #[arg(
        long = "output-reserve-ratio",
        env = "BORDER_OUTPUT_RESERVE_RATIO",
        default_value_t = 0.5,
        value_parser = parse_ratio,
        help = "Share of the usable window allotted to the inspected document"
    )]
    pub output_reserve_ratio: f64,

    #[arg(
        long = "chars-per-token",
        env = "BORDER_CHARS_PER_TOKEN",
        default_value_t = 4.0,
        value_parser = parse_positive_f64,
        help = "Characters assumed per token when converting the budget to characters"
    )]
    pub chars_per_token: f64,

    #[arg(
        long = "binary-sample-bytes",
        env = "BORDER_BINARY_SAMPLE_BYTES",
        default_value_t = 8_192,
        value_parser = parse_positive_usize,
        help = "Prefix length sampled for binary detection"
    )]
    pub binary_sample_bytes: usize,

    #[arg(
        long = "url-dns-check",
        env = "BORDER_URL_DNS_CHECK",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Resolve fetched hostnames and block when any address is private or reserved"
    )]
    pub url_dns_check: bool,

    #[arg(
        long = "url-dns-timeout-ms",
        env = "BORDER_URL_DNS_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Deadline for resolving the fetched hostname. Expiry blocks the result."
    )]
    pub url_dns_timeout_ms: u64,

    #[arg(
        long = "classifier-api-key",
        env = "XAI_API_KEY",
        hide_env_values = true,
        help = "API key for the injection classifier. Without it every guarded result is blocked."
    )]
    pub classifier_api_key: Option<String>,

    #[arg(
        long = "classifier-api-base",
        env = "BORDER_CLASSIFIER_API_BASE",
        default_value = "https://api.x.ai/v1",
        help = "Base URL of the OpenAI-compatible chat-completions API used for classification"
    )]
    pub classifier_api_base: String,

    #[arg(
        long = "classifier-model",
        env = "BORDER_CLASSIFIER_MODEL",
        default_value = "grok-3-mini",
        help = "Model used for prompt-injection classification"
    )]
    pub classifier_model: String,

    #[arg(
        long = "classifier-timeout-ms",
        env = "BORDER_CLASSIFIER_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Deadline for the classification call. Expiry blocks the result."
    )]
    pub classifier_timeout_ms: u64,

    #[arg(
        long = "quarantine-dir",
        env = "BORDER_QUARANTINE_DIR",
        default_value = ".quarantine",
        help = "Directory receiving one JSON record per blocked result"
    )]
    pub quarantine_dir: PathBuf,
}
