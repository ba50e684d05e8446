#![no_main]

use border_guard::{check_content, ContentGuardConfig, ContentViolation, ModelBudget};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let content = String::from_utf8_lossy(data);
    let config = ContentGuardConfig {
        budget: ModelBudget {
            context_window_tokens: 64,
            reserved_tokens: 0,
            output_reserve_ratio: 1.0,
            chars_per_token: 4.0,
        },
        binary_sample_bytes: 512,
    };
    match check_content(&content, &config) {
        Ok(()) => assert!(content.chars().count() <= 256),
        Err(ContentViolation::Oversized { chars, max_chars }) => {
            assert_eq!(max_chars, 256);
            assert!(chars > max_chars);
        }
        Err(ContentViolation::Binary(signal)) => assert!(!signal.is_empty()),
    }
});
