#![no_main]

use border_guard::{
    parse_hook_payload, AdmissionReason, AdmissionVerdict, GuardedTools, ParsedPayload,
    QuarantineRecord,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let guarded = GuardedTools::default();
    match parse_hook_payload(data, &guarded) {
        Ok(ParsedPayload::Guarded(event)) => {
            assert!(guarded.contains(&event.tool_name));
            let verdict = AdmissionVerdict::block(AdmissionReason::InjectionDetected, "fuzz");
            let record = QuarantineRecord::for_event(&event, &verdict);
            assert_eq!(record.content, event.content);
        }
        Ok(ParsedPayload::PassThrough { tool_name }) => {
            assert!(!guarded.contains(&tool_name));
        }
        Err(error) => {
            assert!(!error.to_string().trim().is_empty());
            let verdict = AdmissionVerdict::block(AdmissionReason::ParseError, error.to_string());
            assert_eq!(verdict.exit_code(), 2);
        }
    }
});
