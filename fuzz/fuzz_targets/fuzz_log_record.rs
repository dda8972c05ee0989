//! Fuzz target for log record decoding.
//!
//! Any JSON object decodes without panicking, every field lands in exactly
//! one of entries/malformed, and entries come out in natural order.

#![no_main]

use fanout_replicator::log::{natural_cmp, LogRecord};
use fanout_replicator::value::Fields;
use libfuzzer_sys::fuzz_target;
use std::cmp::Ordering;

fuzz_target!(|data: &[u8]| {
    let Ok(fields) = serde_json::from_slice::<Fields>(data) else {
        return;
    };

    let record = LogRecord::from_fields(&fields);
    assert_eq!(record.len(), fields.len());
    for pair in record.entries.windows(2) {
        assert_ne!(natural_cmp(&pair[0].id, &pair[1].id), Ordering::Greater);
    }
});
