//! Fuzz target for credential blob parsing.
//!
//! Parsing never panics, and rendering a parsed spec never panics.

#![no_main]

use fanout_replicator::store::StoreSpec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(spec) = data.parse::<StoreSpec>() {
        let _ = spec.to_string();
    }
});
