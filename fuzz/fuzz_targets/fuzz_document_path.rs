//! Fuzz target for document path parsing.
//!
//! Parsing never panics, and any path that parses renders back to the
//! same string.

#![no_main]

use fanout_replicator::path::{CollectionPath, DocumentPath};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(path) = data.parse::<DocumentPath>() {
        assert_eq!(path.to_string(), data);
        assert_eq!(path.depth() * 2, data.split('/').count());
    }

    if let Ok(collection) = data.parse::<CollectionPath>() {
        assert_eq!(collection.to_string(), data);
    }
});
