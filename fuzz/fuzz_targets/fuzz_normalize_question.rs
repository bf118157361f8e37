#![no_main]

use libfuzzer_sys::fuzz_target;
use solvecache::{normalize, slugify, Question};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let question = Question::new(raw);
    let normalized = &question.normalized;

    // Idempotent
    assert_eq!(&normalize(normalized), normalized);

    // Only alphabetic characters and single spaces survive
    assert!(!normalized.starts_with(' ') && !normalized.ends_with(' '));
    assert!(!normalized.contains("  "));
    assert!(normalized.chars().all(|c| c == ' ' || c.is_alphabetic()));

    // Slugs are non-empty and never contain path separators
    let slug = slugify(normalized);
    assert!(!slug.is_empty());
    assert!(!slug.contains('/') && !slug.contains('\\'));
});
