//! Built-in checks run by `--test` before installing.
//!
//! These exercise the version scanner against the shapes of `cmake --version`
//! output seen in the wild, so a CI job can confirm the tool itself behaves before
//! trusting what it installs.

use crate::version::{self, Version};

/// Input text and the version it must yield.
const CASES: &[(&str, Option<&str>)] = &[
    ("", None),
    ("blah", None),
    ("3", None),
    ("cmake version 3.18", None),
    ("cmake version 3.18.4", Some("3.18.4")),
    ("cmake version 3.19.0-rc3", Some("3.19.0-rc3")),
    ("cmake version 99.99.99", Some("99.99.99")),
    ("cmake version 99.99.99-rc99", Some("99.99.99-rc99")),
    (
        "cmake version 3.19.0-rc3\n\nCMake suite maintained and supported by Kitware (kitware.com/cmake).\n",
        Some("3.19.0-rc3"),
    ),
];

/// Ordered pairs where the first must sort below the second.
const ORDERING: &[(&str, &str)] = &[
    ("3.19.0-rc3", "3.19.0"),
    ("3.19.0-rc3", "3.19.0-rc4"),
    ("3.19.0-rc9", "3.19.0-rc10"),
    ("3.18.4", "3.19.0"),
];

/// Run every check; returns a description of each failure.
pub fn run() -> Vec<String> {
    let mut failures = Vec::new();

    for (input, expected) in CASES {
        let actual = version::parse_version(input).map(|v| v.to_string());
        if actual.as_deref() != *expected {
            failures.push(format!(
                "parse_version({:?}) = {:?}, expected {:?}",
                input, actual, expected
            ));
        }
    }

    for (lower, higher) in ORDERING {
        let ordered = match (lower.parse::<Version>(), higher.parse::<Version>()) {
            (Ok(a), Ok(b)) => a < b,
            _ => false,
        };
        if !ordered {
            failures.push(format!("expected {} < {}", lower, higher));
        }
    }

    failures
}
