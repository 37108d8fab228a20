//! Utility functions and helpers
//!
//! This module provides identifier validation and small helpers used
//! throughout the codebase.

pub mod identifier;

pub use identifier::{ensure_identifier, is_valid_identifier, slugify};

use std::time::Instant;
use log::debug;

/// Measure execution time of a closure
pub fn measure_time<F, T>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    debug!("{} took {}ms", name, start.elapsed().as_millis());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_time_returns_value() {
        assert_eq!(measure_time("sum", || 2 + 2), 4);
    }
}
