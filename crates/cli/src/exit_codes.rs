//! CLI Exit Code Registry
//!
//! Single source of truth for `clashgroup` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 2    | Usage error (bad arguments)                          |
//! | 3    | Configuration error (settings, overrides, threshold) |
//! | 4    | Ingest error (unreadable input, no valid rows)       |
//! | 5    | Write error (output not writable)                    |

use clashgroup_engine::{ClashError, ErrorClass};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Settings file unreadable or invalid, unknown override, bad threshold.
pub const EXIT_CONFIG: u8 = 3;

/// Input missing, malformed, or without a single usable clash.
pub const EXIT_INGEST: u8 = 4;

/// Result artifact could not be written.
pub const EXIT_WRITE: u8 = 5;

/// Map a pipeline error to its exit code.
pub fn clash_exit_code(err: &ClashError) -> u8 {
    match err.class() {
        ErrorClass::Configuration => EXIT_CONFIG,
        ErrorClass::Ingest => EXIT_INGEST,
        ErrorClass::Write => EXIT_WRITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_map_to_distinct_codes() {
        assert_eq!(clash_exit_code(&ClashError::InvalidThreshold(-1.0)), EXIT_CONFIG);
        assert_eq!(clash_exit_code(&ClashError::UnknownOption("x".into())), EXIT_CONFIG);
        assert_eq!(clash_exit_code(&ClashError::ingest("in.csv", "boom")), EXIT_INGEST);
        assert_eq!(clash_exit_code(&ClashError::write("out.csv", "boom")), EXIT_WRITE);
    }

    #[test]
    fn registry_codes_are_the_documented_set() {
        let codes = [EXIT_SUCCESS, EXIT_USAGE, EXIT_CONFIG, EXIT_INGEST, EXIT_WRITE];
        assert_eq!(codes, [0, 2, 3, 4, 5]);
    }
}
