//! CLI Exit Code Registry
//!
//! Single source of truth for `ringscan` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                            |
//! |------|----------------------------------------------------|
//! | 0    | Success                                            |
//! | 1    | General error (unspecified)                        |
//! | 2    | CLI usage error (bad args)                         |
//! | 3    | Scan config could not be parsed or is invalid      |
//! | 4    | A dataset could not be read or parsed              |
//! | 5    | Findings at or above the `--fail-on` level         |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Config file unreadable, malformed TOML, or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Dataset file missing, unreadable, or missing a mapped column.
pub const EXIT_INPUT: u8 = 4;

/// At least one record scored at or above `--fail-on`.
pub const EXIT_FINDINGS: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_ERROR, EXIT_USAGE, EXIT_INVALID_CONFIG, EXIT_INPUT, EXIT_FINDINGS];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
