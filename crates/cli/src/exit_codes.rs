//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Description                                        |
//! |------|----------------------------------------------------|
//! | 0    | Success                                            |
//! | 1    | Script, settings or mount error                    |
//! | 2    | CLI usage error (bad args), reported by clap       |

/// Success - every script step was applied.
pub const EXIT_SUCCESS: u8 = 0;

/// Script could not be read or parsed, settings were invalid, or a cell
/// failed to mount.
pub const EXIT_ERROR: u8 = 1;
