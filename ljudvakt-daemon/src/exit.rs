//! Process exit codes, based on `sysexits.h`.

pub const OK: i32 = 0;
/// Command line usage error.
pub const USAGE: i32 = 64;
/// Service unavailable.
pub const UNAVAILABLE: i32 = 69;
/// Internal software error.
pub const SOFTWARE: i32 = 70;
/// Configuration error.
pub const CONFIG: i32 = 78;
