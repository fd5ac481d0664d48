//! Log level selection
//!
//! The library logs through the `log` facade and never installs a logger.
//! The `debug` and `verbose` features raise the compile-time default that
//! [`init`] applies.

use log::LevelFilter;

cfg_if::cfg_if! {
    if #[cfg(feature = "verbose")] {
        const DEFAULT_LEVEL: LevelFilter = LevelFilter::Trace;
    } else if #[cfg(feature = "debug")] {
        const DEFAULT_LEVEL: LevelFilter = LevelFilter::Debug;
    } else {
        const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;
    }
}

/// Get the default log level for this build
pub fn level() -> LevelFilter {
    DEFAULT_LEVEL
}

/// Apply the build's default log level to the `log` facade
pub fn init() {
    log::set_max_level(DEFAULT_LEVEL);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_matches_features() {
        if cfg!(feature = "verbose") {
            assert_eq!(level(), LevelFilter::Trace);
        } else if cfg!(feature = "debug") {
            assert_eq!(level(), LevelFilter::Debug);
        } else {
            assert_eq!(level(), LevelFilter::Info);
        }
    }
}
