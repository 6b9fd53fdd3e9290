//! Global logger initialization.
//!
//! Both binaries call [`init`] exactly once at startup. Library code below
//! this layer only ever calls the `log` facade macros and never assumes a
//! sink exists, so tests and embedders that skip `init` still work.

use log::LevelFilter;

/// Initialize the global logger at the level implied by a `-v` occurrence
/// count, mirroring the verbosity-to-filter mapping used across the
/// corpus's CLI tools (0 occurrences = info, 1 = debug, 2+ = trace).
///
/// At `Info` or below, timestamps, levels, and module targets are
/// suppressed so routine output reads like a plain CLI tool rather than a
/// structured log; `Debug`/`Trace` restore full context for diagnosis.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()));

    if level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    // env_logger::Builder::init() panics if a logger is already installed;
    // tests that call this more than once should use try_init via `log`
    // directly instead of this convenience wrapper.
    let _ = builder.try_init();
}
