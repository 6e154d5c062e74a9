//! Logging setup on the `log` facade with an `env_logger` backend.
//!
//! The level comes from the first of these that applies:
//!
//! 1. `RUST_LOG`, if set
//! 2. `--quiet` (errors only)
//! 3. `-v` (debug) or `-vv` (trace)
//! 4. `debug = true` in the configuration (debug)
//! 5. info
//!
//! Debug builds prefix each line with a timestamp, and with the module path
//! once verbose output is requested. Release builds print level and message.
//!
//! ```rust,no_run
//! use dupefiles::logging::{init_logging, LogOptions};
//!
//! init_logging(LogOptions { verbose: 1, ..LogOptions::default() });
//! ```

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Inputs that select the log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Count of `-v` flags
    pub verbose: u8,
    /// `--quiet` was given
    pub quiet: bool,
    /// `debug` configuration switch
    pub config_debug: bool,
}

/// Install the global logger. Later calls are ignored.
pub fn init_logging(options: LogOptions) {
    let from_env = env::var("RUST_LOG").is_ok();
    let mut builder = Builder::new();

    let level = determine_level(options);
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
    }
    configure_format(&mut builder, options.verbose.max(u8::from(options.config_debug)));

    if builder.try_init().is_err() {
        return;
    }
    if from_env {
        log::debug!("Logging configured from RUST_LOG");
    } else {
        log::debug!("Logging initialized at level: {:?}", level);
    }
}

fn determine_level(options: LogOptions) -> LevelFilter {
    if options.quiet {
        return LevelFilter::Error;
    }
    match options.verbose {
        0 if options.config_debug => LevelFilter::Debug,
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, detail: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let style = buf.default_level_style(level);
            if detail >= 1 {
                writeln!(
                    buf,
                    "{} {style}{:<5}{style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(buf, "{} {style}{:<5}{style:#} {}", timestamp, level, record.args())
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = detail;
        builder.format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
        });
    }
}

/// Name of the active maximum log level.
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
