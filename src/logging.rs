//! Logging setup
//! `env_logger` backend for the `log` facade, with local RFC 3339 timestamps.

use std::io::Write;
use std::sync::Once;

use chrono::Local;
use env_logger::{Builder, Env};
use log::SetLoggerError;

static INIT: Once = Once::new();

/// Installs the logger. `default_level` is used unless `RUST_LOG` is set.
/// Only the first call installs anything; later calls return the error
/// `log` reports for a second logger.
pub fn init(default_level: &str) -> Result<(), SetLoggerError> {
    let result = Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if result.is_ok() {
        INIT.call_once(|| log::info!("Logging initialized"));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init("debug");
        assert!(init("debug").is_err());
    }
}
