use pretty_env_logger::formatted_builder;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "toncell_rs=info";

/// Installs a `pretty_env_logger` honouring `RUST_LOG`
pub fn init_logger() -> Result<(), log::SetLoggerError> {
    let mut builder = formatted_builder();

    if let Ok(s) = ::std::env::var("RUST_LOG") {
        builder.parse_filters(&s);
    } else {
        builder.parse_filters(DEFAULT_LOG_FILTER);
    }

    builder.try_init()
}

/// Same as [`init_logger`] but captured by the test harness, at trace level
/// for this crate. Safe to call from every test.
#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = formatted_builder()
        .is_test(true)
        .parse_filters("toncell_rs=trace")
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_is_idempotent() {
        init_test_logger();
        // a logger is already installed, so a second one is refused
        assert!(init_logger().is_err());
        init_test_logger();
    }
}
