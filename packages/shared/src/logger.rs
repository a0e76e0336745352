//! Logging setup for the Moyeo binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter covers both the library crate of the binary and the binary itself.
/// `RUST_LOG` takes precedence when it is set.
///
/// # Arguments
///
/// * `crate_name` - The library crate the binary drives (e.g., "moyeo_client")
/// * `binary_name` - The name of the binary (e.g., "moyeo-client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use moyeo_shared::logger::setup_logger;
///
/// setup_logger("moyeo_client", "moyeo-client", "info");
/// ```
pub fn setup_logger(crate_name: &str, binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                default_filter(crate_name, binary_name, default_log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_filter(crate_name: &str, binary_name: &str, level: &str) -> String {
    format!(
        "{}={},{}={}",
        crate_name.replace('-', "_"),
        level,
        binary_name.replace('-', "_"),
        level
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_normalizes_names() {
        // テスト項目: クレート名とバイナリ名のハイフンがアンダースコアに変換される
        // given (前提条件):
        let crate_name = "moyeo-client";
        let binary_name = "moyeo-client";

        // when (操作):
        let filter = default_filter(crate_name, binary_name, "debug");

        // then (期待する結果):
        assert_eq!(filter, "moyeo_client=debug,moyeo_client=debug");
    }
}
