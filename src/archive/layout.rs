//! Names of the members zipapps writes into an archive

use chrono::Utc;

/// Fixed stub that hands `python app.pyz` over to the launcher
pub const MAIN_STUB_NAME: &str = "__main__.py";
pub const MAIN_STUB: &str = include_str!("../../assets/__main__.py");

/// Embedded run-time record read by the activator
pub const BOOTSTRAP_RECORD_NAME: &str = "zipapps_bootstrap.json";

/// Copy of the build configuration for later reuse
pub const BUILD_CONFIG_NAME: &str = "zipapps_config.json";

/// Directory holding lazy-install targets and their requirement files
pub const LAZY_PIP_DIR_NAME: &str = "_zipapps_lazy_pip";

const TIMESTAMP_PREFIX: &str = "_zip_time_";
const BUILD_ID_PREFIX: &str = "_zipapps_build_id_";

/// Generation timestamp in units of 100ns since the epoch
pub fn generation_timestamp() -> String {
    let now = Utc::now();
    let ticks = now
        .timestamp_nanos_opt()
        .map(|nanos| nanos / 100)
        .unwrap_or_else(|| now.timestamp_micros() * 10);
    ticks.to_string()
}

/// Zero-byte marker whose name encodes the generation timestamp
pub fn timestamp_marker(ts: &str) -> String {
    format!("{}{}", TIMESTAMP_PREFIX, ts)
}

/// Zero-byte marker whose name encodes a build fingerprint
pub fn build_id_marker(digest: &str) -> String {
    format!("{}{}", BUILD_ID_PREFIX, digest)
}

/// Whether a member name is one of the zipapps bookkeeping files
pub fn is_bookkeeping(name: &str) -> bool {
    name.starts_with(TIMESTAMP_PREFIX)
        || name.starts_with(BUILD_ID_PREFIX)
        || name == BOOTSTRAP_RECORD_NAME
        || name == BUILD_CONFIG_NAME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_encode_their_value() {
        assert_eq!(timestamp_marker("123"), "_zip_time_123");
        assert_eq!(build_id_marker("abc"), "_zipapps_build_id_abc");
        assert!(is_bookkeeping("_zip_time_123"));
        assert!(is_bookkeeping(BOOTSTRAP_RECORD_NAME));
        assert!(!is_bookkeeping("six.py"));
    }

    #[test]
    fn timestamps_are_numeric_and_monotonic_enough() {
        let a: i64 = generation_timestamp().parse().unwrap();
        let b: i64 = generation_timestamp().parse().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn stub_execs_launcher() {
        assert!(MAIN_STUB.contains("\"run\""));
    }
}
