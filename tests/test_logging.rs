//! Tests for logging configuration and format parsing
//!
//! Covers the pure functions that turn environment values into a
//! subscriber configuration.

use mqtt_sn_pub::observability::logging::{effective_level, parse_level, LogFormat};
use mqtt_sn_pub::observability::init_logging;
use tracing::Level;

#[test]
fn test_log_format_parse_known_values() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    assert_eq!(LogFormat::parse("invalid"), LogFormat::Compact);
    assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    assert_eq!(LogFormat::parse("yaml"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace() {
    assert_eq!(LogFormat::parse("  json  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("pretty\n"), LogFormat::Pretty);
}

#[test]
fn test_default_level_is_warn() {
    assert_eq!(effective_level(false, None), Level::WARN);
    assert_eq!(effective_level(false, Some("")), Level::WARN);
}

#[test]
fn test_debug_flag_overrides_log_level() {
    assert_eq!(effective_level(true, None), Level::DEBUG);
    assert_eq!(effective_level(true, Some("TRACE")), Level::DEBUG);
}

#[test]
fn test_log_level_from_env_value() {
    assert_eq!(effective_level(false, Some("info")), Level::INFO);
    assert_eq!(parse_level("ERROR"), Some(Level::ERROR));
    assert_eq!(parse_level("loud"), None);
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::WARN, LogFormat::Compact, false);
    init_logging(Level::DEBUG, LogFormat::Json, true);
}
