use std::collections::HashMap;
use std::path::Path;

use remote_browser::config::{Resolution, SessionConfig};
use remote_browser::AppError;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[test]
fn defaults_match_documented_values() {
    let config = SessionConfig::default();

    assert_eq!(config.resolution.to_string(), "1920x1080x24");
    assert_eq!(config.display, ":99");
    assert_eq!(config.state_dir, Path::new("/data/browser-profile"));
    assert_eq!(config.external_debug_port, 9222);
    assert_eq!(config.internal_debug_port, 9223);
    assert_eq!(config.vnc_port, 5900);
    assert_eq!(config.web_proxy_port, 6080);
    assert!(config.vnc_password.is_none());
    assert!(config.devtools_token.is_none());
    assert_eq!(config.programs.browser, "chromium");
    assert_eq!(config.timings.display_poll_attempts, 30);
    assert_eq!(config.timings.monitor_interval_ms, 5000);
    assert_eq!(config.timings.restart_cooldown_ms, 2000);
    config.validate().expect("defaults are valid");
}

#[test]
fn parses_partial_toml_over_defaults() {
    let toml = r#"
resolution = "1280x720x16"
display = ":42"
devtools_token = "s3cret"

[programs]
browser = "google-chrome"
browser_args = ["--lang=en-US"]

[timings]
monitor_interval_ms = 250
"#;

    let config = SessionConfig::from_toml_str(toml).expect("config parses");

    assert_eq!(
        config.resolution,
        Resolution {
            width: 1280,
            height: 720,
            depth: 16
        }
    );
    assert_eq!(config.display, ":42");
    assert_eq!(config.devtools_token.as_deref(), Some("s3cret"));
    assert_eq!(config.programs.browser, "google-chrome");
    assert_eq!(config.programs.browser_args, vec!["--lang=en-US"]);
    assert_eq!(config.programs.display_server, "Xvfb");
    assert_eq!(config.timings.monitor_interval().as_millis(), 250);
    assert_eq!(config.timings.restart_cooldown().as_millis(), 2000);
}

#[test]
fn rejects_invalid_toml() {
    let err = SessionConfig::from_toml_str("vnc_port = \"not a number\"").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn loads_from_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("session.toml");
    std::fs::write(&path, "vnc_port = 5901\n").expect("write config");

    let config = SessionConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.vnc_port, 5901);
}

#[test]
fn missing_file_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let err = SessionConfig::load_from_path(temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn environment_overrides_file_values() {
    let mut config =
        SessionConfig::from_toml_str("vnc_port = 5901\ndisplay = \":5\"\n").expect("parses");

    config
        .apply_env(&env(&[
            ("VNC_PORT", "5999"),
            ("DISPLAY", ":7"),
            ("RESOLUTION", "800x600x8"),
            ("USER_DATA_DIR", "/tmp/profile"),
            ("VNC_PASSWORD", "viewer"),
            ("DEVTOOLS_TOKEN", "token"),
            ("EXTERNAL_DEBUG_PORT", "9333"),
            ("INTERNAL_DEBUG_PORT", "9334"),
            ("NOVNC_PORT", "0"),
            ("VNC_PASSWORD_FILE", "/tmp/vnc/passwd"),
            ("CHROME_BIN", "/opt/chrome/chrome"),
            ("CHROME_EXTRA_ARGS", "--mute-audio  --lang=fr"),
        ]))
        .expect("overrides apply");

    assert_eq!(config.vnc_port, 5999);
    assert_eq!(config.display, ":7");
    assert_eq!(config.resolution.to_string(), "800x600x8");
    assert_eq!(config.state_dir, Path::new("/tmp/profile"));
    assert_eq!(config.vnc_password.as_deref(), Some("viewer"));
    assert_eq!(config.devtools_token.as_deref(), Some("token"));
    assert_eq!(config.external_debug_port, 9333);
    assert_eq!(config.internal_debug_port, 9334);
    assert!(!config.web_viewer_enabled());
    assert_eq!(config.vnc_password_file, Path::new("/tmp/vnc/passwd"));
    assert_eq!(config.programs.browser, "/opt/chrome/chrome");
    assert_eq!(config.programs.browser_args, vec!["--mute-audio", "--lang=fr"]);
}

#[test]
fn empty_environment_values_are_ignored() {
    let config = SessionConfig::from_env_map(&env(&[
        ("VNC_PASSWORD", ""),
        ("DEVTOOLS_TOKEN", "   "),
        ("RESOLUTION", ""),
    ]))
    .expect("config builds");

    assert!(config.vnc_password.is_none());
    assert!(config.devtools_token.is_none());
    assert_eq!(config.resolution, Resolution::default());
}

#[test]
fn rejects_non_numeric_port() {
    let err = SessionConfig::from_env_map(&env(&[("VNC_PORT", "vnc")])).unwrap_err();
    assert!(err.to_string().contains("VNC_PORT"));
}

#[test]
fn rejects_equal_debug_ports() {
    let err = SessionConfig::from_env_map(&env(&[
        ("EXTERNAL_DEBUG_PORT", "9300"),
        ("INTERNAL_DEBUG_PORT", "9300"),
    ]))
    .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_display_without_colon() {
    let err = SessionConfig::from_env_map(&env(&[("DISPLAY", "99")])).unwrap_err();
    assert!(err.to_string().contains("display"));
}

#[test]
fn resolution_parsing() {
    let parsed: Resolution = "1024X768x32".parse().expect("parses");
    assert_eq!((parsed.width, parsed.height, parsed.depth), (1024, 768, 32));

    for bad in ["1920x1080", "1920x1080x24x1", "0x1080x24", "1920x1080x12", "wide", ""] {
        assert!(bad.parse::<Resolution>().is_err(), "{bad} should be rejected");
    }
}

#[test]
fn debug_output_redacts_secrets() {
    let config = SessionConfig::from_env_map(&env(&[
        ("VNC_PASSWORD", "hunter2"),
        ("DEVTOOLS_TOKEN", "tok-abc"),
    ]))
    .expect("config builds");

    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("tok-abc"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn credentials_keep_surrounding_whitespace() {
    let config = SessionConfig::from_env_map(&env(&[
        ("VNC_PASSWORD", " pass word "),
        ("DEVTOOLS_TOKEN", "tok\t"),
        ("VNC_PORT", " 5901 "),
    ]))
    .expect("config builds");

    assert_eq!(config.vnc_password.as_deref(), Some(" pass word "));
    assert_eq!(config.devtools_token.as_deref(), Some("tok\t"));
    assert_eq!(config.vnc_port, 5901);
}
