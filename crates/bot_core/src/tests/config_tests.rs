use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::default();
    assert_eq!(settings.blinko_base_url, "http://localhost:1111");
    assert_eq!(settings.flash_timeout(), Duration::from_secs(30));
    assert!(settings.enable_rich_display);
    assert_eq!(settings.flash_filters.min_content_length, 5);
    assert_eq!(settings.flash_filters.prefixes(), vec!["/t".to_string()]);
}

#[test]
fn partial_toml_keeps_defaults_for_missing_keys() {
    let settings = parse_settings(
        r#"
        blinko_base_url = "https://notes.example.com"
        blinko_token = "abc"
        flash_session_timeout = 0
        enable_rich_display = false

        [flash_filters]
        ignore_prefixes = " /T , !skip ,,"

        [responses]
        flash_add = ""
        "#,
    )
    .expect("parse");

    assert_eq!(settings.blinko_base_url, "https://notes.example.com");
    assert_eq!(settings.blinko_token, "abc");
    assert!(!settings.enable_rich_display);
    // Zero is clamped so the debounce timer always fires.
    assert_eq!(settings.flash_timeout(), Duration::from_secs(1));
    assert_eq!(settings.flash_filters.min_content_length, 5);
    assert_eq!(
        settings.flash_filters.prefixes(),
        vec!["/t".to_string(), "!skip".to_string()]
    );
    assert!(settings.responses.flash_add.is_empty());
    assert!(settings.responses.flash_start.contains("{timeout}"));
}

#[test]
fn malformed_toml_is_rejected() {
    assert!(parse_settings("flash_session_timeout = \"soon\"").is_err());
}

#[test]
fn prefixed_env_overrides_win_over_plain_names() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("BLINKO_TOKEN", "plain-token"),
        ("APP__BLINKO_TOKEN", "app-token"),
        ("BLINKO_BASE_URL", "http://blinko:1111"),
        ("FLASH_SESSION_TIMEOUT", "12"),
        ("APP__ENABLE_RICH_DISPLAY", "off"),
        ("APP__SERVER_BIND", "0.0.0.0:9000"),
        ("WEBHOOK_TOKEN", "hook-secret"),
        ("RENDER_CARD_RETENTION", "5"),
    ]);
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.blinko_token, "app-token");
    assert_eq!(settings.blinko_base_url, "http://blinko:1111");
    assert_eq!(settings.flash_session_timeout, 12);
    assert!(!settings.enable_rich_display);
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.webhook_token, "hook-secret");
    assert_eq!(settings.render_card_retention, 5);
}

#[test]
fn unparsable_env_values_are_ignored() {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, |key| match key {
        "FLASH_SESSION_TIMEOUT" => Some("later".into()),
        "ENABLE_RICH_DISPLAY" => Some("maybe".into()),
        _ => None,
    });
    assert_eq!(settings.flash_session_timeout, 30);
    assert!(settings.enable_rich_display);
}

#[test]
fn load_settings_reads_explicit_file_and_tolerates_missing_one() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("fjnote_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");

    let config_path = temp_root.join("fjnote.toml");
    fs::write(&config_path, "flash_session_timeout = 7\n").expect("write config");
    let settings = load_settings(Some(&config_path)).expect("load");
    assert_eq!(settings.flash_session_timeout, 7);

    let missing = temp_root.join("absent.toml");
    assert!(load_settings(Some(&missing)).is_ok());

    fs::write(&config_path, "[ui\n").expect("write broken config");
    let err = load_settings(Some(&config_path)).expect_err("must fail");
    assert!(err.to_string().contains("failed to parse config file"));

    fs::remove_dir_all(temp_root).expect("cleanup");
}
