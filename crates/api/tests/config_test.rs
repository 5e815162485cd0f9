use std::collections::HashMap;
use std::time::Duration;

use liveclass_api::config::ApiConfig;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tracing::Level;

fn load(vars: &[(&str, &str)]) -> eyre::Result<ApiConfig> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    ApiConfig::from_lookup(|name| vars.get(name).cloned())
}

const REQUIRED: [(&str, &str); 2] = [("DATABASE_URL", "postgres://localhost/liveclass"), ("JWT_SECRET", "s3cret")];

#[test]
fn test_defaults() {
    let config = load(&REQUIRED).unwrap();

    assert_eq!(config.server_addr(), "0.0.0.0:3000");
    assert_eq!(config.log_level, Level::INFO);
    assert_eq!(config.request_timeout, 30);
    assert_eq!(config.cron_secret, None);
    assert_eq!(config.cors_origins, None);
    assert!(!config.internal_ticker);
    assert_eq!(config.sweep_interval, Some(Duration::from_secs(300)));
    assert_eq!(config.engine.timezone, chrono_tz::Asia::Kolkata);
    assert_eq!(config.engine.early_join_minutes, 15);
    assert_eq!(config.engine.reminder_windows.len(), 3);
}

#[test]
fn test_overrides() {
    let mut vars = REQUIRED.to_vec();
    vars.extend([
        ("API_PORT", "8080"),
        ("LOG_LEVEL", "debug"),
        ("API_CORS_ORIGINS", "https://portal.example.org, https://admin.example.org"),
        ("CRON_SECRET", "tick"),
        ("PORTAL_TIMEZONE", "Asia/Dubai"),
        ("EARLY_JOIN_MINUTES", "10"),
        ("REMINDER_WINDOWS", "60:60,start:0:live"),
        ("INTERNAL_TICKER", "true"),
        ("AUTO_END_SWEEP_SECONDS", "0"),
        ("VIDEO_API_SECRET", "video-secret"),
    ]);

    let config = load(&vars).unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.log_level, Level::DEBUG);
    assert_eq!(
        config.cors_origins,
        Some(vec![
            "https://portal.example.org".to_string(),
            "https://admin.example.org".to_string()
        ])
    );
    assert_eq!(config.cron_secret.as_deref(), Some("tick"));
    assert_eq!(config.engine.timezone, chrono_tz::Asia::Dubai);
    assert_eq!(config.engine.early_join_minutes, 10);
    assert_eq!(config.engine.reminder_windows.len(), 2);
    assert!(config.engine.reminder_windows[1].requires_live);
    assert!(config.internal_ticker);
    assert_eq!(config.sweep_interval, None);
    assert_eq!(config.video.api_secret, "video-secret");
    assert_eq!(config.engine.identity_key, "video-secret");
}

#[rstest]
#[case::missing_database(&[("JWT_SECRET", "s3cret")])]
#[case::missing_jwt_secret(&[("DATABASE_URL", "postgres://localhost/liveclass")])]
fn test_required_variables(#[case] vars: &[(&str, &str)]) {
    assert!(load(vars).is_err());
}

#[rstest]
#[case::port("API_PORT", "http")]
#[case::timezone("PORTAL_TIMEZONE", "Mars/Olympus")]
#[case::windows("REMINDER_WINDOWS", "30:soon")]
#[case::ticker("INTERNAL_TICKER", "sometimes")]
#[case::band_too_narrow("REMINDER_BAND_SECONDS", "10")]
fn test_invalid_values(#[case] name: &str, #[case] value: &str) {
    let mut vars = REQUIRED.to_vec();
    vars.push((name, value));

    assert!(load(&vars).is_err());
}
