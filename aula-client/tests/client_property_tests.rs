use std::time::Duration;

use aula_client::config::{AuthConfig, CacheSettings, LogConfig, RetryConfig};
use aula_client::{AulaConfig, ConfigError, Tab};
use aula_core::Role;
use proptest::prelude::*;
use uuid::Uuid;

fn base_config() -> AulaConfig {
    AulaConfig {
        api_base_url: "http://localhost:8000".to_string(),
        request_timeout_ms: 10_000,
        auth: AuthConfig {
            access_token: Some("test-token".to_string()),
            user_id: Uuid::now_v7(),
            role: Role::Student,
        },
        persistence_path: "tmp/aula-preferences.json".into(),
        cache: CacheSettings {
            default_stale_time_ms: 60_000,
            default_gc_time_ms: 300_000,
            gc_interval_ms: 30_000,
        },
        retry: RetryConfig {
            read_retries: 1,
            initial_ms: 500,
            max_ms: 4_000,
            multiplier: 2.0,
            jitter_ms: 100,
        },
        log: LogConfig {
            filter: "info,aula_cache=debug".to_string(),
            json: false,
        },
    }
}

fn invalid_field(config: &AulaConfig) -> Option<&'static str> {
    match config.validate() {
        Err(ConfigError::InvalidValue { field, .. }) => Some(field),
        _ => None,
    }
}

const SAMPLE_TOML: &str = r#"
api_base_url = "https://aula.example.edu"
request_timeout_ms = 15000
persistence_path = "/var/tmp/aula.json"

[auth]
access_token = "abc"
user_id = "0190a5c2-7b1e-7cc1-9a41-2f6d3b8e1a10"
role = "admin"

[cache]
default_stale_time_ms = 0
default_gc_time_ms = 300000
gc_interval_ms = 60000

[retry]
read_retries = 1
initial_ms = 1000
max_ms = 30000
multiplier = 2.0
jitter_ms = 250

[log]
filter = "info"
json = true
"#;

#[test]
fn config_base_is_valid() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn config_requires_http_base_url() {
    let mut config = base_config();
    config.api_base_url = "ftp://aula".to_string();
    assert_eq!(invalid_field(&config), Some("api_base_url"));

    config.api_base_url = "  ".to_string();
    assert_eq!(invalid_field(&config), Some("api_base_url"));
}

#[test]
fn config_rejects_blank_token_but_allows_none() {
    let mut config = base_config();
    config.auth.access_token = Some(" ".to_string());
    assert_eq!(invalid_field(&config), Some("auth.access_token"));

    config.auth.access_token = None;
    assert!(config.validate().is_ok());
}

#[test]
fn config_rejects_nil_user() {
    let mut config = base_config();
    config.auth.user_id = Uuid::nil();
    assert_eq!(invalid_field(&config), Some("auth.user_id"));
}

#[test]
fn config_gc_time_must_cover_stale_time() {
    let mut config = base_config();
    config.cache.default_gc_time_ms = 1_000;
    assert_eq!(invalid_field(&config), Some("cache.default_gc_time_ms"));
}

#[test]
fn config_rejects_inverted_backoff() {
    let mut config = base_config();
    config.retry.max_ms = 100;
    assert_eq!(invalid_field(&config), Some("retry.max_ms"));
}

#[test]
fn config_parses_toml() {
    let config = AulaConfig::from_toml(SAMPLE_TOML).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.auth.role, Role::Admin);
    assert!(config.log.json);
    assert_eq!(config.request_timeout(), Duration::from_secs(15));

    let cache = config.cache_config();
    assert_eq!(cache.default_stale_time, Duration::ZERO);
    assert_eq!(cache.default_gc_time, Duration::from_secs(300));
    assert_eq!(cache.read_retry.max_retries, 1);
}

#[test]
fn config_rejects_unknown_fields() {
    let contents = SAMPLE_TOML.replace("json = true", "json = true\ncolor = \"red\"");
    assert!(matches!(
        AulaConfig::from_toml(&contents),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn config_rejects_missing_section() {
    let contents = SAMPLE_TOML.replace("[log]\nfilter = \"info\"\njson = true\n", "");
    assert!(AulaConfig::from_toml(&contents).is_err());
}

#[test]
fn config_reads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aula.toml");
    std::fs::write(&path, SAMPLE_TOML).unwrap();
    let config = AulaConfig::from_path(&path).unwrap();
    assert_eq!(config.api_base_url, "https://aula.example.edu");

    let missing = AulaConfig::from_path(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(ConfigError::Io(_))));
}

proptest! {
    #[test]
    fn config_multiplier_below_one_is_rejected(multiplier in 0.0f64..1.0f64) {
        let mut config = base_config();
        config.retry.multiplier = multiplier;
        prop_assert_eq!(invalid_field(&config), Some("retry.multiplier"));
    }

    #[test]
    fn config_read_retries_bounded(retries in 0u32..20u32) {
        let mut config = base_config();
        config.retry.read_retries = retries;
        prop_assert_eq!(config.validate().is_ok(), retries <= 5);
    }

    #[test]
    fn config_retry_delays_stay_within_bounds(attempt in 0u32..10u32) {
        let policy = base_config().read_retry_policy();
        let delay = policy.delay_for(attempt);
        prop_assert!(delay >= Duration::from_millis(500));
        prop_assert!(delay < Duration::from_millis(4_100));
    }

    #[test]
    fn tab_next_then_previous_is_identity(index in 0usize..7usize) {
        let tab = Tab::from_index(index).unwrap();
        prop_assert_eq!(tab.next().previous(), tab);
        prop_assert_eq!(tab.index(), index);
    }
}

#[test]
fn tab_defaults_are_visible_to_their_role() {
    for role in [Role::Student, Role::Admin] {
        let default = Tab::default_for(role);
        assert!(default.is_visible_to(role));
        assert!(Tab::for_role(role).contains(&default));
    }
}
