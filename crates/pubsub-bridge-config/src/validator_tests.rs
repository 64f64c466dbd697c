use super::*;

fn valid_config() -> Config {
    let mut config = Config::default();
    config.redis.url = Some("redis://localhost:6379".to_string());
    config.redis.channel = Some("chat".to_string());
    config.server.bind = Some("127.0.0.1:8080".to_string());
    config
}

#[test]
fn test_validate_complete_config() {
    let result = ConfigValidator::validate(&valid_config()).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_default_config_is_missing_required_fields() {
    let result = ConfigValidator::validate(&Config::default());
    assert!(matches!(result, Err(ConfigError::MissingField(ref f)) if f == "redis.url"));
}

#[test]
fn test_each_required_field_is_reported() {
    let mut config = valid_config();
    config.redis.channel = None;
    let result = ConfigValidator::validate(&config);
    assert!(matches!(result, Err(ConfigError::MissingField(ref f)) if f == "redis.channel"));

    let mut config = valid_config();
    config.server.bind = Some("   ".to_string());
    let result = ConfigValidator::validate(&config);
    assert!(matches!(result, Err(ConfigError::MissingField(ref f)) if f == "server.bind"));
}

#[test]
fn test_go_style_bind_is_accepted() {
    let mut config = valid_config();
    config.server.bind = Some(":8080".to_string());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
}

#[test]
fn test_bind_without_port_is_rejected() {
    let mut config = valid_config();
    config.server.bind = Some("localhost".to_string());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "server.bind"));
}

#[test]
fn test_unsupported_bus_scheme() {
    let mut config = valid_config();
    config.redis.url = Some("http://localhost:6379".to_string());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "redis.url"));
}

#[test]
fn test_memory_and_tls_schemes_accepted() {
    for url in ["memory://", "rediss://:pw@cache.example.com:6380/2"] {
        let mut config = valid_config();
        config.redis.url = Some(url.to_string());
        let result = ConfigValidator::validate(&config).unwrap();
        assert!(result.is_valid(), "{url} rejected");
    }
}

#[test]
fn test_unparseable_bus_url() {
    let mut config = valid_config();
    config.redis.url = Some("not a url".to_string());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "redis.url"));
}

#[test]
fn test_unknown_overflow_policy() {
    let mut config = valid_config();
    config.publish.overflow = "drop-oldest".to_string();

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "publish.overflow"));
}

#[test]
fn test_zero_sizes_rejected() {
    let mut config = valid_config();
    config.publish.queue_capacity = 0;
    config.server.outbound_buffer = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    assert_eq!(result.errors.len(), 2);
}

#[test]
fn test_zero_timeouts_rejected() {
    let mut config = valid_config();
    config.server.write_timeout_secs = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "server.write_timeout_secs"));
}

#[test]
fn test_ping_slower_than_read_timeout_warns() {
    let mut config = valid_config();
    config.server.ping_interval_secs = 90;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "server.ping_interval_secs"));
}

#[test]
fn test_wildcard_and_empty_origins_warn() {
    let mut config = valid_config();
    config.server.allowed_origins = vec!["*".to_string()];
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);

    config.server.allowed_origins.clear();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings[0].message.contains("rejected"));
}

#[test]
fn test_reconnect_bounds() {
    let mut config = valid_config();
    config.reconnect.multiplier = 0.5;
    config.reconnect.jitter = 1.5;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "reconnect.multiplier"));
    assert!(result.errors.iter().any(|e| e.path == "reconnect.jitter"));
}

#[test]
fn test_reconnect_limit_warns() {
    let mut config = valid_config();
    config.reconnect.max_attempts = 5;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "reconnect.max_attempts"));
}

#[test]
fn test_into_error_reports_first_error() {
    let mut config = valid_config();
    config.publish.overflow = "maybe".to_string();

    let result = ConfigValidator::validate(&config).unwrap();
    let err = result.into_error().unwrap();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "publish.overflow"));
}

#[test]
fn test_into_error_none_when_valid() {
    let result = ConfigValidator::validate(&valid_config()).unwrap();
    assert!(result.into_error().is_none());
}
