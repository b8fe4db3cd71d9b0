//! Tests for configuration parsing.

use std::time::Duration;

use figment::Figment;
use figment::providers::Serialized;
use resource_controller_sdk::SortOrder;
use serde_json::json;

use crate::api::{ControllerMethod, QueryParams};
use crate::config::ControllerConfig;

#[test]
fn test_config_default() {
    let config = ControllerConfig::default();
    assert_eq!(config.query.limit, 20);
    assert_eq!(config.query.max_limit, 1000);
    assert_eq!(config.query.page, 1);
    assert_eq!(config.query.sort, SortOrder::Asc);
    assert!(!config.jwt.enabled);
    assert_eq!(config.jwt.table, "users");
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.ttl, Duration::from_secs(3600));
    assert_eq!(config.cache.timeout, Duration::from_millis(200));
    assert_eq!(config.cache.methods, vec!["index", "view"]);
    assert_eq!(config.cache.max_entries, 10_000);
    assert_eq!(config.cache.stale_grace, Duration::from_secs(60));
    assert_eq!(config.store_timeout, Duration::from_secs(5));
}

#[test]
fn test_config_parse_full_yaml() {
    let yaml = r#"
query:
  limit: 7
  sort: desc
jwt:
  enabled: true
  table: "members"
  secret: "s3cr3t"
  token_actions: ["create"]
cache:
  enabled: true
  xfetch: true
  ttl: "5m"
  beta: 1.5
  claim_timeout: "2s"
  max_entries: 500
  stale_grace: "30s"
state_machine: true
spell_check: true
bit_mask: true
store_timeout: "750ms"
"#;
    let config: ControllerConfig = serde_saphyr::from_str(yaml).unwrap();
    assert_eq!(config.query.limit, 7);
    assert_eq!(config.query.max_limit, 1000);
    assert_eq!(config.query.sort, SortOrder::Desc);
    assert!(config.jwt.enabled);
    assert_eq!(config.jwt.table, "members");
    assert_eq!(config.jwt.secret.expose(), "s3cr3t");
    assert!(config.cache.xfetch);
    assert_eq!(config.cache.ttl, Duration::from_secs(300));
    assert_eq!(config.cache.claim_timeout, Duration::from_secs(2));
    assert_eq!(config.cache.max_entries, 500);
    assert_eq!(config.cache.stale_grace, Duration::from_secs(30));
    assert!((config.cache.beta - 1.5).abs() < f64::EPSILON);
    assert!(config.state_machine && config.spell_check && config.bit_mask);
    assert_eq!(config.store_timeout, Duration::from_millis(750));
}

#[test]
fn test_config_reject_unknown_fields() {
    let yaml = r#"
cache:
  enabled: true
  flavour: "lru"
"#;
    let result: Result<ControllerConfig, _> = serde_saphyr::from_str(yaml);
    assert!(
        result.is_err(),
        "Config should reject unknown fields due to deny_unknown_fields"
    );
}

#[test]
fn test_secret_is_redacted_in_debug() {
    let yaml = r#"
jwt:
  secret: "hunter2"
"#;
    let config: ControllerConfig = serde_saphyr::from_str(yaml).unwrap();
    let dbg = format!("{config:?}");
    assert!(!dbg.contains("hunter2"));
    assert!(dbg.contains("[REDACTED]"));
}

#[test]
fn test_from_figment_validates() {
    let figment = Figment::new().merge(Serialized::defaults(json!({
        "query": { "limit": 50, "max_limit": 10 }
    })));
    let err = ControllerConfig::from_figment(&figment).unwrap_err();
    assert!(err.to_string().contains("exceeds query.max_limit"));

    let figment = Figment::new().merge(Serialized::defaults(json!({
        "cache": { "enabled": true, "ttl": "90s" }
    })));
    let config = ControllerConfig::from_figment(&figment).unwrap();
    assert_eq!(config.cache.ttl, Duration::from_secs(90));
}

#[test]
fn test_from_figment_rejects_sub_second_ttl() {
    let figment = Figment::new().merge(Serialized::defaults(json!({
        "cache": { "enabled": true, "ttl": "500ms" }
    })));
    let err = ControllerConfig::from_figment(&figment).unwrap_err();
    assert!(err.to_string().contains("cache.ttl"));

    let figment = Figment::new().merge(Serialized::defaults(json!({
        "cache": { "ttl": "1s" }
    })));
    let config = ControllerConfig::from_figment(&figment).unwrap();
    assert_eq!(
        config
            .options_for(ControllerMethod::Index, &QueryParams::default())
            .cache_ttl(),
        1
    );
}

#[test]
fn test_from_figment_rejects_empty_cache_capacity() {
    let figment = Figment::new().merge(Serialized::defaults(json!({
        "cache": { "max_entries": 0 }
    })));
    let err = ControllerConfig::from_figment(&figment).unwrap_err();
    assert!(err.to_string().contains("cache.max_entries"));
}

#[test]
fn test_options_for_builds_request_scoped_options() {
    let yaml = r#"
jwt:
  enabled: true
  table: "users"
  token_actions: ["create"]
cache:
  enabled: true
  xfetch: true
  ttl: "10m"
"#;
    let config: ControllerConfig = serde_saphyr::from_str(yaml).unwrap();
    let query = QueryParams::from_pairs([("access_token", "abc")]);

    let index = config.options_for(ControllerMethod::Index, &query);
    assert_eq!(index.called_method(), "index");
    assert_eq!(index.query_access_token(), Some("abc"));
    assert!(index.jwt_is_enabled());
    assert!(!index.is_jwt_action());
    assert!(index.is_cached());
    assert!(index.is_xfetch());
    assert_eq!(index.cache_ttl(), 600);

    let create = config.options_for(ControllerMethod::Create, &QueryParams::default());
    assert!(create.is_jwt_action());
    assert!(!create.is_cached());
    assert_eq!(create.query_access_token(), None);
}
