use std::fs;

use manifold_base::{Config, ConfigSection};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestConfig {
    name: String,
    port: u16,
    enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct DatabaseConfig {
    host: String,
    port: u16,
    ssl: bool,
}

impl ConfigSection for DatabaseConfig {
    fn key() -> &'static str {
        "database"
    }
}

#[tokio::test]
async fn test_config_new() {
    let config = Config::new();
    assert!(config.is_empty());
}

#[tokio::test]
async fn test_config_set_and_get() {
    let mut config = Config::new();
    let test_config = TestConfig {
        name: "test_app".to_string(),
        port: 8080,
        enabled: true,
    };
    config.set("app", &test_config).unwrap();
    let retrieved: TestConfig = config.get("app").unwrap();
    assert_eq!(retrieved, test_config);
    assert_eq!(config.len(), 1);
}

#[tokio::test]
async fn test_config_get_nonexistent() {
    let config = Config::new();
    let result: Option<String> = config.get("nonexistent").unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_config_with() {
    let test_config = TestConfig {
        name: "test_app".to_string(),
        port: 8080,
        enabled: true,
    };
    let config = Config::new().with("app", &test_config);
    let retrieved: TestConfig = config.get("app").unwrap();
    assert_eq!(retrieved, test_config);
}

#[tokio::test]
async fn test_config_section() {
    let config = Config::new().with(
        "database",
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            ssl: false,
        },
    );
    let section: DatabaseConfig = config.section().unwrap();
    assert_eq!(section.host, "localhost");
    assert_eq!(section.port, 5432);
}

#[tokio::test]
async fn test_config_parse_from_string() {
    let json_str = r#"
    {
        "app": {
            "name": "test_app",
            "port": 8080,
            "enabled": true
        }
    }
    "#;
    let config = Config::parse(json_str).unwrap();
    let app_config: TestConfig = config.get("app").unwrap();
    assert_eq!(app_config.name, "test_app");
    assert_eq!(app_config.port, 8080);
    assert!(app_config.enabled);
}

#[tokio::test]
async fn test_config_parse_file() {
    let file = NamedTempFile::new().unwrap();
    fs::write(
        file.path(),
        r#"{"database": {"host": "db.local", "port": 5432, "ssl": true}}"#,
    )
    .unwrap();
    let config = Config::parse_file(file.path()).await.unwrap();
    let database: DatabaseConfig = config.section().unwrap();
    assert_eq!(database.host, "db.local");
    assert!(database.ssl);
}

#[tokio::test]
async fn test_config_merge() {
    let mut config = Config::parse(r#"{"app": {"name": "base", "port": 80, "enabled": false}}"#)
        .unwrap();
    let overlay = Config::parse(r#"{"app": {"port": 8080, "enabled": true}}"#).unwrap();
    config.merge_from(overlay).unwrap();
    let app: TestConfig = config.get("app").unwrap();
    assert_eq!(app.name, "base");
    assert_eq!(app.port, 8080);
    assert!(app.enabled);
}
