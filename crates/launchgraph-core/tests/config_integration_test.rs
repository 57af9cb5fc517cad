use launchgraph_core::{ConfigError, ConfigManager, LaunchGraphConfig, MatchMode};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_configuration() {
    let manager = ConfigManager::from_config(LaunchGraphConfig::default()).unwrap();
    assert!(manager.config_path().is_none());
    assert_eq!(
        manager.config().classifier.concurrency_namespace,
        "kotlinx.coroutines"
    );
    assert_eq!(
        manager.config().analysis.concurrency_library,
        "kotlinx-coroutines-core"
    );
}

#[test]
fn test_config_file_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("launchgraph.toml");

    let mut config = LaunchGraphConfig::default();
    config.classifier.match_mode = MatchMode::Exact;
    config.classifier.scope_entries.push("supervisorScope".to_string());
    config.analysis.num_threads = 2;
    fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

    let loaded = ConfigManager::from_file(&config_path).unwrap();
    assert_eq!(loaded.config_path(), Some(config_path.as_path()));
    assert_eq!(loaded.config().classifier.match_mode, MatchMode::Exact);
    assert!(loaded
        .config()
        .classifier
        .scope_entries
        .contains(&"supervisorScope".to_string()));
    assert_eq!(loaded.config().analysis.num_threads, 2);
}

#[test]
fn test_missing_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert!(matches!(
        ConfigManager::from_file(&missing),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[analysis\nbatch_size = ").unwrap();

    assert!(matches!(
        ConfigManager::from_file(&config_path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_validation_rules() {
    let mut config = LaunchGraphConfig::default();
    config.classifier.launch_builtins.clear();
    assert!(ConfigManager::from_config(config).is_err());

    let mut config = LaunchGraphConfig::default();
    config.classifier.pass_through_combinators.push("  ".to_string());
    assert!(ConfigManager::from_config(config).is_err());

    let mut config = LaunchGraphConfig::default();
    config.analysis.num_threads = 0;
    assert!(ConfigManager::from_config(config).is_err());

    let mut config = LaunchGraphConfig::default();
    config.logging.level = "loud".to_string();
    assert!(ConfigManager::from_config(config).is_err());
}

#[test]
fn test_environment_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("launchgraph.toml");
    fs::write(&config_path, "[logging]\nformat = \"pretty\"\n").unwrap();

    std::env::set_var("LAUNCHGRAPH_LOG_FORMAT", "compact");
    let loaded = ConfigManager::from_file(&config_path);
    std::env::remove_var("LAUNCHGRAPH_LOG_FORMAT");

    assert_eq!(loaded.unwrap().config().logging.format, "compact");
}
