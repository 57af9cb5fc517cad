use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for LaunchGraph
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LaunchGraphConfig {
    /// Call classification registries
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Bulk analysis scheduling
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How a callee's qualified name is matched against the registries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Namespace prefix plus registry-name substring anywhere in the name
    #[default]
    Substring,
    /// Namespace prefix plus exact last path segment
    Exact,
}

/// Registries used to classify calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierConfig {
    /// Namespace of the concurrency library
    #[serde(default = "default_concurrency_namespace")]
    pub concurrency_namespace: String,

    /// Namespace of the core library
    #[serde(default = "default_stdlib_namespace")]
    pub stdlib_namespace: String,

    /// Calls that start a new task
    #[serde(default = "default_launch_builtins")]
    pub launch_builtins: Vec<String>,

    /// Concurrency-library calls that run their lambda argument in place
    #[serde(default = "default_scope_entries")]
    pub scope_entries: Vec<String>,

    /// Core-library combinators that invoke their lambda exactly once
    #[serde(default = "default_pass_through_combinators")]
    pub pass_through_combinators: Vec<String>,

    #[serde(default)]
    pub match_mode: MatchMode,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            concurrency_namespace: default_concurrency_namespace(),
            stdlib_namespace: default_stdlib_namespace(),
            launch_builtins: default_launch_builtins(),
            scope_entries: default_scope_entries(),
            pass_through_combinators: default_pass_through_combinators(),
            match_mode: MatchMode::default(),
        }
    }
}

/// Bulk analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Number of worker threads
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Functions handed to a worker at a time
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker thread stack size in MiB; bounds how deep a call chain can be evaluated
    #[serde(default = "default_worker_stack_mb")]
    pub worker_stack_mb: usize,

    /// Library whose presence makes a module's functions candidates
    #[serde(default = "default_concurrency_library")]
    pub concurrency_library: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            batch_size: default_batch_size(),
            worker_stack_mb: default_worker_stack_mb(),
            concurrency_library: default_concurrency_library(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_concurrency_namespace() -> String {
    "kotlinx.coroutines".to_string()
}
fn default_stdlib_namespace() -> String {
    "kotlin".to_string()
}
fn default_launch_builtins() -> Vec<String> {
    ["launch", "async", "runBlocking", "start", "actor", "broadcast", "produce"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_scope_entries() -> Vec<String> {
    ["coroutineScope", "withContext"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_pass_through_combinators() -> Vec<String> {
    ["let", "also", "takeIf", "takeUnless", "apply", "run"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_num_threads() -> usize {
    num_cpus::get()
}
fn default_batch_size() -> usize {
    64
}
fn default_worker_stack_mb() -> usize {
    64
}
fn default_concurrency_library() -> String {
    "kotlinx-coroutines-core".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with defaults, file discovery and env overrides
pub struct ConfigManager {
    config: LaunchGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.launchgraph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading LaunchGraph configuration...");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load a specific config file, still honoring env overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();

        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    /// Wrap an already-built configuration, validating it.
    pub fn from_config(config: LaunchGraphConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn finish(config: LaunchGraphConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!("Configuration loaded successfully");
        if let Some(ref path) = config_path {
            info!("   Config file: {}", path.display());
        } else {
            info!("   Config file: NONE (using defaults)");
        }
        info!(
            "   Concurrency namespace: {} ({:?} matching)",
            config.classifier.concurrency_namespace, config.classifier.match_mode
        );
        info!(
            "   Workers: {}, batch size: {}",
            config.analysis.num_threads, config.analysis.batch_size
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.launchgraph.toml (current directory)
    /// 2. ~/.launchgraph/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(LaunchGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".launchgraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".launchgraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((LaunchGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<LaunchGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: LaunchGraphConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    fn apply_env_overrides(mut config: LaunchGraphConfig) -> LaunchGraphConfig {
        if let Ok(namespace) = std::env::var("LAUNCHGRAPH_CONCURRENCY_NAMESPACE") {
            config.classifier.concurrency_namespace = namespace;
        }
        if let Ok(namespace) = std::env::var("LAUNCHGRAPH_STDLIB_NAMESPACE") {
            config.classifier.stdlib_namespace = namespace;
        }
        if let Ok(mode) = std::env::var("LAUNCHGRAPH_MATCH_MODE") {
            match mode.to_lowercase().as_str() {
                "substring" => config.classifier.match_mode = MatchMode::Substring,
                "exact" => config.classifier.match_mode = MatchMode::Exact,
                other => warn!("Ignoring unknown LAUNCHGRAPH_MATCH_MODE: {}", other),
            }
        }
        if let Ok(library) = std::env::var("LAUNCHGRAPH_CONCURRENCY_LIBRARY") {
            config.analysis.concurrency_library = library;
        }
        if let Ok(threads) = std::env::var("LAUNCHGRAPH_NUM_THREADS") {
            if let Ok(threads) = threads.parse() {
                config.analysis.num_threads = threads;
            }
        }
        if let Ok(batch) = std::env::var("LAUNCHGRAPH_BATCH_SIZE") {
            if let Ok(batch) = batch.parse() {
                config.analysis.batch_size = batch;
            }
        }
        if let Ok(stack) = std::env::var("LAUNCHGRAPH_WORKER_STACK_MB") {
            if let Ok(stack) = stack.parse() {
                config.analysis.worker_stack_mb = stack;
            }
        }
        if let Ok(level) = std::env::var("LAUNCHGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("LAUNCHGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    fn validate_config(config: &LaunchGraphConfig) -> Result<(), ConfigError> {
        let classifier = &config.classifier;
        if classifier.concurrency_namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "classifier.concurrency_namespace must not be empty".to_string(),
            ));
        }
        if classifier.stdlib_namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "classifier.stdlib_namespace must not be empty".to_string(),
            ));
        }
        if classifier.launch_builtins.is_empty() {
            return Err(ConfigError::ValidationError(
                "classifier.launch_builtins must name at least one call".to_string(),
            ));
        }
        let registries = [
            &classifier.launch_builtins,
            &classifier.scope_entries,
            &classifier.pass_through_combinators,
        ];
        if registries
            .iter()
            .any(|names| names.iter().any(|n| n.trim().is_empty()))
        {
            return Err(ConfigError::ValidationError(
                "classifier registries must not contain empty names".to_string(),
            ));
        }

        if config.analysis.num_threads == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.num_threads must be greater than 0".to_string(),
            ));
        }
        if config.analysis.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.batch_size must be greater than 0".to_string(),
            ));
        }
        if config.analysis.worker_stack_mb == 0 {
            return Err(ConfigError::ValidationError(
                "analysis.worker_stack_mb must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}",
                config.logging.level
            )));
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&config.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log format: {}",
                config.logging.format
            )));
        }

        Ok(())
    }

    pub fn config(&self) -> &LaunchGraphConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> LaunchGraphConfig {
        self.config
    }

    /// Render a commented example config file
    pub fn create_example_config() -> String {
        let body = toml::to_string_pretty(&LaunchGraphConfig::default()).unwrap_or_default();
        format!(
            "# LaunchGraph configuration\n\
             # Place at ./.launchgraph.toml or ~/.launchgraph/config.toml\n\
             # Every value can be overridden with LAUNCHGRAPH_* environment variables\n\n{}",
            body
        )
    }
}
