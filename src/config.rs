//! 运维程序配置
//!
//! 配置文件使用 TOML 格式。`[store]` 直接映射到 `liberatid_store::StoreConfig`，
//! 其余部分控制定时清理与日志输出。

use liberatid_store::StoreConfig;
use serde::{Deserialize, Serialize};

/// liberatid 主配置结构体
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LiberatidConfig {
    /// 实例名称，仅用于日志
    #[serde(default = "default_name")]
    pub name: String,

    /// 运行环境标识
    ///
    /// 可选值："dev", "prod", "test"
    #[serde(default = "default_env")]
    pub env: String,

    /// association / nonce 存储配置
    #[serde(default)]
    pub store: StoreConfig,

    /// 定时清理配置
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// 可观测性配置
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// 定时清理配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CleanupConfig {
    /// 两次清理之间的间隔（秒），默认每小时一次
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// 启动时是否立即执行一次清理
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别
    ///
    /// 支持 EnvFilter 语法（如 "info,sqlx=warn"）。`RUST_LOG` 优先。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标
    ///
    /// - "console": 仅输出到控制台（默认）
    /// - "file": 输出到文件
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 当 output = "file" 时按天轮转
    #[serde(default)]
    pub rotate: bool,

    /// 日志目录
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for LiberatidConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            env: default_env(),
            store: StoreConfig::default(),
            cleanup: CleanupConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_on_start: default_run_on_start(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_name() -> String {
    "liberatid".to_string()
}

fn default_env() -> String {
    "dev".to_string()
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_run_on_start() -> bool {
    true
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

impl LiberatidConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(format!("Configuration file does not exist: {path_ref:?}").into());
        }

        if !path_ref.is_file() {
            return Err(format!("Path is not a valid file: {path_ref:?}").into());
        }

        let content = std::fs::read_to_string(path_ref)?;
        let config: LiberatidConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 验证配置有效性
    ///
    /// 以 "Warning:" 开头的条目不阻止启动
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        if !["dev", "prod", "test"].contains(&self.env.as_str()) {
            errors.push(format!(
                "Invalid environment '{}', must be one of: dev, prod, test",
                self.env
            ));
        }

        if self.cleanup.interval_secs == 0 {
            errors.push("cleanup.interval_secs must be greater than 0".to_string());
        }

        let main_level = self
            .observability
            .filter_level
            .split(',')
            .next()
            .unwrap_or("")
            .trim();
        if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
            errors.push(format!(
                "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                self.observability.filter_level
            ));
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if let Err(store_errors) = self.store.validate() {
            errors.extend(store_errors.into_iter().map(|e| format!("store: {e}")));
        }

        if self.env == "prod"
            && self.store.storage.backend == liberatid_store::StorageBackend::Memory
        {
            errors.push(
                "Warning: memory backend in prod loses all associations and nonces on restart"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liberatid_store::StorageBackend;

    #[test]
    fn test_default_config() {
        let config = LiberatidConfig::default();
        assert_eq!(config.env, "dev");
        assert_eq!(config.cleanup.interval_secs, 3600);
        assert_eq!(config.store.storage.backend, StorageBackend::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = LiberatidConfig::from_toml(
            r#"
            name = "blog-openid"
            env = "prod"

            [store]
            nonce_skew_secs = 600

            [store.storage]
            backend = "sqlite"

            [store.storage.sqlite]
            path = "/var/lib/liberatid/store.db"

            [cleanup]
            interval_secs = 900
            run_on_start = false

            [observability]
            filter_level = "debug,sqlx=warn"

            [observability.log]
            output = "file"
            rotate = true
            path = "/var/log/liberatid/"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "blog-openid");
        assert_eq!(config.store.nonce_skew_secs, 600);
        assert_eq!(
            config.store.storage.sqlite.as_ref().map(|s| s.path.as_str()),
            Some("/var/lib/liberatid/store.db")
        );
        assert_eq!(config.cleanup.interval_secs, 900);
        assert!(!config.cleanup.run_on_start);
        assert!(config.observability.log.rotate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_and_back() {
        let config = LiberatidConfig::default();
        let parsed = LiberatidConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.name, config.name);
        assert_eq!(parsed.store.nonces_option, config.store.nonces_option);
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = LiberatidConfig::default();
        config.env = "staging".to_string();
        config.cleanup.interval_secs = 0;
        config.observability.filter_level = "loud".to_string();
        config.store.nonce_skew_secs = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.starts_with("store: ")));
    }

    #[test]
    fn test_memory_backend_in_prod_is_only_a_warning() {
        let mut config = LiberatidConfig::default();
        config.env = "prod".to_string();
        config.store = StoreConfig::in_memory();

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().all(|e| e.starts_with("Warning:")));
    }
}
