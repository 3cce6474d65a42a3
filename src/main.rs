//! LiberatID 运维程序
//!
//! 加载配置，按计划清理过期的 association 与 nonce，并提供一次性的
//! 清理、清空与统计命令

mod cli;
mod error;
mod observability;

use clap::Parser;
use liberatid::{CleanupScheduler, LiberatidConfig};
use liberatid_store::OpenIdStore;
use observability::init_observability;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Test { config_file } => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        Commands::Run => {
            ApplicationLauncher::execute(&cli.config, ApplicationLauncher::run_application)
        }
        Commands::Cleanup => {
            ApplicationLauncher::execute(&cli.config, ApplicationLauncher::cleanup_once)
        }
        Commands::Reset => ApplicationLauncher::execute(&cli.config, ApplicationLauncher::reset),
        Commands::Stats => ApplicationLauncher::execute(&cli.config, ApplicationLauncher::stats),
    }
}

impl ApplicationLauncher {
    /// 加载配置、初始化日志后在 Tokio runtime 中执行 `task`
    fn execute<F, Fut>(config_arg: &Path, task: F) -> Result<()>
    where
        F: FnOnce(LiberatidConfig) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let config_path = Self::find_config_file(config_arg)?;
        let config = Self::load_config(&config_path)?;

        // 初始化可观测性系统
        let _observability_guard = init_observability(&config.observability)?;

        // Create Tokio runtime（before running the application）
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        runtime.block_on(task(config))
    }

    /// Find config file with fallback locations
    fn find_config_file(provided_path: &Path) -> Result<PathBuf> {
        // If the provided path is not the default "config.toml", check if it exists
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.to_path_buf());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        // Otherwise, try fallback locations
        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/liberatid/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: liberatid --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载并验证配置，只有警告时继续
    fn load_config(config_path: &Path) -> Result<LiberatidConfig> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);

        let config = match LiberatidConfig::from_file(config_path) {
            Ok(config) => config,
            Err(e) => {
                bootstrap_error!("❌ 配置加载失败: {}", e);
                return Err(Error::custom(format!("配置加载失败: {e}")));
            }
        };

        if let Err(errors) = config.validate() {
            bootstrap_error!("❌ 配置验证发现问题:");
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                return Err(Error::service_validation(
                    "配置验证失败，请修复上述错误".to_string(),
                ));
            }
        }

        bootstrap_info!("✅ 配置加载成功");
        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        // Initialize basic logging for test command
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        match LiberatidConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);

                match config.validate() {
                    Ok(()) => {
                        info!("✅ 配置验证通过");
                    }
                    Err(errors) => {
                        error!("❌ 配置验证发现问题:");
                        for (i, err) in errors.iter().enumerate() {
                            if err.starts_with("Warning:") {
                                info!("  {}. ⚠️  {}", i + 1, err);
                            } else {
                                error!("  {}. ❌ {}", i + 1, err);
                            }
                        }
                        let has_errors = errors.iter().any(|e| !e.starts_with("Warning:"));
                        if has_errors {
                            return Err(Error::service_validation("配置验证失败".to_string()));
                        }
                    }
                }

                info!(
                    "✅ 存储后端: {:?}, nonce skew: {}s, 清理间隔: {}s",
                    config.store.storage.backend,
                    config.store.nonce_skew_secs,
                    config.cleanup.interval_secs
                );
                Ok(())
            }
            Err(e) => {
                error!("❌ 配置文件解析失败: {}", e);
                Err(Error::service_validation(format!("配置解析失败: {e}")))
            }
        }
    }

    async fn open_store(config: &LiberatidConfig) -> Result<OpenIdStore> {
        OpenIdStore::new(&config.store)
            .await
            .map_err(|e| Error::service_startup(format!("存储初始化失败: {e}")))
    }

    /// 运行定时清理，直到收到 Ctrl-C
    async fn run_application(config: LiberatidConfig) -> Result<()> {
        info!("🚀 启动 liberatid: name={}, env={}", config.name, config.env);

        let store = Self::open_store(&config).await?;

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(10);

        let scheduler = CleanupScheduler::new(
            store,
            Duration::from_secs(config.cleanup.interval_secs),
            config.cleanup.run_on_start,
        );
        let handle = scheduler.start(&shutdown_tx);

        setup_ctrl_c_handler(shutdown_tx.clone()).await;

        let sweeps = handle.await?;
        info!("🛑 liberatid 已安全关闭，共执行 {} 次清理", sweeps);
        Ok(())
    }

    /// 执行一次清理
    async fn cleanup_once(config: LiberatidConfig) -> Result<()> {
        let store = Self::open_store(&config).await?;
        let report = store.cleanup().await?;
        println!(
            "Removed {} expired nonces and {} expired associations",
            report.nonces_removed, report.associations_removed
        );
        Ok(())
    }

    /// 清空所有 association 与 nonce
    async fn reset(config: LiberatidConfig) -> Result<()> {
        let store = Self::open_store(&config).await?;
        store.reset().await?;
        println!("All associations and nonces have been cleared");
        Ok(())
    }

    /// 输出存储统计（JSON）
    async fn stats(config: LiberatidConfig) -> Result<()> {
        let store = Self::open_store(&config).await?;
        let stats = store.stats().await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}

/// 设置Ctrl-C信号处理程序
async fn setup_ctrl_c_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听Ctrl-C信号: {}", e);
            return;
        }
        info!("收到Ctrl-C信号，开始优雅关闭...");
        let _ = shutdown_tx.send(());
    });
}
