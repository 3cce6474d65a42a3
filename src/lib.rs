//! # liberatid
//!
//! OpenID association 与 nonce 存储的运维程序：配置加载与定时清理

pub mod config;
pub mod scheduler;

// Re-export commonly used types
pub use config::LiberatidConfig;
pub use scheduler::CleanupScheduler;
