// ==========================================
// 库位分配系统 - 配置层
// ==========================================
// 职责: 系统配置管理（生产设置默认库位、拣货策略、监听参数）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod settings_reader;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use settings_reader::{SettingsResult, StorageSettingsReader, WatchConfig};
