// ==========================================
// 库位分配系统 - 库位设置读取 Trait
// ==========================================
// 职责: 定义引擎所需的设置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{PickingStrategy, WatchMode};
use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

/// 设置读取结果
pub type SettingsResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// 默认轮询间隔（毫秒）
pub const DEFAULT_WATCH_POLL_INTERVAL_MS: u64 = 500;

/// 默认稳定等待（毫秒）
pub const DEFAULT_WATCH_SETTLE_DELAY_MS: u64 = 1_000;

// ==========================================
// WatchConfig - 明细表监听参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub mode: WatchMode,
    /// 轮询间隔（仅 POLLING 模式）
    pub poll_interval: Duration,
    /// 行数增长后等待行生成写完的时间（仅 POLLING 模式）
    pub settle_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Completion,
            poll_interval: Duration::from_millis(DEFAULT_WATCH_POLL_INTERVAL_MS),
            settle_delay: Duration::from_millis(DEFAULT_WATCH_SETTLE_DELAY_MS),
        }
    }
}

// ==========================================
// StorageSettingsReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait StorageSettingsReader: Send + Sync {
    /// 默认在制品库位（生产设置 default_wip_storage）
    ///
    /// # 返回
    /// - None: 未配置
    async fn get_default_wip_storage(&self) -> SettingsResult<Option<String>>;

    /// 默认成品库位（生产设置 default_fg_storage）
    async fn get_default_fg_storage(&self) -> SettingsResult<Option<String>>;

    /// 拣货策略
    ///
    /// # 默认值
    /// - FIFO
    async fn get_picking_strategy(&self) -> SettingsResult<PickingStrategy>;

    /// 明细表监听参数
    async fn get_watch_config(&self) -> SettingsResult<WatchConfig>;
}
