// ==========================================
// 库位分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::settings_reader::{
    SettingsResult, StorageSettingsReader, WatchConfig, DEFAULT_WATCH_POLL_INTERVAL_MS,
    DEFAULT_WATCH_SETTLE_DELAY_MS,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::{PickingStrategy, WatchMode};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> SettingsResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> SettingsResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> SettingsResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> SettingsResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> SettingsResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;

        tracing::debug!(key, value, "配置已更新");
        Ok(())
    }

    /// 列出 global scope 的全部配置
    pub fn list_global_configs(&self) -> SettingsResult<HashMap<String, String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 非空字符串配置（空白视为未配置）
    fn get_non_empty(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    fn get_millis_or_default(&self, key: &str, default: u64) -> SettingsResult<Duration> {
        let millis = match self.get_config_value(key)? {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                tracing::warn!(key, raw = %raw, "配置值不是有效毫秒数，使用默认值");
                default
            }),
            None => default,
        };
        Ok(Duration::from_millis(millis))
    }
}

#[async_trait]
impl StorageSettingsReader for ConfigManager {
    async fn get_default_wip_storage(&self) -> SettingsResult<Option<String>> {
        self.get_non_empty(config_keys::DEFAULT_WIP_STORAGE)
    }

    async fn get_default_fg_storage(&self) -> SettingsResult<Option<String>> {
        self.get_non_empty(config_keys::DEFAULT_FG_STORAGE)
    }

    async fn get_picking_strategy(&self) -> SettingsResult<PickingStrategy> {
        match self.get_non_empty(config_keys::PICKING_STRATEGY)? {
            Some(raw) => Ok(raw.parse::<PickingStrategy>()?),
            None => Ok(PickingStrategy::default()),
        }
    }

    async fn get_watch_config(&self) -> SettingsResult<WatchConfig> {
        let mode = match self.get_non_empty(config_keys::WATCH_MODE)? {
            Some(raw) => raw.parse::<WatchMode>()?,
            None => WatchMode::default(),
        };

        Ok(WatchConfig {
            mode,
            poll_interval: self.get_millis_or_default(
                config_keys::WATCH_POLL_INTERVAL_MS,
                DEFAULT_WATCH_POLL_INTERVAL_MS,
            )?,
            settle_delay: self.get_millis_or_default(
                config_keys::WATCH_SETTLE_DELAY_MS,
                DEFAULT_WATCH_SETTLE_DELAY_MS,
            )?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 生产设置
    pub const DEFAULT_WIP_STORAGE: &str = "default_wip_storage";
    pub const DEFAULT_FG_STORAGE: &str = "default_fg_storage";

    // 分配
    pub const PICKING_STRATEGY: &str = "picking_strategy";

    // 明细表监听
    pub const WATCH_MODE: &str = "watch_mode";
    pub const WATCH_POLL_INTERVAL_MS: &str = "watch_poll_interval_ms";
    pub const WATCH_SETTLE_DELAY_MS: &str = "watch_settle_delay_ms";
}
