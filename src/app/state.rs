// ==========================================
// 库位分配系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::StorageApi;
use crate::config::config_manager::ConfigManager;
use crate::config::settings_reader::StorageSettingsReader;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{
    AllocationEventPublisher, AllocationPipeline, DefaultStorageResolver, OptionalEventPublisher,
    StorageAllocator,
};
use crate::repository::stock_ledger_repo::StockLedgerRepository;

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 库位分配API（同时作为进程内分配服务）
    pub storage_api: Arc<StorageApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 库位分配引擎
    pub allocator: Arc<StorageAllocator>,

    /// 库存台账仓储
    pub ledger_repo: Arc<StockLedgerRepository>,

    /// 事件发布器（用于向界面报告分配结果）
    pub event_publisher: Option<Arc<dyn AllocationEventPublisher>>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let ledger_repo = Arc::new(StockLedgerRepository::new(conn.clone()));

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let allocator = Arc::new(StorageAllocator::new(ledger_repo.clone()));

        // ==========================================
        // 初始化API层
        // ==========================================
        let storage_api = Arc::new(StorageApi::new(
            ledger_repo.clone(),
            allocator.clone(),
            config_manager.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            storage_api,
            config_manager,
            allocator,
            ledger_repo,
            event_publisher: None,
        })
    }

    /// 设置事件发布器
    pub fn with_event_publisher(mut self, publisher: Arc<dyn AllocationEventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// 创建分配流水线（进程内分配服务 + 当前配置）
    pub fn pipeline(&self) -> AllocationPipeline {
        let publisher = match &self.event_publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p.clone()),
            None => OptionalEventPublisher::none(),
        };
        AllocationPipeline::new(self.storage_api.clone(), self.settings()).with_publisher(publisher)
    }

    /// 创建默认库位解析器
    pub fn default_storage_resolver(&self) -> DefaultStorageResolver {
        DefaultStorageResolver::new(self.allocator.clone(), self.settings())
    }

    pub fn settings(&self) -> Arc<dyn StorageSettingsReader> {
        self.config_manager.clone()
    }
}

// ==========================================
// 默认数据库路径
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 STORAGE_ALLOCATION_DB_PATH（非空时）
/// - 否则: 用户数据目录/storage-allocation/storage_allocation.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("STORAGE_ALLOCATION_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./storage_allocation.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("storage-allocation");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("storage_allocation.db");
        }
    }

    path.to_string_lossy().to_string()
}
