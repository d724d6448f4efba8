// ==========================================
// 库位分配系统 - 核心库
// ==========================================
// 职责: 库存单据明细行的库位自动分配、拆分回写、默认库位
// 技术栈: Rust + SQLite
// 系统定位: 人工设置的库位始终优先（自动逻辑只填空值）
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 库存台账
pub mod repository;

// 引擎层 - 分配规则与流水线
pub mod engine;

// 配置层 - 生产设置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DocType, PickingStrategy, StockEntryPurpose, StorageSide, WatchMode};

// 领域实体
pub use domain::{
    AllocationRequest, AllocationResult, LineItem, SharedDocument, StockDocument,
    StockLedgerEntry, Table,
};

// 引擎
pub use engine::{
    AllocationApplier, AllocationPipeline, AllocationRequestBuilder, AllocationService,
    DefaultStorageResolver, StorageAllocator, TableWatcher, WatchSession,
};

// API
pub use api::{ApiError, ApiResult, StorageApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "库位分配系统";
