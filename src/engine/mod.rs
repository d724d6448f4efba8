// ==========================================
// 库位分配系统 - 引擎层
// ==========================================
// 职责: 请求构建、库位分配、结果回写、默认库位、监听
// 红线: Engine 不拼 SQL；人工设置的库位不得被自动逻辑改写
// ==========================================

use std::error::Error;

pub mod allocator;
pub mod applier;
pub mod default_storage;
pub mod events;
pub mod pipeline;
pub mod request_builder;
pub mod watcher;

/// 引擎层结果（服务/设置错误均为装箱错误）
pub type EngineResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// 重导出核心引擎
pub use allocator::{distribute_across_storages, StorageAllocator};
pub use applier::{AllocationApplier, ApplySummary};
pub use default_storage::{
    apply_default_storages, default_storage_queries, DefaultStorageResolver, ManufacturingDefaults,
};
pub use events::{
    AllocationEvent, AllocationEventPublisher, AllocationEventType, NoOpEventPublisher,
    OptionalEventPublisher, RecordingEventPublisher,
};
pub use pipeline::{AllocationPipeline, AllocationService, PipelineOutcome, SkipReason};
pub use request_builder::AllocationRequestBuilder;
pub use watcher::{TableWatcher, WatchDecision, WatchSession, WatchState};
