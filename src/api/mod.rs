// ==========================================
// 库位分配系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供界面/CLI 调用
// ==========================================

pub mod error;
pub mod storage_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use storage_api::StorageApi;
