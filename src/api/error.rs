// ==========================================
// 库位分配系统 - API层错误类型
// ==========================================
// 职责: 台账/配置错误转换为界面可直接展示的消息
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 库位维度负库存（过账被拒绝）
    #[error("库位负库存: {0}")]
    NegativeStock(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    /// 设置取值不合法
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    #[error("配置读取失败: {0}")]
    ConfigError(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            e @ RepositoryError::NegativeStock { .. } => ApiError::NegativeStock(
                e.to_string().trim_start_matches("库位负库存: ").to_string(),
            ),
            RepositoryError::DuplicateEntry(msg) => {
                ApiError::InvalidInput(format!("分录重复过账: {}", msg))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) | RepositoryError::DatabaseQueryError(msg) => {
                ApiError::DatabaseError(msg)
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
