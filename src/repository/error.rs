// ==========================================
// 库位分配系统 - 台账仓储错误
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== SQLite =====
    #[error("台账数据库锁获取失败: {0}")]
    LockError(String),

    #[error("台账事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("台账查询失败: {0}")]
    DatabaseQueryError(String),

    /// 同一凭证行重复过账
    #[error("分录重复: {0}")]
    DuplicateEntry(String),

    // ===== 库存规则 =====
    /// 库位维度负库存（整组过账被拒绝）
    #[error(
        "库位负库存: 需要 {shortfall} 个 {item_code}，仓库 {warehouse}{row_info}，库位: {storage}，凭证 {voucher_type} {voucher_no}"
    )]
    NegativeStock {
        item_code: String,
        warehouse: String,
        storage: String,
        shortfall: f64,
        voucher_type: String,
        voucher_no: String,
        row_info: String,
    },
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE") => {
                RepositoryError::DuplicateEntry(msg)
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) => RepositoryError::DatabaseQueryError(msg),
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
