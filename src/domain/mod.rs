// ==========================================
// 库位分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、分配契约
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod allocation;
pub mod document;
pub mod ledger;
pub mod line_item;
pub mod types;

// 重导出核心类型
pub use allocation::{
    AllocationRequest, AllocationRequestItem, AllocationResult, DefaultStorage,
    DefaultStorageQuery, StockAllocation, StorageQty,
};
pub use document::{SharedDocument, StockDocument};
pub use ledger::{StockLedgerEntry, StorageBalance, StorageCandidate};
pub use line_item::{LineItem, Table, TableError, QTY_EPSILON};
pub use types::{DocType, PickingStrategy, StockEntryPurpose, StorageSide, WatchMode};
