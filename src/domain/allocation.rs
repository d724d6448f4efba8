// ==========================================
// 库位分配系统 - 分配请求/响应领域模型
// ==========================================
// 职责: 客户端与分配服务之间的契约
// 约定: 全部按 row_key 匹配，row_index 仅用于显示
// ==========================================

use crate::domain::line_item::QTY_EPSILON;
use serde::{Deserialize, Serialize};

// ==========================================
// 分配请求
// ==========================================

/// 单行分配请求（数量为库存单位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequestItem {
    pub row_key: String,
    pub item_code: String,
    pub warehouse: String,
    pub qty: f64,
}

/// 分配请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub items: Vec<AllocationRequestItem>,
    #[serde(default)]
    pub company: Option<String>,
    /// 不参与分配的库位（如默认在制品库位）
    #[serde(default)]
    pub excluded_storages: Vec<String>,
}

impl AllocationRequest {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn row_keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.row_key.as_str())
    }
}

// ==========================================
// 拆分分配结果
// ==========================================

/// 单个库位上的分配量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageQty {
    pub storage: String,
    pub qty: f64,
}

/// 单行分配结果
///
/// 不变量: qty_at_storage + Σ additional_allocations.qty == total_qty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub row_key: String,
    pub item_code: String,
    pub total_qty: f64,
    /// None 表示无可用库存
    pub assigned_storage: Option<String>,
    pub qty_at_storage: f64,
    #[serde(default)]
    pub additional_allocations: Vec<StorageQty>,
}

impl AllocationResult {
    /// 由有序分配列表构建（首个为主库位，其余为拆分）
    pub fn from_allocations(
        row_key: impl Into<String>,
        item_code: impl Into<String>,
        allocations: Vec<StorageQty>,
    ) -> Self {
        let total_qty = allocations.iter().map(|a| a.qty).sum();
        let mut iter = allocations.into_iter();
        let (assigned_storage, qty_at_storage) = match iter.next() {
            Some(first) => (Some(first.storage), first.qty),
            None => (None, 0.0),
        };
        Self {
            row_key: row_key.into(),
            item_code: item_code.into(),
            total_qty,
            assigned_storage,
            qty_at_storage,
            additional_allocations: iter.collect(),
        }
    }

    /// 无可用库存的结果
    pub fn not_found(row_key: impl Into<String>, item_code: impl Into<String>) -> Self {
        Self::from_allocations(row_key, item_code, Vec::new())
    }

    pub fn is_found(&self) -> bool {
        self.assigned_storage
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn is_split(&self) -> bool {
        !self.additional_allocations.is_empty()
    }

    /// 分配量合计与 total_qty 是否一致
    pub fn is_balanced(&self) -> bool {
        let sum: f64 = self.qty_at_storage
            + self
                .additional_allocations
                .iter()
                .map(|a| a.qty)
                .sum::<f64>();
        (sum - self.total_qty).abs() <= QTY_EPSILON
    }

    /// 涉及的全部库位（含主库位）
    pub fn storages(&self) -> impl Iterator<Item = &str> {
        self.assigned_storage
            .as_deref()
            .into_iter()
            .chain(self.additional_allocations.iter().map(|a| a.storage.as_str()))
    }
}

// ==========================================
// 单库位分配结果（出库单/库存凭证）
// ==========================================

/// 单行单库位分配（附带批次、序列号）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAllocation {
    pub row_index: usize,
    pub row_key: String,
    pub warehouse: String,
    pub storage: String,
    pub has_batch_no: bool,
    #[serde(default)]
    pub batch_no: Option<String>,
    pub has_serial_no: bool,
    #[serde(default)]
    pub serial_nos: Vec<String>,
}

// ==========================================
// 默认库位
// ==========================================

/// 默认库位查询请求行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultStorageQuery {
    pub row_key: String,
    pub item_code: String,
    pub warehouse: String,
}

/// 默认库位查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultStorage {
    pub row_key: String,
    pub default_storage: Option<String>,
}
