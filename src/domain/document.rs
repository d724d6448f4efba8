// ==========================================
// 库位分配系统 - 库存单据领域模型
// ==========================================
// 职责: 承载明细表的单据头（拣货单/库存凭证/出库单/采购订单）
// ==========================================

use crate::domain::line_item::Table;
use crate::domain::types::{DocType, StockEntryPurpose, StorageSide};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// 编辑会话中共享的单据
///
/// 约束: 锁不得跨 await 持有
pub type SharedDocument = Arc<Mutex<StockDocument>>;

// ==========================================
// StockDocument - 库存单据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDocument {
    pub name: String,
    pub doc_type: DocType,
    #[serde(default)]
    pub company: Option<String>,

    // ===== 库存凭证专用 =====
    #[serde(default)]
    pub purpose: Option<StockEntryPurpose>,
    #[serde(default)]
    pub pick_list: Option<String>,
    #[serde(default)]
    pub work_order: Option<String>,

    // ===== 拣货控制 =====
    // 人工拣货模式下不触发自动分配
    #[serde(default)]
    pub manual_picking: bool,

    #[serde(default)]
    pub items: Table,
}

impl StockDocument {
    pub fn new(name: impl Into<String>, doc_type: DocType) -> Self {
        Self {
            name: name.into(),
            doc_type,
            company: None,
            purpose: None,
            pick_list: None,
            work_order: None,
            manual_picking: false,
            items: Table::new(),
        }
    }

    pub fn with_items(mut self, items: Table) -> Self {
        self.items = items;
        self
    }

    /// 自动分配写入的库位方向
    pub fn storage_side(&self) -> StorageSide {
        self.doc_type.storage_side()
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }
}
