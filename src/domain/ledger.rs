// ==========================================
// 库位分配系统 - 库存台账领域模型
// ==========================================
// 职责: 库存台账分录 (按库位维度) 与库位结存
// ==========================================

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// StockLedgerEntry - 库存台账分录
// ==========================================
// actual_qty: 入库为正，出库为负
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub name: String,
    pub item_code: String,
    pub warehouse: String,
    pub storage: Option<String>,
    pub batch_no: Option<String>,
    pub serial_no: Option<String>,
    pub actual_qty: f64,
    pub posting_date: NaiveDate,
    pub posting_time: NaiveTime,
    pub creation: NaiveDateTime,
    pub expiry_date: Option<NaiveDate>,

    // ===== 来源凭证 =====
    pub voucher_type: String,
    pub voucher_no: String,
    pub voucher_detail_no: Option<String>,
    pub voucher_row_idx: Option<u32>,

    pub is_cancelled: bool,
}

impl StockLedgerEntry {
    /// 创建分录（名称随机生成，creation 取当前时间）
    pub fn new(
        item_code: impl Into<String>,
        warehouse: impl Into<String>,
        storage: Option<String>,
        actual_qty: f64,
        posting_date: NaiveDate,
        posting_time: NaiveTime,
    ) -> Self {
        Self {
            name: uuid::Uuid::new_v4().simple().to_string(),
            item_code: item_code.into(),
            warehouse: warehouse.into(),
            storage,
            batch_no: None,
            serial_no: None,
            actual_qty,
            posting_date,
            posting_time,
            creation: Utc::now().naive_utc(),
            expiry_date: None,
            voucher_type: String::new(),
            voucher_no: String::new(),
            voucher_detail_no: None,
            voucher_row_idx: None,
            is_cancelled: false,
        }
    }

    pub fn with_batch(mut self, batch_no: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch_no = Some(batch_no.into());
        self.expiry_date = expiry_date;
        self
    }

    pub fn with_serial(mut self, serial_no: impl Into<String>) -> Self {
        self.serial_no = Some(serial_no.into());
        self
    }

    pub fn with_voucher(
        mut self,
        voucher_type: impl Into<String>,
        voucher_no: impl Into<String>,
        detail_no: Option<String>,
        row_idx: Option<u32>,
    ) -> Self {
        self.voucher_type = voucher_type.into();
        self.voucher_no = voucher_no.into();
        self.voucher_detail_no = detail_no;
        self.voucher_row_idx = row_idx;
        self
    }

    pub fn with_creation(mut self, creation: NaiveDateTime) -> Self {
        self.creation = creation;
        self
    }

    /// 是否带库位维度
    pub fn has_storage(&self) -> bool {
        self.storage
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

// ==========================================
// StorageBalance - 库位结存
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageBalance {
    pub storage: String,
    pub available_qty: f64,
    pub first_posting: NaiveDateTime,
    pub last_posting: NaiveDateTime,
    pub earliest_expiry: Option<NaiveDate>,
}

/// 候选库位（含本次拟拣数量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageCandidate {
    pub storage: String,
    pub available_qty: f64,
    pub qty_to_pick: f64,
}
