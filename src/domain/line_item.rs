// ==========================================
// 库位分配系统 - 单据明细行领域模型
// ==========================================
// 职责: 明细行 (LineItem) 与明细表 (Table)
// 红线: 人工设置过库位的行 (manual_override) 不允许被自动逻辑改写
// ==========================================

use crate::domain::types::StorageSide;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// 数量比较容差
pub const QTY_EPSILON: f64 = 1e-6;

// ==========================================
// LineItem - 单据明细行
// ==========================================
// 数量约定:
// - qty: 单据单位数量（显示数量）
// - stock_qty: 库存单位数量 = qty * conversion_factor
// - 分配服务一律使用库存单位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    // ===== 行标识 =====
    pub row_key: String, // 行主键（表内唯一）
    #[serde(default)]
    pub idx: u32, // 行号（1 起）

    // ===== 物料描述 =====
    #[serde(default)]
    pub item_code: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,

    // ===== 数量与单位 =====
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub stock_qty: f64,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(default)]
    pub stock_uom: Option<String>,
    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,

    // ===== 仓库与库位 =====
    #[serde(default)]
    pub warehouse: Option<String>, // 来源仓库
    #[serde(default)]
    pub target_warehouse: Option<String>, // 目标仓库
    #[serde(default)]
    pub source_storage: Option<String>,
    #[serde(default)]
    pub target_storage: Option<String>,

    // ===== 自动化控制 =====
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default)]
    pub split_group: Option<String>, // 拆分来源行的 row_key
    #[serde(default)]
    pub is_finished_item: bool,

    // ===== 来源单据引用 =====
    #[serde(default)]
    pub sales_order: Option<String>,
    #[serde(default)]
    pub sales_order_item: Option<String>,
    #[serde(default)]
    pub work_order: Option<String>,
    #[serde(default)]
    pub material_request: Option<String>,
    #[serde(default)]
    pub material_request_item: Option<String>,
    #[serde(default)]
    pub pick_list_item: Option<String>,

    // ===== 批次/序列号 =====
    #[serde(default)]
    pub batch_no: Option<String>,
    #[serde(default)]
    pub serial_no: Option<String>,
}

fn default_conversion_factor() -> f64 {
    1.0
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

impl LineItem {
    /// 创建最小明细行（换算系数 1）
    pub fn new(row_key: impl Into<String>, item_code: impl Into<String>, qty: f64) -> Self {
        Self {
            row_key: row_key.into(),
            idx: 0,
            item_code: item_code.into(),
            item_name: None,
            description: None,
            qty,
            stock_qty: qty,
            uom: None,
            stock_uom: None,
            conversion_factor: 1.0,
            warehouse: None,
            target_warehouse: None,
            source_storage: None,
            target_storage: None,
            manual_override: false,
            split_group: None,
            is_finished_item: false,
            sales_order: None,
            sales_order_item: None,
            work_order: None,
            material_request: None,
            material_request_item: None,
            pick_list_item: None,
            batch_no: None,
            serial_no: None,
        }
    }

    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    pub fn with_uom(mut self, uom: impl Into<String>, conversion_factor: f64) -> Self {
        self.uom = Some(uom.into());
        self.conversion_factor = conversion_factor;
        self.stock_qty = self.qty * self.effective_conversion_factor();
        self
    }

    /// 换算系数（非正数按 1 处理）
    pub fn effective_conversion_factor(&self) -> f64 {
        if self.conversion_factor > 0.0 && self.conversion_factor.is_finite() {
            self.conversion_factor
        } else {
            1.0
        }
    }

    /// 需求数量（库存单位）
    ///
    /// stock_qty 缺失时按 qty * conversion_factor 推算
    pub fn required_stock_qty(&self) -> f64 {
        if self.stock_qty > 0.0 {
            self.stock_qty
        } else {
            self.qty * self.effective_conversion_factor()
        }
    }

    /// 按库存单位数量回写数量字段
    pub fn set_stock_qty(&mut self, stock_qty: f64) {
        self.stock_qty = stock_qty;
        self.qty = stock_qty / self.effective_conversion_factor();
    }

    pub fn has_item_code(&self) -> bool {
        !self.item_code.trim().is_empty()
    }

    pub fn storage(&self, side: StorageSide) -> Option<&str> {
        let value = match side {
            StorageSide::Source => &self.source_storage,
            StorageSide::Target => &self.target_storage,
        };
        value.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn has_storage(&self, side: StorageSide) -> bool {
        self.storage(side).is_some()
    }

    pub fn set_storage(&mut self, side: StorageSide, storage: impl Into<String>) {
        let storage = Some(storage.into());
        match side {
            StorageSide::Source => self.source_storage = storage,
            StorageSide::Target => self.target_storage = storage,
        }
    }

    /// 该方向的仓库
    pub fn warehouse_for(&self, side: StorageSide) -> Option<&str> {
        let value = match side {
            StorageSide::Source => &self.warehouse,
            StorageSide::Target => &self.target_warehouse,
        };
        value.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// 自动逻辑是否可以写入该方向库位
    pub fn accepts_automatic_storage(&self, side: StorageSide) -> bool {
        !self.manual_override && !self.has_storage(side)
    }

    /// 人工设置库位（此后该行库位冻结）
    pub fn set_storage_manually(&mut self, side: StorageSide, storage: impl Into<String>) {
        self.set_storage(side, storage);
        self.manual_override = true;
    }

    /// 复制描述属性生成拆分行
    ///
    /// 保留物料、单位、换算系数、来源引用、批次/序列号提示；
    /// 清空库位、人工标记，数量由调用方设置
    pub fn split_sibling(&self, row_key: impl Into<String>) -> Self {
        let mut sibling = self.clone();
        sibling.row_key = row_key.into();
        sibling.idx = 0;
        sibling.source_storage = None;
        sibling.target_storage = None;
        sibling.manual_override = false;
        sibling.split_group = Some(self.split_origin().to_string());
        sibling
    }

    /// 拆分组标识（未拆分时为自身 row_key）
    pub fn split_origin(&self) -> &str {
        self.split_group.as_deref().unwrap_or(&self.row_key)
    }

    pub fn has_batch_no(&self) -> bool {
        !is_blank(&self.batch_no)
    }

    pub fn has_serial_no(&self) -> bool {
        !is_blank(&self.serial_no)
    }
}

// ==========================================
// Table - 明细表
// ==========================================
// 不变量: row_key 表内唯一；插入顺序即行号顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct Table {
    rows: Vec<LineItem>,
    dirty: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("行主键重复: {0}")]
    DuplicateRowKey(String),

    #[error("行主键为空")]
    EmptyRowKey,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从行列表构建（校验主键唯一并重排行号）
    pub fn from_rows(rows: Vec<LineItem>) -> Result<Self, TableError> {
        let mut table = Self::new();
        for row in rows {
            table.push(row)?;
        }
        table.dirty = false;
        Ok(table)
    }

    /// 追加行到表尾
    pub fn push(&mut self, mut row: LineItem) -> Result<(), TableError> {
        if row.row_key.trim().is_empty() {
            return Err(TableError::EmptyRowKey);
        }
        if self.contains(&row.row_key) {
            return Err(TableError::DuplicateRowKey(row.row_key));
        }
        row.idx = self.rows.len() as u32 + 1;
        self.rows.push(row);
        self.dirty = true;
        Ok(())
    }

    pub fn rows(&self) -> &[LineItem] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row_key: &str) -> bool {
        self.rows.iter().any(|r| r.row_key == row_key)
    }

    pub fn position(&self, row_key: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.row_key == row_key)
    }

    pub fn get(&self, row_key: &str) -> Option<&LineItem> {
        self.rows.iter().find(|r| r.row_key == row_key)
    }

    pub fn get_mut(&mut self, row_key: &str) -> Option<&mut LineItem> {
        self.rows.iter_mut().find(|r| r.row_key == row_key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LineItem> {
        self.rows.iter_mut()
    }

    /// 标记需要重新渲染
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 渲染完成后清除标记
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// 拆分组内库存数量合计
    pub fn split_group_stock_qty(&self, origin_key: &str) -> f64 {
        self.rows
            .iter()
            .filter(|r| r.split_origin() == origin_key)
            .map(|r| r.stock_qty)
            .sum()
    }

    pub fn row_keys(&self) -> HashSet<&str> {
        self.rows.iter().map(|r| r.row_key.as_str()).collect()
    }
}

impl TryFrom<Vec<LineItem>> for Table {
    type Error = TableError;

    fn try_from(rows: Vec<LineItem>) -> Result<Self, Self::Error> {
        Table::from_rows(rows)
    }
}

impl From<Table> for Vec<LineItem> {
    fn from(table: Table) -> Self {
        table.rows
    }
}
