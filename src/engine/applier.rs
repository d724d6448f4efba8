// ==========================================
// 库位分配系统 - 分配结果回写引擎
// ==========================================
// 职责: 将分配服务的结果回写到明细表
// 规则:
// 1) 按 row_key 匹配；按明细表倒序处理，拆分新行一律追加到表尾
// 2) 单库位: 写库位；合计数量与需求不同时回写数量
// 3) 拆分: 原行保留主键，写主库位与主库位数量；每个追加分配复制描述属性生成新行
// 红线: 人工设置 (manual_override) 或已有库位的行绝不改写
// ==========================================

use crate::domain::allocation::{AllocationResult, StockAllocation};
use crate::domain::line_item::{Table, QTY_EPSILON};
use crate::domain::types::StorageSide;
use crate::i18n::t_with_args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::instrument;

// ==========================================
// ApplySummary - 回写汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplySummary {
    /// 写入库位的原有行数（含拆分原行）
    pub rows_updated: usize,
    /// 发生拆分的原有行数
    pub rows_split: usize,
    /// 拆分追加的新行数
    pub rows_added: usize,
    /// 涉及的库位
    pub storages_touched: BTreeSet<String>,
    /// 人工设置而跳过的行
    pub skipped_manual: Vec<String>,
    /// 已有库位而跳过的行
    pub skipped_existing: Vec<String>,
    /// 无可用库存的行
    pub not_found: Vec<String>,
    /// 结果中不存在于明细表的 row_key
    pub unknown_keys: Vec<String>,
    /// 数量合计不一致的结果
    pub unbalanced: Vec<String>,
    /// 含无效追加分配（空库位或数量非正）的结果
    pub malformed: Vec<String>,
}

impl ApplySummary {
    pub fn has_changes(&self) -> bool {
        self.rows_updated > 0 || self.rows_added > 0
    }

    /// 记录无结果返回的请求行
    pub fn record_missing<'a>(&mut self, requested: impl Iterator<Item = &'a str>, answered: &BTreeSet<&str>) {
        for key in requested {
            if !answered.contains(key) && !self.not_found.iter().any(|k| k == key) {
                self.not_found.push(key.to_string());
            }
        }
    }

    /// 用户可读汇总
    pub fn message(&self) -> String {
        let mut message = t_with_args(
            "allocation.summary",
            &[
                ("updated", &self.rows_updated.to_string()),
                ("split", &self.rows_split.to_string()),
                ("storages", &self.storages_touched.len().to_string()),
            ],
        );
        if !self.not_found.is_empty() {
            message.push(' ');
            message.push_str(&t_with_args(
                "allocation.not_found",
                &[("count", &self.not_found.len().to_string())],
            ));
        }
        message
    }
}

// ==========================================
// AllocationApplier - 分配结果回写
// ==========================================
pub struct AllocationApplier {
    side: StorageSide,
}

impl AllocationApplier {
    pub fn new(side: StorageSide) -> Self {
        Self { side }
    }

    /// 回写分配结果，返回新明细表
    pub fn apply(&self, table: &Table, results: &[AllocationResult]) -> (Table, ApplySummary) {
        let mut updated = table.clone();
        let summary = self.apply_in_place(&mut updated, results);
        (updated, summary)
    }

    /// 原地回写分配结果
    #[instrument(skip(self, table, results), fields(rows = table.len(), results = results.len()))]
    pub fn apply_in_place(&self, table: &mut Table, results: &[AllocationResult]) -> ApplySummary {
        let mut summary = ApplySummary::default();

        // 1. 定位（按 row_key）
        let mut located: Vec<(usize, &AllocationResult)> = Vec::with_capacity(results.len());
        for result in results {
            match table.position(&result.row_key) {
                Some(pos) => located.push((pos, result)),
                None => {
                    tracing::debug!(row_key = %result.row_key, "分配结果引用了不存在的行，已跳过");
                    summary.unknown_keys.push(result.row_key.clone());
                }
            }
        }

        // 2. 倒序处理：追加的新行不影响尚未处理行的定位
        located.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, result) in located {
            self.apply_one(table, result, &mut summary);
        }

        if summary.has_changes() {
            table.mark_dirty();
        }

        tracing::info!(
            updated = summary.rows_updated,
            split = summary.rows_split,
            added = summary.rows_added,
            storages = summary.storages_touched.len(),
            not_found = summary.not_found.len(),
            "分配结果已回写"
        );
        summary
    }

    fn apply_one(&self, table: &mut Table, result: &AllocationResult, summary: &mut ApplySummary) {
        let side = self.side;
        let Some(row) = table.get_mut(&result.row_key) else {
            summary.unknown_keys.push(result.row_key.clone());
            return;
        };

        if row.manual_override {
            summary.skipped_manual.push(row.row_key.clone());
            return;
        }
        if row.has_storage(side) {
            summary.skipped_existing.push(row.row_key.clone());
            return;
        }
        let assigned = match result.assigned_storage.as_deref().map(str::trim) {
            Some(storage) if !storage.is_empty() && result.total_qty > 0.0 => storage.to_string(),
            _ => {
                summary.not_found.push(row.row_key.clone());
                return;
            }
        };
        if !result.is_balanced() {
            tracing::warn!(
                row_key = %result.row_key,
                total_qty = result.total_qty,
                qty_at_storage = result.qty_at_storage,
                "分配数量合计与 total_qty 不一致"
            );
            summary.unbalanced.push(result.row_key.clone());
        }

        summary.rows_updated += 1;
        summary.storages_touched.insert(assigned.clone());

        if !result.is_split() {
            row.set_storage(side, assigned);
            if (result.total_qty - row.stock_qty).abs() > QTY_EPSILON {
                row.set_stock_qty(result.total_qty);
            }
            return;
        }

        // 拆分: 原行写主库位
        row.set_storage(side, assigned);
        row.set_stock_qty(result.qty_at_storage);
        row.split_group = Some(row.split_origin().to_string());
        let template = row.clone();

        for extra in &result.additional_allocations {
            if extra.storage.trim().is_empty() || extra.qty <= QTY_EPSILON {
                tracing::warn!(
                    row_key = %result.row_key,
                    storage = %extra.storage,
                    qty = extra.qty,
                    "追加分配无效，已跳过"
                );
                if !summary.malformed.contains(&result.row_key) {
                    summary.malformed.push(result.row_key.clone());
                }
                continue;
            }
            let mut sibling = template.split_sibling(unique_row_key(table));
            sibling.set_storage(side, extra.storage.clone());
            sibling.set_stock_qty(extra.qty);
            summary.storages_touched.insert(extra.storage.clone());

            match table.push(sibling) {
                Ok(()) => summary.rows_added += 1,
                Err(e) => tracing::warn!(error = %e, "拆分行追加失败"),
            }
        }
        summary.rows_split += 1;
    }

    /// 回写单库位分配（附批次/序列号）
    ///
    /// 批次/序列号仅在行内为空时填入
    #[instrument(skip(self, table, allocations), fields(rows = table.len(), allocations = allocations.len()))]
    pub fn apply_stock_allocations(
        &self,
        table: &mut Table,
        allocations: &[StockAllocation],
    ) -> ApplySummary {
        let side = self.side;
        let mut summary = ApplySummary::default();

        for allocation in allocations.iter().rev() {
            let Some(row) = table.get_mut(&allocation.row_key) else {
                summary.unknown_keys.push(allocation.row_key.clone());
                continue;
            };
            if row.manual_override {
                summary.skipped_manual.push(row.row_key.clone());
                continue;
            }
            if row.has_storage(side) {
                summary.skipped_existing.push(row.row_key.clone());
                continue;
            }
            if allocation.storage.trim().is_empty() {
                summary.not_found.push(row.row_key.clone());
                continue;
            }

            row.set_storage(side, allocation.storage.clone());
            if row.warehouse_for(side).is_none() {
                match side {
                    StorageSide::Source => row.warehouse = Some(allocation.warehouse.clone()),
                    StorageSide::Target => row.target_warehouse = Some(allocation.warehouse.clone()),
                }
            }
            if allocation.has_batch_no && !row.has_batch_no() {
                row.batch_no = allocation.batch_no.clone();
            }
            if allocation.has_serial_no && !row.has_serial_no() && !allocation.serial_nos.is_empty() {
                row.serial_no = Some(allocation.serial_nos.join("\n"));
            }

            summary.rows_updated += 1;
            summary.storages_touched.insert(allocation.storage.clone());
        }

        if summary.has_changes() {
            table.mark_dirty();
        }
        summary
    }
}

/// 生成表内唯一的新行主键
fn unique_row_key(table: &Table) -> String {
    loop {
        let candidate = uuid::Uuid::new_v4().simple().to_string()[..10].to_string();
        if !table.contains(&candidate) {
            return candidate;
        }
    }
}
