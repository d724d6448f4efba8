// ==========================================
// 库位分配系统 - 分配请求构建器
// ==========================================
// 职责: 从明细表挑出需要自动分配的行，组装分配请求
// 红线: 无副作用；人工设置/已有库位的行不得进入请求
// ==========================================

use crate::domain::allocation::{AllocationRequest, AllocationRequestItem};
use crate::domain::line_item::{LineItem, Table};
use crate::domain::types::StorageSide;

/// 请求构建器
pub struct AllocationRequestBuilder {
    side: StorageSide,
    company: Option<String>,
    excluded_storages: Vec<String>,
}

impl AllocationRequestBuilder {
    pub fn new(side: StorageSide) -> Self {
        Self {
            side,
            company: None,
            excluded_storages: Vec::new(),
        }
    }

    pub fn company(mut self, company: Option<String>) -> Self {
        self.company = company;
        self
    }

    /// 追加排除库位（空白值忽略）
    pub fn exclude_storage(mut self, storage: Option<String>) -> Self {
        if let Some(storage) = storage.filter(|s| !s.trim().is_empty()) {
            if !self.excluded_storages.contains(&storage) {
                self.excluded_storages.push(storage);
            }
        }
        self
    }

    /// 该行是否需要分配
    ///
    /// 排除: 无物料编码、数量为零、无仓库、人工设置、已有库位
    pub fn needs_allocation(&self, row: &LineItem) -> bool {
        row.has_item_code()
            && row.required_stock_qty() > 0.0
            && row.warehouse_for(self.side).is_some()
            && row.accepts_automatic_storage(self.side)
    }

    /// 构建分配请求（保持明细表顺序）
    pub fn build(&self, table: &Table) -> AllocationRequest {
        let items = table
            .rows()
            .iter()
            .filter(|row| self.needs_allocation(row))
            .map(|row| AllocationRequestItem {
                row_key: row.row_key.clone(),
                item_code: row.item_code.trim().to_string(),
                warehouse: row.warehouse_for(self.side).unwrap_or_default().to_string(),
                qty: row.required_stock_qty(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            total_rows = table.len(),
            requested = items.len(),
            "分配请求已构建"
        );

        AllocationRequest {
            items,
            company: self.company.clone(),
            excluded_storages: self.excluded_storages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, item: &str, qty: f64) -> LineItem {
        LineItem::new(key, item, qty).with_warehouse("Stores - SC")
    }

    #[test]
    fn test_build_skips_manual_existing_and_incomplete_rows() {
        let mut manual = row("r2", "ITEM-B", 2.0);
        manual.manual_override = true;
        let mut existing = row("r3", "ITEM-C", 2.0);
        existing.source_storage = Some("BIN-9".to_string());
        let mut no_warehouse = row("r6", "ITEM-F", 1.0);
        no_warehouse.warehouse = None;

        let table = Table::from_rows(vec![
            row("r1", "ITEM-A", 5.0),
            manual,
            existing,
            row("r4", "", 1.0),
            row("r5", "ITEM-E", 0.0),
            no_warehouse,
            row("r7", "ITEM-G", 3.0),
        ])
        .unwrap();

        let request = AllocationRequestBuilder::new(StorageSide::Source).build(&table);
        let keys: Vec<_> = request.row_keys().collect();
        assert_eq!(keys, vec!["r1", "r7"]);
    }

    #[test]
    fn test_build_uses_stock_qty() {
        let table = Table::from_rows(vec![row("r1", "ITEM-A", 2.0).with_uom("Box", 6.0)]).unwrap();
        let request = AllocationRequestBuilder::new(StorageSide::Source).build(&table);
        assert_eq!(request.items[0].qty, 12.0);
    }

    #[test]
    fn test_target_side_uses_target_warehouse() {
        let mut r = LineItem::new("r1", "ITEM-A", 1.0);
        r.target_warehouse = Some("Finished Goods - SC".to_string());
        let table = Table::from_rows(vec![r]).unwrap();

        let request = AllocationRequestBuilder::new(StorageSide::Target).build(&table);
        assert_eq!(request.items[0].warehouse, "Finished Goods - SC");
        assert!(AllocationRequestBuilder::new(StorageSide::Source).build(&table).is_empty());
    }

    #[test]
    fn test_exclusions_deduplicated() {
        let builder = AllocationRequestBuilder::new(StorageSide::Source)
            .company(Some("SC".to_string()))
            .exclude_storage(Some("WIP".to_string()))
            .exclude_storage(Some("WIP".to_string()))
            .exclude_storage(Some(" ".to_string()))
            .exclude_storage(None);

        let request = builder.build(&Table::new());
        assert_eq!(request.excluded_storages, vec!["WIP".to_string()]);
        assert_eq!(request.company.as_deref(), Some("SC"));
    }
}
