// ==========================================
// 库位分配系统 - 默认库位引擎
// ==========================================
// 职责:
// 1) 出库单/采购订单: 为空库位行填入默认库位（FIFO 有结存库位 → 最近使用库位）
// 2) 库存凭证: 按用途填入来源/目标库位（在制品/成品默认库位、拣货单复制、FIFO）
// 红线: 只填空值；人工设置的行不改；重复执行不产生新变化
// ==========================================

use crate::config::settings_reader::StorageSettingsReader;
use crate::domain::allocation::{DefaultStorage, DefaultStorageQuery};
use crate::domain::document::StockDocument;
use crate::domain::line_item::{LineItem, Table};
use crate::domain::types::{StockEntryPurpose, StorageSide};
use crate::engine::allocator::StorageAllocator;
use crate::engine::EngineResult;
use crate::repository::error::RepositoryResult;
use std::sync::Arc;
use tracing::instrument;

/// 回写默认库位
///
/// # 返回
/// 实际填入的行数
pub fn apply_default_storages(table: &mut Table, defaults: &[DefaultStorage], side: StorageSide) -> usize {
    let mut filled = 0;
    for default in defaults {
        let Some(storage) = default.default_storage.as_deref().filter(|s| !s.trim().is_empty()) else {
            continue;
        };
        let Some(row) = table.get_mut(&default.row_key) else {
            tracing::debug!(row_key = %default.row_key, "默认库位引用了不存在的行");
            continue;
        };
        if !row.accepts_automatic_storage(side) {
            continue;
        }
        row.set_storage(side, storage);
        filled += 1;
    }
    if filled > 0 {
        table.mark_dirty();
    }
    filled
}

/// 需要默认库位的行
pub fn default_storage_queries(table: &Table, side: StorageSide) -> Vec<DefaultStorageQuery> {
    table
        .rows()
        .iter()
        .filter(|row| row.has_item_code() && row.accepts_automatic_storage(side))
        .filter_map(|row| {
            row.warehouse_for(side).map(|warehouse| DefaultStorageQuery {
                row_key: row.row_key.clone(),
                item_code: row.item_code.trim().to_string(),
                warehouse: warehouse.to_string(),
            })
        })
        .collect()
}

/// 生产设置中的默认库位
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManufacturingDefaults {
    pub wip_storage: Option<String>,
    pub fg_storage: Option<String>,
}

// ==========================================
// DefaultStorageResolver - 默认库位解析
// ==========================================
pub struct DefaultStorageResolver {
    allocator: Arc<StorageAllocator>,
    settings: Arc<dyn StorageSettingsReader>,
}

impl DefaultStorageResolver {
    pub fn new(allocator: Arc<StorageAllocator>, settings: Arc<dyn StorageSettingsReader>) -> Self {
        Self { allocator, settings }
    }

    pub async fn load_defaults(&self) -> EngineResult<ManufacturingDefaults> {
        Ok(ManufacturingDefaults {
            wip_storage: self.settings.get_default_wip_storage().await?,
            fg_storage: self.settings.get_default_fg_storage().await?,
        })
    }

    /// 明细表默认库位（出库单/采购订单）
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub async fn resolve_table(&self, table: &mut Table, side: StorageSide) -> EngineResult<usize> {
        let excluded: Vec<String> = self.settings.get_default_wip_storage().await?.into_iter().collect();

        let queries = default_storage_queries(table, side);
        if queries.is_empty() {
            return Ok(0);
        }
        let defaults = self.allocator.default_storage_for_items(&queries, &excluded)?;
        let filled = apply_default_storages(table, &defaults, side);

        tracing::info!(queried = queries.len(), filled, "默认库位已填入");
        Ok(filled)
    }

    /// 库存凭证默认库位
    ///
    /// # 参数
    /// - pick_list: 来源拣货单（按 pick_list_item 匹配行）
    pub async fn resolve_stock_entry(
        &self,
        doc: &mut StockDocument,
        pick_list: Option<&StockDocument>,
    ) -> EngineResult<usize> {
        let defaults = self.load_defaults().await?;
        Ok(self.apply_stock_entry_defaults(doc, &defaults, pick_list)?)
    }

    /// 按用途填入库存凭证的来源/目标库位
    ///
    /// 规则:
    /// 1) 生产领料（来自拣货单）: 来源库位复制拣货单行；目标 = 在制品库位
    /// 2) 生产领料（来自工单）: 来源 = FIFO 首个有结存库位；目标 = 在制品库位
    /// 3) 生产消耗/完工入库: 成品行目标 = 成品库位；原料行来源 = 在制品库位
    /// 4) 其他用途: 不处理
    #[instrument(skip_all, fields(document = %doc.name, purpose = ?doc.purpose))]
    pub fn apply_stock_entry_defaults(
        &self,
        doc: &mut StockDocument,
        defaults: &ManufacturingDefaults,
        pick_list: Option<&StockDocument>,
    ) -> RepositoryResult<usize> {
        let wip = defaults.wip_storage.as_deref();
        let fg = defaults.fg_storage.as_deref();
        let mut filled = 0;

        match doc.purpose {
            Some(StockEntryPurpose::MaterialTransferForManufacture) => {
                let from_pick_list = doc.pick_list.is_some();
                let from_work_order = !from_pick_list && doc.work_order.is_some();
                if !from_pick_list && !from_work_order {
                    return Ok(0);
                }

                for row in doc.items.iter_mut() {
                    if from_pick_list {
                        let picked = pick_list
                            .zip(row.pick_list_item.as_deref())
                            .and_then(|(pl, key)| pl.items.get(key))
                            .and_then(|pl_row| pl_row.storage(StorageSide::Source))
                            .map(str::to_string);
                        filled += fill(row, StorageSide::Source, picked.as_deref()) as usize;
                    } else if row.accepts_automatic_storage(StorageSide::Source)
                        && row.has_item_code()
                    {
                        if let Some(warehouse) = row.warehouse_for(StorageSide::Source) {
                            let storage = self.allocator.fifo_storage_for_item(
                                &row.item_code,
                                warehouse,
                                row.required_stock_qty(),
                            )?;
                            filled += fill(row, StorageSide::Source, storage.as_deref()) as usize;
                        }
                    }
                    filled += fill(row, StorageSide::Target, wip) as usize;
                }
            }
            Some(StockEntryPurpose::MaterialConsumptionForManufacture)
            | Some(StockEntryPurpose::Manufacture) => {
                for row in doc.items.iter_mut() {
                    if row.is_finished_item {
                        filled += fill(row, StorageSide::Target, fg) as usize;
                    } else {
                        filled += fill(row, StorageSide::Source, wip) as usize;
                    }
                }
            }
            _ => return Ok(0),
        }

        if filled > 0 {
            doc.items.mark_dirty();
        }
        tracing::debug!(filled, "库存凭证默认库位已处理");
        Ok(filled)
    }
}

/// 空值、非人工、该方向有仓库时填入
fn fill(row: &mut LineItem, side: StorageSide, storage: Option<&str>) -> bool {
    let Some(storage) = storage.filter(|s| !s.trim().is_empty()) else {
        return false;
    };
    if !row.accepts_automatic_storage(side) || row.warehouse_for(side).is_none() {
        return false;
    }
    row.set_storage(side, storage);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str) -> LineItem {
        LineItem::new(key, "ITEM-A", 1.0).with_warehouse("Stores - SC")
    }

    #[test]
    fn test_apply_default_storages_never_overwrites() {
        let mut existing = row("r2");
        existing.source_storage = Some("KEEP".to_string());
        let mut manual = row("r3");
        manual.manual_override = true;
        let mut table = Table::from_rows(vec![row("r1"), existing, manual]).unwrap();

        let defaults: Vec<DefaultStorage> = ["r1", "r2", "r3", "ghost"]
            .iter()
            .map(|k| DefaultStorage {
                row_key: k.to_string(),
                default_storage: Some("DEF".to_string()),
            })
            .collect();

        assert_eq!(apply_default_storages(&mut table, &defaults, StorageSide::Source), 1);
        assert_eq!(table.get("r1").unwrap().source_storage.as_deref(), Some("DEF"));
        assert_eq!(table.get("r2").unwrap().source_storage.as_deref(), Some("KEEP"));
        assert_eq!(table.get("r3").unwrap().source_storage, None);

        // 再次执行无变化
        assert!(table.take_dirty());
        assert_eq!(apply_default_storages(&mut table, &defaults, StorageSide::Source), 0);
        assert!(!table.is_dirty());
    }

    #[test]
    fn test_queries_skip_filled_rows() {
        let mut filled = row("r2");
        filled.source_storage = Some("A".to_string());
        let table = Table::from_rows(vec![row("r1"), filled, LineItem::new("r3", "ITEM-C", 1.0)]).unwrap();

        let queries = default_storage_queries(&table, StorageSide::Source);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].row_key, "r1");
    }

    #[test]
    fn test_fill_requires_warehouse_on_side() {
        let mut r = row("r1");
        assert!(!fill(&mut r, StorageSide::Target, Some("WIP")));
        r.target_warehouse = Some("WIP - SC".to_string());
        assert!(fill(&mut r, StorageSide::Target, Some("WIP")));
        assert!(!fill(&mut r, StorageSide::Target, Some("OTHER")));
        assert_eq!(r.target_storage.as_deref(), Some("WIP"));
    }
}
