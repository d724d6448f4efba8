// ==========================================
// 库位分配系统 - 库位分配引擎
// ==========================================
// 职责: 按拣货策略在库位间分配需求数量，必要时拆分到多个库位
// 输入: 分配请求 + 库存台账结存
// 输出: 按 row_key 标识的分配结果（保持请求顺序）
// 红线: 同一物料同一仓库的多行共享库位容量，不得重复分配
// ==========================================

use crate::domain::allocation::{
    AllocationRequest, AllocationResult, DefaultStorage, DefaultStorageQuery, StockAllocation,
    StorageQty,
};
use crate::domain::ledger::StorageCandidate;
use crate::domain::line_item::QTY_EPSILON;
use crate::domain::types::PickingStrategy;
use crate::repository::error::RepositoryResult;
use crate::repository::stock_ledger_repo::StockLedgerRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// StorageAllocator - 库位分配引擎
// ==========================================
pub struct StorageAllocator {
    ledger_repo: Arc<StockLedgerRepository>,
}

impl StorageAllocator {
    pub fn new(ledger_repo: Arc<StockLedgerRepository>) -> Self {
        Self { ledger_repo }
    }

    /// 查询候选库位并贪心拟拣
    ///
    /// 按策略顺序逐个库位取 min(可用量, 剩余需求)，需求满足即停止
    ///
    /// # 返回
    /// - 空列表: 物料/仓库缺失、需求非正或无结存
    pub fn available_storage_locations(
        &self,
        item_code: &str,
        warehouse: &str,
        required_qty: f64,
        strategy: PickingStrategy,
        excluded_storages: &[String],
    ) -> RepositoryResult<Vec<StorageCandidate>> {
        if item_code.trim().is_empty() || warehouse.trim().is_empty() || required_qty <= 0.0 {
            return Ok(Vec::new());
        }

        let balances =
            self.ledger_repo
                .storage_balances(item_code, warehouse, strategy, excluded_storages)?;

        let mut result = Vec::new();
        let mut remaining = required_qty;
        for balance in balances {
            if remaining <= QTY_EPSILON {
                break;
            }
            if balance.available_qty <= 0.0 {
                continue;
            }
            let qty_to_pick = balance.available_qty.min(remaining);
            remaining -= qty_to_pick;
            result.push(StorageCandidate {
                storage: balance.storage,
                available_qty: balance.available_qty,
                qty_to_pick,
            });
        }

        Ok(result)
    }

    /// 拣货单整表分配
    ///
    /// 规则:
    /// 1) 按 (物料, 仓库) 分组，按组合计需求一次性取候选库位
    /// 2) 组内按明细表顺序消耗库位容量；当前库位不足时转下一库位（拆分）
    /// 3) 无结存的行返回 assigned_storage = None
    /// 4) 结果按请求顺序返回
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub fn allocate_storage_for_pick_list(
        &self,
        request: &AllocationRequest,
        strategy: PickingStrategy,
    ) -> RepositoryResult<Vec<AllocationResult>> {
        // 分组（保持首次出现顺序）
        let mut group_index: HashMap<(&str, &str), usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (idx, item) in request.items.iter().enumerate() {
            if item.item_code.trim().is_empty() || item.warehouse.trim().is_empty() || item.qty <= 0.0 {
                continue;
            }
            let key = (item.item_code.as_str(), item.warehouse.as_str());
            let g = *group_index.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(idx);
        }

        let mut results: Vec<(usize, AllocationResult)> = Vec::with_capacity(request.items.len());
        for members in groups {
            let first = &request.items[members[0]];
            let group_qty: f64 = members.iter().map(|&i| request.items[i].qty).sum();

            let candidates = self.available_storage_locations(
                &first.item_code,
                &first.warehouse,
                group_qty,
                strategy,
                &request.excluded_storages,
            )?;

            let demands: Vec<f64> = members.iter().map(|&i| request.items[i].qty).collect();
            let distributed = distribute_across_storages(&demands, &candidates);

            for (&idx, allocations) in members.iter().zip(distributed) {
                let item = &request.items[idx];
                if allocations.is_empty() {
                    tracing::debug!(row_key = %item.row_key, item_code = %item.item_code, "无可用库位");
                }
                results.push((
                    idx,
                    AllocationResult::from_allocations(&item.row_key, &item.item_code, allocations),
                ));
            }
        }

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, r)| r).collect())
    }

    /// 单库位分配（出库单/库存凭证）
    ///
    /// 每行至多一个库位: 策略顺序下第一个有结存的库位，附首个有结存批次与在库序列号
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub fn stock_for_items(
        &self,
        request: &AllocationRequest,
        strategy: PickingStrategy,
    ) -> RepositoryResult<Vec<StockAllocation>> {
        let mut allocations = Vec::new();

        for (row_index, item) in request.items.iter().enumerate() {
            let candidates = self.available_storage_locations(
                &item.item_code,
                &item.warehouse,
                item.qty,
                strategy,
                &request.excluded_storages,
            )?;
            let Some(first) = candidates.into_iter().next() else {
                continue;
            };

            let batch_no = self
                .ledger_repo
                .batch_balances(&item.item_code, &item.warehouse, &first.storage)?
                .into_iter()
                .next()
                .map(|(batch, _)| batch);

            let serial_limit = item.qty.ceil().max(0.0) as usize;
            let serial_nos = self.ledger_repo.serial_nos_in_storage(
                &item.item_code,
                &item.warehouse,
                &first.storage,
                serial_limit,
            )?;

            allocations.push(StockAllocation {
                row_index,
                row_key: item.row_key.clone(),
                warehouse: item.warehouse.clone(),
                storage: first.storage,
                has_batch_no: batch_no.is_some(),
                batch_no,
                has_serial_no: !serial_nos.is_empty(),
                serial_nos,
            });
        }

        Ok(allocations)
    }

    /// FIFO 首个有结存库位
    pub fn fifo_storage_for_item(
        &self,
        item_code: &str,
        warehouse: &str,
        required_qty: f64,
    ) -> RepositoryResult<Option<String>> {
        Ok(self
            .available_storage_locations(item_code, warehouse, required_qty, PickingStrategy::Fifo, &[])?
            .into_iter()
            .next()
            .map(|c| c.storage))
    }

    /// 默认库位
    ///
    /// 1) FIFO 首个有结存库位
    /// 2) 否则最近一次出现该物料的库位
    /// 两步均排除 excluded_storages（默认在制品库位）
    pub fn default_storage_for_item(
        &self,
        item_code: &str,
        warehouse: &str,
        excluded_storages: &[String],
    ) -> RepositoryResult<Option<String>> {
        if item_code.trim().is_empty() || warehouse.trim().is_empty() {
            return Ok(None);
        }

        let with_stock = self
            .ledger_repo
            .storage_balances(item_code, warehouse, PickingStrategy::Fifo, excluded_storages)?
            .into_iter()
            .next();
        if let Some(balance) = with_stock {
            return Ok(Some(balance.storage));
        }

        self.ledger_repo
            .last_used_storage(item_code, warehouse, excluded_storages)
    }

    /// 批量默认库位
    pub fn default_storage_for_items(
        &self,
        queries: &[DefaultStorageQuery],
        excluded_storages: &[String],
    ) -> RepositoryResult<Vec<DefaultStorage>> {
        queries
            .iter()
            .map(|q| {
                Ok(DefaultStorage {
                    row_key: q.row_key.clone(),
                    default_storage: self.default_storage_for_item(
                        &q.item_code,
                        &q.warehouse,
                        excluded_storages,
                    )?,
                })
            })
            .collect()
    }
}

/// 将候选库位容量按顺序分给各需求行
///
/// # 参数
/// - demands: 各行需求（按明细表顺序）
/// - candidates: 候选库位（按策略顺序，qty_to_pick 为可分配量）
///
/// # 返回
/// 与 demands 等长，每行的有序分配列表（空表示无库存）
pub fn distribute_across_storages(
    demands: &[f64],
    candidates: &[StorageCandidate],
) -> Vec<Vec<StorageQty>> {
    let mut storage_idx = 0;
    let mut remaining_in_storage = candidates.first().map(|c| c.qty_to_pick).unwrap_or(0.0);

    demands
        .iter()
        .map(|&demand| {
            let mut qty_needed = demand;
            let mut allocations = Vec::new();

            while qty_needed > QTY_EPSILON && storage_idx < candidates.len() {
                let current = &candidates[storage_idx].storage;

                if remaining_in_storage + QTY_EPSILON >= qty_needed {
                    allocations.push(StorageQty {
                        storage: current.clone(),
                        qty: qty_needed,
                    });
                    remaining_in_storage -= qty_needed;
                    qty_needed = 0.0;
                } else {
                    if remaining_in_storage > QTY_EPSILON {
                        allocations.push(StorageQty {
                            storage: current.clone(),
                            qty: remaining_in_storage,
                        });
                        qty_needed -= remaining_in_storage;
                    }

                    storage_idx += 1;
                    remaining_in_storage = candidates
                        .get(storage_idx)
                        .map(|c| c.qty_to_pick)
                        .unwrap_or(0.0);
                }
            }

            allocations
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(storage: &str, qty: f64) -> StorageCandidate {
        StorageCandidate {
            storage: storage.to_string(),
            available_qty: qty,
            qty_to_pick: qty,
        }
    }

    #[test]
    fn test_distribute_single_row_split() {
        let result = distribute_across_storages(&[10.0], &[candidate("A", 6.0), candidate("B", 8.0)]);
        assert_eq!(
            result,
            vec![vec![
                StorageQty { storage: "A".to_string(), qty: 6.0 },
                StorageQty { storage: "B".to_string(), qty: 4.0 },
            ]]
        );
    }

    #[test]
    fn test_distribute_rows_share_capacity() {
        // 两行共用 A 的 5 个，不得重复分配
        let result = distribute_across_storages(&[3.0, 3.0], &[candidate("A", 5.0), candidate("B", 5.0)]);
        assert_eq!(result[0], vec![StorageQty { storage: "A".to_string(), qty: 3.0 }]);
        assert_eq!(
            result[1],
            vec![
                StorageQty { storage: "A".to_string(), qty: 2.0 },
                StorageQty { storage: "B".to_string(), qty: 1.0 },
            ]
        );
    }

    #[test]
    fn test_distribute_shortage_leaves_later_rows_empty() {
        let result = distribute_across_storages(&[4.0, 2.0], &[candidate("A", 3.0)]);
        assert_eq!(result[0], vec![StorageQty { storage: "A".to_string(), qty: 3.0 }]);
        assert!(result[1].is_empty());
    }

    #[test]
    fn test_distribute_no_candidates() {
        let result = distribute_across_storages(&[1.0, 2.0], &[]);
        assert!(result.iter().all(|r| r.is_empty()));
    }
}
