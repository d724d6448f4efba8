// ==========================================
// 库位分配系统 - 库位分配 API
// ==========================================
// 职责: 对外提供库位分配、默认库位、库存过账、设置读写接口
// 匹配: 所有分配结果按 row_key 标识，不依赖行位置
// ==========================================

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::{config_keys, ConfigManager};
use crate::config::settings_reader::StorageSettingsReader;
use crate::domain::allocation::{
    AllocationRequest, AllocationResult, DefaultStorage, DefaultStorageQuery, StockAllocation,
};
use crate::domain::ledger::{StockLedgerEntry, StorageCandidate};
use crate::domain::types::{PickingStrategy, WatchMode};
use crate::engine::allocator::StorageAllocator;
use crate::engine::pipeline::AllocationService;
use crate::engine::EngineResult;
use crate::repository::stock_ledger_repo::StockLedgerRepository;

// ==========================================
// StorageApi - 库位分配 API
// ==========================================

/// 库位分配API
///
/// 职责：
/// 1. 拣货单整表分配（可拆分）
/// 2. 单库位分配（附批次/序列号）
/// 3. 默认库位查询
/// 4. 库存台账过账/取消
/// 5. 生产设置读写
pub struct StorageApi {
    ledger_repo: Arc<StockLedgerRepository>,
    allocator: Arc<StorageAllocator>,
    config_manager: Arc<ConfigManager>,
}

impl StorageApi {
    pub fn new(
        ledger_repo: Arc<StockLedgerRepository>,
        allocator: Arc<StorageAllocator>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            ledger_repo,
            allocator,
            config_manager,
        }
    }

    // ==========================================
    // 分配接口
    // ==========================================

    /// 拣货单整表分配
    ///
    /// # 返回
    /// - 按请求顺序的分配结果；无库存的行 assigned_storage = None
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn allocate_storage_for_pick_list(
        &self,
        request: &AllocationRequest,
    ) -> ApiResult<Vec<AllocationResult>> {
        validate_request(request)?;
        let strategy = self.picking_strategy().await?;
        let request = self.with_wip_excluded(request).await?;

        let results = self.allocator.allocate_storage_for_pick_list(&request, strategy)?;
        tracing::info!(
            strategy = %strategy,
            results = results.len(),
            split = results.iter().filter(|r| r.is_split()).count(),
            "拣货单分配完成"
        );
        Ok(results)
    }

    /// 单库位分配（出库单/库存凭证）
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn get_available_stock_for_items(
        &self,
        request: &AllocationRequest,
    ) -> ApiResult<Vec<StockAllocation>> {
        validate_request(request)?;
        let strategy = self.picking_strategy().await?;
        let request = self.with_wip_excluded(request).await?;

        Ok(self.allocator.stock_for_items(&request, strategy)?)
    }

    /// 默认库位（排除默认在制品库位）
    pub async fn get_default_storage_for_items(
        &self,
        queries: &[DefaultStorageQuery],
    ) -> ApiResult<Vec<DefaultStorage>> {
        let excluded: Vec<String> = self.get_default_wip_storage().await?.into_iter().collect();
        Ok(self.allocator.default_storage_for_items(queries, &excluded)?)
    }

    /// 单物料候选库位（按当前拣货策略）
    pub async fn get_available_storage_locations(
        &self,
        item_code: &str,
        warehouse: &str,
        required_qty: f64,
    ) -> ApiResult<Vec<StorageCandidate>> {
        let strategy = self.picking_strategy().await?;
        let excluded: Vec<String> = self.get_default_wip_storage().await?.into_iter().collect();
        Ok(self.allocator.available_storage_locations(
            item_code,
            warehouse,
            required_qty,
            strategy,
            &excluded,
        )?)
    }

    // ==========================================
    // 库存台账
    // ==========================================

    /// 过账分录（负库存时整组拒绝）
    pub fn post_stock_entries(&self, entries: &[StockLedgerEntry]) -> ApiResult<usize> {
        if entries.iter().any(|e| e.item_code.trim().is_empty() || e.warehouse.trim().is_empty()) {
            return Err(ApiError::InvalidInput("分录缺少物料编码或仓库".to_string()));
        }
        let count = self.ledger_repo.post_entries(entries)?;
        tracing::info!(count, "库存分录已过账");
        Ok(count)
    }

    pub fn cancel_voucher(&self, voucher_type: &str, voucher_no: &str) -> ApiResult<usize> {
        Ok(self.ledger_repo.cancel_voucher(voucher_type, voucher_no)?)
    }

    pub fn storage_balance(&self, item_code: &str, warehouse: &str, storage: &str) -> ApiResult<f64> {
        Ok(self.ledger_repo.storage_balance(item_code, warehouse, storage)?)
    }

    // ==========================================
    // 设置
    // ==========================================

    pub async fn get_default_wip_storage(&self) -> ApiResult<Option<String>> {
        self.config_manager
            .get_default_wip_storage()
            .await
            .map_err(config_error)
    }

    pub async fn get_default_fg_storage(&self) -> ApiResult<Option<String>> {
        self.config_manager
            .get_default_fg_storage()
            .await
            .map_err(config_error)
    }

    /// 更新设置（校验取值）
    pub fn update_setting(&self, key: &str, value: &str) -> ApiResult<()> {
        match key {
            config_keys::DEFAULT_WIP_STORAGE | config_keys::DEFAULT_FG_STORAGE => {}
            config_keys::PICKING_STRATEGY => {
                value.parse::<PickingStrategy>().map_err(ApiError::ValidationError)?;
            }
            config_keys::WATCH_MODE => {
                value.parse::<WatchMode>().map_err(ApiError::ValidationError)?;
            }
            config_keys::WATCH_POLL_INTERVAL_MS | config_keys::WATCH_SETTLE_DELAY_MS => {
                value.trim().parse::<u64>().map_err(|_| {
                    ApiError::ValidationError(format!("{} 必须为非负整数毫秒: {}", key, value))
                })?;
            }
            other => return Err(ApiError::InvalidInput(format!("未知设置项: {}", other))),
        }

        self.config_manager
            .set_global_config_value(key, value.trim())
            .map_err(config_error)
    }

    async fn picking_strategy(&self) -> ApiResult<PickingStrategy> {
        self.config_manager
            .get_picking_strategy()
            .await
            .map_err(config_error)
    }

    /// 请求排除库位追加默认在制品库位
    async fn with_wip_excluded(&self, request: &AllocationRequest) -> ApiResult<AllocationRequest> {
        let mut request = request.clone();
        if let Some(wip) = self.get_default_wip_storage().await? {
            if !request.excluded_storages.contains(&wip) {
                request.excluded_storages.push(wip);
            }
        }
        Ok(request)
    }
}

fn config_error(err: Box<dyn Error + Send + Sync>) -> ApiError {
    ApiError::ConfigError(err.to_string())
}

/// 请求行校验: row_key 非空且不重复，数量有限
fn validate_request(request: &AllocationRequest) -> ApiResult<()> {
    let mut seen = std::collections::HashSet::new();
    for item in &request.items {
        if item.row_key.trim().is_empty() {
            return Err(ApiError::InvalidInput("请求行缺少 row_key".to_string()));
        }
        if !seen.insert(item.row_key.as_str()) {
            return Err(ApiError::InvalidInput(format!("请求行 row_key 重复: {}", item.row_key)));
        }
        if !item.qty.is_finite() {
            return Err(ApiError::InvalidInput(format!("请求行数量无效: {}", item.row_key)));
        }
    }
    Ok(())
}

// ==========================================
// 进程内分配服务
// ==========================================
#[async_trait]
impl AllocationService for StorageApi {
    async fn allocate_storage_for_pick_list(
        &self,
        request: &AllocationRequest,
    ) -> EngineResult<Vec<AllocationResult>> {
        Ok(StorageApi::allocate_storage_for_pick_list(self, request).await?)
    }

    async fn get_available_stock_for_items(
        &self,
        request: &AllocationRequest,
    ) -> EngineResult<Vec<StockAllocation>> {
        Ok(StorageApi::get_available_stock_for_items(self, request).await?)
    }

    async fn get_default_storage_for_items(
        &self,
        queries: &[DefaultStorageQuery],
    ) -> EngineResult<Vec<DefaultStorage>> {
        Ok(StorageApi::get_default_storage_for_items(self, queries).await?)
    }
}
