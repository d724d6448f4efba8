// ==========================================
// 库位分配系统 - 分配流水线
// ==========================================
// 职责: 构建请求 → 调用分配服务 → 回写明细表 → 发布事件
// 按单据类型分派:
// - 拣货单: 整表分配（可拆分）
// - 出库单/库存凭证: 单库位分配（附批次/序列号）
// - 出库单: 单库位无结果的行回退到默认库位（有库存的 FIFO 库位，否则最近使用库位）
// - 采购订单: 默认库位（目标方向）
// 红线: 单据锁不跨 await 持有；服务失败时明细表保持不变
// ==========================================

use crate::config::settings_reader::StorageSettingsReader;
use crate::domain::allocation::{
    AllocationRequest, AllocationResult, DefaultStorage, DefaultStorageQuery, StockAllocation,
};
use crate::domain::document::{SharedDocument, StockDocument};
use crate::domain::types::{DocType, StorageSide};
use crate::engine::applier::{AllocationApplier, ApplySummary};
use crate::engine::default_storage::{apply_default_storages, default_storage_queries};
use crate::engine::events::{AllocationEvent, AllocationEventType, OptionalEventPublisher};
use crate::engine::request_builder::AllocationRequestBuilder;
use crate::engine::EngineResult;
use crate::i18n::{t, t_with_args};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// AllocationService Trait
// ==========================================
// 实现者: StorageApi（进程内）；远程传输可替换
#[async_trait]
pub trait AllocationService: Send + Sync {
    /// 拣货单整表分配（按 row_key 返回）
    async fn allocate_storage_for_pick_list(
        &self,
        request: &AllocationRequest,
    ) -> EngineResult<Vec<AllocationResult>>;

    /// 单库位分配（每行至多一个库位）
    async fn get_available_stock_for_items(
        &self,
        request: &AllocationRequest,
    ) -> EngineResult<Vec<StockAllocation>>;

    /// 默认库位
    async fn get_default_storage_for_items(
        &self,
        queries: &[DefaultStorageQuery],
    ) -> EngineResult<Vec<DefaultStorage>>;
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 人工拣货模式
    ManualPicking,
    /// 没有需要分配的行
    NothingToAllocate,
}

/// 流水线执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Skipped(SkipReason),
    Applied(ApplySummary),
    NoAllocation(ApplySummary),
    Failed(String),
}

impl PipelineOutcome {
    /// 流水线追加的行数（拆分）
    pub fn rows_added(&self) -> usize {
        match self {
            PipelineOutcome::Applied(summary) | PipelineOutcome::NoAllocation(summary) => {
                summary.rows_added
            }
            _ => 0,
        }
    }

    pub fn summary(&self) -> Option<&ApplySummary> {
        match self {
            PipelineOutcome::Applied(summary) | PipelineOutcome::NoAllocation(summary) => Some(summary),
            _ => None,
        }
    }
}

/// 锁内构建的请求
enum Planned {
    Split(AllocationRequest),
    SingleBin(AllocationRequest),
    Defaults(Vec<DefaultStorageQuery>),
}

/// 服务响应
enum Response {
    Split(Vec<AllocationResult>),
    SingleBin(Vec<StockAllocation>),
    Defaults(Vec<DefaultStorage>),
}

// ==========================================
// AllocationPipeline - 分配流水线
// ==========================================
pub struct AllocationPipeline {
    service: Arc<dyn AllocationService>,
    settings: Arc<dyn StorageSettingsReader>,
    publisher: OptionalEventPublisher,
}

impl AllocationPipeline {
    pub fn new(service: Arc<dyn AllocationService>, settings: Arc<dyn StorageSettingsReader>) -> Self {
        Self {
            service,
            settings,
            publisher: OptionalEventPublisher::none(),
        }
    }

    pub fn with_publisher(mut self, publisher: OptionalEventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// 执行一次分配
    ///
    /// 失败不向上传播: 发布 Failed 事件并返回 PipelineOutcome::Failed
    #[instrument(skip_all)]
    pub async fn run(&self, doc: &SharedDocument) -> PipelineOutcome {
        let wip = match self.settings.get_default_wip_storage().await {
            Ok(wip) => wip,
            Err(e) => return self.fail(doc, &e.to_string()),
        };

        // 1. 锁内构建请求
        let (name, doc_type, side, planned) = {
            let guard = match doc.lock() {
                Ok(guard) => guard,
                Err(e) => {
                    tracing::error!(error = %e, "单据锁获取失败");
                    return PipelineOutcome::Failed(e.to_string());
                }
            };
            if guard.manual_picking {
                tracing::debug!(document = %guard.name, "人工拣货模式，跳过自动分配");
                return PipelineOutcome::Skipped(SkipReason::ManualPicking);
            }
            (
                guard.name.clone(),
                guard.doc_type,
                guard.storage_side(),
                plan(&guard, wip),
            )
        };

        let event_type = match &planned {
            Planned::Defaults(_) => AllocationEventType::DefaultsApplied,
            _ => AllocationEventType::Applied,
        };
        let requested: Vec<String> = match &planned {
            Planned::Split(request) | Planned::SingleBin(request) => {
                request.row_keys().map(str::to_string).collect()
            }
            Planned::Defaults(queries) => queries.iter().map(|q| q.row_key.clone()).collect(),
        };
        if requested.is_empty() {
            return PipelineOutcome::Skipped(SkipReason::NothingToAllocate);
        }

        // 2. 锁外调用服务
        tracing::info!(document = %name, rows = requested.len(), "调用分配服务");
        let response = match planned {
            Planned::Split(request) => self
                .service
                .allocate_storage_for_pick_list(&request)
                .await
                .map(Response::Split),
            Planned::SingleBin(request) => self
                .service
                .get_available_stock_for_items(&request)
                .await
                .map(Response::SingleBin),
            Planned::Defaults(queries) => self
                .service
                .get_default_storage_for_items(&queries)
                .await
                .map(Response::Defaults),
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => return self.fail(doc, &e.to_string()),
        };

        // 3. 重新加锁回写（人工设置/已有库位由回写规则保护）
        let mut summary = {
            let mut guard = match doc.lock() {
                Ok(guard) => guard,
                Err(e) => {
                    tracing::error!(error = %e, "单据锁获取失败");
                    return PipelineOutcome::Failed(e.to_string());
                }
            };
            let applier = AllocationApplier::new(side);
            let (mut summary, answered): (ApplySummary, BTreeSet<String>) = match response {
                Response::Split(results) => {
                    let answered = results.iter().map(|r| r.row_key.clone()).collect();
                    (applier.apply_in_place(&mut guard.items, &results), answered)
                }
                Response::SingleBin(allocations) => {
                    let answered = allocations.iter().map(|a| a.row_key.clone()).collect();
                    (applier.apply_stock_allocations(&mut guard.items, &allocations), answered)
                }
                Response::Defaults(defaults) => {
                    let answered = defaults
                        .iter()
                        .filter(|d| d.default_storage.is_some())
                        .map(|d| d.row_key.clone())
                        .collect();
                    (defaults_summary(&mut guard, &defaults, side), answered)
                }
            };
            let answered: BTreeSet<&str> = answered.iter().map(String::as_str).collect();
            summary.record_missing(requested.iter().map(String::as_str), &answered);
            summary
        };

        // 4. 出库单: 单库位未命中的行回退到默认库位
        if doc_type == DocType::DeliveryNote && side == StorageSide::Source && !summary.not_found.is_empty() {
            self.fill_default_fallback(doc, side, &mut summary).await;
        }

        // 5. 发布事件
        if summary.has_changes() {
            self.publisher.publish(
                AllocationEvent::new(&name, event_type, summary.message())
                    .with_rows(requested),
            );
            PipelineOutcome::Applied(summary)
        } else {
            self.publisher.publish(
                AllocationEvent::new(&name, AllocationEventType::NoAllocationFound, t("allocation.no_stock"))
                    .with_rows(summary.not_found.clone()),
            );
            PipelineOutcome::NoAllocation(summary)
        }
    }

    /// 默认库位回退
    ///
    /// 仅处理 not_found 中仍可自动填写的行；服务失败只记日志，保留已回写的单库位结果
    async fn fill_default_fallback(&self, doc: &SharedDocument, side: StorageSide, summary: &mut ApplySummary) {
        let queries: Vec<DefaultStorageQuery> = match doc.lock() {
            Ok(guard) => default_storage_queries(&guard.items, side)
                .into_iter()
                .filter(|q| summary.not_found.contains(&q.row_key))
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "单据锁获取失败");
                return;
            }
        };
        if queries.is_empty() {
            return;
        }

        let defaults = match self.service.get_default_storage_for_items(&queries).await {
            Ok(defaults) => defaults,
            Err(e) => {
                tracing::warn!(error = %e, rows = queries.len(), "默认库位回退失败");
                return;
            }
        };

        let mut guard = match doc.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!(error = %e, "单据锁获取失败");
                return;
            }
        };
        let fallback = defaults_summary(&mut guard, &defaults, side);
        if fallback.rows_updated == 0 {
            return;
        }
        let filled: BTreeSet<&str> = defaults
            .iter()
            .filter(|d| d.default_storage.is_some())
            .map(|d| d.row_key.as_str())
            .filter(|key| guard.items.get(key).is_some_and(|row| row.has_storage(side)))
            .collect();
        summary.not_found.retain(|key| !filled.contains(key.as_str()));
        summary.rows_updated += fallback.rows_updated;
        summary.storages_touched.extend(fallback.storages_touched);
        tracing::info!(filled = fallback.rows_updated, "出库单行已回退到默认库位");
    }

    fn fail(&self, doc: &SharedDocument, error: &str) -> PipelineOutcome {
        let name = doc.lock().map(|d| d.name.clone()).unwrap_or_default();
        tracing::warn!(document = %name, error, "分配服务调用失败，明细表未改动");
        self.publisher.publish(AllocationEvent::new(
            &name,
            AllocationEventType::Failed,
            t_with_args("allocation.service_failed", &[("error", error)]),
        ));
        PipelineOutcome::Failed(error.to_string())
    }
}

/// 按单据类型构建请求
fn plan(doc: &StockDocument, wip: Option<String>) -> Planned {
    let side = doc.storage_side();
    match (doc.doc_type, side) {
        (_, StorageSide::Target) => Planned::Defaults(default_storage_queries(&doc.items, side)),
        (DocType::PickList, _) => Planned::Split(build_request(doc, side, wip)),
        _ => Planned::SingleBin(build_request(doc, side, wip)),
    }
}

fn build_request(doc: &StockDocument, side: StorageSide, wip: Option<String>) -> AllocationRequest {
    AllocationRequestBuilder::new(side)
        .company(doc.company.clone())
        .exclude_storage(wip)
        .build(&doc.items)
}

fn defaults_summary(doc: &mut StockDocument, defaults: &[DefaultStorage], side: StorageSide) -> ApplySummary {
    let filled = apply_default_storages(&mut doc.items, defaults, side);
    let storages_touched = defaults
        .iter()
        .filter_map(|d| d.default_storage.clone())
        .collect();
    ApplySummary {
        rows_updated: filled,
        storages_touched: if filled > 0 { storages_touched } else { BTreeSet::new() },
        ..ApplySummary::default()
    }
}
