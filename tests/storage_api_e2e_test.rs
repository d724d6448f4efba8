// ==========================================
// StorageApi / AppState 端到端测试
// ==========================================
// 测试范围:
// 1. 拣货单: 流水线拆分分配 + Applied 事件
// 2. 出库单: 单库位分配（序列号、批次），无库存行回退到最近使用库位
// 3. 无库存: NoAllocationFound 事件，明细表不变
// 4. 台账: 负库存拒绝、取消凭证
// 5. 设置: 策略切换、取值校验、请求校验
// ==========================================


use std::sync::Arc;
use storage_allocation::config::config_keys;
use storage_allocation::domain::{AllocationRequest, AllocationRequestItem, DocType};
use storage_allocation::engine::{AllocationEventType, PipelineOutcome, RecordingEventPublisher};
use storage_allocation::ApiError;
use test_helpers::*;

fn env_with_recorder() -> (TestEnv, Arc<RecordingEventPublisher>) {
    let recorder = Arc::new(RecordingEventPublisher::new());
    let env = TestEnv::new().unwrap().with_publisher(recorder.clone());
    (env, recorder)
}

#[tokio::test]
async fn test_pick_list_pipeline_splits_and_reports() {
    let (env, recorder) = env_with_recorder();
    env.seed(&[receipt("ITEM-A", "A", 6.0, 1), receipt("ITEM-A", "B", 8.0, 2)]);

    let doc = document(
        "PL-0001",
        DocType::PickList,
        vec![line("r1", "ITEM-A", 10.0), line("r2", "ITEM-NONE", 1.0)],
    )
    .into_shared();

    let outcome = env.state.pipeline().run(&doc).await;
    let summary = match &outcome {
        PipelineOutcome::Applied(summary) => summary.clone(),
        other => panic!("预期 Applied，实际 {:?}", other),
    };
    assert_eq!(summary.rows_split, 1);
    assert_eq!(summary.rows_added, 1);
    assert_eq!(summary.not_found, vec!["r2".to_string()]);
    assert_eq!(outcome.rows_added(), 1);

    let doc = doc.lock().unwrap();
    assert_eq!(doc.items.len(), 3);
    assert_eq!(doc.items.get("r1").unwrap().source_storage.as_deref(), Some("A"));
    assert_eq!(doc.items.rows()[2].source_storage.as_deref(), Some("B"));
    assert_eq!(doc.items.split_group_stock_qty("r1"), 10.0);
    assert_eq!(doc.items.get("r2").unwrap().source_storage, None);

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, AllocationEventType::Applied);
    assert_eq!(events[0].document, "PL-0001");
    assert!(!events[0].message.is_empty());
}

#[tokio::test]
async fn test_delivery_note_assigns_single_bin_with_serials() {
    let (env, _recorder) = env_with_recorder();
    env.seed(&[
        receipt("ITEM-S", "S-1", 1.0, 1).with_serial("SN-001"),
        receipt("ITEM-S", "S-1", 1.0, 1).with_serial("SN-002"),
        receipt("ITEM-L", "L-1", 10.0, 2).with_batch("LOT-7", None),
    ]);

    let doc = document(
        "DN-0001",
        DocType::DeliveryNote,
        vec![line("r1", "ITEM-S", 2.0), line("r2", "ITEM-L", 4.0)],
    )
    .into_shared();

    let outcome = env.state.pipeline().run(&doc).await;
    assert!(matches!(outcome, PipelineOutcome::Applied(_)));

    let doc = doc.lock().unwrap();
    assert_eq!(doc.items.len(), 2);
    let r1 = doc.items.get("r1").unwrap();
    assert_eq!(r1.source_storage.as_deref(), Some("S-1"));
    assert_eq!(r1.serial_no.as_deref(), Some("SN-001\nSN-002"));
    let r2 = doc.items.get("r2").unwrap();
    assert_eq!(r2.source_storage.as_deref(), Some("L-1"));
    assert_eq!(r2.batch_no.as_deref(), Some("LOT-7"));
}

#[tokio::test]
async fn test_delivery_note_falls_back_to_last_used_storage() {
    let (env, recorder) = env_with_recorder();
    env.set(config_keys::DEFAULT_WIP_STORAGE, "WIP-01");
    env.seed(&[
        receipt("ITEM-A", "BIN-A", 5.0, 1),
        issue("ITEM-A", "BIN-A", 5.0, 2),
        receipt("ITEM-A", "WIP-01", 5.0, 3),
        issue("ITEM-A", "WIP-01", 5.0, 4),
    ]);

    let doc = document(
        "DN-0005",
        DocType::DeliveryNote,
        vec![line("r1", "ITEM-A", 2.0), line("r2", "ITEM-NEVER", 1.0)],
    )
    .into_shared();

    let outcome = env.state.pipeline().run(&doc).await;
    let summary = match &outcome {
        PipelineOutcome::Applied(summary) => summary.clone(),
        other => panic!("预期 Applied，实际 {:?}", other),
    };
    assert_eq!(summary.rows_updated, 1);
    assert_eq!(summary.not_found, vec!["r2".to_string()]);

    // 在制品库位虽然更近，但不参与回退
    let doc = doc.lock().unwrap();
    assert_eq!(doc.items.get("r1").unwrap().source_storage.as_deref(), Some("BIN-A"));
    assert_eq!(doc.items.get("r2").unwrap().source_storage, None);
    assert_eq!(recorder.count_of(AllocationEventType::Applied), 1);
}

#[tokio::test]
async fn test_no_stock_publishes_event_and_keeps_table() {
    let (env, recorder) = env_with_recorder();
    let doc = document("PL-0002", DocType::PickList, vec![line("r1", "ITEM-X", 3.0)]).into_shared();
    let before = doc.lock().unwrap().items.clone();

    let outcome = env.state.pipeline().run(&doc).await;
    assert!(matches!(outcome, PipelineOutcome::NoAllocation(_)));
    assert_eq!(doc.lock().unwrap().items.rows(), before.rows());

    assert_eq!(recorder.count_of(AllocationEventType::NoAllocationFound), 1);
    assert_eq!(recorder.events()[0].row_keys, vec!["r1".to_string()]);
}

#[test]
fn test_negative_stock_rejects_whole_batch() {
    let env = TestEnv::new().unwrap();
    let api = &env.state.storage_api;
    api.post_stock_entries(&[receipt("ITEM-A", "A", 5.0, 1)]).unwrap();

    let err = api
        .post_stock_entries(&[issue("ITEM-A", "A", 2.0, 2), issue("ITEM-A", "A", 4.0, 3)])
        .unwrap_err();
    assert!(matches!(err, ApiError::NegativeStock(_)));
    assert_eq!(api.storage_balance("ITEM-A", WAREHOUSE, "A").unwrap(), 5.0);

    // 缺少仓库
    let mut bad = receipt("ITEM-A", "A", 1.0, 4);
    bad.warehouse = String::new();
    assert!(matches!(
        api.post_stock_entries(&[bad]),
        Err(ApiError::InvalidInput(_))
    ));
}

#[test]
fn test_cancel_voucher_restores_balance() {
    let env = TestEnv::new().unwrap();
    let api = &env.state.storage_api;
    api.post_stock_entries(&[receipt("ITEM-A", "A", 5.0, 1)]).unwrap();
    api.post_stock_entries(&[issue("ITEM-A", "A", 3.0, 2)]).unwrap();
    assert_eq!(api.storage_balance("ITEM-A", WAREHOUSE, "A").unwrap(), 2.0);

    assert_eq!(api.cancel_voucher("Delivery Note", "DN-0002").unwrap(), 1);
    assert_eq!(api.storage_balance("ITEM-A", WAREHOUSE, "A").unwrap(), 5.0);
    assert_eq!(api.cancel_voucher("Delivery Note", "DN-9999").unwrap(), 0);
}

#[tokio::test]
async fn test_settings_drive_strategy_and_are_validated() {
    let env = TestEnv::new().unwrap();
    env.seed(&[receipt("ITEM-A", "OLD", 5.0, 1), receipt("ITEM-A", "NEW", 5.0, 9)]);
    let api = &env.state.storage_api;

    let fifo = api.get_available_storage_locations("ITEM-A", WAREHOUSE, 1.0).await.unwrap();
    assert_eq!(fifo[0].storage, "OLD");

    api.update_setting(config_keys::PICKING_STRATEGY, "LIFO").unwrap();
    let lifo = api.get_available_storage_locations("ITEM-A", WAREHOUSE, 1.0).await.unwrap();
    assert_eq!(lifo[0].storage, "NEW");

    // 在制品库位不参与分配
    api.update_setting(config_keys::DEFAULT_WIP_STORAGE, "NEW").unwrap();
    assert_eq!(api.get_default_wip_storage().await.unwrap().as_deref(), Some("NEW"));
    let without_wip = api.get_available_storage_locations("ITEM-A", WAREHOUSE, 1.0).await.unwrap();
    assert_eq!(without_wip.len(), 1);
    assert_eq!(without_wip[0].storage, "OLD");

    api.update_setting(config_keys::DEFAULT_FG_STORAGE, "FG-01").unwrap();
    assert_eq!(api.get_default_fg_storage().await.unwrap().as_deref(), Some("FG-01"));

    assert!(matches!(
        api.update_setting(config_keys::PICKING_STRATEGY, "RANDOM"),
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        api.update_setting(config_keys::WATCH_POLL_INTERVAL_MS, "-5"),
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        api.update_setting("unknown_key", "1"),
        Err(ApiError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_request_validation() {
    let env = TestEnv::new().unwrap();
    let item = |key: &str| AllocationRequestItem {
        row_key: key.to_string(),
        item_code: "ITEM-A".to_string(),
        warehouse: WAREHOUSE.to_string(),
        qty: 1.0,
    };

    let duplicate = AllocationRequest {
        items: vec![item("r1"), item("r1")],
        ..Default::default()
    };
    assert!(matches!(
        env.state.storage_api.allocate_storage_for_pick_list(&duplicate).await,
        Err(ApiError::InvalidInput(_))
    ));

    let blank = AllocationRequest {
        items: vec![item(" ")],
        ..Default::default()
    };
    assert!(matches!(
        env.state.storage_api.get_available_stock_for_items(&blank).await,
        Err(ApiError::InvalidInput(_))
    ));

    // 空请求合法
    let empty = AllocationRequest::default();
    assert!(env
        .state
        .storage_api
        .allocate_storage_for_pick_list(&empty)
        .await
        .unwrap()
        .is_empty());
}
