// ==========================================
// AllocationApplier 集成测试
// ==========================================
// 测试范围:
// 1. 拆分: 原行保留身份，拆分行追加到表尾，合计数量不变
// 2. 倒序处理: 首行与末行同时拆分
// 3. 人工设置/已有库位的行不被改写（含过期结果）
// 4. 合计不一致照常回写并记录；无效追加分配跳过并记录
// 5. 构建器 → 分配 → 回写 全链路
// ==========================================


use storage_allocation::domain::{
    AllocationResult, LineItem, PickingStrategy, StorageQty, StorageSide, Table,
};
use storage_allocation::engine::{AllocationApplier, AllocationRequestBuilder};
use test_helpers::*;

fn result(row_key: &str, allocations: &[(&str, f64)]) -> AllocationResult {
    AllocationResult::from_allocations(
        row_key,
        "ITEM-A",
        allocations
            .iter()
            .map(|(storage, qty)| StorageQty {
                storage: storage.to_string(),
                qty: *qty,
            })
            .collect(),
    )
}

#[test]
fn test_split_6_plus_4_of_10() {
    let mut original = line("r1", "ITEM-A", 10.0);
    original.item_name = Some("Widget".to_string());
    original.work_order = Some("WO-0001".to_string());
    original.material_request = Some("MR-0001".to_string());
    let table = Table::from_rows(vec![original]).unwrap();

    let (updated, summary) = AllocationApplier::new(StorageSide::Source)
        .apply(&table, &[result("r1", &[("A", 6.0), ("B", 4.0)])]);

    assert_eq!(updated.len(), 2);
    let r1 = updated.get("r1").unwrap();
    assert_eq!(r1.source_storage.as_deref(), Some("A"));
    assert_eq!(r1.stock_qty, 6.0);
    assert_eq!(r1.qty, 6.0);
    assert_eq!(r1.split_group.as_deref(), Some("r1"));

    let sibling = &updated.rows()[1];
    assert_ne!(sibling.row_key, "r1");
    assert_eq!(sibling.source_storage.as_deref(), Some("B"));
    assert_eq!(sibling.stock_qty, 4.0);
    assert_eq!(sibling.item_code, "ITEM-A");
    assert_eq!(sibling.uom.as_deref(), Some("Nos"));
    assert_eq!(sibling.work_order.as_deref(), Some("WO-0001"));
    assert_eq!(sibling.material_request.as_deref(), Some("MR-0001"));
    assert_eq!(sibling.split_group.as_deref(), Some("r1"));
    assert!(!sibling.manual_override);

    assert_eq!(updated.split_group_stock_qty("r1"), 10.0);
    assert_eq!(summary.rows_added, 1);
    assert!(updated.is_dirty());
}

#[test]
fn test_first_and_last_rows_split_in_reverse_order() {
    let rows: Vec<LineItem> = (1..=5)
        .map(|i| line(&format!("r{}", i), "ITEM-A", 10.0))
        .collect();
    let table = Table::from_rows(rows).unwrap();

    let results = vec![
        result("r1", &[("A", 7.0), ("B", 3.0)]),
        result("r3", &[("C", 10.0)]),
        result("r5", &[("D", 5.0), ("E", 4.0), ("F", 1.0)]),
    ];
    let (updated, summary) = AllocationApplier::new(StorageSide::Source).apply(&table, &results);

    // 原有行身份与位置不变
    let keys: Vec<_> = updated.rows().iter().map(|r| r.row_key.as_str()).collect();
    assert_eq!(&keys[..5], &["r1", "r2", "r3", "r4", "r5"]);
    assert_eq!(updated.len(), 8);

    // 末行拆分行先追加（倒序处理），首行拆分行在最后
    let appended: Vec<_> = updated.rows()[5..]
        .iter()
        .map(|r| (r.split_group.as_deref().unwrap(), r.source_storage.as_deref().unwrap()))
        .collect();
    assert_eq!(appended, vec![("r5", "E"), ("r5", "F"), ("r1", "B")]);

    // 行号连续
    let idx: Vec<_> = updated.rows().iter().map(|r| r.idx).collect();
    assert_eq!(idx, (1..=8).collect::<Vec<u32>>());

    assert_eq!(updated.split_group_stock_qty("r1"), 10.0);
    assert_eq!(updated.split_group_stock_qty("r5"), 10.0);
    assert_eq!(updated.get("r3").unwrap().source_storage.as_deref(), Some("C"));
    assert_eq!(updated.get("r2").unwrap().source_storage, None);
    assert_eq!(summary.rows_updated, 3);
    assert_eq!(summary.rows_split, 2);
    assert_eq!(summary.rows_added, 3);
    assert_eq!(summary.storages_touched.len(), 6);
}

#[test]
fn test_stale_results_never_touch_manual_or_filled_rows() {
    let mut manual = line("r1", "ITEM-A", 5.0);
    manual.set_storage_manually(StorageSide::Source, "HAND-PICKED");
    let mut filled = line("r2", "ITEM-A", 5.0);
    filled.source_storage = Some("EARLIER".to_string());
    let table = Table::from_rows(vec![manual, filled, line("r3", "ITEM-A", 5.0)]).unwrap();

    let results = vec![
        result("r1", &[("A", 3.0), ("B", 2.0)]),
        result("r2", &[("C", 5.0)]),
        result("r3", &[("D", 5.0)]),
    ];
    let (updated, summary) = AllocationApplier::new(StorageSide::Source).apply(&table, &results);

    assert_eq!(updated.get("r1"), table.get("r1"));
    assert_eq!(updated.get("r2"), table.get("r2"));
    assert_eq!(updated.get("r3").unwrap().source_storage.as_deref(), Some("D"));
    assert_eq!(updated.len(), 3);
    assert_eq!(summary.skipped_manual, vec!["r1".to_string()]);
    assert_eq!(summary.skipped_existing, vec!["r2".to_string()]);

    // 再次回写同一批结果不产生变化
    let (again, summary) = AllocationApplier::new(StorageSide::Source).apply(&updated, &results);
    assert_eq!(again.rows(), updated.rows());
    assert!(!summary.has_changes());
}

#[test]
fn test_unbalanced_result_is_written_and_reported() {
    let table = Table::from_rows(vec![line("r1", "ITEM-A", 10.0)]).unwrap();

    // 主库位 6 + 追加 3，与需求 10 不一致
    let mut unbalanced = result("r1", &[("A", 6.0), ("B", 3.0)]);
    unbalanced.total_qty = 10.0;

    let (updated, summary) = AllocationApplier::new(StorageSide::Source).apply(&table, &[unbalanced]);

    assert_eq!(updated.len(), 2);
    assert_eq!(updated.get("r1").unwrap().source_storage.as_deref(), Some("A"));
    assert_eq!(updated.get("r1").unwrap().stock_qty, 6.0);
    assert_eq!(updated.rows()[1].source_storage.as_deref(), Some("B"));
    assert_eq!(summary.unbalanced, vec!["r1".to_string()]);
    assert_eq!(summary.rows_updated, 1);
    assert_eq!(updated.split_group_stock_qty("r1"), 9.0);
}

#[test]
fn test_invalid_additional_allocations_are_skipped() {
    let table = Table::from_rows(vec![line("r1", "ITEM-A", 10.0), line("r2", "ITEM-A", 5.0)]).unwrap();

    let (updated, summary) = AllocationApplier::new(StorageSide::Source).apply(
        &table,
        &[
            result("r1", &[("A", 6.0), (" ", 2.0), ("B", 4.0)]),
            result("r2", &[("C", 5.0), ("D", 0.0), ("E", -1.0)]),
        ],
    );

    // r1 只追加 B；r2 不追加任何行
    assert_eq!(updated.len(), 3);
    assert_eq!(updated.rows()[2].source_storage.as_deref(), Some("B"));
    assert_eq!(updated.get("r2").unwrap().source_storage.as_deref(), Some("C"));
    assert_eq!(summary.rows_added, 1);
    assert_eq!(summary.malformed, vec!["r2".to_string(), "r1".to_string()]);
    assert!(!summary.storages_touched.contains(" "));
    assert!(!summary.storages_touched.contains("D"));
    assert!(updated
        .rows()
        .iter()
        .all(|row| row.source_storage.as_deref().is_some_and(|s| !s.trim().is_empty())));
}

#[test]
fn test_builder_allocator_applier_chain() {
    let env = TestEnv::new().unwrap();
    env.seed(&[receipt("ITEM-A", "A", 6.0, 1), receipt("ITEM-A", "B", 8.0, 2)]);

    let mut manual = line("r2", "ITEM-A", 3.0);
    manual.set_storage_manually(StorageSide::Source, "HAND");
    let table = Table::from_rows(vec![line("r1", "ITEM-A", 10.0), manual]).unwrap();

    let request = AllocationRequestBuilder::new(StorageSide::Source).build(&table);
    assert_eq!(request.items.len(), 1);

    let results = env
        .state
        .allocator
        .allocate_storage_for_pick_list(&request, PickingStrategy::Fifo)
        .unwrap();
    let (updated, _) = AllocationApplier::new(StorageSide::Source).apply(&table, &results);

    assert_eq!(updated.len(), 3);
    assert_eq!(updated.get("r1").unwrap().source_storage.as_deref(), Some("A"));
    assert_eq!(updated.rows()[2].source_storage.as_deref(), Some("B"));
    assert_eq!(updated.rows()[2].stock_qty, 4.0);
    assert_eq!(updated.get("r2").unwrap().source_storage.as_deref(), Some("HAND"));
}
