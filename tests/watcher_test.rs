// ==========================================
// WatchSession 集成测试
// ==========================================
// 测试范围:
// 1. 完成信号模式: 0→5 行增长触发一次分配
// 2. 人工拣货模式: 不触发
// 3. 轮询模式: 间隔 + 稳定等待后触发一次（等待期间新增的行并入同一次）
// 4. 会话结束后不再触发
// 5. 服务失败: 发布 Failed 事件，明细表不变，会话继续
// ==========================================


use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage_allocation::config::WatchConfig;
use storage_allocation::domain::{
    AllocationRequest, AllocationResult, DefaultStorage, DefaultStorageQuery, DocType,
    SharedDocument, StockAllocation, WatchMode,
};
use storage_allocation::engine::{
    AllocationEventType, AllocationPipeline, AllocationService, EngineResult,
    OptionalEventPublisher, RecordingEventPublisher, WatchSession,
};
use storage_allocation::StorageApi;
use test_helpers::*;

/// 计数包装（可模拟失败）
struct CountingService {
    inner: Arc<StorageApi>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingService {
    fn new(inner: Arc<StorageApi>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AllocationService for CountingService {
    async fn allocate_storage_for_pick_list(
        &self,
        request: &AllocationRequest,
    ) -> EngineResult<Vec<AllocationResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("服务不可用".into());
        }
        AllocationService::allocate_storage_for_pick_list(self.inner.as_ref(), request).await
    }

    async fn get_available_stock_for_items(
        &self,
        request: &AllocationRequest,
    ) -> EngineResult<Vec<StockAllocation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AllocationService::get_available_stock_for_items(self.inner.as_ref(), request).await
    }

    async fn get_default_storage_for_items(
        &self,
        queries: &[DefaultStorageQuery],
    ) -> EngineResult<Vec<DefaultStorage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AllocationService::get_default_storage_for_items(self.inner.as_ref(), queries).await
    }
}

struct Fixture {
    env: TestEnv,
    service: Arc<CountingService>,
    recorder: Arc<RecordingEventPublisher>,
    pipeline: Arc<AllocationPipeline>,
    doc: SharedDocument,
}

fn fixture() -> Fixture {
    let env = TestEnv::new().unwrap();
    env.seed(&[receipt("ITEM-A", "A", 100.0, 1)]);

    let service = CountingService::new(env.state.storage_api.clone());
    let recorder = Arc::new(RecordingEventPublisher::new());
    let pipeline = Arc::new(
        AllocationPipeline::new(service.clone(), env.state.settings())
            .with_publisher(OptionalEventPublisher::with_publisher(recorder.clone())),
    );
    let doc = document("PL-0001", DocType::PickList, vec![]).into_shared();

    Fixture {
        env,
        service,
        recorder,
        pipeline,
        doc,
    }
}

/// 模拟行生成方写入 n 行
fn generate_rows(doc: &SharedDocument, n: usize) {
    let mut doc = doc.lock().unwrap();
    let start = doc.items.len();
    for i in start..start + n {
        doc.items
            .push(line(&format!("row-{}", i + 1), "ITEM-A", 2.0))
            .unwrap();
    }
}

fn polling(poll_ms: u64, settle_ms: u64) -> WatchConfig {
    WatchConfig {
        mode: WatchMode::Polling,
        poll_interval: Duration::from_millis(poll_ms),
        settle_delay: Duration::from_millis(settle_ms),
    }
}

#[tokio::test]
async fn test_growth_0_to_5_triggers_once() {
    let f = fixture();
    let session = WatchSession::start(f.doc.clone(), f.pipeline.clone(), WatchConfig::default());
    session.sync().await;

    generate_rows(&f.doc, 5);
    session.rows_generated();
    session.sync().await;

    assert_eq!(f.service.calls(), 1);
    assert_eq!(session.runs(), 1);
    {
        let doc = f.doc.lock().unwrap();
        assert_eq!(doc.items.len(), 5);
        assert!(doc.items.rows().iter().all(|r| r.source_storage.as_deref() == Some("A")));
    }

    // 无增长的重复通知不触发
    session.rows_generated();
    session.sync().await;
    assert_eq!(f.service.calls(), 1);
    assert_eq!(f.recorder.count_of(AllocationEventType::Applied), 1);

    session.stop().await;
}

#[tokio::test]
async fn test_manual_picking_never_triggers() {
    let f = fixture();
    f.doc.lock().unwrap().manual_picking = true;
    let session = WatchSession::start(f.doc.clone(), f.pipeline.clone(), WatchConfig::default());
    session.sync().await;

    generate_rows(&f.doc, 5);
    session.rows_generated();
    session.sync().await;

    assert_eq!(f.service.calls(), 0);
    assert_eq!(session.runs(), 0);
    assert!(f.doc.lock().unwrap().items.rows().iter().all(|r| r.source_storage.is_none()));
    session.stop().await;
}

#[tokio::test]
async fn test_polling_mode_triggers_after_settle() {
    let f = fixture();
    let session = WatchSession::start(f.doc.clone(), f.pipeline.clone(), polling(10, 30));
    session.sync().await;

    generate_rows(&f.doc, 5);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(f.service.calls(), 1);
    assert!(f.doc.lock().unwrap().items.rows().iter().all(|r| r.source_storage.is_some()));
    session.stop().await;
}

#[tokio::test]
async fn test_polling_rows_added_while_settling_run_once() {
    let f = fixture();
    let session = WatchSession::start(f.doc.clone(), f.pipeline.clone(), polling(10, 100));
    session.sync().await;

    generate_rows(&f.doc, 2);
    tokio::time::sleep(Duration::from_millis(40)).await;
    generate_rows(&f.doc, 3);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(f.service.calls(), 1);
    assert_eq!(session.runs(), 1);
    {
        let doc = f.doc.lock().unwrap();
        assert_eq!(doc.items.len(), 5);
        assert!(doc.items.rows().iter().all(|r| r.source_storage.as_deref() == Some("A")));
    }
    session.stop().await;
}

#[tokio::test]
async fn test_dropped_session_stops_polling() {
    let f = fixture();
    let session = WatchSession::start(f.doc.clone(), f.pipeline.clone(), polling(10, 0));
    session.sync().await;
    drop(session);

    generate_rows(&f.doc, 3);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(f.service.calls(), 0);
    assert!(f.doc.lock().unwrap().items.rows().iter().all(|r| r.source_storage.is_none()));
}

#[tokio::test]
async fn test_service_failure_is_reported_and_session_continues() {
    let f = fixture();
    f.service.fail_next.store(true, Ordering::SeqCst);
    let session = WatchSession::start(f.doc.clone(), f.pipeline.clone(), WatchConfig::default());
    session.sync().await;

    generate_rows(&f.doc, 2);
    session.rows_generated();
    session.sync().await;

    assert_eq!(f.recorder.count_of(AllocationEventType::Failed), 1);
    assert!(f.doc.lock().unwrap().items.rows().iter().all(|r| r.source_storage.is_none()));

    // 下一批行生成后重新分配（含上次失败的行）
    generate_rows(&f.doc, 1);
    session.rows_generated();
    session.sync().await;

    assert_eq!(f.service.calls(), 2);
    assert!(f.doc.lock().unwrap().items.rows().iter().all(|r| r.source_storage.is_some()));
    // 分配不过账
    let balance = f
        .env
        .state
        .storage_api
        .storage_balance("ITEM-A", WAREHOUSE, "A")
        .unwrap();
    assert_eq!(balance, 100.0);
    session.stop().await;
}
