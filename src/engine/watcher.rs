// ==========================================
// 库位分配系统 - 明细表监听
// ==========================================
// 职责: 行数增长时触发分配流水线
// 状态机: Idle → Watching ⇄ Triggered
// 模式:
// - COMPLETION（默认）: 行生成方调用 rows_generated() 通知
// - POLLING（回退）: 固定间隔检查行数，增长后等待稳定再触发
// 生命周期: 每个编辑会话一个 WatchSession；stop() 或 Drop 时终止任务
// ==========================================

use crate::config::settings_reader::WatchConfig;
use crate::domain::document::SharedDocument;
use crate::domain::types::WatchMode;
use crate::engine::pipeline::{AllocationPipeline, PipelineOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ==========================================
// TableWatcher - 监听状态机
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Triggered,
}

/// 单次观察的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    /// 行数增长，执行流水线
    Trigger,
    /// 行数增长但处于人工拣货模式
    SuppressedManual,
    /// 行数未增长
    NoChange,
    /// 流水线执行中，稍后重新观察
    Deferred,
    /// 未开始监听
    NotWatching,
}

#[derive(Debug, Clone)]
pub struct TableWatcher {
    state: WatchState,
    last_count: usize,
}

impl Default for TableWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TableWatcher {
    pub fn new() -> Self {
        Self {
            state: WatchState::Idle,
            last_count: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn last_count(&self) -> usize {
        self.last_count
    }

    /// Idle → Watching
    pub fn start(&mut self, initial_count: usize) {
        if self.state == WatchState::Idle {
            self.state = WatchState::Watching;
            self.last_count = initial_count;
        }
    }

    /// 观察当前行数
    pub fn observe(&mut self, count: usize, manual_picking: bool) -> WatchDecision {
        match self.state {
            WatchState::Idle => WatchDecision::NotWatching,
            // 不更新计数，流水线结束后仍能看到增长
            WatchState::Triggered => WatchDecision::Deferred,
            WatchState::Watching => {
                let grown = count > self.last_count;
                self.last_count = count;
                if !grown {
                    WatchDecision::NoChange
                } else if manual_picking {
                    WatchDecision::SuppressedManual
                } else {
                    self.state = WatchState::Triggered;
                    WatchDecision::Trigger
                }
            }
        }
    }

    /// 稳定等待结束时的行数
    ///
    /// 等待期间新增的行随本次流水线一并处理，不再单独触发
    pub fn settled(&mut self, count: usize) {
        if self.state == WatchState::Triggered && count > self.last_count {
            self.last_count = count;
        }
    }

    /// 流水线结束: Triggered → Watching
    ///
    /// appended 为流水线自身追加的拆分行，计入已观察行数
    pub fn complete(&mut self, appended: usize) {
        if self.state == WatchState::Triggered {
            self.state = WatchState::Watching;
            self.last_count += appended;
        }
    }

    pub fn stop(&mut self) {
        self.state = WatchState::Idle;
    }
}

// ==========================================
// WatchSession - 会话级监听任务
// ==========================================

enum WatchSignal {
    RowsGenerated,
    Sync(oneshot::Sender<()>),
    Stop,
}

pub struct WatchSession {
    tx: mpsc::UnboundedSender<WatchSignal>,
    handle: Option<JoinHandle<()>>,
    runs: Arc<AtomicUsize>,
}

impl WatchSession {
    /// 启动监听任务（需在 tokio 运行时内调用）
    pub fn start(doc: SharedDocument, pipeline: Arc<AllocationPipeline>, config: WatchConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let runs = Arc::new(AtomicUsize::new(0));

        let task = SessionTask {
            doc,
            pipeline,
            watcher: TableWatcher::new(),
            runs: runs.clone(),
        };
        let handle = tokio::spawn(task.run(config, rx));

        tracing::info!(mode = ?config.mode, "明细表监听已启动");
        Self {
            tx,
            handle: Some(handle),
            runs,
        }
    }

    /// 行生成完成通知
    pub fn rows_generated(&self) {
        if self.tx.send(WatchSignal::RowsGenerated).is_err() {
            tracing::debug!("监听任务已结束，忽略行生成通知");
        }
    }

    /// 等待此前的通知全部处理完
    pub async fn sync(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WatchSignal::Sync(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// 已执行的流水线次数
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// 停止监听并等待任务退出
    pub async fn stop(mut self) {
        let _ = self.tx.send(WatchSignal::Stop);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "监听任务异常退出");
            }
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct SessionTask {
    doc: SharedDocument,
    pipeline: Arc<AllocationPipeline>,
    watcher: TableWatcher,
    runs: Arc<AtomicUsize>,
}

impl SessionTask {
    async fn run(mut self, config: WatchConfig, mut rx: mpsc::UnboundedReceiver<WatchSignal>) {
        let Some((count, _)) = self.snapshot() else {
            return;
        };
        self.watcher.start(count);

        match config.mode {
            WatchMode::Completion => {
                while let Some(signal) = rx.recv().await {
                    if !self.handle_signal(signal, None).await {
                        break;
                    }
                }
            }
            WatchMode::Polling => {
                let mut ticker = tokio::time::interval(config.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => self.observe(Some(config.settle_delay)).await,
                        signal = rx.recv() => match signal {
                            Some(signal) => {
                                if !self.handle_signal(signal, Some(config.settle_delay)).await {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            }
        }

        self.watcher.stop();
        tracing::info!("明细表监听已停止");
    }

    /// 返回 false 表示结束会话
    async fn handle_signal(&mut self, signal: WatchSignal, settle: Option<Duration>) -> bool {
        match signal {
            WatchSignal::RowsGenerated => {
                self.observe(settle).await;
                true
            }
            WatchSignal::Sync(ack) => {
                let _ = ack.send(());
                true
            }
            WatchSignal::Stop => false,
        }
    }

    fn snapshot(&self) -> Option<(usize, bool)> {
        match self.doc.lock() {
            Ok(doc) => Some((doc.items.len(), doc.manual_picking)),
            Err(e) => {
                tracing::error!(error = %e, "单据锁获取失败");
                None
            }
        }
    }

    async fn observe(&mut self, settle: Option<Duration>) {
        let Some((count, manual_picking)) = self.snapshot() else {
            return;
        };

        match self.watcher.observe(count, manual_picking) {
            WatchDecision::Trigger => {
                tracing::debug!(count, "行数增长，触发分配");
                if let Some(delay) = settle.filter(|d| !d.is_zero()) {
                    tokio::time::sleep(delay).await;
                    if let Some((settled, _)) = self.snapshot() {
                        self.watcher.settled(settled);
                    }
                }
                let outcome = self.pipeline.run(&self.doc).await;
                if let PipelineOutcome::Failed(error) = &outcome {
                    tracing::debug!(error = %error, "本次分配失败，会话继续");
                }
                self.watcher.complete(outcome.rows_added());
                self.runs.fetch_add(1, Ordering::SeqCst);
            }
            WatchDecision::SuppressedManual => {
                tracing::debug!(count, "人工拣货模式，不触发分配");
            }
            WatchDecision::Deferred => {
                tracing::debug!(count, "分配进行中，推迟观察");
            }
            WatchDecision::NoChange | WatchDecision::NotWatching => {}
        }
    }
}
