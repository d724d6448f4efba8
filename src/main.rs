// ==========================================
// 库位分配系统 - 命令行入口
// ==========================================
// 用法:
//   storage-allocation <db_path> <document.json> [pick_list.json]
//
// 读取单据 JSON，按单据类型执行默认库位与自动分配，
// 向 stdout 输出处理后的单据 JSON；汇总消息写 stderr
//
// 环境变量:
// - STORAGE_ALLOCATION_LANG: 消息语言（zh-CN / en）
// - RUST_LOG: 日志级别
// ==========================================

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use storage_allocation::app::{get_default_db_path, AppState};
use storage_allocation::domain::{DocType, StockDocument};
use storage_allocation::engine::{PipelineOutcome, RecordingEventPublisher, SkipReason};
use storage_allocation::i18n::{self, t, t_with_args};
use storage_allocation::logging;

fn read_document(path: &str) -> Result<StockDocument> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("无法读取单据文件: {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("单据 JSON 格式错误: {}", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    i18n::init_from_env();

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .filter(|s| s != "-")
        .unwrap_or_else(get_default_db_path);
    let doc_path = args
        .next()
        .ok_or_else(|| anyhow!("用法: storage-allocation <db_path> <document.json> [pick_list.json]"))?;
    let pick_list = args.next().map(|p| read_document(&p)).transpose()?;

    tracing::info!("==================================================");
    tracing::info!("{} - 版本 {}", storage_allocation::APP_NAME, storage_allocation::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let mut doc = read_document(&doc_path)?;

    let recorder = Arc::new(RecordingEventPublisher::new());
    let state = AppState::new(db_path)
        .map_err(|e| anyhow!(e))?
        .with_event_publisher(recorder.clone());

    // 1. 库存凭证按用途填默认库位
    if doc.doc_type == DocType::StockEntry && doc.purpose.is_some() {
        let filled = state
            .default_storage_resolver()
            .resolve_stock_entry(&mut doc, pick_list.as_ref())
            .await
            .map_err(|e| anyhow!("默认库位处理失败: {}", e))?;
        if filled > 0 {
            eprintln!(
                "{}",
                t_with_args("default_storage.summary", &[("count", &filled.to_string())])
            );
        }
    }

    // 2. 自动分配
    let shared = doc.into_shared();
    let outcome = state.pipeline().run(&shared).await;
    if outcome == PipelineOutcome::Skipped(SkipReason::ManualPicking) {
        eprintln!("{}", t("allocation.skipped_manual"));
    }
    for event in recorder.events() {
        eprintln!("{}", event.message);
    }

    let doc = shared
        .lock()
        .map_err(|e| anyhow!("单据锁获取失败: {}", e))?
        .clone();
    println!("{}", serde_json::to_string_pretty(&doc)?);

    if let PipelineOutcome::Failed(error) = outcome {
        return Err(anyhow!(t_with_args("allocation.service_failed", &[("error", &error)])));
    }
    Ok(())
}
