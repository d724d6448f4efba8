// ==========================================
// 库位分配系统 - 引擎层事件发布
// ==========================================
// 职责: 定义分配事件发布 trait，向宿主界面报告分配结果
// 说明: Engine 层定义 trait，宿主（界面/CLI）实现适配器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 分配事件类型
// ==========================================

/// 分配事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEventType {
    /// 分配结果已回写
    Applied,
    /// 请求行均无可用库存
    NoAllocationFound,
    /// 分配服务失败（明细表未改动）
    Failed,
    /// 默认库位已填入
    DefaultsApplied,
}

impl AllocationEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AllocationEventType::Applied => "Applied",
            AllocationEventType::NoAllocationFound => "NoAllocationFound",
            AllocationEventType::Failed => "Failed",
            AllocationEventType::DefaultsApplied => "DefaultsApplied",
        }
    }
}

/// 分配事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEvent {
    /// 单据编号
    pub document: String,
    pub event_type: AllocationEventType,
    /// 用户可读消息（已本地化）
    pub message: String,
    /// 涉及的行（Failed 时为空）
    pub row_keys: Vec<String>,
}

impl AllocationEvent {
    pub fn new(
        document: impl Into<String>,
        event_type: AllocationEventType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            document: document.into(),
            event_type,
            message: message.into(),
            row_keys: Vec::new(),
        }
    }

    pub fn with_rows(mut self, row_keys: Vec<String>) -> Self {
        self.row_keys = row_keys;
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 分配事件发布者 Trait
///
/// # 返回
/// - `Ok(id)`: 通知 ID（如果支持）或空字符串
/// - `Err`: 发布失败（不影响明细表）
pub trait AllocationEventPublisher: Send + Sync {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl AllocationEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - document={}, event_type={}",
            event.document,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 记录型发布者（CLI 汇总输出、测试断言）
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<AllocationEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收到的事件快照
    pub fn events(&self) -> Vec<AllocationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, event_type: AllocationEventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AllocationEventPublisher for RecordingEventPublisher {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| format!("锁获取失败: {}", e))?;
        events.push(event);
        Ok(events.len().to_string())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn AllocationEventPublisher>> 的使用；发布失败只记日志
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn AllocationEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn AllocationEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn publish(&self, event: AllocationEvent) {
        match &self.inner {
            Some(publisher) => {
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!(error = %e, "分配事件发布失败");
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - document={}, event_type={}",
                    event.document,
                    event.event_type.as_str()
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
