// ==========================================
// 库位分配系统 - 领域类型定义
// ==========================================
// 职责: 单据类型、出入库用途、拣货策略等枚举
// 序列化格式: 与 ERP 侧保持一致的显示名称
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 单据类型 (Document Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    #[serde(rename = "Pick List")]
    PickList,
    #[serde(rename = "Stock Entry")]
    StockEntry,
    #[serde(rename = "Delivery Note")]
    DeliveryNote,
    #[serde(rename = "Purchase Order")]
    PurchaseOrder,
}

impl DocType {
    /// 自动分配写入哪一侧库位
    ///
    /// 采购订单是收货方向（目标库位），其余单据从库位发出（来源库位）
    pub fn storage_side(&self) -> StorageSide {
        match self {
            DocType::PurchaseOrder => StorageSide::Target,
            DocType::PickList | DocType::StockEntry | DocType::DeliveryNote => StorageSide::Source,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::PickList => "Pick List",
            DocType::StockEntry => "Stock Entry",
            DocType::DeliveryNote => "Delivery Note",
            DocType::PurchaseOrder => "Purchase Order",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 库位方向 (Storage Side)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageSide {
    Source, // 来源库位 (storage)
    Target, // 目标库位 (to_storage)
}

// ==========================================
// 库存凭证用途 (Stock Entry Purpose)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEntryPurpose {
    #[serde(rename = "Material Issue")]
    MaterialIssue,
    #[serde(rename = "Material Receipt")]
    MaterialReceipt,
    #[serde(rename = "Material Transfer")]
    MaterialTransfer,
    #[serde(rename = "Material Transfer for Manufacture")]
    MaterialTransferForManufacture,
    #[serde(rename = "Material Consumption for Manufacture")]
    MaterialConsumptionForManufacture,
    #[serde(rename = "Manufacture")]
    Manufacture,
    #[serde(rename = "Repack")]
    Repack,
    #[serde(rename = "Send to Subcontractor")]
    SendToSubcontractor,
    #[serde(rename = "Disassemble")]
    Disassemble,
}

impl fmt::Display for StockEntryPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StockEntryPurpose::MaterialIssue => "Material Issue",
            StockEntryPurpose::MaterialReceipt => "Material Receipt",
            StockEntryPurpose::MaterialTransfer => "Material Transfer",
            StockEntryPurpose::MaterialTransferForManufacture => {
                "Material Transfer for Manufacture"
            }
            StockEntryPurpose::MaterialConsumptionForManufacture => {
                "Material Consumption for Manufacture"
            }
            StockEntryPurpose::Manufacture => "Manufacture",
            StockEntryPurpose::Repack => "Repack",
            StockEntryPurpose::SendToSubcontractor => "Send to Subcontractor",
            StockEntryPurpose::Disassemble => "Disassemble",
        };
        f.write_str(s)
    }
}

// ==========================================
// 拣货策略 (Picking Strategy)
// ==========================================
// 决定候选库位的排序: 先进先出 / 后进先出 / 效期优先
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickingStrategy {
    #[default]
    Fifo,
    Lifo,
    Expiry,
}

impl fmt::Display for PickingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickingStrategy::Fifo => write!(f, "FIFO"),
            PickingStrategy::Lifo => write!(f, "LIFO"),
            PickingStrategy::Expiry => write!(f, "EXPIRY"),
        }
    }
}

impl FromStr for PickingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FIFO" => Ok(PickingStrategy::Fifo),
            "LIFO" => Ok(PickingStrategy::Lifo),
            "EXPIRY" | "FEFO" => Ok(PickingStrategy::Expiry),
            other => Err(format!("未知拣货策略: {}", other)),
        }
    }
}

// ==========================================
// 监听模式 (Watch Mode)
// ==========================================
// COMPLETION: 行生成方通知完成后再观察（默认）
// POLLING: 对无完成信号的行生成方，按固定间隔轮询行数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchMode {
    #[default]
    Completion,
    Polling,
}

impl FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COMPLETION" => Ok(WatchMode::Completion),
            "POLLING" => Ok(WatchMode::Polling),
            other => Err(format!("未知监听模式: {}", other)),
        }
    }
}
