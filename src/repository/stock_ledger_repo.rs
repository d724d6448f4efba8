// ==========================================
// 库位分配系统 - 库存台账数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（分配/拆分在 engine 层）
// 约束: 所有查询使用参数化
// ==========================================

use crate::domain::ledger::{StockLedgerEntry, StorageBalance};
use crate::domain::types::PickingStrategy;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const POSTING_FMT: &str = "%Y-%m-%d %H:%M:%S";
const CREATION_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// 结存为正的判定阈值
const POSITIVE_QTY: f64 = 1e-9;

// ==========================================
// StockLedgerRepository - 库存台账仓储
// ==========================================
pub struct StockLedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StockLedgerRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 过账一组分录（单事务）
    ///
    /// 出库分录会校验库位结存，结存不足时整组回滚并返回 NegativeStock
    ///
    /// # 返回
    /// - Ok(count): 写入的分录数
    pub fn post_entries(&self, entries: &[StockLedgerEntry]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for entry in entries {
            if entry.actual_qty < 0.0 && entry.has_storage() && !entry.is_cancelled {
                let storage = entry.storage.as_deref().unwrap_or_default();
                let balance =
                    storage_balance_in(&tx, &entry.item_code, &entry.warehouse, storage)?;
                let after = balance + entry.actual_qty;
                if after < -POSITIVE_QTY {
                    return Err(RepositoryError::NegativeStock {
                        item_code: entry.item_code.clone(),
                        warehouse: entry.warehouse.clone(),
                        storage: storage.to_string(),
                        shortfall: after.abs(),
                        voucher_type: entry.voucher_type.clone(),
                        voucher_no: entry.voucher_no.clone(),
                        row_info: entry
                            .voucher_row_idx
                            .map(|idx| format!(" (第 {} 行)", idx))
                            .unwrap_or_default(),
                    });
                }
            }
            insert_entry(&tx, entry)?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(entries.len())
    }

    /// 取消凭证下的全部分录
    pub fn cancel_voucher(&self, voucher_type: &str, voucher_no: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE stock_ledger_entry SET is_cancelled = 1 WHERE voucher_type = ?1 AND voucher_no = ?2",
            params![voucher_type, voucher_no],
        )?;
        Ok(rows)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 查询物料在仓库内各库位的正结存
    ///
    /// # 参数
    /// - strategy: 排序方式（FIFO 按最早过账；LIFO 按最近过账；EXPIRY 按最早效期，无效期排后）
    /// - excluded_storages: 排除的库位
    pub fn storage_balances(
        &self,
        item_code: &str,
        warehouse: &str,
        strategy: PickingStrategy,
        excluded_storages: &[String],
    ) -> RepositoryResult<Vec<StorageBalance>> {
        let conn = self.get_conn()?;

        let order_by = match strategy {
            PickingStrategy::Fifo => "first_posting ASC, first_creation ASC, storage ASC",
            PickingStrategy::Lifo => "last_posting DESC, last_creation DESC, storage ASC",
            PickingStrategy::Expiry => {
                "earliest_expiry IS NULL, earliest_expiry ASC, first_posting ASC, first_creation ASC, storage ASC"
            }
        };

        let sql = format!(
            r#"
            SELECT
                storage,
                SUM(actual_qty) AS available_qty,
                MIN(posting_date || ' ' || posting_time) AS first_posting,
                MAX(posting_date || ' ' || posting_time) AS last_posting,
                MIN(expiry_date) AS earliest_expiry,
                MIN(creation) AS first_creation,
                MAX(creation) AS last_creation
            FROM stock_ledger_entry
            WHERE item_code = ?1
              AND warehouse = ?2
              AND storage IS NOT NULL
              AND storage != ''
              AND is_cancelled = 0
              {}
            GROUP BY storage
            HAVING SUM(actual_qty) > {}
            ORDER BY {}
            "#,
            exclusion_clause(excluded_storages.len(), 3),
            POSITIVE_QTY,
            order_by
        );

        let mut args: Vec<&str> = vec![item_code, warehouse];
        args.extend(excluded_storages.iter().map(String::as_str));

        let mut stmt = conn.prepare(&sql)?;
        let balances = stmt
            .query_map(params_from_iter(args), |row| {
                Ok(StorageBalance {
                    storage: row.get(0)?,
                    available_qty: row.get(1)?,
                    first_posting: parse_posting(&row.get::<_, String>(2)?),
                    last_posting: parse_posting(&row.get::<_, String>(3)?),
                    earliest_expiry: row
                        .get::<_, Option<String>>(4)?
                        .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FMT).ok()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(balances)
    }

    /// 最近一次出现该物料的库位（不要求有结存）
    pub fn last_used_storage(
        &self,
        item_code: &str,
        warehouse: &str,
        excluded_storages: &[String],
    ) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"
            SELECT storage
            FROM stock_ledger_entry
            WHERE item_code = ?1
              AND warehouse = ?2
              AND storage IS NOT NULL
              AND storage != ''
              AND is_cancelled = 0
              {}
            ORDER BY posting_date DESC, posting_time DESC, creation DESC
            LIMIT 1
            "#,
            exclusion_clause(excluded_storages.len(), 3)
        );

        let mut args: Vec<&str> = vec![item_code, warehouse];
        args.extend(excluded_storages.iter().map(String::as_str));

        let storage = conn
            .query_row(&sql, params_from_iter(args), |row| row.get::<_, String>(0))
            .optional()?;
        Ok(storage)
    }

    /// 库位内有结存的批次（按最早过账排序）
    pub fn batch_balances(
        &self,
        item_code: &str,
        warehouse: &str,
        storage: &str,
    ) -> RepositoryResult<Vec<(String, f64)>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT batch_no, SUM(actual_qty)
            FROM stock_ledger_entry
            WHERE item_code = ?1
              AND warehouse = ?2
              AND storage = ?3
              AND batch_no IS NOT NULL
              AND batch_no != ''
              AND is_cancelled = 0
            GROUP BY batch_no
            HAVING SUM(actual_qty) > {}
            ORDER BY MIN(posting_date || ' ' || posting_time), MIN(creation), batch_no
            "#,
            POSITIVE_QTY
        ))?;

        let batches = stmt
            .query_map(params![item_code, warehouse, storage], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// 库位内在库的序列号（按入库顺序，至多 limit 个）
    pub fn serial_nos_in_storage(
        &self,
        item_code: &str,
        warehouse: &str,
        storage: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT serial_no
            FROM stock_ledger_entry
            WHERE item_code = ?1
              AND warehouse = ?2
              AND storage = ?3
              AND serial_no IS NOT NULL
              AND serial_no != ''
              AND is_cancelled = 0
            GROUP BY serial_no
            HAVING SUM(actual_qty) > {}
            ORDER BY MIN(posting_date || ' ' || posting_time), MIN(creation), serial_no
            LIMIT ?4
            "#,
            POSITIVE_QTY
        ))?;

        let serials = stmt
            .query_map(params![item_code, warehouse, storage, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serials)
    }

    /// 单库位结存
    pub fn storage_balance(
        &self,
        item_code: &str,
        warehouse: &str,
        storage: &str,
    ) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        storage_balance_in(&conn, item_code, warehouse, storage)
    }

    /// 按物料/仓库列出未取消的分录（按过账顺序）
    pub fn list_entries(&self, item_code: &str, warehouse: &str) -> RepositoryResult<Vec<StockLedgerEntry>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                name, item_code, warehouse, storage, batch_no, serial_no, actual_qty,
                posting_date, posting_time, creation, expiry_date,
                voucher_type, voucher_no, voucher_detail_no, voucher_row_idx, is_cancelled
            FROM stock_ledger_entry
            WHERE item_code = ?1 AND warehouse = ?2 AND is_cancelled = 0
            ORDER BY posting_date, posting_time, creation
            "#,
        )?;

        let entries = stmt
            .query_map(params![item_code, warehouse], |row| {
                Ok(StockLedgerEntry {
                    name: row.get(0)?,
                    item_code: row.get(1)?,
                    warehouse: row.get(2)?,
                    storage: row.get(3)?,
                    batch_no: row.get(4)?,
                    serial_no: row.get(5)?,
                    actual_qty: row.get(6)?,
                    posting_date: NaiveDate::parse_from_str(&row.get::<_, String>(7)?, DATE_FMT)
                        .unwrap_or_default(),
                    posting_time: chrono::NaiveTime::parse_from_str(
                        &row.get::<_, String>(8)?,
                        TIME_FMT,
                    )
                    .unwrap_or_default(),
                    creation: NaiveDateTime::parse_from_str(&row.get::<_, String>(9)?, CREATION_FMT)
                        .unwrap_or_default(),
                    expiry_date: row
                        .get::<_, Option<String>>(10)?
                        .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FMT).ok()),
                    voucher_type: row.get(11)?,
                    voucher_no: row.get(12)?,
                    voucher_detail_no: row.get(13)?,
                    voucher_row_idx: row.get(14)?,
                    is_cancelled: row.get::<_, i64>(15)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ==========================================
// 内部辅助函数
// ==========================================

/// 生成 "AND storage NOT IN (?n, ...)" 子句
fn exclusion_clause(count: usize, first_param: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let placeholders = (0..count)
        .map(|i| format!("?{}", first_param + i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("AND storage NOT IN ({})", placeholders)
}

fn parse_posting(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, POSTING_FMT).unwrap_or_default()
}

fn storage_balance_in(
    conn: &Connection,
    item_code: &str,
    warehouse: &str,
    storage: &str,
) -> RepositoryResult<f64> {
    let balance: Option<f64> = conn.query_row(
        r#"
        SELECT SUM(actual_qty)
        FROM stock_ledger_entry
        WHERE item_code = ?1 AND warehouse = ?2 AND storage = ?3 AND is_cancelled = 0
        "#,
        params![item_code, warehouse, storage],
        |row| row.get(0),
    )?;
    Ok(balance.unwrap_or(0.0))
}

fn insert_entry(conn: &Connection, entry: &StockLedgerEntry) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO stock_ledger_entry (
            name, item_code, warehouse, storage, batch_no, serial_no, actual_qty,
            posting_date, posting_time, creation, expiry_date,
            voucher_type, voucher_no, voucher_detail_no, voucher_row_idx, is_cancelled
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            entry.name,
            entry.item_code,
            entry.warehouse,
            entry.storage,
            entry.batch_no,
            entry.serial_no,
            entry.actual_qty,
            entry.posting_date.format(DATE_FMT).to_string(),
            entry.posting_time.format(TIME_FMT).to_string(),
            entry.creation.format(CREATION_FMT).to_string(),
            entry.expiry_date.map(|d| d.format(DATE_FMT).to_string()),
            entry.voucher_type,
            entry.voucher_no,
            entry.voucher_detail_no,
            entry.voucher_row_idx,
            entry.is_cancelled as i64,
        ],
    )?;
    Ok(())
}
