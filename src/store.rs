//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 存储抽象层
//!
//! 定义缓存层调用的底层存储接口，以及一个按会话隔离未提交写入的内存实现。

use crate::cache::key::RowBounds;
use crate::error::StoreError;
use crate::statement::StatementDescriptor;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// 一次语句调用
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// 发起调用的会话
    pub session_id: Uuid,
    pub statement: &'a StatementDescriptor,
    pub params: &'a Value,
    pub bounds: Option<RowBounds>,
}

/// 交给存储执行的操作
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Read(Invocation<'a>),
    Write(Invocation<'a>),
    /// 批量写入，结果为逐条结果组成的数组
    Batch(&'a [Invocation<'a>]),
}

impl Operation<'_> {
    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match self {
            Operation::Read(invocation) => format!("READ {}", invocation.statement.id()),
            Operation::Write(invocation) => format!("WRITE {}", invocation.statement.id()),
            Operation::Batch(batch) => format!("BATCH x{}", batch.len()),
        }
    }
}

/// 存储接口
#[async_trait]
pub trait Store: Send + Sync {
    /// 执行读语句
    async fn execute_read(&self, invocation: &Invocation<'_>) -> Result<Value, StoreError>;

    /// 执行写语句
    async fn execute_write(&self, invocation: &Invocation<'_>) -> Result<Value, StoreError>;

    /// 批量执行写语句
    async fn execute_batch(&self, batch: &[Invocation<'_>]) -> Result<Vec<Value>, StoreError> {
        let mut results = Vec::with_capacity(batch.len());
        for invocation in batch {
            results.push(self.execute_write(invocation).await?);
        }
        Ok(results)
    }

    /// 提交会话的写入
    async fn commit(&self, _session_id: Uuid) -> Result<(), StoreError> {
        Ok(())
    }

    /// 回滚会话的写入
    async fn rollback(&self, _session_id: Uuid) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Upsert { table: String, id: i64, row: Value },
    Delete { table: String, id: i64 },
}

/// 存储调用计数
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl StoreStats {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

/// 内存存储实现
///
/// 每个命名空间一张表，行以整数 `id` 为主键。约定：
/// - 读语句参数带 `id` 时返回单行（不存在为 `null`），否则返回按其余标量参数
///   过滤后的全部行，并应用分页边界
/// - 写语句名以 `delete` 开头时按 `id` 删除，否则按 `id` 合并写入，缺少 `id`
///   时自动分配
///
/// 写入在提交前只对发起的会话可见。
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, BTreeMap<i64, Value>>,
    pending: DashMap<Uuid, Vec<PendingWrite>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    stats: StoreStats,
}

impl MemoryStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入已提交的行
    pub fn seed(&self, namespace: &str, row: Value) -> Result<(), StoreError> {
        let id = row_id(&row)?
            .ok_or_else(|| StoreError::QueryError("种子数据缺少 id".to_string()))?;
        self.tables
            .entry(namespace.to_string())
            .or_default()
            .insert(id, row);
        Ok(())
    }

    /// 之后的读操作全部失败
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 之后的写操作全部失败
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// 已提交的行
    pub fn committed_row(&self, namespace: &str, id: i64) -> Option<Value> {
        self.tables.get(namespace)?.get(&id).cloned()
    }

    /// 会话可见的表：已提交数据加上该会话未提交的写入
    fn visible_table(&self, session_id: Uuid, table: &str) -> BTreeMap<i64, Value> {
        let mut rows = self
            .tables
            .get(table)
            .map(|t| t.value().clone())
            .unwrap_or_default();
        if let Some(pending) = self.pending.get(&session_id) {
            for write in pending.value() {
                apply(&mut rows, table, write);
            }
        }
        rows
    }
}

fn apply(rows: &mut BTreeMap<i64, Value>, table: &str, write: &PendingWrite) {
    match write {
        PendingWrite::Upsert {
            table: target,
            id,
            row,
        } if target == table => {
            let merged = match (rows.remove(id), row) {
                (Some(Value::Object(mut existing)), Value::Object(update)) => {
                    for (field, value) in update {
                        existing.insert(field.clone(), value.clone());
                    }
                    Value::Object(existing)
                }
                _ => row.clone(),
            };
            rows.insert(*id, merged);
        }
        PendingWrite::Delete { table: target, id } if target == table => {
            rows.remove(id);
        }
        _ => {}
    }
}

fn row_id(value: &Value) -> Result<Option<i64>, StoreError> {
    match value.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(id) => id
            .as_i64()
            .map(Some)
            .ok_or_else(|| StoreError::QueryError(format!("id 必须是整数: {}", id))),
    }
}

fn matches_filter(row: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(field, expected)| {
        if expected.is_object() || expected.is_array() {
            return true;
        }
        row.get(field) == Some(expected)
    })
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute_read(&self, invocation: &Invocation<'_>) -> Result<Value, StoreError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError("读操作被注入失败".to_string()));
        }

        let table = self.visible_table(invocation.session_id, invocation.statement.namespace());
        // 标量参数直接视为主键
        let id = match invocation.params.as_i64() {
            Some(id) => Some(id),
            None => row_id(invocation.params)?,
        };
        if let Some(id) = id {
            return Ok(table.get(&id).cloned().unwrap_or(Value::Null));
        }

        let empty = Map::new();
        let filter = invocation.params.as_object().unwrap_or(&empty);
        let rows = table.into_values().filter(|row| matches_filter(row, filter));
        let rows: Vec<Value> = match invocation.bounds {
            Some(bounds) => rows
                .skip(bounds.offset as usize)
                .take(bounds.limit as usize)
                .collect(),
            None => rows.collect(),
        };
        Ok(Value::Array(rows))
    }

    async fn execute_write(&self, invocation: &Invocation<'_>) -> Result<Value, StoreError> {
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectionError("写操作被注入失败".to_string()));
        }

        let table = invocation.statement.namespace().to_string();
        let visible = self.visible_table(invocation.session_id, &table);

        let write = if invocation.statement.name().starts_with("delete") {
            let id = row_id(invocation.params)?
                .ok_or_else(|| StoreError::QueryError("删除操作缺少 id".to_string()))?;
            if !visible.contains_key(&id) {
                return Ok(Value::from(0));
            }
            PendingWrite::Delete { table, id }
        } else {
            let id = match row_id(invocation.params)? {
                Some(id) => id,
                None => visible.keys().next_back().map_or(1, |max| max + 1),
            };
            let mut row = invocation.params.clone();
            if let Value::Object(fields) = &mut row {
                fields.insert("id".to_string(), Value::from(id));
            }
            PendingWrite::Upsert { table, id, row }
        };

        self.pending
            .entry(invocation.session_id)
            .or_default()
            .push(write);
        Ok(Value::from(1))
    }

    async fn commit(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.stats.commits.fetch_add(1, Ordering::SeqCst);
        let Some((_, writes)) = self.pending.remove(&session_id) else {
            return Ok(());
        };
        for write in &writes {
            let table = match write {
                PendingWrite::Upsert { table, .. } | PendingWrite::Delete { table, .. } => table,
            };
            let mut rows = self.tables.entry(table.clone()).or_default();
            apply(&mut rows, table, write);
        }
        Ok(())
    }

    async fn rollback(&self, session_id: Uuid) -> Result<(), StoreError> {
        self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.pending.remove(&session_id);
        Ok(())
    }
}
