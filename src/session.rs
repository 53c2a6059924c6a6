//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 会话模块
//!
//! [`SessionFactory`] 持有全部会话共享的状态：语句注册表、二级缓存集合、
//! 存储和拦截器链。每个 [`Session`] 是一个工作单元，独占一个一级缓存，
//! 可变 API 全部取 `&mut self`，同一时刻只能被一个调用方使用。
//!
//! # 示例
//!
//! ```rust
//! use mappercache::config::MapperConfig;
//! use mappercache::session::SessionFactory;
//! use mappercache::store::MemoryStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), mappercache::error::MapperError> {
//! let config = MapperConfig::from_yaml_str(r#"
//! namespaces:
//!   - name: emp
//!     cache: {}
//! statements:
//!   - id: emp.getEmpById
//!     kind: READ
//! "#)?;
//! let store = Arc::new(MemoryStore::new());
//! store.seed("emp", json!({"id": 1, "name": "Tom"}))?;
//!
//! let factory = SessionFactory::new(&config, store)?;
//! let mut session = factory.open_session();
//! let emp = session.execute("emp.getEmpById", &json!({"id": 1})).await?;
//! assert_eq!(emp["name"], "Tom");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::cache::key::{CacheKey, RowBounds};
use crate::cache::local::LocalCache;
use crate::cache::namespace::NamespaceCacheSet;
use crate::config::{ClosePolicy, ExecutorType, MapperConfig, Settings};
use crate::constants::{BATCH_PENDING_RESULT, NAMESPACE_SEPARATOR};
use crate::coordinator::{CacheCoordinator, CacheLookup, PromotionReport};
use crate::error::MapperError;
use crate::interceptor::InterceptorChain;
use crate::statement::{StatementDescriptor, StatementKind, StatementRegistry};
use crate::store::{Invocation, Operation, Store};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ============================================================================
// 会话工厂
// ============================================================================

/// 会话工厂
pub struct SessionFactory {
    registry: Arc<StatementRegistry>,
    caches: Arc<NamespaceCacheSet>,
    settings: Settings,
    store: Arc<dyn Store>,
    interceptors: Arc<InterceptorChain>,
}

impl SessionFactory {
    /// 从配置构建工厂
    ///
    /// 配置在这里校验，有误时返回 [`MapperError::ConfigError`]。
    pub fn new(config: &MapperConfig, store: Arc<dyn Store>) -> Result<Self, MapperError> {
        Self::with_interceptors(config, store, InterceptorChain::new())
    }

    /// 从配置构建工厂，并在每次存储调用外包裹拦截器链
    pub fn with_interceptors(
        config: &MapperConfig,
        store: Arc<dyn Store>,
        interceptors: InterceptorChain,
    ) -> Result<Self, MapperError> {
        let registry = StatementRegistry::from_config(config)?;
        let caches = NamespaceCacheSet::new(
            registry
                .cache_configs()
                .map(|(name, cache)| (name.to_string(), cache.clone())),
        );

        info!(
            "会话工厂已创建: 语句 {} 条, 二级缓存 {}, 拦截器 {:?}",
            registry.len(),
            if config.settings.cache_enabled {
                "开启"
            } else {
                "关闭"
            },
            interceptors.names()
        );

        Ok(Self {
            registry: Arc::new(registry),
            caches: Arc::new(caches),
            settings: config.settings.clone(),
            store,
            interceptors: Arc::new(interceptors),
        })
    }

    pub fn registry(&self) -> &Arc<StatementRegistry> {
        &self.registry
    }

    /// 全部会话共享的二级缓存
    pub fn caches(&self) -> &Arc<NamespaceCacheSet> {
        &self.caches
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// 以默认设置打开会话
    pub fn open_session(&self) -> Session {
        self.open_session_with(SessionOptions::from_settings(&self.settings))
    }

    /// 以指定选项打开会话
    pub fn open_session_with(&self, options: SessionOptions) -> Session {
        let id = Uuid::new_v4();
        debug!(
            "打开会话: id={}, executor={:?}, auto_commit={}",
            id, options.executor_type, options.auto_commit
        );
        Session {
            id,
            registry: Arc::clone(&self.registry),
            coordinator: CacheCoordinator::new(
                Arc::clone(&self.caches),
                self.settings.cache_enabled,
                self.settings.local_cache_scope,
            ),
            store: Arc::clone(&self.store),
            interceptors: Arc::clone(&self.interceptors),
            local: LocalCache::new(),
            executor_type: options.executor_type,
            auto_commit: options.auto_commit,
            close_policy: self.settings.close_policy,
            batch: Vec::new(),
            uncommitted_flushes: Vec::new(),
            dirty: false,
            closed: false,
        }
    }
}

/// 打开会话时的选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub executor_type: ExecutorType,
    pub auto_commit: bool,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            executor_type: settings.default_executor_type,
            auto_commit: settings.auto_commit,
        }
    }

    pub fn executor_type(mut self, executor_type: ExecutorType) -> Self {
        self.executor_type = executor_type;
        self
    }

    pub fn auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }
}

// ============================================================================
// 会话
// ============================================================================

/// 批量执行器中排队的写语句
struct QueuedWrite {
    statement: Arc<StatementDescriptor>,
    params: Value,
}

/// 工作单元
///
/// 关闭后所有操作都返回 [`MapperError::InvalidState`]。没有调用
/// [`Session::close`] 就丢弃的会话不会提升任何缓存条目。
pub struct Session {
    id: Uuid,
    registry: Arc<StatementRegistry>,
    coordinator: CacheCoordinator,
    store: Arc<dyn Store>,
    interceptors: Arc<InterceptorChain>,
    local: LocalCache,
    executor_type: ExecutorType,
    auto_commit: bool,
    close_policy: ClosePolicy,
    batch: Vec<QueuedWrite>,
    /// 未提交的写入刷新过的二级缓存实例，提交时再清空一次
    uncommitted_flushes: Vec<String>,
    /// 存储中有未提交的写入
    dirty: bool,
    closed: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 是否有未提交（或尚未发送的批量）写入
    pub fn is_dirty(&self) -> bool {
        self.dirty || !self.batch.is_empty()
    }

    pub fn executor_type(&self) -> ExecutorType {
        self.executor_type
    }

    /// 批量执行器中排队的写语句数
    pub fn pending_writes(&self) -> usize {
        self.batch.len()
    }

    /// 本会话的一级缓存
    pub fn local_cache(&self) -> &LocalCache {
        &self.local
    }

    fn ensure_open(&self) -> Result<(), MapperError> {
        if self.closed {
            return Err(MapperError::InvalidState(format!("会话 {} 已关闭", self.id)));
        }
        Ok(())
    }

    /// 执行语句
    ///
    /// 读语句依次查一级缓存、二级缓存，最后访问存储；写语句访问存储后按
    /// `flush_cache` 失效缓存，返回存储的结果。
    pub async fn execute(&mut self, statement_id: &str, params: &Value) -> Result<Value, MapperError> {
        self.execute_with_bounds(statement_id, params, None).await
    }

    /// 带分页边界执行语句，边界是缓存键的一部分；写语句忽略边界
    #[instrument(skip(self, params), fields(session = %self.id))]
    pub async fn execute_with_bounds(
        &mut self,
        statement_id: &str,
        params: &Value,
        bounds: Option<RowBounds>,
    ) -> Result<Value, MapperError> {
        self.ensure_open()?;
        let statement = self.registry.get(statement_id)?;
        match statement.kind() {
            StatementKind::Read => self.read(&statement, params, bounds).await,
            StatementKind::Write => self.write(&statement, params).await,
        }
    }

    async fn read(
        &mut self,
        statement: &StatementDescriptor,
        params: &Value,
        bounds: Option<RowBounds>,
    ) -> Result<Value, MapperError> {
        // 读之前先把排队的写发出去，保证读到自己的写入
        self.flush_batch().await?;

        let key = CacheKey::new(statement.id(), params, bounds);
        if let CacheLookup::Hit { value, source } =
            self.coordinator.lookup(&mut self.local, statement, &key)
        {
            debug!("缓存命中({}): {}", source, key);
            return Ok(value);
        }

        let invocation = Invocation {
            session_id: self.id,
            statement,
            params,
            bounds,
        };
        let value = self
            .interceptors
            .proceed(self.store.as_ref(), &Operation::Read(invocation))
            .await?;

        self.coordinator
            .complete_read(&mut self.local, statement, key, &value);
        Ok(value)
    }

    async fn write(
        &mut self,
        statement: &Arc<StatementDescriptor>,
        params: &Value,
    ) -> Result<Value, MapperError> {
        if self.executor_type == ExecutorType::Batch {
            self.batch.push(QueuedWrite {
                statement: Arc::clone(statement),
                params: params.clone(),
            });
            debug!("写语句进入批量队列: {} (共 {} 条)", statement.id(), self.batch.len());
            return Ok(BATCH_PENDING_RESULT);
        }

        let invocation = Invocation {
            session_id: self.id,
            statement,
            params,
            bounds: None,
        };
        let value = self
            .interceptors
            .proceed(self.store.as_ref(), &Operation::Write(invocation))
            .await?;

        self.coordinator.complete_write(&mut self.local, statement);
        self.remember_flush(statement);
        self.after_write().await?;
        Ok(value)
    }

    async fn after_write(&mut self) -> Result<(), MapperError> {
        if self.auto_commit {
            self.store.commit(self.id).await?;
            self.uncommitted_flushes.clear();
        } else {
            self.dirty = true;
        }
        Ok(())
    }

    fn remember_flush(&mut self, statement: &StatementDescriptor) {
        if !statement.flush_cache() {
            return;
        }
        for target in statement.flush_targets() {
            if !self.uncommitted_flushes.contains(target) {
                self.uncommitted_flushes.push(target.clone());
            }
        }
    }

    /// 存储提交后再次清空未提交期间刷新过的二级缓存
    fn publish_flushes(&mut self) {
        if self.uncommitted_flushes.is_empty() {
            return;
        }
        let targets = std::mem::take(&mut self.uncommitted_flushes);
        self.coordinator.clear_namespaces(&targets);
    }

    /// 发送批量队列中的写语句，返回逐条结果
    pub async fn flush_statements(&mut self) -> Result<Vec<Value>, MapperError> {
        self.ensure_open()?;
        self.flush_batch().await
    }

    async fn flush_batch(&mut self) -> Result<Vec<Value>, MapperError> {
        if self.batch.is_empty() {
            return Ok(Vec::new());
        }

        let queued = std::mem::take(&mut self.batch);
        let invocations: Vec<Invocation<'_>> = queued
            .iter()
            .map(|write| Invocation {
                session_id: self.id,
                statement: &write.statement,
                params: &write.params,
                bounds: None,
            })
            .collect();

        let result = self
            .interceptors
            .proceed(self.store.as_ref(), &Operation::Batch(&invocations))
            .await;
        let results = match result {
            Ok(Value::Array(results)) => results,
            Ok(other) => vec![other],
            Err(e) => {
                // 失败前的写入可能已进入存储事务，按全部已写入处理
                warn!("批量写入失败, 共 {} 条语句, 会话保留未提交状态: {}", queued.len(), e);
                self.local.clear();
                for write in &queued {
                    self.coordinator
                        .invalidate_unconfirmed(&mut self.local, &write.statement);
                    self.remember_flush(&write.statement);
                }
                self.dirty = true;
                return Err(e.into());
            }
        };

        for write in &queued {
            self.coordinator.complete_write(&mut self.local, &write.statement);
            self.remember_flush(&write.statement);
        }
        debug!("批量写入完成: {} 条", queued.len());
        self.after_write().await?;
        Ok(results)
    }

    /// 提交
    ///
    /// 先发送排队的写语句并提交存储，再次清空本次事务刷新过的二级缓存，
    /// 然后把一级缓存中仍有效的条目提升到二级缓存。会话保持打开。
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn commit(&mut self) -> Result<PromotionReport, MapperError> {
        self.ensure_open()?;
        self.flush_batch().await?;
        if self.dirty {
            self.store.commit(self.id).await?;
            self.dirty = false;
        }
        self.publish_flushes();
        let report = self.coordinator.promote(&mut self.local);
        info!("会话已提交, 提升 {} 条缓存", report.promoted);
        Ok(report)
    }

    /// 回滚
    ///
    /// 丢弃排队的写语句，回滚存储并清空一级缓存。
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn rollback(&mut self) -> Result<(), MapperError> {
        self.ensure_open()?;
        self.discard_writes().await
    }

    async fn discard_writes(&mut self) -> Result<(), MapperError> {
        self.batch.clear();
        self.uncommitted_flushes.clear();
        self.local.clear();
        if self.dirty {
            self.store.rollback(self.id).await?;
            self.dirty = false;
        }
        debug!("会话已回滚");
        Ok(())
    }

    /// 关闭会话
    ///
    /// 存在未提交写入时按配置的 [`ClosePolicy`] 提交或回滚，然后提升仍然
    /// 有效的一级缓存条目并释放一级缓存。重复关闭返回
    /// [`MapperError::InvalidState`]，不会再次提升。
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn close(&mut self) -> Result<PromotionReport, MapperError> {
        self.ensure_open()?;
        let result = self.finish().await;
        self.closed = true;
        self.batch.clear();
        self.local = LocalCache::new();
        result
    }

    async fn finish(&mut self) -> Result<PromotionReport, MapperError> {
        if self.is_dirty() {
            match self.close_policy {
                ClosePolicy::Commit => {
                    self.flush_batch().await?;
                    if self.dirty {
                        self.store.commit(self.id).await?;
                        self.dirty = false;
                    }
                    self.publish_flushes();
                }
                ClosePolicy::Rollback => {
                    warn!("会话关闭时存在未提交写入, 已回滚");
                    self.discard_writes().await?;
                }
            }
        }
        let report = self.coordinator.promote(&mut self.local);
        info!("会话已关闭, 提升 {} 条缓存", report.promoted);
        Ok(report)
    }

    /// 清空本会话的一级缓存，不影响二级缓存
    pub fn clear_cache(&mut self) -> Result<(), MapperError> {
        self.ensure_open()?;
        self.local.clear();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // 按语句类型分派
    // ------------------------------------------------------------------------

    fn expect_kind(
        &self,
        statement_id: &str,
        expected: StatementKind,
    ) -> Result<(), MapperError> {
        let statement = self.registry.get(statement_id)?;
        if statement.kind() != expected {
            return Err(MapperError::StatementKindMismatch {
                statement: statement_id.to_string(),
                expected: expected.to_string(),
                actual: statement.kind().to_string(),
            });
        }
        Ok(())
    }

    /// 执行读语句并把结果展开为行列表
    pub async fn select(&mut self, statement_id: &str, params: &Value) -> Result<Vec<Value>, MapperError> {
        self.select_page(statement_id, params, None).await
    }

    /// 带分页边界执行读语句
    pub async fn select_page(
        &mut self,
        statement_id: &str,
        params: &Value,
        bounds: Option<RowBounds>,
    ) -> Result<Vec<Value>, MapperError> {
        self.ensure_open()?;
        self.expect_kind(statement_id, StatementKind::Read)?;
        let value = self.execute_with_bounds(statement_id, params, bounds).await?;
        Ok(into_rows(value))
    }

    /// 执行读语句，期望至多一行
    ///
    /// 多于一行时返回 [`MapperError::TooManyResults`]。
    pub async fn select_one(&mut self, statement_id: &str, params: &Value) -> Result<Option<Value>, MapperError> {
        let mut rows = self.select(statement_id, params).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(MapperError::TooManyResults(n)),
        }
    }

    /// 执行读语句，把唯一结果反序列化为 `T`
    pub async fn select_as<T: DeserializeOwned>(
        &mut self,
        statement_id: &str,
        params: &Value,
    ) -> Result<Option<T>, MapperError> {
        match self.select_one(statement_id, params).await? {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// 执行写语句
    pub async fn update(&mut self, statement_id: &str, params: &Value) -> Result<Value, MapperError> {
        self.ensure_open()?;
        self.expect_kind(statement_id, StatementKind::Write)?;
        self.execute(statement_id, params).await
    }

    /// 绑定到一个命名空间的映射器
    pub fn mapper(&mut self, namespace: impl Into<String>) -> Mapper<'_> {
        Mapper {
            session: self,
            namespace: namespace.into(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed && self.is_dirty() {
            warn!("会话 {} 未关闭即被丢弃, 未提交的写入不会提交", self.id);
        }
    }
}

/// 读结果展开为行：数组逐项，`null` 为空，其余为单行
fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        row => vec![row],
    }
}

// ============================================================================
// 映射器
// ============================================================================

/// 绑定到命名空间的映射器，按语句名调用
pub struct Mapper<'s> {
    session: &'s mut Session,
    namespace: String,
}

impl Mapper<'_> {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn statement_id(&self, name: &str) -> String {
        format!("{}{}{}", self.namespace, NAMESPACE_SEPARATOR, name)
    }

    pub async fn select(&mut self, name: &str, params: &Value) -> Result<Vec<Value>, MapperError> {
        let id = self.statement_id(name);
        self.session.select(&id, params).await
    }

    pub async fn select_page(
        &mut self,
        name: &str,
        params: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>, MapperError> {
        let id = self.statement_id(name);
        self.session.select_page(&id, params, Some(bounds)).await
    }

    pub async fn select_one(&mut self, name: &str, params: &Value) -> Result<Option<Value>, MapperError> {
        let id = self.statement_id(name);
        self.session.select_one(&id, params).await
    }

    pub async fn select_as<T: DeserializeOwned>(
        &mut self,
        name: &str,
        params: &Value,
    ) -> Result<Option<T>, MapperError> {
        let id = self.statement_id(name);
        self.session.select_as(&id, params).await
    }

    pub async fn update(&mut self, name: &str, params: &Value) -> Result<Value, MapperError> {
        let id = self.statement_id(name);
        self.session.update(&id, params).await
    }
}
