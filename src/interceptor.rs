//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 拦截器链模块
//!
//! 在每次存储调用外层按注册顺序包裹拦截器，先注册的在最外层。
//!
//! # 特性
//!
//! - 显式的中间件列表，不依赖动态代理
//! - 每个拦截器拿到 [`Next`]，可以在调用前后插入逻辑，也可以直接短路返回
//! - 读、写、批量写统一经过同一条链

use crate::error::StoreError;
use crate::store::{Operation, Store};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 拦截器
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// 拦截器名称
    fn name(&self) -> &str;

    /// 处理一次操作，调用 `next.run(operation)` 继续向内传递
    async fn intercept(
        &self,
        operation: &Operation<'_>,
        next: Next<'_>,
    ) -> Result<Value, StoreError>;
}

/// 链中剩余的拦截器与最终的存储
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    store: &'a dyn Store,
}

impl<'a> Next<'a> {
    /// 继续执行链中的下一环
    pub async fn run(self, operation: &Operation<'_>) -> Result<Value, StoreError> {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                trace!("进入拦截器: {}", first.name());
                let next = Next {
                    interceptors: rest,
                    store: self.store,
                };
                first.intercept(operation, next).await
            }
            None => dispatch(self.store, operation).await,
        }
    }
}

async fn dispatch(store: &dyn Store, operation: &Operation<'_>) -> Result<Value, StoreError> {
    match operation {
        Operation::Read(invocation) => store.execute_read(invocation).await,
        Operation::Write(invocation) => store.execute_write(invocation).await,
        Operation::Batch(batch) => store.execute_batch(batch).await.map(Value::Array),
    }
}

/// 拦截器链统计信息
#[derive(Debug, Clone, Default)]
pub struct ChainStats {
    /// 总调用次数
    pub total_calls: u64,
    /// 失败次数
    pub failed_calls: u64,
}

/// 拦截器链
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    stats: RwLock<ChainStats>,
}

impl InterceptorChain {
    /// 创建空链
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加拦截器（内层）
    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.add(interceptor);
        self
    }

    /// 追加拦截器（内层）
    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        debug!("注册拦截器: {}", interceptor.name());
        self.interceptors.push(interceptor);
    }

    /// 按名称移除拦截器
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Interceptor>> {
        let pos = self.interceptors.iter().position(|i| i.name() == name)?;
        Some(self.interceptors.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// 由外到内的拦截器名称
    pub fn names(&self) -> Vec<String> {
        self.interceptors
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    /// 经过整条链执行操作
    pub async fn proceed(
        &self,
        store: &dyn Store,
        operation: &Operation<'_>,
    ) -> Result<Value, StoreError> {
        let next = Next {
            interceptors: &self.interceptors,
            store,
        };
        let result = next.run(operation).await;

        let mut stats = self.stats.write();
        stats.total_calls += 1;
        if result.is_err() {
            stats.failed_calls += 1;
        }
        result
    }

    /// 获取统计信息
    pub fn stats(&self) -> ChainStats {
        self.stats.read().clone()
    }
}

/// 记录每次存储调用耗时的拦截器
///
/// 超过慢查询阈值时以 `warn` 级别输出。
pub struct TracingInterceptor {
    slow_threshold: Option<Duration>,
}

impl TracingInterceptor {
    pub fn new() -> Self {
        Self {
            slow_threshold: None,
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }
}

impl Default for TracingInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interceptor for TracingInterceptor {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn intercept(
        &self,
        operation: &Operation<'_>,
        next: Next<'_>,
    ) -> Result<Value, StoreError> {
        let start = Instant::now();
        let result = next.run(operation).await;
        let elapsed = start.elapsed();

        match (&result, self.slow_threshold) {
            (Err(e), _) => warn!("{} 失败: {}, 耗时 {:?}", operation.describe(), e, elapsed),
            (Ok(_), Some(threshold)) if elapsed >= threshold => {
                warn!("慢语句: {}, 耗时 {:?}", operation.describe(), elapsed)
            }
            (Ok(_), _) => debug!("{} 完成, 耗时 {:?}", operation.describe(), elapsed),
        }
        result
    }
}
