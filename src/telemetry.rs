//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 监控模块
//!
//! 缓存内部通过 [`record`] 上报事件。开启 `monitoring` 特性并调用
//! [`set_global_metrics`] 后，事件会累加到 Prometheus 计数器；否则为空操作。
//! 开启 `telemetry` 特性时提供 [`init_tracing`] 初始化日志输出。
//!
//! # 示例
//!
//! ```rust,ignore
//! use mappercache::telemetry::{set_global_metrics, Metrics};
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(Metrics::new());
//! set_global_metrics(metrics.clone());
//! // ... 执行语句 ...
//! println!("{}", metrics.gather());
//! ```

/// 缓存事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// 一级缓存命中
    LocalHit,
    /// 二级缓存命中
    NamespaceHit,
    /// 读请求落到存储
    StoreRead,
    /// 写请求落到存储
    StoreWrite,
    /// 一条结果提升到二级缓存
    Promotion,
    /// 一次写触发的缓存失效
    Invalidation,
}

/// 上报缓存事件
#[cfg(feature = "monitoring")]
pub(crate) fn record(event: CacheEvent) {
    if let Some(metrics) = monitoring::try_global() {
        metrics.record(event);
    }
}

#[cfg(not(feature = "monitoring"))]
#[inline]
pub(crate) fn record(_event: CacheEvent) {}

#[cfg(feature = "monitoring")]
pub use monitoring::{set_global_metrics, try_global, Metrics};

#[cfg(feature = "monitoring")]
mod monitoring {
    use super::CacheEvent;
    use prometheus::{Counter, Encoder, Registry, TextEncoder};
    use std::sync::{Arc, OnceLock};
    use tracing::error;

    /// 全局指标实例
    static GLOBAL_METRICS: OnceLock<Arc<Metrics>> = OnceLock::new();

    /// 设置全局指标实例，只有第一次调用生效
    pub fn set_global_metrics(metrics: Arc<Metrics>) {
        let _ = GLOBAL_METRICS.set(metrics);
    }

    /// 获取全局指标实例
    pub fn try_global() -> Option<Arc<Metrics>> {
        GLOBAL_METRICS.get().cloned()
    }

    /// 缓存指标
    #[derive(Clone)]
    pub struct Metrics {
        pub local_hits: Counter,
        pub namespace_hits: Counter,
        pub store_reads: Counter,
        pub store_writes: Counter,
        pub promotions: Counter,
        pub invalidations: Counter,
        registry: Registry,
    }

    impl Metrics {
        pub fn new() -> Self {
            let registry = Registry::new();
            let local_hits = register_counter(
                &registry,
                "mappercache_local_hits_total",
                "Session-local cache hits",
            );
            let namespace_hits = register_counter(
                &registry,
                "mappercache_namespace_hits_total",
                "Namespace cache hits",
            );
            let store_reads = register_counter(
                &registry,
                "mappercache_store_reads_total",
                "Reads that reached the store",
            );
            let store_writes = register_counter(
                &registry,
                "mappercache_store_writes_total",
                "Writes that reached the store",
            );
            let promotions = register_counter(
                &registry,
                "mappercache_promotions_total",
                "Entries promoted into namespace caches",
            );
            let invalidations = register_counter(
                &registry,
                "mappercache_invalidations_total",
                "Cache invalidations caused by flushing statements",
            );

            Self {
                local_hits,
                namespace_hits,
                store_reads,
                store_writes,
                promotions,
                invalidations,
                registry,
            }
        }

        pub fn record(&self, event: CacheEvent) {
            match event {
                CacheEvent::LocalHit => self.local_hits.inc(),
                CacheEvent::NamespaceHit => self.namespace_hits.inc(),
                CacheEvent::StoreRead => self.store_reads.inc(),
                CacheEvent::StoreWrite => self.store_writes.inc(),
                CacheEvent::Promotion => self.promotions.inc(),
                CacheEvent::Invalidation => self.invalidations.inc(),
            }
        }

        /// 以 Prometheus 文本格式导出
        pub fn gather(&self) -> String {
            let encoder = TextEncoder::new();
            let metric_families = self.registry.gather();
            let mut buffer = Vec::new();
            if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                error!("指标编码失败: {}", e);
                return String::new();
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    fn register_counter(registry: &Registry, name: &str, help: &str) -> Counter {
        // 指标名均为常量，创建不会失败
        let counter = Counter::new(name, help).expect("valid metric name");
        if let Err(e) = registry.register(Box::new(counter.clone())) {
            error!("指标注册失败 {}: {}", name, e);
        }
        counter
    }

}

/// 初始化日志输出
///
/// `filter` 使用 `EnvFilter` 语法；设置了 `RUST_LOG` 时以环境变量为准。
#[cfg(feature = "telemetry")]
pub fn init_tracing(filter: &str) -> Result<(), crate::error::MapperError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| crate::error::MapperError::ConfigError(format!("日志过滤器无效: {}", e)))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| crate::error::MapperError::ConfigError(format!("日志初始化失败: {}", e)))
}
