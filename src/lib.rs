//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Mappercache - Session Cache Layer for Data Mapping
//!
//! Provides the two-level result cache a data-mapping framework keeps around its store:
//! a session-local first-level cache and namespace-scoped second-level caches shared
//! across sessions.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use mappercache::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`SessionFactory`] - Builds sessions from a validated [`MapperConfig`]
//! - [`Session`] - Unit-of-work owning one first-level cache
//! - [`Mapper`] - Namespace-bound handle with typed `select` / `update` dispatch
//! - [`MapperError`] - Error types
//!
//! ## Caches
//!
//! - [`LocalCache`] - Session-local first-level cache
//! - [`NamespaceCache`] - Shared second-level cache holding serialized snapshots
//! - [`CacheCoordinator`] - Hit/miss, invalidation and promotion decisions
//!
//! ## Extension points
//!
//! - [`Store`] - The backing data store, with [`MemoryStore`] for demos and tests
//! - [`Interceptor`] - Middleware wrapped around every store call
//!
//! # Examples
//!
//! ```rust
//! use mappercache::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MapperConfig::from_yaml_str(r#"
//! namespaces:
//!   - name: emp
//!     cache: {}
//! statements:
//!   - id: emp.getEmpById
//!     kind: READ
//! "#).unwrap();
//!     let store = Arc::new(MemoryStore::new());
//!     store.seed("emp", json!({"id": 1, "name": "Tom"})).unwrap();
//!     let factory = SessionFactory::new(&config, store.clone()).unwrap();
//!
//!     // 第一个会话读取后关闭，结果提升到二级缓存
//!     let mut first = factory.open_session();
//!     first.execute("emp.getEmpById", &json!({"id": 1})).await.unwrap();
//!     first.close().await.unwrap();
//!
//!     // 第二个会话直接命中二级缓存
//!     let mut second = factory.open_session();
//!     let emp = second.execute("emp.getEmpById", &json!({"id": 1})).await.unwrap();
//!     assert_eq!(emp["name"], "Tom");
//!     assert_eq!(store.stats().reads(), 1);
//! }
//! ```
//!
//! # Features
//!
//! - **Two-level caching**: session-local results plus shared namespace caches
//! - **Coarse invalidation**: writes clear the session cache and every affected namespace cache
//! - **Promotion on commit/close**: only results that survived the unit-of-work reach shared caches
//! - **Batch executor**: queued writes flushed before reads and on commit
//! - **Monitoring**: optional Prometheus counters (`monitoring`) and log output (`telemetry`)

pub mod prelude;

pub mod cache;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod interceptor;
pub mod session;
pub mod statement;
pub mod store;
pub mod telemetry;

// 重新导出常用类型
pub use cache::{
    CacheEntry, CacheKey, CacheStats, LocalCache, LocalEntry, NamespaceCache, NamespaceCacheSet,
    RowBounds,
};
pub use config::{
    ClosePolicy, EvictionPolicy, ExecutorType, LocalCacheScope, MapperConfig,
    NamespaceCacheConfig, NamespaceConfig, Settings, StatementConfig,
};
pub use coordinator::{CacheCoordinator, CacheLookup, CacheSource, PromotionFailure, PromotionReport};
pub use error::{MapperError, StoreError};
pub use interceptor::{ChainStats, Interceptor, InterceptorChain, Next, TracingInterceptor};
pub use session::{Mapper, Session, SessionFactory, SessionOptions};
pub use statement::{StatementDescriptor, StatementKind, StatementRegistry};
pub use store::{Invocation, MemoryStore, Operation, Store, StoreStats};
#[cfg(feature = "telemetry")]
pub use telemetry::init_tracing;
#[cfg(feature = "monitoring")]
pub use telemetry::{set_global_metrics, try_global, Metrics};
