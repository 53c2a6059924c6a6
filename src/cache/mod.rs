//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 缓存模块
//!
//! 两级缓存：会话私有的一级缓存（[`LocalCache`]）和按命名空间共享的
//! 二级缓存（[`NamespaceCache`]）。两者使用同一种 [`CacheKey`]。

pub mod key;
pub mod local;
pub mod namespace;

pub use key::{CacheKey, RowBounds};
pub use local::{LocalCache, LocalEntry};
pub use namespace::{CacheEntry, CacheStats, NamespaceCache, NamespaceCacheSet};
