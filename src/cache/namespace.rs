//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 二级缓存（命名空间缓存）实现
//!
//! 每个命名空间一个实例，由同一工厂打开的所有会话共享。
//!
//! # 特性
//!
//! - **读写锁**: 每个实例一把 `parking_lot::RwLock`，读可以并发，写入与清空独占
//! - **快照存储**: 值在写入时序列化为字节，命中时反序列化出独立副本
//! - **淘汰策略**: LRU（命中刷新顺序，需要写锁）或 FIFO（命中只读）
//! - **定时清空**: 配置了刷新间隔时，间隔到期后的首次访问清空整个实例
//!
//! # 使用示例
//!
//! ```
//! use mappercache::cache::{CacheKey, NamespaceCache};
//! use mappercache::config::NamespaceCacheConfig;
//! use serde_json::json;
//!
//! let cache = NamespaceCache::new("emp", NamespaceCacheConfig::default());
//! let key = CacheKey::new("emp.getEmpById", &json!({"id": 1}), None);
//!
//! cache.put(key.clone(), &json!({"id": 1, "name": "Tom"})).unwrap();
//! assert_eq!(cache.get(&key), Some(json!({"id": 1, "name": "Tom"})));
//! ```

use crate::cache::key::CacheKey;
use crate::config::{EvictionPolicy, NamespaceCacheConfig};
use crate::error::MapperError;
use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::RwLock;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 缓存条目：序列化后的值快照
#[derive(Debug, Clone)]
pub struct CacheEntry {
    snapshot: Arc<[u8]>,
    /// 写入时间
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// 序列化值创建条目
    pub fn snapshot(value: &Value) -> Result<Self, MapperError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self {
            snapshot: Arc::from(bytes),
            stored_at: Utc::now(),
        })
    }

    /// 快照字节数
    pub fn size(&self) -> usize {
        self.snapshot.len()
    }

    /// 还原出独立的值
    pub fn restore(&self) -> Result<Value, MapperError> {
        Ok(serde_json::from_slice(&self.snapshot)?)
    }
}

/// 缓存统计信息
#[derive(Debug, Default)]
pub struct CacheStats {
    /// 命中次数
    hits: AtomicU64,
    /// 未命中次数
    misses: AtomicU64,
    /// 写入次数
    puts: AtomicU64,
    /// 淘汰次数
    evictions: AtomicU64,
    /// 清空次数
    clears: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    last_flush: Instant,
    last_cleared_at: Option<DateTime<Utc>>,
}

/// 命名空间缓存
pub struct NamespaceCache {
    name: String,
    config: NamespaceCacheConfig,
    flush_interval: Option<Duration>,
    state: RwLock<CacheState>,
    stats: CacheStats,
}

impl NamespaceCache {
    /// 创建命名空间缓存
    pub fn new(name: impl Into<String>, config: NamespaceCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            flush_interval: config.flush_interval_secs.map(Duration::from_secs),
            config,
            state: RwLock::new(CacheState {
                entries: LruCache::new(capacity),
                last_flush: Instant::now(),
                last_cleared_at: None,
            }),
            stats: CacheStats::default(),
        }
    }

    /// 覆盖定时清空间隔
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &NamespaceCacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// 获取值的独立副本
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.flush_if_due();

        let entry = match self.config.eviction {
            EvictionPolicy::Lru => self.state.write().entries.get(key).cloned(),
            EvictionPolicy::Fifo => self.state.read().entries.peek(key).cloned(),
        };

        let Some(entry) = entry else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            trace!("二级缓存未命中: namespace={}, key={}", self.name, key);
            return None;
        };

        match entry.restore() {
            Ok(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!("二级缓存命中: namespace={}, key={}", self.name, key);
                Some(value)
            }
            Err(e) => {
                warn!("二级缓存快照损坏, 按未命中处理: key={}, error={}", key, e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 写入值快照
    ///
    /// 序列化在加锁之前完成，超过 `max_entry_bytes` 的值返回
    /// [`MapperError::EntryTooLarge`] 且不修改缓存。
    pub fn put(&self, key: CacheKey, value: &Value) -> Result<(), MapperError> {
        let entry = CacheEntry::snapshot(value)?;
        if let Some(limit) = self.config.max_entry_bytes {
            if entry.size() > limit {
                return Err(MapperError::EntryTooLarge {
                    size: entry.size(),
                    limit,
                });
            }
        }

        self.flush_if_due();

        let mut state = self.state.write();
        let evicted = state.entries.push(key.clone(), entry);
        drop(state);

        if let Some((old_key, _)) = evicted {
            if old_key != key {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("二级缓存淘汰: namespace={}, key={}", self.name, old_key);
            }
        }
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// 检查键是否存在（不影响淘汰顺序）
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.read().entries.contains(key)
    }

    /// 清空缓存
    pub fn clear(&self) {
        let mut state = self.state.write();
        Self::clear_locked(&mut state);
        drop(state);
        self.stats.clears.fetch_add(1, Ordering::Relaxed);
        debug!("二级缓存已清空: namespace={}", self.name);
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// 最近一次清空的时间
    pub fn last_cleared_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_cleared_at
    }

    fn clear_locked(state: &mut CacheState) {
        state.entries.clear();
        state.last_flush = Instant::now();
        state.last_cleared_at = Some(Utc::now());
    }

    fn flush_if_due(&self) {
        let Some(interval) = self.flush_interval else {
            return;
        };
        if self.state.read().last_flush.elapsed() < interval {
            return;
        }

        let mut state = self.state.write();
        // 拿到写锁后再确认一次，避免重复清空
        if state.last_flush.elapsed() >= interval {
            Self::clear_locked(&mut state);
            drop(state);
            self.stats.clears.fetch_add(1, Ordering::Relaxed);
            debug!("二级缓存到达刷新间隔, 已清空: namespace={}", self.name);
        }
    }
}

/// 全部命名空间缓存的集合
///
/// 实例在第一次提升时按需创建，之后一直存在直到被显式清空。
#[derive(Default)]
pub struct NamespaceCacheSet {
    caches: DashMap<String, Arc<NamespaceCache>>,
    configs: HashMap<String, NamespaceCacheConfig>,
}

impl NamespaceCacheSet {
    /// 以可用的缓存配置创建集合
    pub fn new<I, S>(configs: I) -> Self
    where
        I: IntoIterator<Item = (S, NamespaceCacheConfig)>,
        S: Into<String>,
    {
        Self {
            caches: DashMap::new(),
            configs: configs
                .into_iter()
                .map(|(name, config)| (name.into(), config))
                .collect(),
        }
    }

    /// 获取已存在的实例
    pub fn get(&self, namespace: &str) -> Option<Arc<NamespaceCache>> {
        self.caches.get(namespace).map(|cache| Arc::clone(&cache))
    }

    /// 获取或创建实例；命名空间未配置缓存时返回 None
    pub fn get_or_create(&self, namespace: &str) -> Option<Arc<NamespaceCache>> {
        if let Some(cache) = self.get(namespace) {
            return Some(cache);
        }
        let config = self.configs.get(namespace)?.clone();
        let cache = self
            .caches
            .entry(namespace.to_string())
            .or_insert_with(|| {
                debug!("创建二级缓存: namespace={}", namespace);
                Arc::new(NamespaceCache::new(namespace, config))
            });
        Some(Arc::clone(&cache))
    }

    /// 命名空间是否配置了缓存
    pub fn is_configured(&self, namespace: &str) -> bool {
        self.configs.contains_key(namespace)
    }

    /// 清空一个实例，实例尚未创建时什么也不做
    pub fn clear(&self, namespace: &str) -> bool {
        match self.get(namespace) {
            Some(cache) => {
                cache.clear();
                true
            }
            None => false,
        }
    }

    /// 清空全部实例
    pub fn clear_all(&self) {
        for cache in self.caches.iter() {
            cache.clear();
        }
    }

    /// 已创建的实例名
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }
}
