//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 缓存协调器
//!
//! 纯决策逻辑：读之前查一级、二级缓存，存储调用成功后回填，写成功后失效，
//! 提交或关闭时把仍然有效的一级缓存条目提升到二级缓存。协调器本身不持有
//! 缓存数据，只持有共享的二级缓存集合和全局开关。
//!
//! 读操作决策表：
//!
//! | 一级命中 | 二级可用 | 二级命中 | 动作 |
//! |---|---|---|---|
//! | 是 | - | - | 返回一级缓存的值 |
//! | 否 | 是 | 是 | 返回二级缓存的值并回填一级缓存 |
//! | 否 | 是 | 否 | 调用存储，写入一级缓存并标记待提升 |
//! | 否 | 否 | - | 调用存储，只写入一级缓存 |

use crate::cache::key::CacheKey;
use crate::cache::local::LocalCache;
use crate::cache::namespace::NamespaceCacheSet;
use crate::config::LocalCacheScope;
use crate::error::MapperError;
use crate::statement::StatementDescriptor;
use crate::telemetry::{self, CacheEvent};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Local,
    Namespace,
    Store,
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSource::Local => write!(f, "L1"),
            CacheSource::Namespace => write!(f, "L2"),
            CacheSource::Store => write!(f, "store"),
        }
    }
}

/// 缓存查找结果
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit { value: Value, source: CacheSource },
    Miss,
}

/// 单条提升失败
#[derive(Debug)]
pub struct PromotionFailure {
    pub key: CacheKey,
    pub namespace: String,
    pub error: MapperError,
}

/// 一次提升的结果
#[derive(Debug, Default)]
pub struct PromotionReport {
    pub promoted: usize,
    pub failures: Vec<PromotionFailure>,
}

impl PromotionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 缓存协调器
#[derive(Clone)]
pub struct CacheCoordinator {
    caches: Arc<NamespaceCacheSet>,
    cache_enabled: bool,
    local_scope: LocalCacheScope,
}

impl CacheCoordinator {
    pub fn new(
        caches: Arc<NamespaceCacheSet>,
        cache_enabled: bool,
        local_scope: LocalCacheScope,
    ) -> Self {
        Self {
            caches,
            cache_enabled,
            local_scope,
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn caches(&self) -> &Arc<NamespaceCacheSet> {
        &self.caches
    }

    /// 该语句可用的二级缓存实例
    fn namespace_cache_for<'s>(&self, statement: &'s StatementDescriptor) -> Option<&'s str> {
        if self.cache_enabled && statement.use_cache() {
            statement.cache_namespace()
        } else {
            None
        }
    }

    /// 读之前查缓存
    ///
    /// 二级命中时回填一级缓存（不再标记提升）。带 `flush_cache` 的读语句
    /// 总是返回未命中。
    pub fn lookup(
        &self,
        local: &mut LocalCache,
        statement: &StatementDescriptor,
        key: &CacheKey,
    ) -> CacheLookup {
        if statement.flush_cache() {
            trace!("语句要求刷新缓存, 跳过查找: {}", statement.id());
            return CacheLookup::Miss;
        }

        if self.local_scope == LocalCacheScope::Session {
            if let Some(value) = local.get(key) {
                trace!("一级缓存命中: {}", key);
                telemetry::record(CacheEvent::LocalHit);
                return CacheLookup::Hit {
                    value: value.clone(),
                    source: CacheSource::Local,
                };
            }
        }

        if let Some(namespace) = self.namespace_cache_for(statement) {
            if let Some(cache) = self.caches.get(namespace) {
                if let Some(value) = cache.get(key) {
                    telemetry::record(CacheEvent::NamespaceHit);
                    local.put(key.clone(), value.clone(), None);
                    return CacheLookup::Hit {
                        value,
                        source: CacheSource::Namespace,
                    };
                }
            }
        }

        CacheLookup::Miss
    }

    /// 存储读取成功后回填缓存
    pub fn complete_read(
        &self,
        local: &mut LocalCache,
        statement: &StatementDescriptor,
        key: CacheKey,
        value: &Value,
    ) {
        telemetry::record(CacheEvent::StoreRead);
        if statement.flush_cache() {
            self.invalidate(local, statement);
        }
        let promote_to = self.namespace_cache_for(statement).map(str::to_string);
        trace!("回填一级缓存: key={}, promote_to={:?}", key, promote_to);
        local.put(key, value.clone(), promote_to);
    }

    /// 存储写入成功后失效缓存，返回清空的二级缓存实例数
    pub fn complete_write(&self, local: &mut LocalCache, statement: &StatementDescriptor) -> usize {
        telemetry::record(CacheEvent::StoreWrite);
        if statement.flush_cache() {
            self.invalidate(local, statement)
        } else {
            0
        }
    }

    /// 写入结果未知时（批量中途失败）按语句的刷新规则失效缓存
    ///
    /// 与 [`complete_write`](Self::complete_write) 相同，但不记录存储写入。
    pub fn invalidate_unconfirmed(
        &self,
        local: &mut LocalCache,
        statement: &StatementDescriptor,
    ) -> usize {
        if statement.flush_cache() {
            self.invalidate(local, statement)
        } else {
            0
        }
    }

    /// 再次清空指定的二级缓存实例，返回实际清空的实例数
    ///
    /// 提交时调用：未提交期间其他会话可能把旧值提升进这些实例。
    pub fn clear_namespaces(&self, targets: &[String]) -> usize {
        let cleared = targets
            .iter()
            .filter(|target| self.caches.clear(target))
            .count();
        if cleared > 0 {
            telemetry::record(CacheEvent::Invalidation);
            debug!("提交时再次清空二级缓存: {:?}", targets);
        }
        cleared
    }

    fn invalidate(&self, local: &mut LocalCache, statement: &StatementDescriptor) -> usize {
        local.clear();
        let mut cleared = 0;
        for target in statement.flush_targets() {
            if self.caches.clear(target) {
                cleared += 1;
            }
        }
        telemetry::record(CacheEvent::Invalidation);
        debug!(
            "语句 {} 刷新缓存: 一级缓存已清空, 二级缓存 {:?}",
            statement.id(),
            statement.flush_targets()
        );
        cleared
    }

    /// 把仍然有效的一级缓存条目提升到二级缓存
    ///
    /// 逐条尝试，单条失败记录在报告中，不影响其余条目。
    pub fn promote(&self, local: &mut LocalCache) -> PromotionReport {
        let mut report = PromotionReport::default();
        if !self.cache_enabled {
            return report;
        }

        let candidates: Vec<(CacheKey, String, Value)> = local
            .promotion_candidates()
            .filter_map(|(key, entry)| {
                entry
                    .promote_to()
                    .map(|ns| (key.clone(), ns.to_string(), entry.value().clone()))
            })
            .collect();

        for (key, namespace, value) in candidates {
            let Some(cache) = self.caches.get_or_create(&namespace) else {
                continue;
            };
            match cache.put(key.clone(), &value) {
                Ok(()) => {
                    local.mark_promoted(&key);
                    report.promoted += 1;
                    telemetry::record(CacheEvent::Promotion);
                }
                Err(error) => {
                    warn!("提升到二级缓存失败: key={}, namespace={}, error={}", key, namespace, error);
                    report.failures.push(PromotionFailure {
                        key,
                        namespace,
                        error,
                    });
                }
            }
        }

        if report.promoted > 0 || !report.failures.is_empty() {
            debug!(
                "提升完成: 成功 {} 条, 失败 {} 条",
                report.promoted,
                report.failures.len()
            );
        }
        report
    }
}
