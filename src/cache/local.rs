//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 一级缓存（会话本地缓存）
//!
//! 每个会话独占一个实例，不需要同步。条目记录创建时的失效纪元，清空时纪元
//! 递增，只有纪元与当前一致且标记了目标二级缓存的条目才会被提升。

use crate::cache::key::CacheKey;
use ahash::AHashMap as HashMap;
use serde_json::Value;

/// 一级缓存条目
#[derive(Debug, Clone)]
pub struct LocalEntry {
    value: Value,
    epoch: u64,
    /// 提升目标（二级缓存实例名），None 表示不提升
    promote_to: Option<String>,
    promoted: bool,
}

impl LocalEntry {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn promote_to(&self) -> Option<&str> {
        self.promote_to.as_deref()
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted
    }
}

/// 一级缓存
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: HashMap<CacheKey, LocalEntry>,
    epoch: u64,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取值
    pub fn get(&self, key: &CacheKey) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// 写入值，覆盖同键旧条目
    pub fn put(&mut self, key: CacheKey, value: Value, promote_to: Option<String>) {
        self.entries.insert(
            key,
            LocalEntry {
                value,
                epoch: self.epoch,
                promote_to,
                promoted: false,
            },
        );
    }

    /// 清空缓存并推进纪元
    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 待提升的条目：有提升目标、尚未提升、且创建后未失效
    pub fn promotion_candidates(&self) -> impl Iterator<Item = (&CacheKey, &LocalEntry)> {
        let epoch = self.epoch;
        self.entries.iter().filter(move |(_, entry)| {
            entry.promote_to.is_some() && !entry.promoted && entry.epoch == epoch
        })
    }

    /// 标记条目已提升
    pub fn mark_promoted(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.promoted = true;
        }
    }
}
