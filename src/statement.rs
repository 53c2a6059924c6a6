//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 语句注册表
//!
//! 启动时从配置构建一次，之后只读。每条语句的命名空间、缓存实例和
//! 刷新目标都在构建时解析完毕，运行期只做查表。

use crate::config::{MapperConfig, NamespaceCacheConfig};
use crate::error::MapperError;
use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 语句类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Read,
    Write,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Read => write!(f, "READ"),
            StatementKind::Write => write!(f, "WRITE"),
        }
    }
}

/// 已解析的语句描述
#[derive(Debug, Clone, PartialEq)]
pub struct StatementDescriptor {
    id: String,
    namespace: String,
    kind: StatementKind,
    use_cache: bool,
    flush_cache: bool,
    cache_namespace: Option<String>,
    flush_targets: Vec<String>,
}

impl StatementDescriptor {
    /// 完整标识，例如 `emp.getEmpById`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 所属命名空间
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 语句名（去掉命名空间前缀）
    pub fn name(&self) -> &str {
        &self.id[self.namespace.len() + 1..]
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn is_read(&self) -> bool {
        self.kind == StatementKind::Read
    }

    /// 是否允许使用二级缓存
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// 执行成功后是否清空缓存
    pub fn flush_cache(&self) -> bool {
        self.flush_cache
    }

    /// 服务于该语句的二级缓存实例（考虑 cache-ref），None 表示没有二级缓存
    pub fn cache_namespace(&self) -> Option<&str> {
        self.cache_namespace.as_deref()
    }

    /// 刷新时需要清空的二级缓存实例
    pub fn flush_targets(&self) -> &[String] {
        &self.flush_targets
    }
}

/// 语句注册表
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: HashMap<String, Arc<StatementDescriptor>>,
    caches: HashMap<String, NamespaceCacheConfig>,
}

impl StatementRegistry {
    /// 从配置构建注册表
    ///
    /// 配置不合法时返回 [`MapperError::ConfigError`]。
    pub fn from_config(config: &MapperConfig) -> Result<Self, MapperError> {
        config.validate().map_err(MapperError::ConfigError)?;

        let mut caches = HashMap::new();
        for namespace in &config.namespaces {
            if let Some(cache) = &namespace.cache {
                caches.insert(namespace.name.clone(), cache.clone());
            }
        }

        // 命名空间 -> 实际缓存实例
        let resolve = |namespace: &str| -> Option<String> {
            let declared = config.namespace(namespace)?;
            if declared.cache.is_some() {
                Some(declared.name.clone())
            } else {
                declared.cache_ref.clone()
            }
        };

        let mut statements = HashMap::with_capacity(config.statements.len());
        for statement in &config.statements {
            let namespace = statement
                .namespace()
                .ok_or_else(|| MapperError::ConfigError(format!("语句缺少命名空间: {}", statement.id)))?
                .to_string();

            let is_read = statement.kind == StatementKind::Read;
            let cache_namespace = resolve(&namespace);

            let mut flush_targets: Vec<String> = Vec::new();
            for target in std::iter::once(namespace.as_str())
                .chain(statement.flush_namespaces.iter().map(String::as_str))
            {
                if let Some(cache) = resolve(target) {
                    if !flush_targets.contains(&cache) {
                        flush_targets.push(cache);
                    }
                }
            }

            let descriptor = StatementDescriptor {
                id: statement.id.clone(),
                namespace,
                kind: statement.kind,
                use_cache: is_read && statement.use_cache.unwrap_or(true),
                flush_cache: statement.flush_cache.unwrap_or(!is_read),
                cache_namespace,
                flush_targets,
            };
            debug!(
                "注册语句: id={}, kind={}, cache={:?}",
                descriptor.id, descriptor.kind, descriptor.cache_namespace
            );
            statements.insert(statement.id.clone(), Arc::new(descriptor));
        }

        info!(
            "语句注册表构建完成: {} 条语句, {} 个二级缓存",
            statements.len(),
            caches.len()
        );

        Ok(Self { statements, caches })
    }

    /// 查找语句
    pub fn get(&self, id: &str) -> Result<Arc<StatementDescriptor>, MapperError> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| MapperError::UnknownStatement(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// 某个命名空间下的全部语句
    pub fn statements_in(&self, namespace: &str) -> Vec<Arc<StatementDescriptor>> {
        let mut found: Vec<_> = self
            .statements
            .values()
            .filter(|s| s.namespace() == namespace)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// 二级缓存实例的配置
    pub fn cache_config(&self, cache_namespace: &str) -> Option<&NamespaceCacheConfig> {
        self.caches.get(cache_namespace)
    }

    /// 全部二级缓存实例的配置
    pub fn cache_configs(&self) -> impl Iterator<Item = (&str, &NamespaceCacheConfig)> {
        self.caches
            .iter()
            .map(|(name, config)| (name.as_str(), config))
    }
}
