//! 配置模块
//!
//! 定义全局设置、命名空间缓存和语句映射的配置结构。
//! 支持YAML与TOML两种格式。

use crate::constants::{DEFAULT_CONFIG_VERSION, DEFAULT_NAMESPACE_CACHE_CAPACITY};
use crate::error::MapperError;
use crate::statement::StatementKind;
use ahash::AHashSet as HashSet;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

lazy_static! {
    /// 语句标识: 至少两段, 以点分隔
    static ref STATEMENT_ID: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$")
            .expect("statement id pattern is valid");
    static ref NAMESPACE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("namespace pattern is valid");
}

/// 映射配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
    #[serde(default)]
    pub statements: Vec<StatementConfig>,
}

fn default_version() -> String {
    DEFAULT_CONFIG_VERSION.to_string()
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            settings: Settings::default(),
            namespaces: Vec::new(),
            statements: Vec::new(),
        }
    }
}

impl MapperConfig {
    /// 从YAML文本解析
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MapperError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// 从TOML文本解析
    pub fn from_toml_str(text: &str) -> Result<Self, MapperError> {
        Ok(toml::from_str(text)?)
    }

    /// 从文件加载，按扩展名选择格式
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MapperError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            other => Err(MapperError::ConfigError(format!(
                "不支持的配置文件格式: {:?}",
                other
            ))),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.version.is_empty() {
            return Err("版本号不能为空".to_string());
        }

        let mut declared = HashSet::new();
        for (index, namespace) in self.namespaces.iter().enumerate() {
            if !declared.insert(namespace.name.as_str()) {
                return Err(format!("命名空间重复: {}", namespace.name));
            }
            namespace
                .validate()
                .map_err(|e| format!("命名空间[{}]校验失败: {}", index, e))?;
        }

        // cache-ref 只能指向自带缓存的命名空间
        for namespace in &self.namespaces {
            if let Some(target) = &namespace.cache_ref {
                let referenced = self.namespaces.iter().find(|n| &n.name == target);
                match referenced {
                    None => {
                        return Err(format!(
                            "命名空间 {} 引用了不存在的缓存: {}",
                            namespace.name, target
                        ))
                    }
                    Some(n) if n.cache.is_none() => {
                        return Err(format!(
                            "命名空间 {} 引用的 {} 未配置缓存",
                            namespace.name, target
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        if self.statements.is_empty() {
            return Err("至少需要一条语句".to_string());
        }

        let mut ids = HashSet::new();
        let mut known_namespaces: HashSet<&str> = declared.clone();
        for statement in &self.statements {
            if let Some(namespace) = statement.namespace() {
                known_namespaces.insert(namespace);
            }
        }

        for (index, statement) in self.statements.iter().enumerate() {
            if !ids.insert(statement.id.as_str()) {
                return Err(format!("语句ID重复: {}", statement.id));
            }
            statement
                .validate()
                .map_err(|e| format!("语句[{}]校验失败: {}", index, e))?;
            for target in &statement.flush_namespaces {
                if !known_namespaces.contains(target.as_str()) {
                    return Err(format!(
                        "语句 {} 声明刷新未知命名空间: {}",
                        statement.id, target
                    ));
                }
            }
        }

        Ok(())
    }

    /// 查找命名空间配置
    pub fn namespace(&self, name: &str) -> Option<&NamespaceConfig> {
        self.namespaces.iter().find(|n| n.name == name)
    }
}

/// 全局设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// 二级缓存总开关（一级缓存不受影响）
    pub cache_enabled: bool,
    /// 一级缓存作用域
    pub local_cache_scope: LocalCacheScope,
    /// 默认执行器类型
    pub default_executor_type: ExecutorType,
    /// 是否自动提交
    pub auto_commit: bool,
    /// 存在未提交写操作时关闭会话的处理方式
    pub close_policy: ClosePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            default_executor_type: ExecutorType::Simple,
            auto_commit: false,
            close_policy: ClosePolicy::Rollback,
        }
    }
}

/// 一级缓存作用域
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LocalCacheScope {
    /// 整个会话共享一级缓存
    #[default]
    Session,
    /// 每条语句之后失效，一级缓存不会命中
    Statement,
}

/// 执行器类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExecutorType {
    /// 写操作立即下发
    #[default]
    Simple,
    /// 写操作排队，读之前或提交时批量下发
    Batch,
}

/// 关闭时的未提交处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// 提交后再关闭
    Commit,
    /// 回滚并丢弃脏数据期间读取的缓存
    #[default]
    Rollback,
}

/// 命名空间配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceConfig {
    pub name: String,
    /// 二级缓存配置，缺省时该命名空间不使用二级缓存
    #[serde(default)]
    pub cache: Option<NamespaceCacheConfig>,
    /// 共享另一个命名空间的缓存实例
    #[serde(default)]
    pub cache_ref: Option<String>,
}

impl NamespaceConfig {
    /// 校验命名空间
    pub fn validate(&self) -> Result<(), String> {
        if !NAMESPACE_NAME.is_match(&self.name) {
            return Err(format!("无效的命名空间名称: {:?}", self.name));
        }
        if self.cache.is_some() && self.cache_ref.is_some() {
            return Err("cache 与 cache_ref 不能同时配置".to_string());
        }
        if self.cache_ref.as_deref() == Some(self.name.as_str()) {
            return Err("cache_ref 不能引用自身".to_string());
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        Ok(())
    }
}

/// 命名空间二级缓存配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceCacheConfig {
    #[serde(default)]
    pub eviction: EvictionPolicy,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// 定时清空间隔（秒）
    #[serde(default)]
    pub flush_interval_secs: Option<u64>,
    /// 单条快照的最大字节数
    #[serde(default)]
    pub max_entry_bytes: Option<usize>,
}

fn default_capacity() -> usize {
    DEFAULT_NAMESPACE_CACHE_CAPACITY
}

impl Default for NamespaceCacheConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::Lru,
            capacity: DEFAULT_NAMESPACE_CACHE_CAPACITY,
            flush_interval_secs: None,
            max_entry_bytes: None,
        }
    }
}

impl NamespaceCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn flush_interval_secs(mut self, secs: u64) -> Self {
        self.flush_interval_secs = Some(secs);
        self
    }

    pub fn max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = Some(bytes);
        self
    }

    /// 校验缓存配置
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("缓存容量必须大于0".to_string());
        }
        if self.flush_interval_secs == Some(0) {
            return Err("flush_interval_secs 必须大于0".to_string());
        }
        if self.max_entry_bytes == Some(0) {
            return Err("max_entry_bytes 必须大于0".to_string());
        }
        Ok(())
    }
}

/// 淘汰策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// 最近最少使用，命中会刷新顺序
    #[default]
    Lru,
    /// 先进先出，命中不改变顺序
    Fifo,
}

/// 语句配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementConfig {
    pub id: String,
    pub kind: StatementKind,
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub flush_cache: Option<bool>,
    /// 写操作额外影响的命名空间
    #[serde(default)]
    pub flush_namespaces: Vec<String>,
}

impl StatementConfig {
    pub fn read(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: StatementKind::Read,
            use_cache: None,
            flush_cache: None,
            flush_namespaces: Vec::new(),
        }
    }

    pub fn write(id: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Write,
            ..Self::read(id)
        }
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    pub fn with_flush_cache(mut self, flush_cache: bool) -> Self {
        self.flush_cache = Some(flush_cache);
        self
    }

    pub fn with_flush_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.flush_namespaces.push(namespace.into());
        self
    }

    /// 标识中最后一个分隔符之前的部分
    pub fn namespace(&self) -> Option<&str> {
        self.id
            .rsplit_once(crate::constants::NAMESPACE_SEPARATOR)
            .map(|(namespace, _)| namespace)
    }

    /// 校验语句
    pub fn validate(&self) -> Result<(), String> {
        if !STATEMENT_ID.is_match(&self.id) {
            return Err(format!("无效的语句ID: {:?}, 需要 namespace.name 形式", self.id));
        }
        if self.kind == StatementKind::Write && self.use_cache == Some(true) {
            return Err("写语句不能启用 use_cache".to_string());
        }
        Ok(())
    }
}
