//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。

use thiserror::Error;

/// 缓存层错误类型
#[derive(Error, Debug)]
pub enum MapperError {
    /// 语句未注册
    #[error("未知语句: {0}")]
    UnknownStatement(String),

    /// 会话已关闭
    #[error("会话状态无效: {0}")]
    InvalidState(String),

    /// 底层存储错误，原样透传
    #[error("存储错误: {0}")]
    StoreError(#[from] StoreError),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 语句类型与调用方式不匹配
    #[error("语句类型不匹配: {statement} 是 {actual}, 期望 {expected}")]
    StatementKindMismatch {
        statement: String,
        expected: String,
        actual: String,
    },

    /// select_one 得到多行结果
    #[error("期望一条结果, 实际返回 {0} 条")]
    TooManyResults(usize),

    /// 快照超过命名空间允许的大小
    #[error("缓存条目过大: {size} 字节, 上限 {limit} 字节")]
    EntryTooLarge { size: usize, limit: usize },

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl MapperError {
    /// 是否为调用方错误（重试无意义）
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MapperError::UnknownStatement(_)
                | MapperError::InvalidState(_)
                | MapperError::StatementKindMismatch { .. }
                | MapperError::TooManyResults(_)
        )
    }
}

/// 存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// 连接错误
    #[error("连接错误: {0}")]
    ConnectionError(String),

    /// 查询错误
    #[error("查询错误: {0}")]
    QueryError(String),

    /// 超时错误
    #[error("超时错误: {0}")]
    TimeoutError(String),
}
