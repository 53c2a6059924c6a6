//! 缓存键
//!
//! 由语句标识、规范化后的参数和分页边界组成。参数中对象字段按键名排序后
//! 再编码，因此字段插入顺序不同的两次调用得到相同的键。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 分页边界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowBounds {
    pub offset: u64,
    pub limit: u64,
}

impl RowBounds {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// 按页码构造（页码从1开始）
    pub fn page(page_num: u64, page_size: u64) -> Self {
        Self {
            offset: page_num.saturating_sub(1).saturating_mul(page_size),
            limit: page_size,
        }
    }
}

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    statement_id: String,
    params: String,
    bounds: Option<RowBounds>,
}

impl CacheKey {
    pub fn new(statement_id: &str, params: &Value, bounds: Option<RowBounds>) -> Self {
        let mut encoded = String::new();
        write_canonical(params, &mut encoded);
        Self {
            statement_id: statement_id.to_string(),
            params: encoded,
            bounds,
        }
    }

    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    /// 规范化后的参数编码
    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn bounds(&self) -> Option<RowBounds> {
        self.bounds
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.statement_id, self.params)?;
        if let Some(bounds) = self.bounds {
            write!(f, "[{},{}]", bounds.offset, bounds.limit)?;
        }
        Ok(())
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
