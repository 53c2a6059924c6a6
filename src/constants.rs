//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for mappercache.
//!
//! Defaults applied when a configuration file leaves a setting out.

/// Default capacity of a namespace cache.
///
/// Matches the entry count a `<cache/>` element gets in most mapping frameworks.
pub const DEFAULT_NAMESPACE_CACHE_CAPACITY: usize = 1024;

/// Default configuration version string.
pub const DEFAULT_CONFIG_VERSION: &str = "1.0";

/// Separator between namespace and statement name in an identifier.
///
/// `com.example.EmployeeMapper.getEmpById` belongs to namespace
/// `com.example.EmployeeMapper`.
pub const NAMESPACE_SEPARATOR: char = '.';

/// Value returned for a write queued by a batch executor.
///
/// The real row count is only known once the batch is flushed.
pub const BATCH_PENDING_RESULT: serde_json::Value = serde_json::Value::Null;

/// Default tracing filter used by `telemetry::init_tracing`.
pub const DEFAULT_LOG_FILTER: &str = "mappercache=info";
