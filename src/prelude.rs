//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Mappercache,
//! allowing users to import them with a single `use mappercache::prelude::*;`
//! statement instead of importing each type individually.

// Core types
pub use crate::config::{ClosePolicy, ExecutorType, MapperConfig};
pub use crate::error::{MapperError, StoreError};
pub use crate::session::{Mapper, Session, SessionFactory, SessionOptions};

// Caching
pub use crate::cache::RowBounds;
pub use crate::coordinator::PromotionReport;

// Extension points
pub use crate::interceptor::{Interceptor, InterceptorChain, Next};
pub use crate::store::{Invocation, MemoryStore, Operation, Store};
