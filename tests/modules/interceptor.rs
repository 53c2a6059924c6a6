//! 拦截器链集成测试

use crate::common::*;
use async_trait::async_trait;
use mappercache::error::{MapperError, StoreError};
use mappercache::interceptor::{Interceptor, InterceptorChain, Next, TracingInterceptor};
use mappercache::session::SessionFactory;
use mappercache::store::Operation;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// 拒绝所有写操作的拦截器
struct ReadOnly;

#[async_trait]
impl Interceptor for ReadOnly {
    fn name(&self) -> &str {
        "read-only"
    }

    async fn intercept(
        &self,
        operation: &Operation<'_>,
        next: Next<'_>,
    ) -> Result<Value, StoreError> {
        match operation {
            Operation::Read(_) => next.run(operation).await,
            _ => Err(StoreError::QueryError("只读模式".to_string())),
        }
    }
}

/// 为读结果附加标记的拦截器
struct Tagging;

#[async_trait]
impl Interceptor for Tagging {
    fn name(&self) -> &str {
        "tagging"
    }

    async fn intercept(
        &self,
        operation: &Operation<'_>,
        next: Next<'_>,
    ) -> Result<Value, StoreError> {
        let mut value = next.run(operation).await?;
        if let (Operation::Read(invocation), Value::Object(fields)) = (operation, &mut value) {
            fields.insert("_source".to_string(), json!(invocation.statement.id()));
        }
        Ok(value)
    }
}

#[tokio::test]
async fn test_interceptor_can_reject_writes() {
    let store = seeded_store();
    let chain = InterceptorChain::new().with(Arc::new(ReadOnly));
    let factory = SessionFactory::with_interceptors(&employee_config(), store.clone(), chain).unwrap();
    let mut session = factory.open_session();

    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    let err = session
        .execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap_err();

    assert!(matches!(err, MapperError::StoreError(StoreError::QueryError(_))));
    assert_eq!(store.stats().writes(), 0);
    // 被拒绝的写不会失效缓存
    assert_eq!(session.local_cache().len(), 1);
    assert_eq!(factory.interceptors().stats().failed_calls, 1);
}

#[tokio::test]
async fn test_transformed_result_is_cached() {
    let store = seeded_store();
    let counter = CountingInterceptor::new();
    let chain = InterceptorChain::new()
        .with(counter.clone())
        .with(Arc::new(Tagging));
    let factory = SessionFactory::with_interceptors(&employee_config(), store.clone(), chain).unwrap();

    let mut a = factory.open_session();
    let emp = a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["_source"], "emp.getEmpById");
    a.close().await.unwrap();

    // 缓存命中不经过拦截器
    let mut b = factory.open_session();
    let cached = b.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(cached["_source"], "emp.getEmpById");
    assert_eq!(counter.reads(), 1);
    assert_eq!(
        factory.interceptors().names(),
        vec!["counting".to_string(), "tagging".to_string()]
    );
}

#[tokio::test]
async fn test_tracing_interceptor_passes_through() {
    let store = seeded_store();
    let chain = InterceptorChain::new().with(Arc::new(
        TracingInterceptor::new().with_slow_threshold(Duration::from_secs(5)),
    ));
    let factory = SessionFactory::with_interceptors(&employee_config(), store, chain).unwrap();
    let mut session = factory.open_session();

    let emp = session.execute("emp.getEmpById", &by_id(2)).await.unwrap();
    assert_eq!(emp["name"], "Jerry");
    assert_eq!(factory.interceptors().stats().total_calls, 1);
    assert_eq!(factory.interceptors().stats().failed_calls, 0);
}
