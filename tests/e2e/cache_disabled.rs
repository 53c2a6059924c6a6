//! 端到端测试：关闭全局缓存
//!
//! 关闭后二级缓存完全不参与，一级缓存照常工作。

use crate::common::*;
use mappercache::error::{MapperError, StoreError};
use mappercache::session::SessionFactory;

#[tokio::test]
async fn test_local_cache_still_active() {
    let (factory, store) = create_factory_with(|config| {
        config.settings.cache_enabled = false;
    })
    .unwrap();

    let mut session = factory.open_session();
    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(store.stats().reads(), 1);

    let report = session.close().await.unwrap();
    assert_eq!(report.promoted, 0);
}

#[tokio::test]
async fn test_sessions_always_reach_store() {
    let (factory, store) = create_factory_with(|config| {
        config.settings.cache_enabled = false;
    })
    .unwrap();

    for _ in 0..3 {
        let mut session = factory.open_session();
        session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
        session.commit().await.unwrap();
        session.close().await.unwrap();
    }

    assert_eq!(store.stats().reads(), 3);
    assert!(factory.caches().namespaces().is_empty());
}

#[tokio::test]
async fn test_store_failure_leaves_no_entry() {
    let store = FailingStore::new(StoreError::ConnectionError("down".to_string()));
    let factory = SessionFactory::new(&employee_config(), store.clone()).unwrap();
    let mut session = factory.open_session();

    let err = session.execute("emp.getEmpById", &by_id(1)).await.unwrap_err();

    assert!(matches!(
        err,
        MapperError::StoreError(StoreError::ConnectionError(_))
    ));
    assert!(!err.is_caller_error());
    assert!(session.local_cache().is_empty());

    // 失败的结果不会被缓存
    assert!(session.execute("emp.getEmpById", &by_id(1)).await.is_err());
    assert_eq!(store.calls(), 2);
}
