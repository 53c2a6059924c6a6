//! 端到端测试：会话隔离
//!
//! 一个会话的一级缓存和未提交写入对其他会话不可见。

use crate::common::*;
use mappercache::config::ClosePolicy;
use serde_json::json;

#[tokio::test]
async fn test_local_cache_is_private() {
    let (factory, store) = create_test_factory();

    let mut a = factory.open_session();
    let mut b = factory.open_session();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    b.execute("emp.getEmpById", &by_id(1)).await.unwrap();

    assert_eq!(store.stats().reads(), 2);
    assert_eq!(a.local_cache().len(), 1);
    assert_eq!(b.local_cache().len(), 1);
    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_uncommitted_write_is_private() {
    let (factory, _) = create_test_factory();

    let mut a = factory.open_session();
    let mut b = factory.open_session();
    a.execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();

    let seen_by_a = a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    let seen_by_b = b.execute("emp.getEmpById", &by_id(1)).await.unwrap();

    assert_eq!(seen_by_a["name"], "Tommy");
    assert_eq!(seen_by_b["name"], "Tom");
}

#[tokio::test]
async fn test_rollback_on_close_promotes_nothing_dirty() {
    let (factory, store) = create_test_factory();

    let mut a = factory.open_session();
    a.execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    let report = a.close().await.unwrap();

    assert_eq!(report.promoted, 0);
    assert_eq!(store.stats().rollbacks(), 1);
    assert_eq!(store.committed_row("emp", 1).unwrap()["name"], "Tom");

    let mut b = factory.open_session();
    let emp = b.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["name"], "Tom");
}

#[tokio::test]
async fn test_commit_on_close_publishes_writes() {
    let (factory, store) = create_factory_with(|config| {
        config.settings.close_policy = ClosePolicy::Commit;
    })
    .unwrap();

    let mut a = factory.open_session();
    a.execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    let report = a.close().await.unwrap();

    assert_eq!(report.promoted, 1);
    assert_eq!(store.stats().commits(), 1);
    assert_eq!(store.committed_row("emp", 1).unwrap()["name"], "Tommy");

    let reads_before = store.stats().reads();
    let mut b = factory.open_session();
    let emp = b.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["name"], "Tommy");
    assert_eq!(store.stats().reads(), reads_before);
}

#[tokio::test]
async fn test_clear_cache_only_affects_own_session() {
    let (factory, store) = create_test_factory();

    let mut a = factory.open_session();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    a.commit().await.unwrap();

    a.clear_cache().unwrap();
    assert!(a.local_cache().is_empty());
    assert_eq!(factory.caches().get("emp").unwrap().len(), 1);

    // 清空一级缓存后从二级缓存取回
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(store.stats().reads(), 1);
}
