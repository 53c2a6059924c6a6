//! 端到端测试：写操作失效缓存
//!
//! 测试场景：
//! 1. 会话读取员工
//! 2. 执行更新
//! 3. 再次读取时访问存储并得到新值
//! 4. 写入未提交期间其他会话提升的旧值在提交时被清掉

use crate::common::*;
use mappercache::config::ClosePolicy;
use mappercache::error::MapperError;
use serde_json::json;

#[tokio::test]
async fn test_read_after_update_goes_to_store() {
    let (factory, store) = create_test_factory();
    let mut session = factory.open_session();

    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    let affected = session
        .execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();
    assert_eq!(affected, json!(1));
    assert!(session.local_cache().is_empty());

    let emp = session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["name"], "Tommy");
    assert_eq!(store.stats().reads(), 2);
}

#[tokio::test]
async fn test_write_clears_namespace_cache_immediately() {
    let (factory, store) = create_test_factory();

    let mut a = factory.open_session();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    a.close().await.unwrap();
    assert_eq!(factory.caches().get("emp").unwrap().len(), 1);

    let mut b = factory.open_session();
    b.execute("emp.deleteEmpById", &by_id(3)).await.unwrap();
    let emp_cache = factory.caches().get("emp").unwrap();
    assert!(emp_cache.is_empty());
    assert!(emp_cache.last_cleared_at().is_some());

    let mut c = factory.open_session();
    c.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(store.stats().reads(), 2);
}

#[tokio::test]
async fn test_write_without_flush_keeps_caches() {
    let (factory, store) = create_test_factory();
    let mut session = factory.open_session();

    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    session
        .execute("emp.touchEmp", &json!({"id": 2, "seen": true}))
        .await
        .unwrap();
    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();

    assert_eq!(store.stats().reads(), 1);
    assert_eq!(session.local_cache().len(), 1);
}

#[tokio::test]
async fn test_declared_namespaces_are_flushed() {
    let (factory, _) = create_test_factory();

    let mut a = factory.open_session();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    a.execute("dept.getDeptById", &by_id(1)).await.unwrap();
    a.close().await.unwrap();

    let mut b = factory.open_session();
    b.execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();
    assert!(factory.caches().get("emp").unwrap().is_empty());
    assert_eq!(factory.caches().get("dept").unwrap().len(), 1);

    b.execute("emp.transferEmp", &json!({"id": 1, "dept": 2}))
        .await
        .unwrap();
    assert!(factory.caches().get("dept").unwrap().is_empty());
}

#[tokio::test]
async fn test_flushing_read_always_hits_store() {
    let (factory, store) = create_test_factory();

    let mut a = factory.open_session();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    a.close().await.unwrap();

    let mut b = factory.open_session();
    b.execute("emp.getEmpFresh", &by_id(1)).await.unwrap();
    b.execute("emp.getEmpFresh", &by_id(1)).await.unwrap();

    assert_eq!(store.stats().reads(), 3);
    assert!(factory.caches().get("emp").unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_write_leaves_caches_untouched() {
    let (factory, store) = create_test_factory();
    let mut session = factory.open_session();

    session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    store.fail_writes(true);
    let err = session
        .execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap_err();

    assert!(matches!(err, MapperError::StoreError(_)));
    assert!(!session.is_dirty());
    assert_eq!(session.local_cache().len(), 1);

    let emp = session.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["name"], "Tom");
    assert_eq!(store.stats().reads(), 1);
}

#[tokio::test]
async fn test_commit_clears_values_promoted_before_it() {
    let (factory, store) = create_test_factory();

    let mut writer = factory.open_session();
    writer
        .execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();

    // 写入尚未提交，读者看到并提升的是旧值
    let mut reader = factory.open_session();
    let stale = reader.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(stale["name"], "Tom");
    reader.close().await.unwrap();
    assert_eq!(factory.caches().get("emp").unwrap().len(), 1);

    writer.commit().await.unwrap();
    writer.close().await.unwrap();
    assert_eq!(store.committed_row("emp", 1).unwrap()["name"], "Tommy");

    let mut fresh = factory.open_session();
    let emp = fresh.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["name"], "Tommy");
}

#[tokio::test]
async fn test_close_with_commit_policy_clears_declared_namespaces() {
    let (factory, _) = create_factory_with(|config| {
        config.settings.close_policy = ClosePolicy::Commit;
    })
    .unwrap();

    let mut writer = factory.open_session();
    writer
        .execute("emp.transferEmp", &json!({"id": 1, "dept": 2}))
        .await
        .unwrap();

    let mut reader = factory.open_session();
    reader.execute("dept.getDeptById", &by_id(1)).await.unwrap();
    reader.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    reader.close().await.unwrap();
    assert_eq!(factory.caches().get("dept").unwrap().len(), 1);

    writer.close().await.unwrap();
    assert!(factory.caches().get("emp").unwrap().is_empty());
    assert!(factory.caches().get("dept").unwrap().is_empty());

    let mut fresh = factory.open_session();
    let emp = fresh.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(emp["dept"], 2);
}

#[tokio::test]
async fn test_rollback_forgets_pending_flushes() {
    let (factory, _) = create_test_factory();

    let mut writer = factory.open_session();
    writer
        .execute("emp.updateEmp", &json!({"id": 1, "name": "Tommy"}))
        .await
        .unwrap();
    writer.rollback().await.unwrap();

    let mut reader = factory.open_session();
    reader.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    reader.close().await.unwrap();

    // 回滚后的提交不再清空二级缓存
    writer.commit().await.unwrap();
    assert_eq!(factory.caches().get("emp").unwrap().len(), 1);
}
