//! 一级缓存作用域与映射器测试

use crate::common::*;
use mappercache::config::LocalCacheScope;
use mappercache::error::MapperError;
use mappercache::RowBounds;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, PartialEq)]
struct Employee {
    id: i64,
    name: String,
    gender: String,
}

#[tokio::test]
async fn test_statement_scope_disables_local_hits() {
    let (factory, store) = create_factory_with(|config| {
        config.settings.local_cache_scope = LocalCacheScope::Statement;
    })
    .unwrap();

    let mut a = factory.open_session();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    a.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(store.stats().reads(), 2);

    // 仍然会提升到二级缓存
    let report = a.close().await.unwrap();
    assert_eq!(report.promoted, 1);

    let mut b = factory.open_session();
    b.execute("emp.getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(store.stats().reads(), 2);
}

#[tokio::test]
async fn test_parameter_order_does_not_matter() {
    let (factory, store) = create_test_factory();
    let mut session = factory.open_session();

    session
        .execute("emp.getEmps", &json!({"dept": 1, "gender": "M"}))
        .await
        .unwrap();
    session
        .execute("emp.getEmps", &json!({"gender": "M", "dept": 1}))
        .await
        .unwrap();

    assert_eq!(store.stats().reads(), 1);
}

#[tokio::test]
async fn test_mapper_typed_dispatch() {
    let (factory, _) = create_test_factory();
    let mut session = factory.open_session();
    let mut emp = session.mapper("emp");

    let tom: Option<Employee> = emp.select_as("getEmpById", &by_id(1)).await.unwrap();
    assert_eq!(
        tom,
        Some(Employee {
            id: 1,
            name: "Tom".to_string(),
            gender: "M".to_string(),
        })
    );

    let women = emp.select("getEmps", &json!({"gender": "F"})).await.unwrap();
    assert_eq!(women.len(), 1);

    let page = emp
        .select_page("getEmps", &json!({}), RowBounds::page(1, 2))
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    let err = emp.select("updateEmp", &by_id(1)).await.unwrap_err();
    assert!(matches!(
        err,
        MapperError::StatementKindMismatch { ref statement, .. } if statement == "emp.updateEmp"
    ));

    let err = emp.select_one("getEmps", &json!({})).await.unwrap_err();
    assert!(matches!(err, MapperError::TooManyResults(3)));

    let err = emp.update("missingStatement", &by_id(1)).await.unwrap_err();
    assert!(matches!(err, MapperError::UnknownStatement(_)));
}

#[tokio::test]
async fn test_select_as_type_mismatch() {
    #[derive(Debug, Deserialize)]
    struct WrongShape {
        #[allow(dead_code)]
        salary: f64,
    }

    let (factory, _) = create_test_factory();
    let mut session = factory.open_session();

    let err = session
        .select_as::<WrongShape>("emp.getEmpById", &by_id(1))
        .await
        .unwrap_err();
    assert!(matches!(err, MapperError::SerdeError(_)));
}
