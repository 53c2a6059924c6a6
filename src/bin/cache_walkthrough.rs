//! 缓存演示
//!
//! 依次演示一级缓存和二级缓存的命中、失效和提升过程

use anyhow::Context;
use mappercache::constants::DEFAULT_LOG_FILTER;
use mappercache::prelude::*;
use mappercache::telemetry::init_tracing;
use mappercache::TracingInterceptor;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const CONFIG: &str = r#"
version: "1.0"
settings:
  cache_enabled: true
  close_policy: Rollback
namespaces:
  - name: emp
    cache:
      eviction: Lru
      capacity: 512
      flush_interval_secs: 60
  - name: dept
    cache_ref: emp
statements:
  - id: emp.getEmpById
    kind: READ
  - id: emp.getEmpsByDept
    kind: READ
  - id: emp.updateEmp
    kind: WRITE
  - id: dept.getDeptById
    kind: READ
"#;

#[derive(Debug, Deserialize)]
struct Employee {
    id: i64,
    name: String,
    dept: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_LOG_FILTER)?;

    println!("=== 缓存演示 ===");

    let config = MapperConfig::from_yaml_str(CONFIG).context("解析配置失败")?;
    let store = Arc::new(MemoryStore::new());
    store.seed("emp", json!({"id": 1, "name": "Tom", "dept": 1}))?;
    store.seed("emp", json!({"id": 2, "name": "Jerry", "dept": 1}))?;
    store.seed("dept", json!({"id": 1, "name": "研发部"}))?;

    let chain = InterceptorChain::new().with(Arc::new(TracingInterceptor::new()));
    let factory = SessionFactory::with_interceptors(&config, store.clone(), chain)?;

    first_level_cache(&factory, &store).await?;
    second_level_cache(&factory, &store).await?;

    println!("\n=== 演示完成 ===");
    Ok(())
}

async fn first_level_cache(factory: &SessionFactory, store: &MemoryStore) -> anyhow::Result<()> {
    println!("\n--- 一级缓存 ---");
    let mut session = factory.open_session();
    let before = store.stats().reads();

    let emp: Option<Employee> = session.select_as("emp.getEmpById", &json!({"id": 1})).await?;
    println!("第一次查询: {:?}", emp);
    let emp: Option<Employee> = session.select_as("emp.getEmpById", &json!({"id": 1})).await?;
    println!("第二次查询: {:?}", emp);
    println!("存储读取次数: {}", store.stats().reads() - before);

    session
        .update("emp.updateEmp", &json!({"id": 2, "name": "Jerry2"}))
        .await?;
    let emp: Option<Employee> = session.select_as("emp.getEmpById", &json!({"id": 1})).await?;
    println!("写操作之后再次查询: {:?}", emp);
    println!("存储读取次数: {}", store.stats().reads() - before);

    // 未提交的写入按配置回滚
    session.close().await?;
    Ok(())
}

async fn second_level_cache(factory: &SessionFactory, store: &MemoryStore) -> anyhow::Result<()> {
    println!("\n--- 二级缓存 ---");
    let before = store.stats().reads();

    let mut first = factory.open_session();
    let emps = first
        .mapper("emp")
        .select("getEmpsByDept", &json!({"dept": 1}))
        .await?;
    println!("会话 A 查询部门员工: {} 人", emps.len());
    let report = first.close().await?;
    println!("会话 A 关闭, 提升 {} 条缓存", report.promoted);

    let mut second = factory.open_session();
    let emps = second
        .mapper("emp")
        .select("getEmpsByDept", &json!({"dept": 1}))
        .await?;
    for emp in &emps {
        let emp: Employee = serde_json::from_value(emp.clone())?;
        println!("会话 B 命中: {} {} (部门 {})", emp.id, emp.name, emp.dept);
    }
    println!("存储读取次数: {}", store.stats().reads() - before);
    second.close().await?;

    if let Some(cache) = factory.caches().get("emp") {
        let stats = cache.stats();
        println!(
            "二级缓存 emp: 条目 {}, 命中 {}, 未命中 {}, 命中率 {:.2}",
            cache.len(),
            stats.hits(),
            stats.misses(),
            stats.hit_rate()
        );
    }
    Ok(())
}
