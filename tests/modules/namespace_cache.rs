//! 命名空间缓存测试

use mappercache::cache::{CacheKey, NamespaceCache, NamespaceCacheSet};
use mappercache::config::{EvictionPolicy, NamespaceCacheConfig};
use serde_json::json;
use std::time::Duration;

fn key(id: i64) -> CacheKey {
    CacheKey::new("emp.getEmpById", &json!({ "id": id }), None)
}

#[test]
fn test_lru_keeps_recently_read() {
    let cache = NamespaceCache::new("emp", NamespaceCacheConfig::new().capacity(2));
    cache.put(key(1), &json!(1)).unwrap();
    cache.put(key(2), &json!(2)).unwrap();

    assert!(cache.get(&key(1)).is_some());
    cache.put(key(3), &json!(3)).unwrap();

    assert!(cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)));
    assert_eq!(cache.stats().evictions(), 1);
}

#[test]
fn test_fifo_ignores_reads() {
    let cache = NamespaceCache::new(
        "emp",
        NamespaceCacheConfig::new()
            .eviction(EvictionPolicy::Fifo)
            .capacity(2),
    );
    cache.put(key(1), &json!(1)).unwrap();
    cache.put(key(2), &json!(2)).unwrap();

    assert!(cache.get(&key(1)).is_some());
    cache.put(key(3), &json!(3)).unwrap();

    assert!(!cache.contains(&key(1)));
    assert!(cache.contains(&key(2)));
    assert!(cache.contains(&key(3)));
}

#[test]
fn test_flush_interval_clears_lazily() {
    let cache = NamespaceCache::new("emp", NamespaceCacheConfig::default())
        .with_flush_interval(Duration::from_millis(50));
    cache.put(key(1), &json!({"id": 1})).unwrap();
    assert!(cache.get(&key(1)).is_some());

    std::thread::sleep(Duration::from_millis(80));

    assert!(cache.get(&key(1)).is_none());
    assert_eq!(cache.stats().clears(), 1);
    assert!(cache.last_cleared_at().is_some());
}

#[test]
fn test_hit_rate() {
    let cache = NamespaceCache::new("emp", NamespaceCacheConfig::default());
    assert_eq!(cache.stats().hit_rate(), 0.0);

    cache.put(key(1), &json!(1)).unwrap();
    cache.get(&key(1));
    cache.get(&key(1));
    cache.get(&key(1));
    cache.get(&key(2));

    assert_eq!(cache.stats().hits(), 3);
    assert_eq!(cache.stats().misses(), 1);
    assert!((cache.stats().hit_rate() - 0.75).abs() < f64::EPSILON);
}

#[test]
fn test_cache_set_lazily_creates_configured_instances() {
    let set = NamespaceCacheSet::new(vec![
        ("emp".to_string(), NamespaceCacheConfig::default()),
        ("dept".to_string(), NamespaceCacheConfig::new().capacity(4)),
    ]);

    assert!(set.namespaces().is_empty());
    assert!(set.get_or_create("audit").is_none());
    assert!(!set.clear("emp"));

    let emp = set.get_or_create("emp").unwrap();
    emp.put(key(1), &json!(1)).unwrap();
    let dept = set.get_or_create("dept").unwrap();
    assert_eq!(dept.config().capacity, 4);

    assert_eq!(set.namespaces(), vec!["dept".to_string(), "emp".to_string()]);
    assert!(set.clear("emp"));
    assert!(set.get("emp").unwrap().is_empty());

    dept.put(key(2), &json!(2)).unwrap();
    set.clear_all();
    assert!(dept.is_empty());
}
