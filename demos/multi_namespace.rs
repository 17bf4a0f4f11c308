//! Example demonstrating several typed namespaces over one cache manager.
//!
//! The store is type-agnostic: each `Namespace` keeps its own value type and
//! key prefix while sharing the same underlying store and background executor.

use lazy_swr_cache::{CacheConfig, CacheManager, MokaStore, Namespace};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
struct User {
    id: String,
    name: String,
    email: String,
}

#[derive(Clone, Debug)]
struct ApiKey {
    key: String,
    user_id: String,
    created_at: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One store instance shared by every namespace
    let cache = CacheManager::builder()
        .store(Arc::new(MokaStore::default()))
        .stale_threshold(Duration::from_secs(10))
        .build();

    let user_cache: Namespace<User> =
        Namespace::new("users", cache.clone(), Duration::from_secs(60));
    let apikey_cache: Namespace<ApiKey> =
        Namespace::new("apikeys", cache.clone(), Duration::from_secs(120));

    // Use the user cache with SWR pattern
    let user = user_cache
        .swr("chronark", |id| async move {
            println!("Loading user from database: {}", id);
            Ok::<_, std::io::Error>(Some(User {
                id: id.clone(),
                name: "Andreas".to_string(),
                email: "andreas@example.com".to_string(),
            }))
        })
        .await?;

    println!("User: {:?}", user);

    // Second call hits cache
    let user2 = user_cache
        .swr("chronark", |id| async move {
            println!("This won't be called - using cached value");
            Ok::<_, std::io::Error>(Some(User {
                id,
                name: "Should not appear".to_string(),
                email: "no@example.com".to_string(),
            }))
        })
        .await?;

    println!("User (cached): {:?}", user2);

    // Use the apikey cache (different type, same store!)
    apikey_cache.set(
        "key_123",
        ApiKey {
            key: "sk_test_123".to_string(),
            user_id: "chronark".to_string(),
            created_at: 1234567890,
        },
    )?;

    let api_key = apikey_cache.get("key_123")?;
    println!("ApiKey in apikey cache: {:?}", api_key);

    // But not in user cache (different namespace and type)
    let not_found = user_cache.get("key_123")?;
    println!("key_123 in user cache: {:?}", not_found); // None

    // The same setup, declared as configuration
    let configured = CacheConfig::from_json(
        r#"{
            "store": {
                "kind": "hashmap",
                "evict_on_set": { "frequency": 0.1, "max_items": 1000 }
            },
            "stale_threshold_ms": 5000
        }"#,
    )?
    .build();
    println!("Configured cache: {:?}", configured);

    Ok(())
}
