use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hls_relay::server::services::resolution_cache_services::{
    ManualClock, ResolutionCache, ResolutionKey,
};

const TTL: Duration = Duration::from_secs(300);
const WAIT: Duration = Duration::from_secs(5);

fn cache_with_clock(capacity: usize) -> (ResolutionCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = ResolutionCache::with_clock(TTL, capacity, WAIT, clock.clone());
    (cache, clock)
}

fn key(episode: &str) -> ResolutionKey {
    ResolutionKey::new(episode, "tv/watch-rick-and-morty-39480")
}

#[test]
fn return_a_stored_url_within_its_ttl() {
    let (cache, clock) = cache_with_clock(16);

    cache.put(key("1"), "https://cdn.example/a.m3u8".to_string(), Duration::from_secs(10));
    clock.advance(Duration::from_secs(9));

    assert_eq!(
        cache.get(&key("1")),
        Some("https://cdn.example/a.m3u8".to_string())
    );
}

#[test]
fn forget_a_url_once_its_ttl_elapses() {
    let (cache, clock) = cache_with_clock(16);

    cache.put(key("1"), "https://cdn.example/a.m3u8".to_string(), Duration::from_secs(10));
    clock.advance(Duration::from_secs(10));

    assert_eq!(cache.get(&key("1")), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn overwrite_an_existing_entry_and_restart_its_ttl() {
    let (cache, clock) = cache_with_clock(16);

    cache.put(key("1"), "https://cdn.example/old.m3u8".to_string(), Duration::from_secs(10));
    clock.advance(Duration::from_secs(8));
    cache.put(key("1"), "https://cdn.example/new.m3u8".to_string(), Duration::from_secs(10));
    clock.advance(Duration::from_secs(8));

    assert_eq!(
        cache.get(&key("1")),
        Some("https://cdn.example/new.m3u8".to_string())
    );
}

#[test]
fn keep_ids_with_separator_characters_apart() {
    let (cache, _clock) = cache_with_clock(16);

    cache.put(ResolutionKey::new("a|b", "c"), "first".to_string(), TTL);
    cache.put(ResolutionKey::new("a", "b|c"), "second".to_string(), TTL);

    assert_eq!(cache.get(&ResolutionKey::new("a|b", "c")), Some("first".to_string()));
    assert_eq!(cache.get(&ResolutionKey::new("a", "b|c")), Some("second".to_string()));
}

#[test]
fn evict_the_least_recently_used_entry_when_full() {
    let (cache, _clock) = cache_with_clock(2);

    cache.put(key("a"), "a".to_string(), TTL);
    cache.put(key("b"), "b".to_string(), TTL);
    // touching a makes b the oldest
    assert!(cache.get(&key("a")).is_some());
    cache.put(key("c"), "c".to_string(), TTL);

    assert_eq!(cache.get(&key("a")), Some("a".to_string()));
    assert_eq!(cache.get(&key("b")), None);
    assert_eq!(cache.get(&key("c")), Some("c".to_string()));
    assert_eq!(cache.len(), 2);
}

#[test]
fn drop_expired_entries_before_live_ones_when_full() {
    let (cache, clock) = cache_with_clock(2);

    cache.put(key("short"), "short".to_string(), Duration::from_secs(1));
    cache.put(key("long"), "long".to_string(), TTL);
    // long is the least recently used, but short is already dead
    assert!(cache.get(&key("short")).is_some());
    clock.advance(Duration::from_secs(2));
    cache.put(key("new"), "new".to_string(), TTL);

    assert_eq!(cache.get(&key("long")), Some("long".to_string()));
    assert_eq!(cache.get(&key("new")), Some("new".to_string()));
}

#[tokio::test]
async fn resolve_once_and_then_serve_from_cache() {
    let (cache, _clock) = cache_with_clock(16);
    let calls = AtomicUsize::new(0);
    let calls = &calls;

    for _ in 0..3 {
        let url = cache
            .get_or_resolve(&key("1"), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("https://cdn.example/a.m3u8".to_string())
            })
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/a.m3u8");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resolve_again_after_the_entry_expires() {
    let (cache, clock) = cache_with_clock(16);
    let calls = AtomicUsize::new(0);
    let calls = &calls;
    let resolve = move || async move {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(format!("https://cdn.example/{}.m3u8", n))
    };

    let first = cache.get_or_resolve(&key("1"), resolve).await.unwrap();
    clock.advance(TTL);
    let second = cache.get_or_resolve(&key("1"), resolve).await.unwrap();

    assert_eq!(first, "https://cdn.example/0.m3u8");
    assert_eq!(second, "https://cdn.example/1.m3u8");
}

#[tokio::test]
async fn not_cache_failures() {
    let (cache, _clock) = cache_with_clock(16);

    let failed = cache
        .get_or_resolve(&key("1"), || async { Err::<String, _>("resolver down") })
        .await;
    assert_eq!(failed, Err("resolver down"));
    assert_eq!(cache.get(&key("1")), None);

    let recovered = cache
        .get_or_resolve(&key("1"), || async { Ok::<_, &str>("https://cdn.example/a.m3u8".to_string()) })
        .await;
    assert_eq!(recovered, Ok("https://cdn.example/a.m3u8".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn share_one_resolution_between_concurrent_misses() {
    let cache = Arc::new(ResolutionCache::new(TTL, 16, WAIT));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let calls = calls.clone();
        tasks.push(tokio::spawn(async move {
            let calls = &calls;
            cache
                .get_or_resolve(&key("1"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, String>("https://cdn.example/a.m3u8".to_string())
                })
                .await
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "https://cdn.example/a.m3u8");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn let_waiters_resolve_themselves_when_the_leader_fails() {
    let cache = Arc::new(ResolutionCache::new(TTL, 16, WAIT));
    let calls = Arc::new(AtomicUsize::new(0));

    let leader = {
        let cache = cache.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            let calls = &calls;
            cache
                .get_or_resolve(&key("1"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Err::<String, _>("resolver down".to_string())
                })
                .await
        })
    };

    // give the leader time to register
    tokio::time::sleep(Duration::from_millis(50)).await;

    let waiter = {
        let cache = cache.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            let calls = &calls;
            cache
                .get_or_resolve(&key("1"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("https://cdn.example/a.m3u8".to_string())
                })
                .await
        })
    };

    assert!(leader.await.unwrap().is_err());
    assert_eq!(
        waiter.await.unwrap().unwrap(),
        "https://cdn.example/a.m3u8"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
