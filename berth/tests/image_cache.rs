//! Image existence cache behavior against a scripted runtime.

use berth::{ImageExistsCache, ImageName, RuntimeClient};
use berth_test_utils::{ImageProbe, MockRuntime};
use std::sync::Arc;
use std::time::Duration;

fn client(mock: &Arc<MockRuntime>) -> Arc<dyn RuntimeClient> {
    mock.clone()
}

#[tokio::test]
async fn concurrent_first_callers_share_one_probe() {
    let mock = Arc::new(MockRuntime::new());
    // Widen the race window: both callers must be in flight before the
    // first probe resolves.
    mock.set_probe_delay(Duration::from_millis(50));
    let cache = ImageExistsCache::new();
    let client = client(&mock);
    let name: ImageName = "redis:7.2".parse().unwrap();

    let (a, b) = tokio::join!(cache.exists(&client, &name), cache.exists(&client, &name));
    assert!(a.unwrap());
    assert!(b.unwrap());
    assert_eq!(mock.image_probe_count("redis:7.2"), 1);
}

#[tokio::test]
async fn not_found_is_cached() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_image("ghost:latest", [ImageProbe::Absent]);
    let cache = ImageExistsCache::new();
    let client = client(&mock);
    let name: ImageName = "ghost".parse().unwrap();

    assert!(!cache.exists(&client, &name).await.unwrap());
    assert!(!cache.exists(&client, &name).await.unwrap());
    assert_eq!(mock.image_probe_count("ghost:latest"), 1);
}

#[tokio::test]
async fn probe_failure_is_not_cached() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_image(
        "flaky:latest",
        [
            ImageProbe::Fails("daemon returned 500".to_string()),
            ImageProbe::Exists,
        ],
    );
    let cache = ImageExistsCache::new();
    let client = client(&mock);
    let name: ImageName = "flaky".parse().unwrap();

    assert!(cache.exists(&client, &name).await.is_err());
    // The failure left no entry behind; the retry probes again and its
    // result is cached.
    assert!(cache.exists(&client, &name).await.unwrap());
    assert!(cache.exists(&client, &name).await.unwrap());
    assert_eq!(mock.image_probe_count("flaky:latest"), 2);
}

#[tokio::test]
async fn distinct_images_probe_independently() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_image("a:latest", [ImageProbe::Exists]);
    mock.script_image("b:latest", [ImageProbe::Absent]);
    let cache = ImageExistsCache::new();
    let client = client(&mock);

    let a: ImageName = "a".parse().unwrap();
    let b: ImageName = "b".parse().unwrap();
    assert!(cache.exists(&client, &a).await.unwrap());
    assert!(!cache.exists(&client, &b).await.unwrap());
    assert_eq!(mock.image_probe_count("a:latest"), 1);
    assert_eq!(mock.image_probe_count("b:latest"), 1);
}

#[tokio::test]
async fn ensure_present_pulls_once_and_updates_cache() {
    let mock = Arc::new(MockRuntime::new());
    mock.script_image("pullme:latest", [ImageProbe::Absent]);
    let cache = ImageExistsCache::new();
    let client = client(&mock);
    let name: ImageName = "pullme".parse().unwrap();

    cache.ensure_present(&client, &name).await.unwrap();
    assert_eq!(mock.pulled_images(), vec!["pullme:latest".to_string()]);

    // Cache now reports present without another probe or pull.
    assert!(cache.exists(&client, &name).await.unwrap());
    cache.ensure_present(&client, &name).await.unwrap();
    assert_eq!(mock.pulled_images().len(), 1);
    assert_eq!(mock.image_probe_count("pullme:latest"), 1);
}
