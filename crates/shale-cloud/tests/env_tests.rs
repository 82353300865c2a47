//! Environment lifecycle and background reclamation tests

use shale_cloud::{
    create_provider_with_defaults, CloudEnv, CloudStorageProvider, PROVIDER_MEMORY,
};
use shale_testing::fixtures::{memory_env_options, seed_object, StaticManifest};
use shale_testing::TestDir;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEST: &str = "rockset.private";

/// Polls until the condition holds or the deadline passes
fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Memory provider with the destination bucket pre-created and seeded
fn seeded_provider(dir: &TestDir, keys: &[&str]) -> Arc<dyn CloudStorageProvider> {
    let provider = create_provider_with_defaults(PROVIDER_MEMORY).unwrap();
    provider.create_bucket(DEST).unwrap();
    for key in keys {
        seed_object(provider.as_ref(), dir, DEST, key, b"payload").unwrap();
    }
    provider
}

#[test]
fn test_purger_gating() {
    let tmp = TestDir::new().unwrap();

    // Flag set but no destination bucket: nothing to reclaim from
    let mut options = memory_env_options("template", "");
    options.run_purger = true;
    let env = CloudEnv::new(options, tmp.path()).unwrap();
    assert!(!env.is_purger_running());
    assert!(env.purger_stop_witness().is_none());

    // Destination configured but flag unset
    let env = CloudEnv::new(memory_env_options("", "private"), tmp.path()).unwrap();
    assert!(!env.is_purger_running());

    // Both: the purger runs
    let mut options = memory_env_options("", "private");
    options.run_purger = true;
    let env = CloudEnv::new(options, tmp.path()).unwrap();
    assert!(env.is_purger_running());
}

#[test]
fn test_purger_reclaims_unreferenced_objects() {
    let tmp = TestDir::new().unwrap();
    let provider = seeded_provider(&tmp, &["db1/000001.sst", "db1/000002.sst"]);
    let manifest = StaticManifest::new(["db1/000001.sst"]);

    let mut options = memory_env_options("", "private");
    options.dest_bucket.set_object_path("db1");
    options.storage_provider = Some(provider.clone());
    options.file_manifest = Some(manifest);
    options.run_purger = true;
    options.purger_periodicity_millis = 50;

    let _env = CloudEnv::new(options, tmp.path()).unwrap();

    assert!(wait_until(
        || !provider.exists_cloud_object(DEST, "db1/000002.sst").unwrap(),
        Duration::from_secs(5),
    ));
    // The referenced object survives every pass
    assert!(provider.exists_cloud_object(DEST, "db1/000001.sst").unwrap());
}

#[test]
fn test_purger_without_manifest_deletes_nothing() {
    let tmp = TestDir::new().unwrap();
    let provider = seeded_provider(&tmp, &["db1/000001.sst", "db1/000002.sst"]);

    let mut options = memory_env_options("", "private");
    options.dest_bucket.set_object_path("db1");
    options.storage_provider = Some(provider.clone());
    options.run_purger = true;
    options.purger_periodicity_millis = 20;

    let _env = CloudEnv::new(options, tmp.path()).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(provider.list_cloud_objects(DEST, "db1").unwrap().len(), 2);
}

#[test]
fn test_purger_tolerates_failing_manifest() {
    let tmp = TestDir::new().unwrap();
    let provider = seeded_provider(&tmp, &["db1/000001.sst"]);
    let manifest = StaticManifest::new(Vec::<String>::new());
    manifest.set_failing(true);

    let mut options = memory_env_options("", "private");
    options.dest_bucket.set_object_path("db1");
    options.storage_provider = Some(provider.clone());
    options.file_manifest = Some(manifest.clone());
    options.run_purger = true;
    options.purger_periodicity_millis = 20;

    let env = CloudEnv::new(options, tmp.path()).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    // While the manifest fails, nothing is provably dead
    assert!(provider.exists_cloud_object(DEST, "db1/000001.sst").unwrap());
    assert!(env.is_purger_running());

    // Once it recovers, reclamation resumes
    manifest.set_failing(false);
    assert!(wait_until(
        || !provider.exists_cloud_object(DEST, "db1/000001.sst").unwrap(),
        Duration::from_secs(5),
    ));
}

#[test]
fn test_teardown_stops_purger_before_releasing_provider() {
    let tmp = TestDir::new().unwrap();
    let provider = seeded_provider(&tmp, &[]);

    let mut options = memory_env_options("", "private");
    options.storage_provider = Some(provider.clone());
    options.file_manifest = Some(StaticManifest::new(Vec::<String>::new()));
    options.run_purger = true;
    options.purger_periodicity_millis = 20;

    let env = CloudEnv::new(options, tmp.path()).unwrap();
    let witness = env.purger_stop_witness().unwrap();
    assert!(!witness.load(Ordering::SeqCst));

    drop(env);

    // Drop joined the thread, so the witness is already set and no other
    // owner of the provider remains
    assert!(witness.load(Ordering::SeqCst));
    assert_eq!(Arc::strong_count(&provider), 1);
}

#[test]
fn test_teardown_is_prompt_despite_long_period() {
    let tmp = TestDir::new().unwrap();

    let mut options = memory_env_options("", "private");
    options.run_purger = true;
    // Ten minutes between passes; stopping must not wait that long
    options.purger_periodicity_millis = 600_000;

    let env = CloudEnv::new(options, tmp.path()).unwrap();
    assert!(env.is_purger_running());

    let started = Instant::now();
    drop(env);
    assert!(started.elapsed() < Duration::from_secs(5));
}
