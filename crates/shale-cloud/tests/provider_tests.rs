//! Provider-level integration tests against the in-memory backend

use shale_cloud::{
    create_provider, create_provider_with_defaults, CloudError, CloudStorageProvider,
    CloudStorageProviderOptions, PROVIDER_MEMORY,
};
use shale_testing::fixtures::{counting_callback, fetch_object, seed_object};
use shale_testing::TestDir;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

const BUCKET: &str = "rockset.test";

fn memory_provider() -> Arc<dyn CloudStorageProvider> {
    let provider = create_provider_with_defaults(PROVIDER_MEMORY).unwrap();
    provider.create_bucket(BUCKET).unwrap();
    provider
}

#[test]
fn test_bucket_lifecycle() {
    let provider = create_provider_with_defaults(PROVIDER_MEMORY).unwrap();

    assert!(!provider.exists_bucket("rockset.fresh").unwrap());
    provider.create_bucket("rockset.fresh").unwrap();
    assert!(provider.exists_bucket("rockset.fresh").unwrap());

    // Creating an existing bucket is not an error
    provider.create_bucket("rockset.fresh").unwrap();
    assert!(provider.exists_bucket("rockset.fresh").unwrap());
}

#[test]
fn test_operations_against_missing_bucket() {
    let provider = create_provider_with_defaults(PROVIDER_MEMORY).unwrap();
    let err = provider
        .exists_cloud_object("rockset.nowhere", "file.sst")
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_put_get_roundtrip() {
    let provider = memory_provider();
    let dir = TestDir::new().unwrap();

    seed_object(provider.as_ref(), &dir, BUCKET, "db1/000001.sst", b"sst payload").unwrap();

    assert!(provider.exists_cloud_object(BUCKET, "db1/000001.sst").unwrap());
    assert_eq!(
        provider.get_cloud_object_size(BUCKET, "db1/000001.sst").unwrap(),
        b"sst payload".len() as u64
    );
    assert_eq!(
        fetch_object(provider.as_ref(), &dir, BUCKET, "db1/000001.sst").unwrap(),
        b"sst payload"
    );
}

#[test]
fn test_missing_object_errors_and_probes() {
    let provider = memory_provider();
    let dir = TestDir::new().unwrap();

    // Existence probe answers false, direct queries answer NotFound
    assert!(!provider.exists_cloud_object(BUCKET, "db1/gone.sst").unwrap());
    let err = provider.get_cloud_object_size(BUCKET, "db1/gone.sst").unwrap_err();
    assert!(err.is_not_found());
    let err = fetch_object(provider.as_ref(), &dir, BUCKET, "db1/gone.sst").unwrap_err();
    let err = err.downcast::<CloudError>().unwrap();
    assert!(err.is_not_found());
}

#[test]
fn test_list_is_sorted_and_prefix_scoped() {
    let provider = memory_provider();
    let dir = TestDir::new().unwrap();

    for key in ["db1/b.sst", "db1/a.sst", "db1/c.sst", "db2/x.sst"] {
        seed_object(provider.as_ref(), &dir, BUCKET, key, b"x").unwrap();
    }

    let keys = provider.list_cloud_objects(BUCKET, "db1").unwrap();
    assert_eq!(keys, vec!["db1/a.sst", "db1/b.sst", "db1/c.sst"]);

    let all = provider.list_cloud_objects(BUCKET, "").unwrap();
    assert_eq!(all.len(), 4);
}

#[test]
fn test_delete_and_empty_bucket() {
    let provider = memory_provider();
    let dir = TestDir::new().unwrap();

    for key in ["db1/a.sst", "db1/b.sst", "db2/keep.sst"] {
        seed_object(provider.as_ref(), &dir, BUCKET, key, b"x").unwrap();
    }

    provider.delete_cloud_object(BUCKET, "db1/a.sst").unwrap();
    assert!(!provider.exists_cloud_object(BUCKET, "db1/a.sst").unwrap());

    // Emptying a prefix leaves unrelated prefixes alone
    provider.empty_bucket(BUCKET, "db1").unwrap();
    assert!(provider.list_cloud_objects(BUCKET, "db1").unwrap().is_empty());
    assert!(provider.exists_cloud_object(BUCKET, "db2/keep.sst").unwrap());
}

#[test]
fn test_copy_within_and_across_buckets() {
    let provider = memory_provider();
    provider.create_bucket("rockset.other").unwrap();
    let dir = TestDir::new().unwrap();

    seed_object(provider.as_ref(), &dir, BUCKET, "db1/src.sst", b"copied bytes").unwrap();

    provider
        .copy_cloud_object(BUCKET, "db1/src.sst", BUCKET, "db1/dup.sst")
        .unwrap();
    assert_eq!(
        fetch_object(provider.as_ref(), &dir, BUCKET, "db1/dup.sst").unwrap(),
        b"copied bytes"
    );

    provider
        .copy_cloud_object(BUCKET, "db1/src.sst", "rockset.other", "db1/far.sst")
        .unwrap();
    assert_eq!(
        fetch_object(provider.as_ref(), &dir, "rockset.other", "db1/far.sst").unwrap(),
        b"copied bytes"
    );
    // The source is untouched
    assert!(provider.exists_cloud_object(BUCKET, "db1/src.sst").unwrap());
}

#[test]
fn test_metadata_roundtrip() {
    let provider = memory_provider();
    let dir = TestDir::new().unwrap();

    seed_object(provider.as_ref(), &dir, BUCKET, "db1/meta.sst", b"payload").unwrap();

    let mut tags = HashMap::new();
    tags.insert("epoch".to_string(), "42".to_string());
    tags.insert("origin".to_string(), "clone".to_string());
    provider
        .put_cloud_object_metadata(BUCKET, "db1/meta.sst", &tags)
        .unwrap();

    let info = provider.get_cloud_object_metadata(BUCKET, "db1/meta.sst").unwrap();
    assert_eq!(info.size, b"payload".len() as u64);
    assert!(info.modification_time > 0);
    assert_eq!(info.metadata.get("epoch").map(String::as_str), Some("42"));
    assert_eq!(info.metadata.get("origin").map(String::as_str), Some("clone"));
    // Replacing metadata preserves the payload
    assert_eq!(
        fetch_object(provider.as_ref(), &dir, BUCKET, "db1/meta.sst").unwrap(),
        b"payload"
    );
}

#[test]
fn test_writable_then_readable_handle() {
    let provider = memory_provider();
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

    let mut writer = provider.new_cloud_writable_file(BUCKET, "db1/big.sst").unwrap();
    writer.write_all(&data).unwrap();
    assert_eq!(writer.bytes_written(), data.len() as u64);
    writer.status().unwrap();
    writer.close().unwrap();

    let mut reader = provider.new_cloud_readable_file(BUCKET, "db1/big.sst").unwrap();
    assert_eq!(reader.size(), data.len() as u64);

    let mut all = Vec::new();
    reader.read_to_end(&mut all).unwrap();
    assert_eq!(all, data);

    // Random access through the same handle
    let mut buf = [0u8; 10];
    assert_eq!(reader.seek(SeekFrom::Start(500)).unwrap(), 500);
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[500..510]);

    assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), data.len() as u64 - 10);
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[data.len() - 10..]);

    assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 100);
    assert_eq!(reader.seek(SeekFrom::Current(50)).unwrap(), 150);
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[150..160]);

    // Past-the-end seeks are rejected
    assert!(reader.seek(SeekFrom::End(1)).is_err());
    assert!(reader.seek(SeekFrom::Start(data.len() as u64 + 1)).is_err());
}

#[test]
fn test_writable_handle_switches_to_multipart() {
    let provider = memory_provider();
    // Larger than one upload part, so the handle crosses into multipart
    let data: Vec<u8> = (0..9 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();

    let mut writer = provider.new_cloud_writable_file(BUCKET, "db1/multi.sst").unwrap();
    writer.write_all(&data).unwrap();
    writer.close().unwrap();

    let mut reader = provider.new_cloud_readable_file(BUCKET, "db1/multi.sst").unwrap();
    assert_eq!(reader.size(), data.len() as u64);
    let mut all = Vec::new();
    reader.read_to_end(&mut all).unwrap();
    assert_eq!(all, data);
}

#[test]
fn test_writable_handle_empty_object() {
    let provider = memory_provider();

    let mut writer = provider.new_cloud_writable_file(BUCKET, "db1/empty.sst").unwrap();
    writer.close().unwrap();

    assert_eq!(provider.get_cloud_object_size(BUCKET, "db1/empty.sst").unwrap(), 0);
    let mut reader = provider.new_cloud_readable_file(BUCKET, "db1/empty.sst").unwrap();
    let mut all = Vec::new();
    assert_eq!(reader.read_to_end(&mut all).unwrap(), 0);
}

#[test]
fn test_writable_handle_rejects_writes_after_close() {
    let provider = memory_provider();

    let mut writer = provider.new_cloud_writable_file(BUCKET, "db1/closed.sst").unwrap();
    writer.write_all(b"data").unwrap();
    writer.close().unwrap();
    assert!(writer.write_all(b"more").is_err());
    // Closing again reports the retained status rather than re-uploading
    writer.close().unwrap();
}

#[test]
fn test_concurrent_metadata_queries() {
    let provider = memory_provider();
    let dir = TestDir::new().unwrap();

    for i in 0..10 {
        let key = format!("db1/{i:06}.sst");
        seed_object(provider.as_ref(), &dir, BUCKET, &key, format!("payload {i}").as_bytes())
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..10 {
        let provider = provider.clone();
        handles.push(std::thread::spawn(move || {
            let key = format!("db1/{i:06}.sst");
            let info = provider.get_cloud_object_metadata(BUCKET, &key).unwrap();
            assert_eq!(info.size, format!("payload {i}").len() as u64);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_request_callback_observes_operations() {
    let (callback, counter) = counting_callback();
    let options = CloudStorageProviderOptions {
        cloud_request_callback: Some(callback),
        ..Default::default()
    };
    let provider = create_provider(PROVIDER_MEMORY, options).unwrap();
    provider.create_bucket(BUCKET).unwrap();
    let dir = TestDir::new().unwrap();

    seed_object(provider.as_ref(), &dir, BUCKET, "db1/cb.sst", b"x").unwrap();
    provider.exists_cloud_object(BUCKET, "db1/cb.sst").unwrap();
    provider.list_cloud_objects(BUCKET, "db1").unwrap();
    provider.delete_cloud_object(BUCKET, "db1/cb.sst").unwrap();

    // Create + Write + Info + List + Delete
    assert!(counter.load(std::sync::atomic::Ordering::SeqCst) >= 5);

    // Failing operations are reported too
    let before = counter.load(std::sync::atomic::Ordering::SeqCst);
    let _ = provider.get_cloud_object_size(BUCKET, "db1/absent.sst");
    assert!(counter.load(std::sync::atomic::Ordering::SeqCst) > before);
}
