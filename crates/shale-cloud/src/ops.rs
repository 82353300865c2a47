//! Shared object-store plumbing for provider implementations
//!
//! Every function here bridges one async `object_store` call behind the
//! crate's blocking contract and reports it through the request callback.
//! Providers differ only in how they resolve a bucket name to a store.

use crate::error::{CloudError, Result};
use crate::provider::{CloudObjectInformation, CloudRequestOpType, RequestInstrument};
use crate::runtime;
use bytes::Bytes;
use futures_util::StreamExt;
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, PutOptions};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::time::Instant;
use tracing::trace;

/// Parses an object key, rejecting malformed paths as `InvalidArgument`
pub(crate) fn parse_key(key: &str) -> Result<Path> {
    Path::parse(key).map_err(|e| CloudError::InvalidArgument(format!("object path {key:?}: {e}")))
}

pub(crate) fn list_keys(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<Vec<String>> {
    let started = Instant::now();
    let result = (|| {
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(parse_key(prefix)?)
        };
        runtime::block_on(async {
            let mut stream = store.list(prefix_path.as_ref());
            let mut keys = Vec::new();
            while let Some(meta) = stream.next().await {
                keys.push(meta?.location.to_string());
            }
            keys.sort();
            Ok(keys)
        })
    })();
    instrument.record(CloudRequestOpType::List, 0, started, result.is_ok());
    result
}

pub(crate) fn exists(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
) -> Result<bool> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        match runtime::block_on(store.head(&path)) {
            Ok(_) => Ok(true),
            Err(e) => {
                let e = CloudError::from(e);
                if e.is_not_found() {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    })();
    instrument.record(CloudRequestOpType::Info, 0, started, result.is_ok());
    result
}

pub(crate) fn object_size(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
) -> Result<u64> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        let meta = runtime::block_on(store.head(&path))?;
        Ok(meta.size as u64)
    })();
    instrument.record(CloudRequestOpType::Info, 0, started, result.is_ok());
    result
}

pub(crate) fn object_modification_time(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
) -> Result<u64> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        let meta = runtime::block_on(store.head(&path))?;
        Ok(meta.last_modified.timestamp().max(0) as u64)
    })();
    instrument.record(CloudRequestOpType::Info, 0, started, result.is_ok());
    result
}

pub(crate) fn object_info(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
) -> Result<CloudObjectInformation> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        let mut options = GetOptions::default();
        options.head = true;
        let response = runtime::block_on(store.get_opts(&path, options))?;

        let mut metadata = HashMap::new();
        for (attr, value) in response.attributes.iter() {
            if let Attribute::Metadata(name) = attr {
                metadata.insert(name.to_string(), value.to_string());
            }
        }
        Ok(CloudObjectInformation {
            size: response.meta.size as u64,
            modification_time: response.meta.last_modified.timestamp().max(0) as u64,
            content_hash: response.meta.e_tag.clone().unwrap_or_default(),
            metadata,
        })
    })();
    instrument.record(CloudRequestOpType::Info, 0, started, result.is_ok());
    result
}

pub(crate) fn delete(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
) -> Result<()> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        runtime::block_on(store.delete(&path))?;
        Ok(())
    })();
    instrument.record(CloudRequestOpType::Delete, 0, started, result.is_ok());
    result
}

/// Deletes every object under `prefix`. Stops on the first failing delete;
/// partial progress is not rolled back.
pub(crate) fn empty_prefix(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    prefix: &str,
) -> Result<()> {
    for key in list_keys(instrument, store, prefix)? {
        delete(instrument, store, &key)?;
    }
    Ok(())
}

/// Server-side copy within one store
pub(crate) fn copy_within(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    from: &str,
    to: &str,
) -> Result<()> {
    let started = Instant::now();
    let result = (|| {
        let from = parse_key(from)?;
        let to = parse_key(to)?;
        runtime::block_on(store.copy(&from, &to))?;
        Ok(())
    })();
    instrument.record(CloudRequestOpType::Copy, 0, started, result.is_ok());
    result
}

/// Copy across stores; streams through memory, never via local disk
pub(crate) fn copy_across(
    instrument: &RequestInstrument,
    src_store: &dyn ObjectStore,
    from: &str,
    dst_store: &dyn ObjectStore,
    to: &str,
) -> Result<()> {
    let started = Instant::now();
    let result = (|| {
        let from = parse_key(from)?;
        let to = parse_key(to)?;
        runtime::block_on(async {
            let data = src_store.get(&from).await?.bytes().await?;
            let size = data.len() as u64;
            dst_store.put(&to, data.into()).await?;
            Ok(size)
        })
    })();
    let bytes = *result.as_ref().unwrap_or(&0);
    instrument.record(CloudRequestOpType::Copy, bytes, started, result.is_ok());
    result.map(|_| ())
}

/// Downloads an object to a local file
pub(crate) fn download(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
    local_path: &str,
) -> Result<()> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        runtime::block_on(async {
            let response = store.get(&path).await?;
            let mut file = std::fs::File::create(local_path)?;
            let mut stream = response.into_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk)?;
                written += chunk.len() as u64;
            }
            trace!(key, local_path, written, "downloaded cloud object");
            Ok(written)
        })
    })();
    let bytes = *result.as_ref().unwrap_or(&0);
    instrument.record(CloudRequestOpType::Read, bytes, started, result.is_ok());
    result.map(|_| ())
}

/// Uploads a local file as an object
pub(crate) fn upload(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    local_path: &str,
    key: &str,
) -> Result<()> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        let data = Bytes::from(std::fs::read(local_path)?);
        let size = data.len() as u64;
        runtime::block_on(store.put(&path, data.into()))?;
        trace!(key, local_path, size, "uploaded cloud object");
        Ok(size)
    })();
    let bytes = *result.as_ref().unwrap_or(&0);
    instrument.record(CloudRequestOpType::Write, bytes, started, result.is_ok());
    result.map(|_| ())
}

/// Replaces the object's vendor metadata.
///
/// The vendor crate attaches attributes only at put time, so this is a
/// read-modify-write of the object payload.
pub(crate) fn replace_metadata(
    instrument: &RequestInstrument,
    store: &dyn ObjectStore,
    key: &str,
    metadata: &HashMap<String, String>,
) -> Result<()> {
    let started = Instant::now();
    let result = (|| {
        let path = parse_key(key)?;
        let mut attributes = Attributes::new();
        for (name, value) in metadata {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(name.clone())),
                AttributeValue::from(value.clone()),
            );
        }
        runtime::block_on(async {
            let data = store.get(&path).await?.bytes().await?;
            let size = data.len() as u64;
            let mut options = PutOptions::default();
            options.attributes = attributes;
            store.put_opts(&path, data.into(), options).await?;
            Ok(size)
        })
    })();
    let bytes = *result.as_ref().unwrap_or(&0);
    instrument.record(CloudRequestOpType::Write, bytes, started, result.is_ok());
    result.map(|_| ())
}
