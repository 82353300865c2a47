//! Synchronous read/write handles over cloud objects

use crate::buffer::{ReadWindow, WriteBuffer};
use crate::error::{CloudError, Result};
use crate::ops;
use crate::provider::{CloudRequestOpType, RequestInstrument};
use crate::runtime;
use object_store::path::Path;
use object_store::{MultipartUpload, ObjectStore};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024; // 8MB read window
const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024; // 8MB upload parts

/// Read handle over a cloud object.
///
/// One handle carries both capabilities the engine needs: sequential reads
/// through [`Read`] and random access through [`Seek`] plus [`Read`].
pub trait CloudReadableFile: Read + Seek + Send {
    /// Total size of the object in bytes
    fn size(&self) -> u64;
}

/// Append-write handle over a cloud object.
///
/// Appended data is buffered and uploaded on [`close`]; large files switch
/// to multipart upload transparently. The last I/O error is retained and
/// queryable through [`status`], so partial-write detection does not rely
/// on exceptions.
///
/// [`close`]: CloudWritableFile::close
/// [`status`]: CloudWritableFile::status
pub trait CloudWritableFile: Write + Send {
    /// The last I/O error observed by this handle, if any
    fn status(&self) -> Result<()>;

    /// Uploads all buffered data and finalizes the object
    fn close(&mut self) -> Result<()>;

    /// Total bytes accepted by this handle
    fn bytes_written(&self) -> u64;
}

/// Buffered reader over one object, fetching fixed-size windows on demand
#[derive(Debug)]
pub(crate) struct ObjectReadableFile {
    store: Arc<dyn ObjectStore>,
    path: Path,
    position: u64,
    size: u64,
    window: Option<ReadWindow>,
    instrument: RequestInstrument,
}

impl ObjectReadableFile {
    pub(crate) fn open(
        store: Arc<dyn ObjectStore>,
        key: &str,
        instrument: RequestInstrument,
    ) -> Result<Self> {
        let path = ops::parse_key(key)?;
        let started = Instant::now();
        let meta = runtime::block_on(store.head(&path)).map_err(CloudError::from);
        instrument.record(CloudRequestOpType::Info, 0, started, meta.is_ok());
        let meta = meta?;

        Ok(ObjectReadableFile {
            store,
            path,
            position: 0,
            size: meta.size as u64,
            window: None,
            instrument,
        })
    }

    /// Downloads the window covering the current position
    fn fetch_window(&mut self) -> Result<()> {
        let len = DEFAULT_CHUNK_SIZE.min((self.size - self.position) as usize);
        let range = self.position as usize..self.position as usize + len;

        let started = Instant::now();
        let data = runtime::block_on(self.store.get_range(&self.path, range))
            .map_err(CloudError::from);
        let bytes = data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        self.instrument
            .record(CloudRequestOpType::Read, bytes, started, data.is_ok());

        trace!(path = %self.path, position = self.position, bytes, "fetched read window");
        self.window = Some(ReadWindow::new(data?, self.position));
        Ok(())
    }

    fn ensure_window(&mut self) -> Result<()> {
        if let Some(window) = &self.window {
            if window.contains(self.position) {
                return Ok(());
            }
        }
        if self.position >= self.size {
            return Ok(());
        }
        self.fetch_window()
    }
}

impl Read for ObjectReadableFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.size {
            return Ok(0); // EOF
        }

        self.ensure_window()?;

        if let Some(window) = &self.window {
            if let Some(available) = window.slice_from(self.position) {
                let to_read = buf.len().min(available.len());
                if to_read > 0 {
                    buf[..to_read].copy_from_slice(&available[..to_read]);
                    self.position += to_read as u64;
                    return Ok(to_read);
                }
            }
        }

        Ok(0)
    }
}

impl Seek for ObjectReadableFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(offset) => {
                if offset > 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "cannot seek beyond end of object",
                    ));
                }
                (self.size as i64 + offset) as u64
            }
            SeekFrom::Current(offset) => {
                let new_pos = self.position as i64 + offset;
                if new_pos < 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "cannot seek before start of object",
                    ));
                }
                new_pos as u64
            }
        };

        if new_pos > self.size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot seek beyond end of object",
            ));
        }

        self.position = new_pos;
        Ok(self.position)
    }
}

impl CloudReadableFile for ObjectReadableFile {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Buffered writer over one object.
///
/// Data is accumulated in part-sized chunks; once the first part fills, the
/// upload switches to multipart. Objects smaller than one part are stored
/// with a single put at close.
#[derive(Debug)]
pub(crate) struct ObjectWritableFile {
    store: Arc<dyn ObjectStore>,
    path: Path,
    buffer: WriteBuffer,
    bytes_written: u64,
    multipart: Option<Box<dyn MultipartUpload>>,
    last_error: Option<CloudError>,
    closed: bool,
    instrument: RequestInstrument,
}

impl ObjectWritableFile {
    pub(crate) fn create(
        store: Arc<dyn ObjectStore>,
        key: &str,
        instrument: RequestInstrument,
    ) -> Result<Self> {
        Ok(ObjectWritableFile {
            store,
            path: ops::parse_key(key)?,
            buffer: WriteBuffer::new(DEFAULT_PART_SIZE),
            bytes_written: 0,
            multipart: None,
            last_error: None,
            closed: false,
            instrument,
        })
    }

    fn fail(&mut self, error: CloudError) -> CloudError {
        self.last_error = Some(error.clone());
        error
    }

    /// Uploads the full buffer as one multipart part
    fn upload_part(&mut self) -> Result<()> {
        if self.multipart.is_none() {
            debug!(path = %self.path, "starting multipart upload");
            let created =
                runtime::block_on(self.store.put_multipart(&self.path)).map_err(CloudError::from);
            self.multipart = Some(created.map_err(|e| self.fail(e))?);
        }

        let data = self.buffer.take();
        let bytes = data.len() as u64;
        let started = Instant::now();
        let multipart = self.multipart.as_mut().expect("multipart just initialized");
        let result =
            runtime::block_on(multipart.put_part(data.into())).map_err(CloudError::from);
        self.instrument
            .record(CloudRequestOpType::Write, bytes, started, result.is_ok());
        result.map_err(|e| self.fail(e))
    }
}

impl Write for ObjectWritableFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "file already closed",
            ));
        }

        let mut remaining = buf;
        while !remaining.is_empty() {
            let taken = self.buffer.fill(remaining);
            self.bytes_written += taken as u64;
            remaining = &remaining[taken..];

            if self.buffer.remaining() == 0 {
                self.upload_part()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Parts are uploaded on buffer fill or at close; a mid-stream flush
        // of a partial part would corrupt the multipart layout.
        Ok(())
    }
}

impl CloudWritableFile for ObjectWritableFile {
    fn status(&self) -> Result<()> {
        match &self.last_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return self.status();
        }

        if self.multipart.is_some() {
            if !self.buffer.is_empty() {
                self.upload_part()?;
            }
            debug!(path = %self.path, "completing multipart upload");
            let mut multipart = self.multipart.take().expect("checked above");
            runtime::block_on(multipart.complete())
                .map_err(CloudError::from)
                .map_err(|e| self.fail(e))?;
        } else {
            let data = self.buffer.take();
            let bytes = data.len() as u64;
            let started = Instant::now();
            let result =
                runtime::block_on(self.store.put(&self.path, data.into())).map_err(CloudError::from);
            self.instrument
                .record(CloudRequestOpType::Write, bytes, started, result.is_ok());
            result.map_err(|e| self.fail(e))?;
        }

        self.closed = true;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for ObjectWritableFile {
    fn drop(&mut self) {
        if !self.closed && (self.multipart.is_some() || !self.buffer.is_empty()) {
            if let Err(error) = self.close() {
                warn!(path = %self.path, %error, "failed to finalize cloud file on drop");
            }
        }
    }
}
