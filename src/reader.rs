//! Stream reader.
//!
//! This module provides [`NofsStream`], which pulls the logical data stream
//! out of a NoFS card one chunk at a time without loading the card into
//! memory.

use crate::device::{Access, DeviceHandle};
use crate::error::{Error, Result};
use crate::layout::{Header, Region, SentinelScanner, SECTOR_SIZE};
use crate::options::Options;

use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Read and validate the header of the card at `path`.
pub fn read_header(path: &Path) -> Result<Header> {
    let handle = DeviceHandle::open(path, Access::Read)?;
    decode_header(&handle)
}

pub(crate) fn decode_header(handle: &DeviceHandle) -> Result<Header> {
    if handle.size() < SECTOR_SIZE as u64 {
        return Err(Error::NotNoFsFormatted(handle.path().to_path_buf()));
    }
    let block = handle.read_at(0, SECTOR_SIZE)?;
    Header::decode(handle.path(), &block)
}

/// Lazy, forward-only sequence of payload chunks from a NoFS card.
///
/// The stream holds the device for its whole lifetime and releases it when
/// dropped. It cannot seek; to read again, open a new stream. After the end
/// of data or the first error it yields nothing further.
///
/// # Example
///
/// ```no_run
/// use nofs::{NofsStream, Options};
/// use std::path::Path;
///
/// let mut stream = NofsStream::open(Path::new("/dev/sdb"), &Options::default()).unwrap();
/// let mut out = std::fs::File::create("log.bin").unwrap();
/// std::io::copy(&mut stream, &mut out).unwrap();
/// ```
#[derive(Debug)]
pub struct NofsStream {
    handle: DeviceHandle,
    header: Header,
    region: Region,
    offset: u64,
    chunk_size: usize,
    scanner: SentinelScanner,
    emitted: u64,
    finished: bool,
    // Unconsumed tail of the last chunk, for the `io::Read` impl.
    spill: Vec<u8>,
    spill_pos: usize,
}

impl NofsStream {
    /// Open `path`, validate its header and prepare to stream the data
    /// region.
    pub fn open(path: &Path, options: &Options) -> Result<Self> {
        let handle = DeviceHandle::open(path, Access::Read)?;
        let header = decode_header(&handle)?;
        let region = header.region(path, handle.size())?;

        info!(
            device = %path.display(),
            version = header.version,
            region_length = ?header.region_length,
            "reading NoFS data region"
        );

        Ok(Self {
            handle,
            header,
            region,
            offset: region.start,
            chunk_size: options.chunk_size,
            scanner: SentinelScanner::new(options.sentinel_run),
            emitted: 0,
            finished: false,
            spill: Vec::new(),
            spill_pos: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Number of payload bytes produced so far.
    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    /// Drain the remaining stream into `writer`, returning the byte count.
    pub fn copy_to<W: io::Write>(&mut self, writer: &mut W) -> Result<u64> {
        let mut total = 0u64;
        for chunk in &mut *self {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .map_err(|e| Error::io("write output", e))?;
            total += chunk.len() as u64;
        }
        Ok(total)
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();

        while !self.finished && out.is_empty() {
            if self.offset >= self.region.end {
                self.scanner.finish(&mut out);
                self.finished = true;
                break;
            }

            let length = (self.region.end - self.offset).min(self.chunk_size as u64) as usize;
            let raw = self.handle.read_at(self.offset, length)?;
            self.offset += length as u64;

            if self.scanner.feed(&raw, &mut out) {
                debug!(offset = self.offset, "end-of-data sentinel found");
                self.finished = true;
            }
        }

        if out.is_empty() {
            return Ok(None);
        }
        self.emitted += out.len() as u64;
        Ok(Some(out))
    }
}

impl Iterator for NofsStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl io::Read for NofsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.spill_pos >= self.spill.len() {
            match self.next() {
                Some(Ok(chunk)) => {
                    self.spill = chunk;
                    self.spill_pos = 0;
                }
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => return Ok(0),
            }
        }

        let available = &self.spill[self.spill_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.spill_pos += n;
        Ok(n)
    }
}
