//! Staging and write-through buffers
//!
//! Body bytes take one of two paths. Bytes that might still turn out to be
//! a delimiter wait in a bounded [`StagingBuffer`]; bytes known to be content
//! go to a [`WriteBuffer`], which batches them into large writes on the sink.

use std::io::{self, Write};

/// Default staging cap (10 MiB)
pub const DEFAULT_STAGING_LIMIT: usize = 10 * 1024 * 1024;

/// Default write-through batch size (2 MiB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Bytes whose classification (delimiter or content) is not yet known
#[derive(Debug)]
pub struct StagingBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl StagingBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit.min(128)),
            limit,
        }
    }

    /// Stage one byte. Returns `false`, leaving the buffer untouched, when
    /// the buffer is already at its limit.
    #[must_use]
    pub fn push(&mut self, byte: u8) -> bool {
        if self.bytes.len() >= self.limit {
            return false;
        }
        self.bytes.push(byte);
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Move every staged byte into `writer` as content.
    pub fn release_into<W: Write>(&mut self, writer: &mut WriteBuffer<W>) -> io::Result<()> {
        if !self.bytes.is_empty() {
            writer.write(&self.bytes)?;
            self.bytes.clear();
        }
        Ok(())
    }
}

/// Write-through buffer in front of a storage sink.
///
/// Committed bytes are copied into a fixed-capacity batch that is written
/// to the sink only when full or on [`finish`](Self::finish).
pub struct WriteBuffer<W: Write> {
    sink: W,
    batch: Vec<u8>,
    capacity: usize,
    committed: u64,
}

impl<W: Write> WriteBuffer<W> {
    pub fn new(sink: W, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            batch: Vec::with_capacity(capacity),
            capacity,
            committed: 0,
        }
    }

    /// Commit bytes as content
    pub fn write(&mut self, mut data: &[u8]) -> io::Result<()> {
        self.committed += data.len() as u64;
        while !data.is_empty() {
            if self.batch.len() == self.capacity {
                self.flush_batch()?;
            }
            let room = self.capacity - self.batch.len();
            let take = room.min(data.len());
            self.batch.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(())
    }

    /// Total bytes committed so far, flushed or not
    pub fn committed(&self) -> u64 {
        self.committed
    }

    fn flush_batch(&mut self) -> io::Result<()> {
        if !self.batch.is_empty() {
            self.sink.write_all(&self.batch)?;
            self.batch.clear();
        }
        Ok(())
    }

    /// Flush everything and hand back the sink with the committed byte count.
    pub fn finish(mut self) -> io::Result<(W, u64)> {
        self.flush_batch()?;
        self.sink.flush()?;
        Ok((self.sink, self.committed))
    }
}
