//! Streaming part decoder
//!
//! [`PartDecoder`] applies the effects produced by [`Cursor::step`] to real
//! buffers and sinks. It is fed one chunk at a time and never holds more
//! than one header block, one staging run and one write batch in memory.

use super::boundary::DelimiterSet;
use super::buffer::{StagingBuffer, WriteBuffer};
use super::filename::{self, CreatedFile};
use super::headers::{HeaderAccumulator, PartHeader};
use super::state::{Cursor, DecoderState, Effect, Followup};
use super::{MultipartError, StoredFile};
use crate::config::MultipartConfig;
use crate::storage::Destination;
use std::path::PathBuf;
use tracing::{debug, warn};

/// The part currently being written
struct OpenPart<F: std::io::Write> {
    name: String,
    path: PathBuf,
    writer: WriteBuffer<F>,
}

/// Incremental multipart decoder writing file parts into a [`Destination`]
pub struct PartDecoder<'a, D: Destination> {
    delimiters: DelimiterSet,
    destination: &'a D,
    cursor: Cursor,
    headers: HeaderAccumulator,
    staging: StagingBuffer,
    current: Option<OpenPart<D::File>>,
    stored: Vec<StoredFile>,
    write_buffer_size: usize,
    reject_truncated: bool,
}

impl<'a, D: Destination> PartDecoder<'a, D> {
    /// Create a decoder for one request body.
    ///
    /// The staging limit is raised to the delimiter length when configured
    /// lower, so a forced staging flush can never split a real delimiter.
    pub fn new(
        boundary: &str,
        destination: &'a D,
        config: &MultipartConfig,
    ) -> Result<Self, MultipartError> {
        let delimiters = DelimiterSet::new(boundary)?;
        let staging_limit = config.staging_limit.max(delimiters.part().len());
        Ok(Self::with_staging_limit(
            delimiters,
            destination,
            config,
            staging_limit,
        ))
    }

    fn with_staging_limit(
        delimiters: DelimiterSet,
        destination: &'a D,
        config: &MultipartConfig,
        staging_limit: usize,
    ) -> Self {
        Self {
            delimiters,
            destination,
            cursor: Cursor::new(),
            headers: HeaderAccumulator::new(config.max_header_bytes),
            staging: StagingBuffer::with_limit(staging_limit),
            current: None,
            stored: Vec::new(),
            write_buffer_size: config.write_buffer_size,
            reject_truncated: config.reject_truncated,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.cursor.state()
    }

    /// Feed the next chunk of the body.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), MultipartError> {
        // Start of the current run of plain content bytes within `chunk`
        let mut run: Option<usize> = None;

        for (i, &byte) in chunk.iter().enumerate() {
            let (next, effect) = self.cursor.step(&self.delimiters, byte);
            self.cursor = next;

            if effect == Effect::Content {
                run.get_or_insert(i);
                continue;
            }
            if let Some(start) = run.take() {
                self.commit(&chunk[start..i])?;
            }

            match effect {
                Effect::Discard | Effect::Content => {}
                Effect::Stage => self.stage(byte)?,
                Effect::Release(followup) => {
                    self.release_staged()?;
                    match followup {
                        Followup::Content => run = Some(i),
                        Followup::Stage => self.stage(byte)?,
                    }
                }
                Effect::Header => self.push_header(byte)?,
                Effect::OpenHeaders => self.headers.clear(),
                Effect::ClosePart => self.close_part(1)?,
                Effect::Finish => {
                    self.headers.clear();
                    if self.current.is_some() {
                        self.release_staged()?;
                        self.close_part(0)?;
                    }
                }
            }
        }

        if let Some(start) = run {
            self.commit(&chunk[start..])?;
        }
        Ok(())
    }

    /// End of stream. Finalizes a part left open by a body that stopped
    /// before its closing delimiter, unless truncation is configured as an
    /// error. On error, call [`abort`](Self::abort) to discard the open part.
    pub fn finish(&mut self) -> Result<Vec<StoredFile>, MultipartError> {
        match self.cursor.state() {
            DecoderState::ReadingBody => {
                if self.reject_truncated {
                    return Err(MultipartError::Truncated);
                }
                if let Some(part) = &self.current {
                    warn!(
                        file = %part.name,
                        bytes = part.writer.committed() + self.staging.len() as u64,
                        "Body ended inside a part; keeping what was received"
                    );
                }
                self.release_staged()?;
                self.close_part(0)?;
            }
            DecoderState::ReadingHeaders if !self.headers.is_blank() => {
                return Err(MultipartError::UnterminatedHeaders);
            }
            _ => {}
        }
        Ok(std::mem::take(&mut self.stored))
    }

    /// Drop the in-progress part, removing its partial file, and return the
    /// files that were already finalized.
    pub fn abort(&mut self) -> Vec<StoredFile> {
        if let Some(part) = self.current.take() {
            let OpenPart { name, path, writer } = part;
            drop(writer);
            if let Err(e) = self.destination.remove(&path) {
                warn!(file = %name, error = %e, "Failed to remove partial upload");
            } else {
                debug!(file = %name, "Removed partial upload");
            }
        }
        std::mem::take(&mut self.stored)
    }

    fn commit(&mut self, bytes: &[u8]) -> Result<(), MultipartError> {
        if let Some(part) = self.current.as_mut() {
            part.writer.write(bytes).map_err(MultipartError::Storage)?;
        }
        Ok(())
    }

    fn stage(&mut self, byte: u8) -> Result<(), MultipartError> {
        if self.staging.push(byte) {
            return Ok(());
        }

        // Staging is full: everything held back is content after all.
        debug!(limit = self.staging.limit(), "Staging limit reached, flushing as content");
        self.release_staged()?;
        self.commit(&[byte])?;
        self.cursor = self.cursor.abandon_match();
        Ok(())
    }

    fn release_staged(&mut self) -> Result<(), MultipartError> {
        match self.current.as_mut() {
            Some(part) => self
                .staging
                .release_into(&mut part.writer)
                .map_err(MultipartError::Storage),
            None => {
                self.staging.clear();
                Ok(())
            }
        }
    }

    fn push_header(&mut self, byte: u8) -> Result<(), MultipartError> {
        if let Some(header) = self.headers.push(byte)? {
            let is_file = self.open_part(&header)?;
            self.cursor = self.cursor.headers_complete(is_file);
        }
        Ok(())
    }

    fn open_part(&mut self, header: &PartHeader) -> Result<bool, MultipartError> {
        let Some(raw_name) = header.filename() else {
            debug!("Skipping part without filename");
            return Ok(false);
        };

        let safe_name = filename::sanitize(&raw_name);
        let CreatedFile { name, path, file } =
            filename::create_unique(self.destination, &safe_name)?;
        debug!(file = %name, "Opened part");

        self.current = Some(OpenPart {
            name,
            path,
            writer: WriteBuffer::new(file, self.write_buffer_size),
        });
        Ok(true)
    }

    /// Close the open part. `pending` is the number of delimiter bytes not
    /// yet staged (the byte that completed the match).
    fn close_part(&mut self, pending: usize) -> Result<(), MultipartError> {
        let Some(part) = self.current.take() else {
            self.staging.clear();
            return Ok(());
        };
        let OpenPart {
            name,
            path,
            mut writer,
        } = part;

        // Staged bytes beyond the delimiter length preceded it and are content.
        let delimiter_len = self.delimiters.part().len();
        let keep = (self.staging.len() + pending).saturating_sub(delimiter_len);
        let flushed = match writer.write(&self.staging.as_slice()[..keep]) {
            Ok(()) => writer.finish(),
            Err(e) => Err(e),
        };
        self.staging.clear();

        let size = match flushed {
            Ok((file, size)) => {
                drop(file);
                size
            }
            Err(e) => {
                if let Err(remove_err) = self.destination.remove(&path) {
                    warn!(file = %name, error = %remove_err, "Failed to remove partial upload");
                }
                return Err(MultipartError::Storage(e));
            }
        };

        debug!(file = %name, size, "Stored part");
        self.stored.push(StoredFile { name, path, size });
        Ok(())
    }
}
