//! IVF writer
//!
//! Append-only. The header is written when the writer is created; `close`
//! rewrites the frame count and flushes. A writer dropped without `close`
//! finalizes itself, so every exit path leaves a readable file.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::ContainerError;
use super::ivf::{FrameHeader, IvfHeader, FRAME_COUNT_OFFSET, MAX_FRAME_SIZE};

/// Writer for a single IVF destination
///
/// Not `Sync`-shared: exactly one producer owns it.
pub struct IvfWriter<W: Write + Seek> {
    inner: Option<BufWriter<W>>,
    header: IvfHeader,
    frame_count: u32,
    bytes_written: u64,
    path: Option<PathBuf>,
}

impl IvfWriter<File> {
    /// Create (or truncate) a file and write the IVF header
    pub fn create(path: impl AsRef<Path>, header: IvfHeader) -> Result<Self, ContainerError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let mut writer = Self::new(file, header)?;
        writer.path = Some(path.to_path_buf());
        Ok(writer)
    }
}

impl<W: Write + Seek> IvfWriter<W> {
    /// Wrap a destination and write the IVF header
    pub fn new(inner: W, header: IvfHeader) -> Result<Self, ContainerError> {
        let mut inner = BufWriter::new(inner);
        let mut header = header;
        header.frame_count = 0;
        inner.write_all(&header.encode())?;

        Ok(Self {
            inner: Some(inner),
            header,
            frame_count: 0,
            bytes_written: 0,
            path: None,
        })
    }

    /// Append one frame record
    pub fn write_frame(&mut self, data: &[u8], timestamp: u64) -> Result<(), ContainerError> {
        let inner = self.inner.as_mut().ok_or(ContainerError::Closed)?;

        let size = u32::try_from(data.len())
            .ok()
            .filter(|size| *size <= MAX_FRAME_SIZE)
            .ok_or(ContainerError::FrameTooLarge(data.len().min(u32::MAX as usize) as u32))?;

        let frame_header = FrameHeader { size, timestamp };
        inner.write_all(&frame_header.encode())?;
        inner.write_all(data)?;

        self.frame_count += 1;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Number of frames written so far
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Payload bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Header as it will be finalized
    pub fn header(&self) -> IvfHeader {
        IvfHeader {
            frame_count: self.frame_count,
            ..self.header
        }
    }

    /// Destination path, if created from a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if the writer has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Finalize the header and release the destination
    pub fn close(mut self) -> Result<W, ContainerError> {
        self.finish()?.ok_or(ContainerError::Closed)
    }

    fn finish(&mut self) -> Result<Option<W>, ContainerError> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(None);
        };

        inner.flush()?;
        let mut dest = inner.into_inner().map_err(|e| e.into_error())?;

        let end = dest.stream_position()?;
        dest.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        dest.write_all(&self.frame_count.to_le_bytes())?;
        dest.seek(SeekFrom::Start(end))?;
        dest.flush()?;

        Ok(Some(dest))
    }
}

impl<W: Write + Seek> Drop for IvfWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!(error = %e, "Failed to finalize IVF writer on drop");
            }
        }
    }
}
