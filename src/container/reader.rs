//! IVF reader
//!
//! Produces a lazy, finite sequence of frames. The sequence cannot be
//! rewound; reopen the source to start over.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use bytes::BytesMut;

use super::error::ContainerError;
use super::ivf::{FrameHeader, IvfFrame, IvfHeader, FRAME_HEADER_SIZE, IVF_HEADER_SIZE};

/// Reader for a single IVF source
pub struct IvfReader<R: Read> {
    inner: BufReader<R>,
    header: IvfHeader,
    frames_read: u64,
    finished: bool,
}

impl IvfReader<File> {
    /// Open a file and parse its header
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, IvfHeader), ContainerError> {
        let file = File::open(path)?;
        Self::new(file)
    }
}

impl<R: Read> IvfReader<R> {
    /// Wrap a source and parse its header
    pub fn new(inner: R) -> Result<(Self, IvfHeader), ContainerError> {
        let mut inner = BufReader::new(inner);

        let mut buf = [0u8; IVF_HEADER_SIZE];
        let n = read_full(&mut inner, &mut buf)?;
        if n < IVF_HEADER_SIZE {
            return Err(ContainerError::TruncatedHeader);
        }
        let header = IvfHeader::parse(&buf)?;

        let reader = Self {
            inner,
            header,
            frames_read: 0,
            finished: false,
        };
        Ok((reader, header))
    }

    /// Parsed file header
    pub fn header(&self) -> &IvfHeader {
        &self.header
    }

    /// Number of frames returned so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    pub fn next_frame(&mut self) -> Result<Option<IvfFrame>, ContainerError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = [0u8; FRAME_HEADER_SIZE];
        let n = read_full(&mut self.inner, &mut buf)?;
        if n == 0 {
            self.finished = true;
            return Ok(None);
        }
        if n < FRAME_HEADER_SIZE {
            self.finished = true;
            return Err(ContainerError::TruncatedFrameHeader);
        }

        let frame_header = FrameHeader::parse(&buf)?;

        let mut data = BytesMut::zeroed(frame_header.size as usize);
        let n = read_full(&mut self.inner, &mut data)?;
        if n < data.len() {
            self.finished = true;
            return Err(ContainerError::TruncatedFrame {
                expected: frame_header.size,
                actual: n,
            });
        }

        self.frames_read += 1;
        Ok(Some(IvfFrame {
            timestamp: frame_header.timestamp,
            data: data.freeze(),
        }))
    }
}

impl<R: Read> Iterator for IvfReader<R> {
    type Item = Result<IvfFrame, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Fill `buf` unless the source ends first; returns the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
