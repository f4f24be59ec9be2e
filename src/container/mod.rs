//! Framed media container I/O
//!
//! Captured sessions are persisted as IVF files and file playback reads the
//! same format back. IVF is a minimal chunked container: one fixed header
//! followed by length-prefixed frames.
//!
//! ```text
//! +================+===============+=========+===============+=========+
//! | File Header    | Frame Header  | Frame   | Frame Header  | Frame   |
//! | (32 bytes)     | (12 bytes)    | (N)     | (12 bytes)    | (M) ... |
//! +================+===============+=========+===============+=========+
//! ```
//!
//! Writers and readers are single-owner: exactly one task produces into a
//! writer, and exactly one task consumes a reader.

pub mod error;
pub mod ivf;
pub mod reader;
pub mod writer;

pub use error::ContainerError;
pub use ivf::{FrameHeader, IvfFrame, IvfHeader};
pub use reader::IvfReader;
pub use writer::IvfWriter;
