use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;

/// In-memory representation of a single-channel PCM WAV file: every header
/// field plus the raw sample payload, tied to the path it was loaded from.
///
/// A missing or zero-length file loads as an empty container ("nothing
/// recorded yet"), not an error. Appending another container's payload and
/// saving rewrites the full header + payload at the container's own path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavContainer {
    path: PathBuf,
    chunk_id: [u8; 4],
    file_size: u32,
    riff_type: [u8; 4],
    fmt_id: [u8; 4],
    fmt_size: u32,
    format_code: u16,
    channels: u16,
    sample_rate: u32,
    avg_bytes_per_sec: u32,
    block_align: u16,
    bit_depth: u16,
    fmt_extra: Vec<u8>,
    data_id: [u8; 4],
    data: Vec<u8>,
}

impl WavContainer {
    /// Load a container from `path`.
    ///
    /// A missing or empty file yields an empty container. Any other read
    /// error, or a header that ends short, is an `IoFailure`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(CaptureError::IoFailure(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if bytes.is_empty() {
            return Ok(Self::empty(path));
        }

        let mut reader = FieldReader::new(&bytes);
        let chunk_id = reader.bytes4()?;
        let file_size = reader.u32()?;
        let riff_type = reader.bytes4()?;
        let fmt_id = reader.bytes4()?;
        let fmt_size = reader.u32()?;
        let format_code = reader.u16()?;
        let channels = reader.u16()?;
        let sample_rate = reader.u32()?;
        let avg_bytes_per_sec = reader.u32()?;
        let block_align = reader.u16()?;
        let bit_depth = reader.u16()?;

        let fmt_extra = if fmt_size == 18 {
            let extra_size = reader.u16()? as usize;
            reader.take(extra_size)?.to_vec()
        } else {
            Vec::new()
        };

        let data_id = reader.bytes4()?;
        let data_size = reader.u32()?;
        let data = reader.take(data_size as usize)?.to_vec();

        Ok(Self {
            path,
            chunk_id,
            file_size,
            riff_type,
            fmt_id,
            fmt_size,
            format_code,
            channels,
            sample_rate,
            avg_bytes_per_sec,
            block_align,
            bit_depth,
            fmt_extra,
            data_id,
            data,
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            chunk_id: [0; 4],
            file_size: 0,
            riff_type: [0; 4],
            fmt_id: [0; 4],
            fmt_size: 0,
            format_code: 0,
            channels: 0,
            sample_rate: 0,
            avg_bytes_per_sec: 0,
            block_align: 0,
            bit_depth: 0,
            fmt_extra: Vec::new(),
            data_id: [0; 4],
            data: Vec::new(),
        }
    }

    /// Append `other`'s payload to this container and rewrite the file.
    ///
    /// An empty container adopts `other`'s header and payload verbatim.
    /// Otherwise every header field must match exactly; on mismatch the
    /// container is left untouched in memory and on disk.
    pub fn append(&mut self, other: &WavContainer) -> Result<(), CaptureError> {
        if self.data.is_empty() {
            self.adopt(other);
        } else {
            if other.data.is_empty() {
                return Err(CaptureError::FormatMismatch(
                    "cannot append a container with an empty payload".into(),
                ));
            }
            if !self.header_matches(other) {
                return Err(CaptureError::FormatMismatch(
                    "container headers differ".into(),
                ));
            }
            self.data.extend_from_slice(&other.data);
            self.file_size += other.data_size();
        }

        self.save()
    }

    /// Serialize header + payload back to this container's path.
    pub fn save(&self) -> Result<(), CaptureError> {
        let mut out = Vec::with_capacity(44 + self.fmt_extra.len() + self.data.len());
        out.extend_from_slice(&self.chunk_id);
        out.extend_from_slice(&self.file_size.to_le_bytes());
        out.extend_from_slice(&self.riff_type);
        out.extend_from_slice(&self.fmt_id);
        out.extend_from_slice(&self.fmt_size.to_le_bytes());
        out.extend_from_slice(&self.format_code.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.avg_bytes_per_sec.to_le_bytes());
        out.extend_from_slice(&self.block_align.to_le_bytes());
        out.extend_from_slice(&self.bit_depth.to_le_bytes());
        if self.fmt_size == 18 {
            out.extend_from_slice(&(self.fmt_extra.len() as u16).to_le_bytes());
            out.extend_from_slice(&self.fmt_extra);
        }
        out.extend_from_slice(&self.data_id);
        out.extend_from_slice(&self.data_size().to_le_bytes());
        out.extend_from_slice(&self.data);

        fs::write(&self.path, &out).map_err(|e| {
            CaptureError::IoFailure(format!("failed to write {}: {}", self.path.display(), e))
        })
    }

    /// Duration in whole seconds, truncated. Assumes 16-bit mono samples;
    /// an empty container reports 0.
    pub fn duration(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.data.len() as u64 / self.sample_rate as u64 / 2) as u32
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn data_size(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn header_matches(&self, other: &WavContainer) -> bool {
        self.chunk_id == other.chunk_id
            && self.riff_type == other.riff_type
            && self.fmt_id == other.fmt_id
            && self.fmt_size == other.fmt_size
            && self.format_code == other.format_code
            && self.channels == other.channels
            && self.sample_rate == other.sample_rate
            && self.avg_bytes_per_sec == other.avg_bytes_per_sec
            && self.block_align == other.block_align
            && self.bit_depth == other.bit_depth
            && self.fmt_extra.len() == other.fmt_extra.len()
            && self.data_id == other.data_id
    }

    /// Take over `other`'s header and payload, keeping this container's path.
    fn adopt(&mut self, other: &WavContainer) {
        self.chunk_id = other.chunk_id;
        self.file_size = other.file_size;
        self.riff_type = other.riff_type;
        self.fmt_id = other.fmt_id;
        self.fmt_size = other.fmt_size;
        self.format_code = other.format_code;
        self.channels = other.channels;
        self.sample_rate = other.sample_rate;
        self.avg_bytes_per_sec = other.avg_bytes_per_sec;
        self.block_align = other.block_align;
        self.bit_depth = other.bit_depth;
        self.fmt_extra = other.fmt_extra.clone();
        self.data_id = other.data_id;
        self.data = other.data.clone();
    }
}

/// Sequential little-endian field reader over a byte slice.
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CaptureError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.buf.len());
        let Some(end) = end else {
            return Err(CaptureError::IoFailure(format!(
                "short read: wanted {} bytes at offset {}, file is {} bytes",
                len,
                self.pos,
                self.buf.len()
            )));
        };
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn bytes4(&mut self) -> Result<[u8; 4], CaptureError> {
        let slice = self.take(4)?;
        Ok([slice[0], slice[1], slice[2], slice[3]])
    }

    fn u16(&mut self) -> Result<u16, CaptureError> {
        let slice = self.take(2)?;
        Ok(u16::from_le_bytes([slice[0], slice[1]]))
    }

    fn u32(&mut self) -> Result<u32, CaptureError> {
        let slice = self.take(4)?;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }
}
