use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, ScanError};

/// Minimal addressable unit assumed for raw images and block devices.
pub const SECTOR_SIZE: usize = 512;

const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Sequential, restartable block stream over a disk image, opened read-only.
///
/// Blocks are non-overlapping, cover the whole image in ascending offset
/// order, and only the final block may be shorter than `block_size`.
/// `read_at` allows later pipeline stages to re-inspect a byte range without
/// disturbing the sequential position.
pub struct BlockReader {
    file: File,
    size: u64,
    block_size: usize,
    position: u64,
}

impl BlockReader {
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        if block_size == 0 || block_size % SECTOR_SIZE != 0 {
            return Err(ScanError::InvalidConfig(format!(
                "block size {} is not a positive multiple of {}",
                block_size, SECTOR_SIZE
            )));
        }

        let file = OpenOptions::new().read(true).open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            file,
            size,
            block_size,
            position: 0,
        })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Reads the next block into `buf` (resized and truncated to the bytes
    /// actually read) and returns its offset, or `None` at end of image.
    pub fn next_block_into(&mut self, buf: &mut Vec<u8>) -> Result<Option<u64>> {
        if self.position >= self.size {
            return Ok(None);
        }

        let offset = self.position;
        buf.resize(self.block_size, 0);
        self.file.seek(SeekFrom::Start(offset))?;

        let n = read_up_to(&mut self.file, buf)?;
        if n == 0 {
            // Metadata claimed more bytes than the file delivers.
            return Err(ScanError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("image truncated at offset {offset}"),
            )));
        }

        buf.truncate(n);
        self.position += n as u64;
        Ok(Some(offset))
    }

    /// Re-reads up to `len` bytes starting at `offset`. Returns whatever is
    /// available before end of image so callers can detect truncation by
    /// comparing lengths.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset >= self.size {
            return Ok(Vec::new());
        }
        let available = (self.size - offset).min(len as u64) as usize;
        let mut buf = vec![0u8; available];
        self.file.seek(SeekFrom::Start(offset))?;
        let n = read_up_to(&mut self.file, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ScanError::Io(e)),
        }
    }
    Ok(filled)
}

/// Streaming SHA-256 of the whole image, for the chain-of-custody comparison
/// the case collaborator performs before and after a scan.
pub fn hash_image(path: impl AsRef<Path>) -> Result<String> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
