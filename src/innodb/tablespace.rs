//! Tablespace file access and the page-size probe.
//!
//! The probe reads the first 1024 bytes (the smallest possible physical
//! page), decodes the FSP flags from the fixed offset on page 0, validates
//! them, and derives the physical/logical page-size pair. Compressed
//! tablespaces store pages at the physical size; everything downstream
//! reads at physical granularity and decompresses on demand.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::page::{FspFlags, FspHeader};
use crate::IbxError;

/// The physical/logical page-size pair of an open tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    /// On-disk block size; smaller than `logical` iff the tablespace is
    /// compressed.
    pub physical: usize,
    /// In-memory size the engine treats every page as.
    pub logical: usize,
}

impl PageSize {
    pub fn is_compressed(&self) -> bool {
        self.physical < self.logical
    }
}

/// An open tablespace file with its probed geometry.
pub struct Tablespace {
    file: File,
    file_size: u64,
    page_size: PageSize,
    page_count: u64,
    fsp_flags: FspFlags,
    space_id: u32,
}

impl Tablespace {
    /// Open a tablespace file and probe its page size from page 0.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IbxError> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .map_err(|e| IbxError::Io(format!("cannot open {}: {}", path.display(), e)))?;

        let file_size = file
            .metadata()
            .map_err(|e| IbxError::Io(format!("cannot stat {}: {}", path.display(), e)))?
            .len();

        let (page_size, fsp_flags, space_id) = probe_page_size(&mut file)?;
        let page_count = file_size / page_size.physical as u64;

        Ok(Tablespace {
            file,
            file_size,
            page_size,
            page_count,
            fsp_flags,
            space_id,
        })
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn fsp_flags(&self) -> FspFlags {
        self.fsp_flags
    }

    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    /// Read one page at physical size via a positional read. The main page
    /// loop and the LOB reader share the descriptor; positional I/O keeps
    /// the file offset state immaterial.
    pub fn read_page(&self, page_no: u64) -> Result<Vec<u8>, IbxError> {
        if page_no >= self.page_count {
            return Err(IbxError::Io(format!(
                "page {} out of range ({} pages)",
                page_no, self.page_count
            )));
        }
        let mut buf = vec![0u8; self.page_size.physical];
        let offset = page_no * self.page_size.physical as u64;
        self.file
            .read_exact_at(&mut buf, offset)
            .map_err(|e| IbxError::Io(format!("cannot read page {}: {}", page_no, e)))?;
        Ok(buf)
    }

    /// Stream every page in file order into the callback, reusing one
    /// physical-size buffer.
    pub fn for_each_page<F>(&mut self, mut callback: F) -> Result<(), IbxError>
    where
        F: FnMut(u64, &[u8]) -> Result<(), IbxError>,
    {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| IbxError::Io(format!("cannot seek to start: {}", e)))?;

        let mut buf = vec![0u8; self.page_size.physical];
        for page_no in 0..self.page_count {
            self.file
                .read_exact(&mut buf)
                .map_err(|e| IbxError::Io(format!("cannot read page {}: {}", page_no, e)))?;
            callback(page_no, &buf)?;
        }
        Ok(())
    }
}

/// Probe `(physical, logical, flags, space_id)` from the first 1024 bytes,
/// then rewind the file.
fn probe_page_size(file: &mut File) -> Result<(PageSize, FspFlags, u32), IbxError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| IbxError::Io(format!("cannot seek to start: {}", e)))?;

    let mut buf = [0u8; UNIV_ZIP_SIZE_MIN];
    file.read_exact(&mut buf)
        .map_err(|e| IbxError::ShortRead(format!("cannot read first {} bytes: {}", UNIV_ZIP_SIZE_MIN, e)))?;

    let flags = FspFlags(codec::read_u32(&buf, FIL_PAGE_DATA + FSP_SPACE_FLAGS));
    if !flags.is_valid() {
        return Err(IbxError::InvalidFspFlags(flags.raw()));
    }

    let logical = flags.logical_page_size();
    if !(UNIV_PAGE_SIZE_MIN..=UNIV_PAGE_SIZE_MAX).contains(&logical) || !logical.is_power_of_two() {
        return Err(IbxError::UnsupportedPageSize(logical));
    }
    let physical = flags.physical_page_size();
    if physical < UNIV_ZIP_SIZE_MIN || physical > logical || !physical.is_power_of_two() {
        return Err(IbxError::UnsupportedPageSize(physical));
    }

    let space_id = codec::read_u32(&buf, FIL_PAGE_DATA + FSP_SPACE_ID);

    file.seek(SeekFrom::Start(0))
        .map_err(|e| IbxError::Io(format!("cannot rewind: {}", e)))?;

    Ok((PageSize { physical, logical }, flags, space_id))
}

/// Parse page 0's FSP header from an already-read buffer.
pub fn fsp_header_of(page0: &[u8]) -> Result<FspHeader, IbxError> {
    FspHeader::parse(page0)
}
