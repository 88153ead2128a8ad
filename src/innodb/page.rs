//! FIL header/trailer and FSP header parsing.
//!
//! Every page begins with a 38-byte FIL header and ends with an 8-byte
//! trailer. Page 0 additionally carries the FSP header at byte 38, whose
//! flags field encodes the logical page size, the compressed (zip) page
//! size, and whether the tablespace embeds SDI metadata.

use serde::Serialize;

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::page_types::PageType;
use crate::IbxError;

/// Parsed FIL header (38 bytes, present at the start of every page).
#[derive(Debug, Clone, Serialize)]
pub struct FilHeader {
    pub checksum: u32,
    pub page_number: u32,
    pub prev_page: u32,
    pub next_page: u32,
    pub lsn: u64,
    pub page_type: PageType,
    pub flush_lsn: u64,
    pub space_id: u32,
}

impl FilHeader {
    /// Parse a FIL header from a page buffer (needs at least 38 bytes).
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZE_FIL_HEAD {
            return None;
        }
        Some(FilHeader {
            checksum: codec::read_u32(data, FIL_PAGE_SPACE_OR_CHKSUM),
            page_number: codec::read_u32(data, FIL_PAGE_OFFSET),
            prev_page: codec::read_u32(data, FIL_PAGE_PREV),
            next_page: codec::read_u32(data, FIL_PAGE_NEXT),
            lsn: codec::read_u64(data, FIL_PAGE_LSN),
            page_type: PageType::from_u16(codec::read_u16(data, FIL_PAGE_TYPE)),
            flush_lsn: codec::read_u64(data, FIL_PAGE_FILE_FLUSH_LSN),
            space_id: codec::read_u32(data, FIL_PAGE_SPACE_ID),
        })
    }

    pub fn has_next(&self) -> bool {
        self.next_page != FIL_NULL && self.next_page != 0
    }
}

/// Read just the page type without building a full header.
pub fn page_type_of(data: &[u8]) -> PageType {
    if data.len() < FIL_PAGE_TYPE + 2 {
        return PageType::Unknown;
    }
    PageType::from_u16(codec::read_u16(data, FIL_PAGE_TYPE))
}

/// FSP space flags with typed accessors (fsp0types.h bit layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FspFlags(pub u32);

impl FspFlags {
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn post_antelope(self) -> bool {
        self.0 & FSP_FLAGS_MASK_POST_ANTELOPE != 0
    }

    pub fn zip_ssize(self) -> u32 {
        (self.0 & FSP_FLAGS_MASK_ZIP_SSIZE) >> FSP_FLAGS_POS_ZIP_SSIZE
    }

    pub fn page_ssize(self) -> u32 {
        (self.0 & FSP_FLAGS_MASK_PAGE_SSIZE) >> FSP_FLAGS_POS_PAGE_SSIZE
    }

    pub fn atomic_blobs(self) -> bool {
        self.0 & FSP_FLAGS_MASK_ATOMIC_BLOBS != 0
    }

    pub fn has_sdi(self) -> bool {
        self.0 & FSP_FLAGS_MASK_SDI != 0
    }

    pub fn is_encrypted(self) -> bool {
        self.0 & FSP_FLAGS_MASK_ENCRYPTION != 0
    }

    /// Validity rules mirrored from fsp_flags_is_valid(): reserved high bits
    /// must be clear, shifts must be in range, and a zip size or atomic
    /// blobs require the post-Antelope bit.
    pub fn is_valid(self) -> bool {
        if self.0 == 0 {
            return true;
        }
        if self.0 >> FSP_FLAGS_POS_UNUSED != 0 {
            return false;
        }
        if !self.post_antelope() && (self.zip_ssize() != 0 || self.atomic_blobs()) {
            return false;
        }
        if self.zip_ssize() > 5 {
            return false;
        }
        let pssize = self.page_ssize();
        if pssize != 0 && !(3..=7).contains(&pssize) {
            return false;
        }
        true
    }

    /// Logical page size encoded in the flags (0 means the 16 KiB default).
    pub fn logical_page_size(self) -> usize {
        match self.page_ssize() {
            0 => UNIV_PAGE_SIZE_ORIG,
            ssize => 512usize << ssize,
        }
    }

    /// Physical page size: the zip size if set, otherwise the logical size.
    pub fn physical_page_size(self) -> usize {
        match self.zip_ssize() {
            0 => self.logical_page_size(),
            ssize => 512usize << ssize,
        }
    }

    /// Flags with both size-shift nibbles cleared, as written by the
    /// uncompressed rebuild.
    pub fn cleared_for_uncompressed(self) -> FspFlags {
        FspFlags(self.0 & !(FSP_FLAGS_MASK_ZIP_SSIZE | FSP_FLAGS_MASK_PAGE_SSIZE))
    }

    /// Byte offset of the wrapped-key (encryption info) blob on page 0:
    /// right after the XDES array.
    pub fn encryption_offset(self) -> usize {
        let entries = self.physical_page_size() / extent_size_in_pages(self.logical_page_size());
        XDES_ARR_OFFSET + entries * XDES_SIZE
    }

    /// Byte offset of the two-u32 SDI sub-header on page 0: after the
    /// encryption info slot.
    pub fn sdi_offset(self) -> usize {
        self.encryption_offset() + ENCRYPTION_INFO_MAX_SIZE
    }
}

/// Parsed FSP header (page 0 body).
#[derive(Debug, Clone, Serialize)]
pub struct FspHeader {
    pub space_id: u32,
    pub size: u32,
    pub free_limit: u32,
    pub flags: FspFlags,
    pub frag_n_used: u32,
}

impl FspHeader {
    /// Parse the FSP header from a full page-0 buffer.
    pub fn parse(page0: &[u8]) -> Result<Self, IbxError> {
        if page0.len() < FIL_PAGE_DATA + FSP_HEADER_SIZE {
            return Err(IbxError::ShortRead(
                "page 0 too small for FSP header".into(),
            ));
        }
        let d = &page0[FIL_PAGE_DATA..];
        Ok(FspHeader {
            space_id: codec::read_u32(d, FSP_SPACE_ID),
            size: codec::read_u32(d, FSP_SIZE),
            free_limit: codec::read_u32(d, FSP_FREE_LIMIT),
            flags: FspFlags(codec::read_u32(d, FSP_SPACE_FLAGS)),
            frag_n_used: codec::read_u32(d, FSP_FRAG_N_USED),
        })
    }
}

/// Read an FSP header field given a full page-0 buffer.
pub fn fsp_header_get_field(page0: &[u8], field: usize) -> u32 {
    codec::read_u32(page0, FIL_PAGE_DATA + field)
}

/// Write an FSP header field into a page-0 buffer.
pub fn fsp_header_set_field(page0: &mut [u8], field: usize, val: u32) {
    codec::write_u32(page0, FIL_PAGE_DATA + field, val);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fil_header_roundtrip() {
        let mut page = vec![0u8; 256];
        codec::write_u32(&mut page, FIL_PAGE_SPACE_OR_CHKSUM, 0x1234_5678);
        codec::write_u32(&mut page, FIL_PAGE_OFFSET, 42);
        codec::write_u32(&mut page, FIL_PAGE_PREV, FIL_NULL);
        codec::write_u32(&mut page, FIL_PAGE_NEXT, 43);
        codec::write_u64(&mut page, FIL_PAGE_LSN, 1000);
        codec::write_u16(&mut page, FIL_PAGE_TYPE, 17855);
        codec::write_u32(&mut page, FIL_PAGE_SPACE_ID, 5);

        let hdr = FilHeader::parse(&page).unwrap();
        assert_eq!(hdr.checksum, 0x1234_5678);
        assert_eq!(hdr.page_number, 42);
        assert_eq!(hdr.next_page, 43);
        assert_eq!(hdr.page_type, PageType::Index);
        assert_eq!(hdr.space_id, 5);
        assert!(hdr.has_next());
    }

    #[test]
    fn flags_sizes_uncompressed_16k() {
        let flags = FspFlags((5 << FSP_FLAGS_POS_PAGE_SSIZE) | FSP_FLAGS_MASK_POST_ANTELOPE);
        assert!(flags.is_valid());
        assert_eq!(flags.logical_page_size(), 16384);
        assert_eq!(flags.physical_page_size(), 16384);
        assert_eq!(flags.encryption_offset(), 10390);
        assert_eq!(flags.sdi_offset(), 10390 + ENCRYPTION_INFO_MAX_SIZE);
    }

    #[test]
    fn flags_sizes_compressed_8k_physical() {
        // zip_ssize 4 => 8192 physical; page_ssize 0 => 16384 logical
        let flags = FspFlags(
            FSP_FLAGS_MASK_POST_ANTELOPE
                | FSP_FLAGS_MASK_ATOMIC_BLOBS
                | (4 << FSP_FLAGS_POS_ZIP_SSIZE),
        );
        assert!(flags.is_valid());
        assert_eq!(flags.logical_page_size(), 16384);
        assert_eq!(flags.physical_page_size(), 8192);
        assert_eq!(flags.encryption_offset(), 5270);
    }

    #[test]
    fn flags_validity() {
        assert!(FspFlags(0).is_valid());
        // reserved bit set
        assert!(!FspFlags(1 << 20).is_valid());
        // zip size without post-antelope
        assert!(!FspFlags(4 << FSP_FLAGS_POS_ZIP_SSIZE).is_valid());
        // zip ssize out of range
        assert!(
            !FspFlags(FSP_FLAGS_MASK_POST_ANTELOPE | (6 << FSP_FLAGS_POS_ZIP_SSIZE)).is_valid()
        );
        // page ssize 1 and 2 are impossible
        assert!(!FspFlags(1 << FSP_FLAGS_POS_PAGE_SSIZE).is_valid());
        assert!(!FspFlags(2 << FSP_FLAGS_POS_PAGE_SSIZE).is_valid());
    }

    #[test]
    fn cleared_flags_keep_feature_bits() {
        let flags = FspFlags(
            FSP_FLAGS_MASK_POST_ANTELOPE
                | FSP_FLAGS_MASK_ATOMIC_BLOBS
                | FSP_FLAGS_MASK_SDI
                | (4 << FSP_FLAGS_POS_ZIP_SSIZE)
                | (5 << FSP_FLAGS_POS_PAGE_SSIZE),
        );
        let cleared = flags.cleared_for_uncompressed();
        assert_eq!(cleared.zip_ssize(), 0);
        assert_eq!(cleared.page_ssize(), 0);
        assert!(cleared.has_sdi());
        assert!(cleared.atomic_blobs());
    }
}
