//! CRC-32C page checksums.
//!
//! The engine computes the page checksum over two disjoint ranges, skipping
//! the checksum slot itself, the flush-LSN/space-id area that is written
//! outside the buffer pool, and the 8-byte trailer:
//!
//! - range 1: bytes 4..26 (`FIL_PAGE_OFFSET` to `FIL_PAGE_FILE_FLUSH_LSN`)
//! - range 2: bytes 38..(page_size - 8)
//!
//! The stored value is `crc32c(range1) XOR crc32c(range2)`, written into both
//! the header slot (offset 0) and the first 4 bytes of the trailer.

use crate::innodb::codec;
use crate::innodb::constants::*;

/// Compute the CRC-32C page checksum (buf_calc_page_crc32 equivalent).
pub fn page_crc32(page: &[u8], page_size: usize) -> u32 {
    let c1 = crc32c::crc32c(&page[FIL_PAGE_OFFSET..FIL_PAGE_FILE_FLUSH_LSN]);
    let c2 = crc32c::crc32c(&page[FIL_PAGE_DATA..page_size - FIL_PAGE_END_LSN_OLD_CHKSUM]);
    c1 ^ c2
}

/// Write the LSN into header and trailer, then stamp the checksum into both
/// checksum slots. After this call the trailer holds checksum(4) + lsn_low32(4).
pub fn stamp_page_lsn_and_crc32(page: &mut [u8], page_size: usize, lsn: u64) {
    codec::write_u64(page, FIL_PAGE_LSN, lsn);
    codec::write_u64(page, page_size - FIL_PAGE_END_LSN_OLD_CHKSUM, lsn);

    let checksum = page_crc32(page, page_size);
    codec::write_u32(page, FIL_PAGE_SPACE_OR_CHKSUM, checksum);
    codec::write_u32(page, page_size - FIL_PAGE_END_LSN_OLD_CHKSUM, checksum);
}

/// Result of verifying a page's stored checksum against the computed one.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumCheck {
    pub stored_header: u32,
    pub stored_trailer: u32,
    pub calculated: u32,
}

impl ChecksumCheck {
    pub fn is_valid(&self) -> bool {
        self.stored_header == self.calculated && self.stored_trailer == self.calculated
    }
}

/// Verify both checksum slots of a page.
pub fn verify_page_crc32(page: &[u8], page_size: usize) -> ChecksumCheck {
    ChecksumCheck {
        stored_header: codec::read_u32(page, FIL_PAGE_SPACE_OR_CHKSUM),
        stored_trailer: codec::read_u32(page, page_size - FIL_PAGE_END_LSN_OLD_CHKSUM),
        calculated: page_crc32(page, page_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_then_verify() {
        let mut page = vec![0u8; 16384];
        for (i, b) in page.iter_mut().enumerate().skip(38) {
            *b = (i * 31 % 251) as u8;
        }
        stamp_page_lsn_and_crc32(&mut page, 16384, 0x1122_3344_5566);
        let check = verify_page_crc32(&page, 16384);
        assert!(check.is_valid());
        // trailer low 32 bits of the LSN survive the checksum overwrite
        assert_eq!(codec::read_u32(&page, 16384 - 4), 0x3344_5566);
        assert_eq!(codec::read_u64(&page, FIL_PAGE_LSN), 0x1122_3344_5566);
    }

    #[test]
    fn body_change_invalidates() {
        let mut page = vec![0u8; 16384];
        stamp_page_lsn_and_crc32(&mut page, 16384, 0);
        page[100] ^= 0xFF;
        assert!(!verify_page_crc32(&page, 16384).is_valid());
    }

    #[test]
    fn flush_lsn_area_excluded() {
        // Bytes 26..38 do not participate in the checksum.
        let mut page = vec![0u8; 16384];
        stamp_page_lsn_and_crc32(&mut page, 16384, 0);
        codec::write_u32(&mut page, FIL_PAGE_SPACE_ID, 777);
        assert!(verify_page_crc32(&page, 16384).is_valid());
    }

    #[test]
    fn checksum_matches_formula() {
        let mut page = vec![0u8; 4096];
        for (i, b) in page.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        stamp_page_lsn_and_crc32(&mut page, 4096, 9);
        let c1 = crc32c::crc32c(&page[4..26]);
        let c2 = crc32c::crc32c(&page[38..4096 - 8]);
        assert_eq!(codec::read_u32(&page, 0), c1 ^ c2);
    }
}
