//! Extent descriptor (XDES) bitmaps.
//!
//! Every `physical_size`-th page (counted in pages) is a descriptor page
//! carrying one 40-byte XDES entry per extent it covers. Each entry's bitmap
//! stores two bits per page; bit 0 of the pair is the FREE bit. The record
//! parser consults this to skip pages that are not allocated.

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::tablespace::PageSize;

/// Descriptor page number covering `page_no` (FSP_HDR for the first group).
pub fn descriptor_page(page_size: PageSize, page_no: u64) -> u64 {
    let per_desc_page = page_size.physical as u64;
    page_no - (page_no % per_desc_page)
}

/// Index of the XDES entry for `page_no` within its descriptor page.
pub fn descriptor_index(page_size: PageSize, page_no: u64) -> usize {
    let per_desc_page = page_size.physical as u64;
    let extent = extent_size_in_pages(page_size.logical) as u64;
    ((page_no % per_desc_page) / extent) as usize
}

/// Check the FREE bit for `page_no` in its descriptor entry.
pub fn page_is_free(descriptor: &[u8], page_size: PageSize, page_no: u64) -> bool {
    let extent = extent_size_in_pages(page_size.logical) as u64;
    let entry = XDES_ARR_OFFSET + XDES_SIZE * descriptor_index(page_size, page_no);
    let pos_in_extent = (page_no % extent) as usize;
    let bit_index = pos_in_extent * XDES_BITS_PER_PAGE + XDES_FREE_BIT;
    let byte = entry + XDES_BITMAP + bit_index / 8;
    if byte >= descriptor.len() {
        return false;
    }
    descriptor[byte] & (1 << (bit_index % 8)) != 0
}

/// One cached descriptor page, reused across the sequential page loop.
pub struct XdesCache {
    page_no: u64,
    buf: Vec<u8>,
    valid: bool,
}

impl XdesCache {
    pub fn new() -> Self {
        XdesCache {
            page_no: FIL_NULL as u64,
            buf: Vec::new(),
            valid: false,
        }
    }

    /// Remember a freshly read FSP_HDR/XDES page.
    pub fn update(&mut self, page_no: u64, page: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(page);
        self.page_no = page_no;
        self.valid = true;
    }

    pub fn holds(&self, page_no: u64) -> bool {
        self.valid && self.page_no == page_no
    }

    /// FREE-bit lookup for `page_no`; false when the cache does not hold the
    /// owning descriptor page.
    pub fn is_free(&self, page_size: PageSize, page_no: u64) -> bool {
        if !self.valid || descriptor_page(page_size, page_no) != self.page_no {
            return false;
        }
        page_is_free(&self.buf, page_size, page_no)
    }
}

impl Default for XdesCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS16: PageSize = PageSize {
        physical: 16384,
        logical: 16384,
    };

    fn set_free_bit(desc: &mut [u8], page_size: PageSize, page_no: u64) {
        let extent = extent_size_in_pages(page_size.logical) as u64;
        let entry = XDES_ARR_OFFSET + XDES_SIZE * descriptor_index(page_size, page_no);
        let bit_index = (page_no % extent) as usize * XDES_BITS_PER_PAGE + XDES_FREE_BIT;
        desc[entry + XDES_BITMAP + bit_index / 8] |= 1 << (bit_index % 8);
    }

    #[test]
    fn descriptor_page_mapping() {
        assert_eq!(descriptor_page(PS16, 0), 0);
        assert_eq!(descriptor_page(PS16, 100), 0);
        assert_eq!(descriptor_page(PS16, 16384), 16384);
        assert_eq!(descriptor_page(PS16, 16385), 16384);
    }

    #[test]
    fn descriptor_index_mapping() {
        // 64 pages per extent at 16 KiB
        assert_eq!(descriptor_index(PS16, 0), 0);
        assert_eq!(descriptor_index(PS16, 63), 0);
        assert_eq!(descriptor_index(PS16, 64), 1);
        assert_eq!(descriptor_index(PS16, 16384 + 130), 2);
    }

    #[test]
    fn free_bit_lookup() {
        let mut desc = vec![0u8; 16384];
        set_free_bit(&mut desc, PS16, 70);
        assert!(page_is_free(&desc, PS16, 70));
        assert!(!page_is_free(&desc, PS16, 71));
        assert!(!page_is_free(&desc, PS16, 6));
    }

    #[test]
    fn cache_scoped_to_descriptor_page() {
        let mut desc = vec![0u8; 16384];
        set_free_bit(&mut desc, PS16, 5);
        let mut cache = XdesCache::new();
        assert!(!cache.is_free(PS16, 5));
        cache.update(0, &desc);
        assert!(cache.is_free(PS16, 5));
        // page owned by a different descriptor page
        assert!(!cache.is_free(PS16, 16384 + 5));
    }
}
