//! On-disk constants for the InnoDB file format.
//!
//! Values are taken from the MySQL 8.0 source headers:
//! - fil0fil.h (FIL header/trailer, page types)
//! - fsp0fsp.h / fsp0types.h (FSP header, flags, XDES)
//! - page0page.h / rem0rec.h (index page header, compact records)
//! - lob0lob.h (external references, LOB chains)

// Page sizes
pub const UNIV_PAGE_SIZE_ORIG: usize = 16384;
pub const UNIV_PAGE_SIZE_MIN: usize = 4096;
pub const UNIV_PAGE_SIZE_MAX: usize = 65536;
/// Smallest possible physical page size; also the probe read size.
pub const UNIV_ZIP_SIZE_MIN: usize = 1024;

// FIL header (38 bytes at the start of every page)
pub const SIZE_FIL_HEAD: usize = 38;
pub const FIL_PAGE_SPACE_OR_CHKSUM: usize = 0; // 4 bytes - checksum
pub const FIL_PAGE_OFFSET: usize = 4; // 4 bytes - page number
pub const FIL_PAGE_PREV: usize = 8; // 4 bytes - previous page
pub const FIL_PAGE_NEXT: usize = 12; // 4 bytes - next page
pub const FIL_PAGE_LSN: usize = 16; // 8 bytes - newest modification LSN
pub const FIL_PAGE_TYPE: usize = 24; // 2 bytes - page type
pub const FIL_PAGE_FILE_FLUSH_LSN: usize = 26; // 8 bytes - flush LSN (page 0 only)
/// Before encrypting a page the engine saves the original type here.
pub const FIL_PAGE_ORIGINAL_TYPE_V1: usize = 26;
pub const FIL_PAGE_SPACE_ID: usize = 34; // 4 bytes - space id
pub const FIL_PAGE_ARCH_LOG_NO_OR_SPACE_ID: usize = 34;
pub const FIL_PAGE_DATA: usize = 38;

// FIL trailer (8 bytes at the end of every page)
pub const SIZE_FIL_TRAILER: usize = 8;
pub const FIL_PAGE_END_LSN_OLD_CHKSUM: usize = 8;

pub const FIL_NULL: u32 = 0xFFFF_FFFF;

// FSP header (112 bytes, starts at FIL_PAGE_DATA on page 0)
pub const FSP_HEADER_SIZE: usize = 112;
pub const FSP_SPACE_ID: usize = 0; // 4 bytes
pub const FSP_NOT_USED: usize = 4; // 4 bytes
pub const FSP_SIZE: usize = 8; // 4 bytes - tablespace size in pages
pub const FSP_FREE_LIMIT: usize = 12; // 4 bytes
pub const FSP_SPACE_FLAGS: usize = 16; // 4 bytes
pub const FSP_FRAG_N_USED: usize = 20; // 4 bytes

// FSP flags bit layout (fsp0types.h)
pub const FSP_FLAGS_POS_POST_ANTELOPE: u32 = 0;
pub const FSP_FLAGS_POS_ZIP_SSIZE: u32 = 1;
pub const FSP_FLAGS_WIDTH_ZIP_SSIZE: u32 = 4;
pub const FSP_FLAGS_POS_ATOMIC_BLOBS: u32 = 5;
pub const FSP_FLAGS_POS_PAGE_SSIZE: u32 = 6;
pub const FSP_FLAGS_WIDTH_PAGE_SSIZE: u32 = 4;
pub const FSP_FLAGS_POS_DATA_DIR: u32 = 10;
pub const FSP_FLAGS_POS_SHARED: u32 = 11;
pub const FSP_FLAGS_POS_TEMPORARY: u32 = 12;
pub const FSP_FLAGS_POS_ENCRYPTION: u32 = 13;
pub const FSP_FLAGS_POS_SDI: u32 = 14;
pub const FSP_FLAGS_POS_UNUSED: u32 = 15;

pub const FSP_FLAGS_MASK_POST_ANTELOPE: u32 = 1 << FSP_FLAGS_POS_POST_ANTELOPE;
pub const FSP_FLAGS_MASK_ZIP_SSIZE: u32 =
    ((1 << FSP_FLAGS_WIDTH_ZIP_SSIZE) - 1) << FSP_FLAGS_POS_ZIP_SSIZE;
pub const FSP_FLAGS_MASK_ATOMIC_BLOBS: u32 = 1 << FSP_FLAGS_POS_ATOMIC_BLOBS;
pub const FSP_FLAGS_MASK_PAGE_SSIZE: u32 =
    ((1 << FSP_FLAGS_WIDTH_PAGE_SSIZE) - 1) << FSP_FLAGS_POS_PAGE_SSIZE;
pub const FSP_FLAGS_MASK_ENCRYPTION: u32 = 1 << FSP_FLAGS_POS_ENCRYPTION;
pub const FSP_FLAGS_MASK_SDI: u32 = 1 << FSP_FLAGS_POS_SDI;

// XDES (extent descriptor) entries on FSP_HDR/XDES pages
pub const XDES_ARR_OFFSET: usize = FIL_PAGE_DATA + FSP_HEADER_SIZE; // 150
pub const XDES_SIZE: usize = 40;
pub const XDES_BITMAP: usize = 24; // offset of the page-state bitmap in an entry
pub const XDES_BITS_PER_PAGE: usize = 2;
pub const XDES_FREE_BIT: usize = 0;

// Index page header (starts at FIL_PAGE_DATA = PAGE_HEADER)
pub const PAGE_HEADER: usize = FIL_PAGE_DATA;
pub const PAGE_N_DIR_SLOTS: usize = 0; // 2 bytes
pub const PAGE_HEAP_TOP: usize = 2; // 2 bytes
pub const PAGE_N_HEAP: usize = 4; // 2 bytes (bit 15 = compact flag)
pub const PAGE_FREE: usize = 6; // 2 bytes
pub const PAGE_GARBAGE: usize = 8; // 2 bytes
pub const PAGE_LAST_INSERT: usize = 10; // 2 bytes
pub const PAGE_DIRECTION: usize = 12; // 2 bytes
pub const PAGE_N_DIRECTION: usize = 14; // 2 bytes
pub const PAGE_N_RECS: usize = 16; // 2 bytes
pub const PAGE_MAX_TRX_ID: usize = 18; // 8 bytes
pub const PAGE_HEADER_PRIV_END: usize = 26;
pub const PAGE_LEVEL: usize = 26; // 2 bytes (0 = leaf)
pub const PAGE_INDEX_ID: usize = 28; // 8 bytes
pub const PAGE_BTR_SEG_LEAF: usize = 36; // 10 bytes
pub const PAGE_BTR_SEG_TOP: usize = 46; // 10 bytes
pub const FSEG_HEADER_SIZE: usize = 10;

pub const PAGE_NO_DIRECTION: u16 = 5;

/// Start of the record heap: page header + 36 + two FSEG headers.
pub const PAGE_DATA: usize = PAGE_HEADER + 36 + 2 * FSEG_HEADER_SIZE; // 94

// Compact system records
pub const REC_N_NEW_EXTRA_BYTES: usize = 5;
pub const PAGE_NEW_INFIMUM: usize = PAGE_DATA + REC_N_NEW_EXTRA_BYTES; // 99
pub const PAGE_NEW_SUPREMUM: usize = PAGE_DATA + 2 * REC_N_NEW_EXTRA_BYTES + 8; // 112
pub const PAGE_NEW_SUPREMUM_END: usize = PAGE_NEW_SUPREMUM + 8; // 120

/// The infimum/supremum byte image copied onto every fresh compact page.
pub const INFIMUM_SUPREMUM_COMPACT: [u8; 26] = [
    // infimum record
    0x01, 0x00, 0x02, 0x00, 0x0d, b'i', b'n', b'f', b'i', b'm', b'u', b'm', 0x00,
    // supremum record
    0x01, 0x00, 0x0b, 0x00, 0x00, b's', b'u', b'p', b'r', b'e', b'm', b'u', b'm',
];

// Page directory (grows down from the trailer)
pub const PAGE_DIR: usize = SIZE_FIL_TRAILER;
pub const PAGE_DIR_SLOT_SIZE: usize = 2;
pub const PAGE_DIR_SLOT_MIN_N_OWNED: usize = 4;
pub const PAGE_DIR_SLOT_MAX_N_OWNED: usize = 8;
pub const PAGE_HEAP_NO_USER_LOW: usize = 2;

// Compact record extra bytes
pub const REC_NEXT: usize = 2; // next-record delta sits 2 bytes before the origin
pub const REC_STATUS_ORDINARY: u8 = 0;
pub const REC_STATUS_NODE_PTR: u8 = 1;
pub const REC_STATUS_INFIMUM: u8 = 2;
pub const REC_STATUS_SUPREMUM: u8 = 3;
pub const REC_INFO_MIN_REC_FLAG: u8 = 0x10;
pub const REC_INFO_DELETED_FLAG: u8 = 0x20;
pub const REC_INFO_VERSION_FLAG: u8 = 0x40;
pub const REC_INFO_INSTANT_FLAG: u8 = 0x80;
pub const REC_N_FIELDS_TWO_BYTES_FLAG: u8 = 0x80;

// System column widths
pub const DATA_TRX_ID_LEN: usize = 6;
pub const DATA_ROLL_PTR_LEN: usize = 7;
pub const DATA_ROW_ID_LEN: usize = 6;

// External (off-page) field reference: space(4) + page(4) + offset(4) + len(8)
pub const FIELD_REF_SIZE: usize = 20;
pub const BTR_EXTERN_SPACE_ID: usize = 0;
pub const BTR_EXTERN_PAGE_NO: usize = 4;
pub const BTR_EXTERN_OFFSET: usize = 8;
pub const BTR_EXTERN_LEN: usize = 12;

// Old-style BLOB page header (relative to FIL_PAGE_DATA)
pub const LOB_HDR_PART_LEN: usize = 0; // 4 bytes
pub const LOB_HDR_NEXT_PAGE_NO: usize = 4; // 4 bytes
pub const LOB_HDR_SIZE: usize = 8;

// New-style (8.0) uncompressed LOB first page
pub const LOB_FIRST_OFFSET_VERSION: usize = FIL_PAGE_DATA;
pub const LOB_FIRST_OFFSET_FLAGS: usize = FIL_PAGE_DATA + 1;
pub const LOB_FIRST_OFFSET_LOB_VERSION: usize = FIL_PAGE_DATA + 2;
pub const LOB_FIRST_OFFSET_LAST_TRX_ID: usize = FIL_PAGE_DATA + 6;
pub const LOB_FIRST_OFFSET_LAST_UNDO_NO: usize = FIL_PAGE_DATA + 12;
pub const LOB_FIRST_OFFSET_DATA_LEN: usize = FIL_PAGE_DATA + 16;
pub const LOB_FIRST_OFFSET_TRX_ID: usize = FIL_PAGE_DATA + 20;
pub const LOB_FIRST_OFFSET_INDEX_LIST: usize = FIL_PAGE_DATA + 26; // 64
pub const LOB_FIRST_OFFSET_INDEX_FREE_NODES: usize = FIL_PAGE_DATA + 42; // 80
/// First byte of the index-entry array on a LOB first page.
pub const LOB_FIRST_NODE_ARRAY: usize = FIL_PAGE_DATA + 58; // 96
pub const LOB_INDEX_ENTRY_SIZE: usize = 60;
// Offsets within a 60-byte LOB index entry
pub const LOB_ENTRY_OFFSET_PREV: usize = 0; // 6-byte file address
pub const LOB_ENTRY_OFFSET_NEXT: usize = 6; // 6-byte file address
pub const LOB_ENTRY_OFFSET_VERSIONS: usize = 12; // 16-byte list base node
pub const LOB_ENTRY_OFFSET_TRX_ID: usize = 28;
pub const LOB_ENTRY_OFFSET_TRX_ID_MODIFIER: usize = 34;
pub const LOB_ENTRY_OFFSET_TRX_UNDO_NO: usize = 40;
pub const LOB_ENTRY_OFFSET_TRX_UNDO_NO_MODIFIER: usize = 44;
pub const LOB_ENTRY_OFFSET_PAGE_NO: usize = 48;
pub const LOB_ENTRY_OFFSET_DATA_LEN: usize = 52;
pub const LOB_ENTRY_OFFSET_LOB_VERSION: usize = 56;
/// Data area of a LOB_DATA page begins after a 1-byte version tag.
pub const LOB_DATA_PAGE_DATA: usize = FIL_PAGE_DATA + 1;

// New-style (8.0) compressed LOB first page. The three list base nodes
// (index, free, fragment) are followed by the entry array. Entry geometry is
// table-driven; these values match the 16 KiB layout.
pub const ZLOB_FIRST_OFFSET_INDEX_LIST: usize = FIL_PAGE_DATA + 26; // 64
pub const ZLOB_FIRST_OFFSET_FREE_LIST: usize = FIL_PAGE_DATA + 42; // 80
pub const ZLOB_FIRST_OFFSET_FRAG_LIST: usize = FIL_PAGE_DATA + 58; // 96
pub const ZLOB_FIRST_NODE_ARRAY: usize = FIL_PAGE_DATA + 74; // 112
pub const ZLOB_INDEX_ENTRY_SIZE: usize = 66;
// Offsets within a 66-byte ZLOB index entry
pub const ZLOB_ENTRY_OFFSET_PREV: usize = 0;
pub const ZLOB_ENTRY_OFFSET_NEXT: usize = 6;
pub const ZLOB_ENTRY_OFFSET_VERSIONS: usize = 12;
pub const ZLOB_ENTRY_OFFSET_TRX_ID: usize = 28;
pub const ZLOB_ENTRY_OFFSET_TRX_ID_MODIFIER: usize = 34;
pub const ZLOB_ENTRY_OFFSET_TRX_UNDO_NO: usize = 40;
pub const ZLOB_ENTRY_OFFSET_TRX_UNDO_NO_MODIFIER: usize = 44;
pub const ZLOB_ENTRY_OFFSET_Z_PAGE_NO: usize = 48;
pub const ZLOB_ENTRY_OFFSET_Z_FRAG_ID: usize = 52;
pub const ZLOB_ENTRY_OFFSET_DATA_LEN: usize = 54;
pub const ZLOB_ENTRY_OFFSET_ZDATA_LEN: usize = 58;
pub const ZLOB_ENTRY_OFFSET_LOB_VERSION: usize = 62;
/// Data area of a ZLOB_DATA page begins after a 1-byte version tag.
pub const ZLOB_DATA_PAGE_DATA: usize = FIL_PAGE_DATA + 1;
/// Fragment id meaning "data lives on a ZLOB_DATA chain, not a fragment".
pub const ZLOB_FRAG_ID_NULL: u16 = 0xFFFF;
/// Per-fragment header on a ZLOB_FRAG page: frag_id (2) + payload len (2).
pub const ZLOB_FRAG_HDR_SIZE: usize = 4;

// File list (flst) node geometry
pub const FLST_BASE_NODE_SIZE: usize = 16; // len(4) + first addr(6) + last addr(6)
pub const FLST_NODE_SIZE: usize = 12; // prev addr(6) + next addr(6)
pub const FIL_ADDR_SIZE: usize = 6; // page(4) + boffset(2)

/// Step cap for any LOB chain walk; guards corrupted or malicious links.
pub const LOB_CHAIN_STEP_CAP: usize = 100_000;

// SDI clustered index record layout (relative to the record origin)
pub const SDI_REC_OFF_TYPE: usize = 0; // u32
pub const SDI_REC_OFF_ID: usize = 4; // u64
pub const SDI_REC_OFF_TRX_ID: usize = 12; // u48
pub const SDI_REC_OFF_ROLL_PTR: usize = 18; // u56
pub const SDI_REC_OFF_UNCOMP_LEN: usize = 25; // u32
pub const SDI_REC_OFF_COMP_LEN: usize = 29; // u32
pub const SDI_REC_OFF_DATA: usize = 33;
pub const SDI_VERSION: u32 = 1;
/// Index id stamped on SDI pages (dict_sdi_get_index_id()).
pub const SDI_INDEX_ID: u64 = u64::MAX;
/// Largest compressed payload that may stay inline in the SDI root.
pub const SDI_INLINE_MAX_COMP_LEN: usize = 0x3FFF;

// Tablespace encryption info (stored on page 0 after the XDES array)
pub const ENCRYPTION_MAGIC_SIZE: usize = 3;
pub const ENCRYPTION_MAGIC_V1: &[u8; 3] = b"lCA";
pub const ENCRYPTION_MAGIC_V2: &[u8; 3] = b"lCB";
pub const ENCRYPTION_MAGIC_V3: &[u8; 3] = b"lCC";
pub const ENCRYPTION_SERVER_UUID_LEN: usize = 36;
pub const ENCRYPTION_KEY_LEN: usize = 32;
/// magic(3) + key id(4) + uuid(36) + wrapped key+iv(64) + crc(4)
pub const ENCRYPTION_INFO_SIZE: usize =
    ENCRYPTION_MAGIC_SIZE + 4 + ENCRYPTION_SERVER_UUID_LEN + 2 * ENCRYPTION_KEY_LEN + 4;
pub const ENCRYPTION_INFO_MAX_SIZE: usize = ENCRYPTION_INFO_SIZE + 4; // 115
/// Known wrapped-key offsets: 5270 for 8 KiB-physical, 10390 for 16 KiB pages.
pub const ENCRYPTION_OFFSET_COMPRESSED_8K: usize = 5270;
pub const ENCRYPTION_OFFSET_UNCOMPRESSED_16K: usize = 10390;

pub const AES_BLOCK_SIZE: usize = 16;

pub const SPACE_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Pages per extent as a function of the logical page size (fsp0types.h).
pub fn extent_size_in_pages(logical_size: usize) -> usize {
    match logical_size {
        0..=16384 => 1_048_576 / logical_size.max(1024),
        16385..=32768 => 2_097_152 / logical_size,
        _ => 4_194_304 / logical_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_record_offsets() {
        assert_eq!(PAGE_DATA, 94);
        assert_eq!(PAGE_NEW_INFIMUM, 99);
        assert_eq!(PAGE_NEW_SUPREMUM, 112);
        assert_eq!(PAGE_NEW_SUPREMUM_END, 120);
        assert_eq!(
            INFIMUM_SUPREMUM_COMPACT.len(),
            PAGE_NEW_SUPREMUM_END - PAGE_DATA
        );
    }

    #[test]
    fn extent_sizes() {
        assert_eq!(extent_size_in_pages(4096), 256);
        assert_eq!(extent_size_in_pages(8192), 128);
        assert_eq!(extent_size_in_pages(16384), 64);
        assert_eq!(extent_size_in_pages(32768), 64);
        assert_eq!(extent_size_in_pages(65536), 64);
    }

    #[test]
    fn encryption_info_size() {
        assert_eq!(ENCRYPTION_INFO_SIZE, 111);
        assert_eq!(ENCRYPTION_INFO_MAX_SIZE, 115);
    }
}
