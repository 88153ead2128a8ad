//! InnoDB page type codes.
//!
//! Maps the 2-byte page type field (bytes 24-25 of the FIL header) to a
//! [`PageType`] enum. Values are from fil0fil.h in the MySQL 8.0 source.

use serde::Serialize;
use std::fmt;

/// All page types this toolkit understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum PageType {
    /// Freshly allocated, type field not initialized
    Allocated = 0,
    /// Undo log page
    UndoLog = 2,
    /// File segment inode
    Inode = 3,
    /// Insert buffer free list
    IbufFreeList = 4,
    /// Insert buffer bitmap
    IbufBitmap = 5,
    /// System internal page
    Sys = 6,
    /// Transaction system header
    TrxSys = 7,
    /// File space header (page 0 of each tablespace)
    FspHdr = 8,
    /// Extent descriptor page
    Xdes = 9,
    /// Old-style uncompressed BLOB page
    Blob = 10,
    /// Old-style compressed BLOB, first page
    ZBlob = 11,
    /// Old-style compressed BLOB, subsequent page
    ZBlob2 = 12,
    /// Unknown or unrecognized type
    Unknown = 13,
    /// Transparently compressed page
    Compressed = 14,
    /// Encrypted page
    Encrypted = 15,
    /// Compressed and encrypted page
    CompressedEncrypted = 16,
    /// Encrypted R-tree page
    EncryptedRtree = 17,
    /// SDI BLOB overflow page
    SdiBlob = 18,
    /// SDI compressed BLOB overflow page
    SdiZblob = 19,
    /// Legacy doublewrite buffer page
    LegacyDblwr = 20,
    /// Rollback segment array page
    RsegArray = 21,
    /// LOB index page (8.0+ uncompressed LOB)
    LobIndex = 22,
    /// LOB data page
    LobData = 23,
    /// LOB first page
    LobFirst = 24,
    /// Compressed LOB first page
    ZLobFirst = 25,
    /// Compressed LOB data page
    ZLobData = 26,
    /// Compressed LOB index page
    ZLobIndex = 27,
    /// Compressed LOB fragment page
    ZLobFrag = 28,
    /// Compressed LOB fragment entry page
    ZLobFragEntry = 29,
    /// Serialized Dictionary Information B-tree page
    Sdi = 17853,
    /// R-tree spatial index page
    Rtree = 17854,
    /// B+Tree index page
    Index = 17855,
}

impl PageType {
    /// Parse a page type from the u16 value in the FIL header.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => PageType::Allocated,
            2 => PageType::UndoLog,
            3 => PageType::Inode,
            4 => PageType::IbufFreeList,
            5 => PageType::IbufBitmap,
            6 => PageType::Sys,
            7 => PageType::TrxSys,
            8 => PageType::FspHdr,
            9 => PageType::Xdes,
            10 => PageType::Blob,
            11 => PageType::ZBlob,
            12 => PageType::ZBlob2,
            14 => PageType::Compressed,
            15 => PageType::Encrypted,
            16 => PageType::CompressedEncrypted,
            17 => PageType::EncryptedRtree,
            18 => PageType::SdiBlob,
            19 => PageType::SdiZblob,
            20 => PageType::LegacyDblwr,
            21 => PageType::RsegArray,
            22 => PageType::LobIndex,
            23 => PageType::LobData,
            24 => PageType::LobFirst,
            25 => PageType::ZLobFirst,
            26 => PageType::ZLobData,
            27 => PageType::ZLobIndex,
            28 => PageType::ZLobFrag,
            29 => PageType::ZLobFragEntry,
            17853 => PageType::Sdi,
            17854 => PageType::Rtree,
            17855 => PageType::Index,
            _ => PageType::Unknown,
        }
    }

    /// Raw u16 value as stored on disk.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// MySQL source-style name.
    pub fn name(self) -> &'static str {
        match self {
            PageType::Allocated => "ALLOCATED",
            PageType::UndoLog => "UNDO_LOG",
            PageType::Inode => "INODE",
            PageType::IbufFreeList => "IBUF_FREE_LIST",
            PageType::IbufBitmap => "IBUF_BITMAP",
            PageType::Sys => "SYS",
            PageType::TrxSys => "TRX_SYS",
            PageType::FspHdr => "FSP_HDR",
            PageType::Xdes => "XDES",
            PageType::Blob => "BLOB",
            PageType::ZBlob => "ZBLOB",
            PageType::ZBlob2 => "ZBLOB2",
            PageType::Unknown => "UNKNOWN",
            PageType::Compressed => "COMPRESSED",
            PageType::Encrypted => "ENCRYPTED",
            PageType::CompressedEncrypted => "COMPRESSED_ENCRYPTED",
            PageType::EncryptedRtree => "ENCRYPTED_RTREE",
            PageType::SdiBlob => "SDI_BLOB",
            PageType::SdiZblob => "SDI_ZBLOB",
            PageType::LegacyDblwr => "LEGACY_DBLWR",
            PageType::RsegArray => "RSEG_ARRAY",
            PageType::LobIndex => "LOB_INDEX",
            PageType::LobData => "LOB_DATA",
            PageType::LobFirst => "LOB_FIRST",
            PageType::ZLobFirst => "ZLOB_FIRST",
            PageType::ZLobData => "ZLOB_DATA",
            PageType::ZLobIndex => "ZLOB_INDEX",
            PageType::ZLobFrag => "ZLOB_FRAG",
            PageType::ZLobFragEntry => "ZLOB_FRAG_ENTRY",
            PageType::Sdi => "SDI",
            PageType::Rtree => "RTREE",
            PageType::Index => "INDEX",
        }
    }

    /// True for the page types whose body is zlib-compressed in a
    /// ROW_FORMAT=COMPRESSED tablespace.
    pub fn is_zip_compressed_type(self) -> bool {
        matches!(self, PageType::Index | PageType::Rtree | PageType::Sdi)
    }

    /// True for the encrypted page type markers (15, 16, 17).
    pub fn is_encrypted_type(self) -> bool {
        matches!(
            self,
            PageType::Encrypted | PageType::CompressedEncrypted | PageType::EncryptedRtree
        )
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
