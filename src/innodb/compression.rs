//! Per-page zlib decompression for ROW_FORMAT=COMPRESSED tablespaces.
//!
//! Only INDEX, RTREE, and SDI pages are stored zip-compressed; FSP_HDR,
//! XDES, INODE, BLOB and friends live at physical size even in a compressed
//! tablespace and pass through unchanged. A compressed page keeps its
//! 38-byte FIL header in clear; the remainder of the physical block is one
//! zlib stream that inflates to the logical-size body and trailer.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::innodb::constants::*;
use crate::innodb::page::page_type_of;
use crate::innodb::tablespace::PageSize;
use crate::IbxError;

/// Result of pushing one physical page through the decompression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTransform {
    /// Page copied unchanged; `actual` equals the physical size.
    PassThrough,
    /// Page inflated to logical size.
    Decompressed,
    /// RTREE page whose stream was rejected; copied at physical size.
    RtreeFallback,
}

/// Whether this page's body is zip-compressed on disk.
pub fn should_decompress(page: &[u8], page_size: PageSize) -> bool {
    page_size.is_compressed() && page_type_of(page).is_zip_compressed_type()
}

/// Decompress one physical page into `out` (sized >= logical).
///
/// Returns the transform applied and the number of meaningful output bytes:
/// logical size for decompressed pages, physical size for pass-through. The
/// rest of `out` is zeroed either way.
pub fn decompress_page(
    src: &[u8],
    page_size: PageSize,
    out: &mut [u8],
) -> Result<(PageTransform, usize), IbxError> {
    debug_assert!(src.len() >= page_size.physical);
    debug_assert!(out.len() >= page_size.logical);
    out.fill(0);

    if !should_decompress(src, page_size) {
        out[..page_size.physical].copy_from_slice(&src[..page_size.physical]);
        return Ok((PageTransform::PassThrough, page_size.physical));
    }

    let want = page_size.logical - SIZE_FIL_HEAD;
    match inflate_exact(&src[SIZE_FIL_HEAD..page_size.physical], want) {
        Ok(body) => {
            out[..SIZE_FIL_HEAD].copy_from_slice(&src[..SIZE_FIL_HEAD]);
            out[SIZE_FIL_HEAD..page_size.logical].copy_from_slice(&body);
            Ok((PageTransform::Decompressed, page_size.logical))
        }
        Err(err) => {
            let page_type = page_type_of(src);
            if page_type == crate::innodb::page_types::PageType::Rtree {
                // Salvageable for most consumers; keep the stored bytes.
                out[..page_size.physical].copy_from_slice(&src[..page_size.physical]);
                Ok((PageTransform::RtreeFallback, page_size.physical))
            } else {
                Err(IbxError::Decompression(format!(
                    "{} page: {}",
                    page_type, err
                )))
            }
        }
    }
}

/// Inflate a zlib stream that must produce exactly `want` bytes.
fn inflate_exact(compressed: &[u8], want: usize) -> Result<Vec<u8>, String> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut body = Vec::with_capacity(want);
    decoder
        .read_to_end(&mut body)
        .map_err(|e| format!("zlib: {}", e))?;
    if body.len() != want {
        return Err(format!("inflated {} bytes, expected {}", body.len(), want));
    }
    Ok(body)
}

/// Inverse transform: deflate a logical page into a physical block.
///
/// Used to synthesize compressed fixtures; fails if the deflated body does
/// not fit the physical block.
pub fn compress_page(logical_page: &[u8], page_size: PageSize) -> Result<Vec<u8>, IbxError> {
    debug_assert_eq!(logical_page.len(), page_size.logical);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    encoder
        .write_all(&logical_page[SIZE_FIL_HEAD..])
        .map_err(|e| IbxError::Decompression(format!("zlib deflate: {}", e)))?;
    let deflated = encoder
        .finish()
        .map_err(|e| IbxError::Decompression(format!("zlib deflate: {}", e)))?;

    if SIZE_FIL_HEAD + deflated.len() > page_size.physical {
        return Err(IbxError::Decompression(format!(
            "deflated body ({} bytes) does not fit physical page of {}",
            deflated.len(),
            page_size.physical
        )));
    }

    let mut physical = vec![0u8; page_size.physical];
    physical[..SIZE_FIL_HEAD].copy_from_slice(&logical_page[..SIZE_FIL_HEAD]);
    physical[SIZE_FIL_HEAD..SIZE_FIL_HEAD + deflated.len()].copy_from_slice(&deflated);
    Ok(physical)
}

/// Inflate an arbitrary zlib buffer fully (SDI payloads).
pub fn inflate_all(compressed: &[u8]) -> Result<Vec<u8>, IbxError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| IbxError::Decompression(format!("zlib: {}", e)))?;
    Ok(out)
}

/// Deflate a buffer at level 6 (the engine's SDI compression level).
pub fn deflate_level6(data: &[u8]) -> Result<Vec<u8>, IbxError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
    encoder
        .write_all(data)
        .map_err(|e| IbxError::Decompression(format!("zlib deflate: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| IbxError::Decompression(format!("zlib deflate: {}", e)))
}
