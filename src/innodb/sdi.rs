//! Serialized Dictionary Information (SDI).
//!
//! A tablespace with the SDI flag embeds a mini B-tree whose root page
//! number lives in the page-0 sub-header. Its records are keyed
//! `(type u32, id u64)` and carry a zlib-compressed JSON blob, inline when
//! small enough or spilled across SDI-BLOB pages through a 20-byte external
//! reference.
//!
//! This module reads that tree and also synthesizes it: the rebuild pipeline
//! re-creates the root leaf and its blob chains from an `sdi.json`.

use std::collections::HashMap;

use crate::innodb::checksum;
use crate::innodb::codec;
use crate::innodb::compression;
use crate::innodb::constants::*;
use crate::innodb::lob::{ExternRef, LobReader};
use crate::innodb::page::{page_type_of, FspFlags};
use crate::innodb::page_types::PageType;
use crate::innodb::record::{
    next_record_offset, rec_set_heap_no, rec_set_n_owned, rec_set_next_offs, rec_set_status,
    RecordHeader, RecordStatus,
};
use crate::innodb::schema::SdiEntry;
use crate::innodb::tablespace::Tablespace;
use crate::IbxError;

/// One decoded SDI record.
#[derive(Debug, Clone)]
pub struct SdiRecord {
    pub sdi_type: u32,
    pub sdi_id: u64,
    pub uncompressed_len: u32,
    pub compressed_len: u32,
    pub json: String,
}

/// Read `(version, root_page)` from the page-0 SDI sub-header.
pub fn sdi_root_from_page0(page0: &[u8], flags: FspFlags) -> Option<(u32, u32)> {
    if !flags.has_sdi() {
        return None;
    }
    let offset = flags.sdi_offset();
    if page0.len() < offset + 8 {
        return None;
    }
    let version = codec::read_u32(page0, offset);
    let root = codec::read_u32(page0, offset + 4);
    if version == 0 || root == 0 || root == FIL_NULL {
        return None;
    }
    Some((version, root))
}

/// Iterate every SDI record of the tablespace, following the leaf chain
/// from the root page and SDI-BLOB references where records spilled.
pub fn read_sdi_records(ts: &Tablespace) -> Result<Vec<SdiRecord>, IbxError> {
    let flags = ts.fsp_flags();
    let page0 = ts.read_page(0)?;
    let (_version, root) = sdi_root_from_page0(&page0, flags)
        .ok_or_else(|| IbxError::Parse("tablespace carries no SDI header".into()))?;
    if root as u64 >= ts.page_count() {
        return Err(IbxError::SdiRootInvalid(root));
    }

    let page_size = ts.page_size();
    let mut records = Vec::new();
    let mut page_no = root;
    let mut guard = 0;

    while page_no != FIL_NULL && page_no != 0 {
        if guard >= LOB_CHAIN_STEP_CAP {
            break;
        }
        guard += 1;

        let physical = ts.read_page(page_no as u64)?;
        let mut logical = vec![0u8; page_size.logical];
        compression::decompress_page(&physical, page_size, &mut logical)?;

        if page_type_of(&logical) != PageType::Sdi {
            break;
        }
        parse_sdi_leaf(&logical, page_size.logical, ts, &mut records)?;

        page_no = codec::read_u32(&logical, FIL_PAGE_NEXT);
    }

    Ok(records)
}

/// Walk the record chain of one SDI leaf page.
fn parse_sdi_leaf(
    page: &[u8],
    page_size: usize,
    ts: &Tablespace,
    out: &mut Vec<SdiRecord>,
) -> Result<(), IbxError> {
    let n_recs = codec::read_u16(page, PAGE_HEADER + PAGE_N_RECS) as usize;
    let max_steps = (page_size / (REC_N_NEW_EXTRA_BYTES + 1)).max(n_recs + 2);

    let mut origin = PAGE_NEW_INFIMUM;
    let mut steps = 0;
    while steps < max_steps {
        let Some(header) = RecordHeader::parse(page, origin) else {
            break;
        };
        if header.status == RecordStatus::Supremum {
            break;
        }
        if header.status == RecordStatus::Ordinary && !header.is_deleted() {
            if let Some(record) = parse_sdi_record(page, origin, ts)? {
                out.push(record);
            }
        }
        match next_record_offset(page, origin, page_size) {
            Some(next) if next != origin => {
                origin = next;
                steps += 1;
            }
            _ => break,
        }
    }
    Ok(())
}

/// Decode the record at `origin`: fixed key/system fields, then the data
/// payload, inline or behind an SDI-BLOB reference.
fn parse_sdi_record(
    page: &[u8],
    origin: usize,
    ts: &Tablespace,
) -> Result<Option<SdiRecord>, IbxError> {
    if origin + SDI_REC_OFF_DATA > page.len() || origin < REC_N_NEW_EXTRA_BYTES + 1 {
        return Ok(None);
    }

    // Variable-length prefix just below the extra bytes: 1 byte, or 2 with
    // the 0x80 continuation; bit 14 marks external storage.
    let mut lenbyte = page[origin - REC_N_NEW_EXTRA_BYTES - 1] as usize;
    let external;
    let data_len;
    if lenbyte & 0x80 != 0 {
        if origin < REC_N_NEW_EXTRA_BYTES + 2 {
            return Ok(None);
        }
        lenbyte = (lenbyte << 8) | page[origin - REC_N_NEW_EXTRA_BYTES - 2] as usize;
        external = lenbyte & 0x4000 != 0;
        data_len = lenbyte & 0x3FFF;
    } else {
        external = false;
        data_len = lenbyte;
    }

    let rec = &page[origin..];
    let sdi_type = codec::read_u32(rec, SDI_REC_OFF_TYPE);
    let sdi_id = codec::read_u64(rec, SDI_REC_OFF_ID);
    let uncompressed_len = codec::read_u32(rec, SDI_REC_OFF_UNCOMP_LEN);
    let compressed_len = codec::read_u32(rec, SDI_REC_OFF_COMP_LEN);
    if compressed_len == 0 {
        return Ok(None);
    }

    let compressed: Vec<u8> = if external {
        if origin + SDI_REC_OFF_DATA + FIELD_REF_SIZE > page.len() {
            return Ok(None);
        }
        let reference = ExternRef::parse(&rec[SDI_REC_OFF_DATA..SDI_REC_OFF_DATA + FIELD_REF_SIZE])
            .ok_or_else(|| IbxError::Parse("bad SDI external reference".into()))?;
        let value = LobReader::new(ts, compressed_len as usize).read_external(&reference)?;
        value.data
    } else {
        let end = origin + SDI_REC_OFF_DATA + data_len.max(compressed_len as usize);
        if end > page.len() {
            return Ok(None);
        }
        rec[SDI_REC_OFF_DATA..SDI_REC_OFF_DATA + compressed_len as usize].to_vec()
    };

    let json_bytes = compression::inflate_all(&compressed)?;
    let json = String::from_utf8_lossy(&json_bytes).into_owned();

    Ok(Some(SdiRecord {
        sdi_type,
        sdi_id,
        uncompressed_len,
        compressed_len,
        json,
    }))
}

// ---------------------------------------------------------------------------
// Write side: empty-page init, blob chains, root repopulation
// ---------------------------------------------------------------------------

/// Allocates SDI-BLOB pages from the free pool collected during the rebuild
/// scan, building each page's full image in memory.
pub struct SdiBlobAllocator {
    pool: Vec<u32>,
    next: usize,
    page_size: usize,
    space_id: u32,
    /// Finished blob pages keyed by page number, written out after the
    /// main rebuild pass.
    pub out_pages: HashMap<u32, Vec<u8>>,
}

/// Payload bytes per SDI-BLOB page.
pub fn sdi_blob_payload_size(page_size: usize) -> usize {
    page_size - FIL_PAGE_DATA - LOB_HDR_SIZE - FIL_PAGE_END_LSN_OLD_CHKSUM
}

impl SdiBlobAllocator {
    pub fn new(pool: Vec<u32>, page_size: usize, space_id: u32) -> Self {
        SdiBlobAllocator {
            pool,
            next: 0,
            page_size,
            space_id,
            out_pages: HashMap::new(),
        }
    }

    pub fn pool_is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Spill one compressed payload across blob pages from the pool.
    /// Returns the first page number of the chain.
    pub fn emit_chain(&mut self, comp: &[u8]) -> Result<u32, IbxError> {
        if comp.is_empty() {
            return Err(IbxError::SdiCapacityExceeded(
                "empty SDI payload for external storage".into(),
            ));
        }
        let payload_size = sdi_blob_payload_size(self.page_size);

        let mut remaining = comp.len();
        let mut offset = 0;
        let mut first_page = FIL_NULL;

        while remaining > 0 {
            if self.next >= self.pool.len() {
                return Err(IbxError::SdiCapacityExceeded(format!(
                    "blob pool exhausted ({} pages) while spilling {} bytes",
                    self.pool.len(),
                    comp.len()
                )));
            }
            let page_no = self.pool[self.next];
            self.next += 1;
            if first_page == FIL_NULL {
                first_page = page_no;
            }

            let part_len = payload_size.min(remaining);
            let next_page = if remaining > part_len && self.next < self.pool.len() {
                self.pool[self.next]
            } else {
                FIL_NULL
            };

            let mut page = vec![0u8; self.page_size];
            codec::write_u32(&mut page, FIL_PAGE_OFFSET, page_no);
            codec::write_u32(&mut page, FIL_PAGE_PREV, FIL_NULL);
            codec::write_u32(&mut page, FIL_PAGE_NEXT, FIL_NULL);
            codec::write_u16(&mut page, FIL_PAGE_TYPE, PageType::SdiBlob.as_u16());
            codec::write_u32(&mut page, FIL_PAGE_ARCH_LOG_NO_OR_SPACE_ID, self.space_id);

            codec::write_u32(&mut page, FIL_PAGE_DATA + LOB_HDR_PART_LEN, part_len as u32);
            codec::write_u32(&mut page, FIL_PAGE_DATA + LOB_HDR_NEXT_PAGE_NO, next_page);
            let data_start = FIL_PAGE_DATA + LOB_HDR_SIZE;
            page[data_start..data_start + part_len].copy_from_slice(&comp[offset..offset + part_len]);

            checksum::stamp_page_lsn_and_crc32(&mut page, self.page_size, 0);
            self.out_pages.insert(page_no, page);

            remaining -= part_len;
            offset += part_len;
        }

        Ok(first_page)
    }
}

/// Reinitialize a buffer as an empty compact SDI leaf: infimum/supremum and
/// the two directory slots, everything else zeroed.
pub fn init_empty_sdi_page(page: &mut [u8], page_size: usize, page_no: u32) {
    page[..page_size].fill(0);
    codec::write_u32(page, FIL_PAGE_OFFSET, page_no);
    codec::write_u32(page, FIL_PAGE_PREV, FIL_NULL);
    codec::write_u32(page, FIL_PAGE_NEXT, FIL_NULL);
    codec::write_u16(page, FIL_PAGE_TYPE, PageType::Sdi.as_u16());

    codec::write_u16(page, PAGE_HEADER + PAGE_N_DIR_SLOTS, 2);
    codec::write_u16(page, PAGE_HEADER + PAGE_DIRECTION, PAGE_NO_DIRECTION);
    codec::write_u16(
        page,
        PAGE_HEADER + PAGE_N_HEAP,
        0x8000 | PAGE_HEAP_NO_USER_LOW as u16,
    );
    codec::write_u16(page, PAGE_HEADER + PAGE_HEAP_TOP, PAGE_NEW_SUPREMUM_END as u16);

    page[PAGE_DATA..PAGE_NEW_SUPREMUM_END].copy_from_slice(&INFIMUM_SUPREMUM_COMPACT);

    codec::write_u16(
        page,
        page_size - PAGE_DIR - PAGE_DIR_SLOT_SIZE,
        PAGE_NEW_INFIMUM as u16,
    );
    codec::write_u16(
        page,
        page_size - PAGE_DIR - 2 * PAGE_DIR_SLOT_SIZE,
        PAGE_NEW_SUPREMUM as u16,
    );
}

/// Greedy directory grouping: full groups of `PAGE_DIR_SLOT_MAX_N_OWNED`
/// with the supremum-terminated remainder last.
fn build_dir_groups(user_recs: usize) -> Vec<usize> {
    let mut groups = Vec::new();
    let mut remaining = user_recs + 1; // user records + supremum
    while remaining > PAGE_DIR_SLOT_MAX_N_OWNED {
        groups.push(PAGE_DIR_SLOT_MAX_N_OWNED);
        remaining -= PAGE_DIR_SLOT_MAX_N_OWNED;
    }
    groups.push(remaining);
    groups
}

/// Populate an initialized SDI leaf with `entries` (already sorted by
/// `(type, id)`). Payloads compress at level 6; anything over the inline
/// limit or the page's free space spills through `blob_alloc`.
pub fn populate_sdi_root_page(
    page: &mut [u8],
    page_size: usize,
    entries: &[SdiEntry],
    mut blob_alloc: Option<&mut SdiBlobAllocator>,
    space_id: u32,
) -> Result<(), IbxError> {
    struct RecInfo {
        origin: usize,
    }
    let mut recs: Vec<RecInfo> = Vec::with_capacity(entries.len());

    let groups = build_dir_groups(entries.len());
    let n_slots = 1 + groups.len();
    let dir_start = page_size - PAGE_DIR - PAGE_DIR_SLOT_SIZE * n_slots;

    let mut heap_top = PAGE_NEW_SUPREMUM_END;

    for (i, entry) in entries.iter().enumerate() {
        let comp = compression::deflate_level6(entry.json.as_bytes())?;
        let comp_len = comp.len();
        let uncomp_len = entry.json.len() as u32;

        // Inline when the two-byte length prefix can carry it and the heap
        // still has room before the directory.
        let mut use_external = comp_len > SDI_INLINE_MAX_COMP_LEN;
        let mut len_bytes = if comp_len <= 127 { 1 } else { 2 };
        let mut rec_size = REC_N_NEW_EXTRA_BYTES + len_bytes + SDI_REC_OFF_DATA + comp_len;
        if !use_external && heap_top + rec_size > dir_start {
            use_external = true;
        }

        let mut first_blob_page = FIL_NULL;
        if use_external {
            len_bytes = 2;
            rec_size = REC_N_NEW_EXTRA_BYTES + len_bytes + SDI_REC_OFF_DATA + FIELD_REF_SIZE;
            if heap_top + rec_size > dir_start {
                return Err(IbxError::SdiCapacityExceeded(
                    "SDI external records exceed root page capacity".into(),
                ));
            }
            let alloc = blob_alloc.as_deref_mut().ok_or_else(|| {
                IbxError::SdiCapacityExceeded(
                    "SDI record needs external storage but no blob pages are available".into(),
                )
            })?;
            first_blob_page = alloc.emit_chain(&comp)?;
        }

        let rec_base = heap_top;
        let origin = rec_base + len_bytes + REC_N_NEW_EXTRA_BYTES;
        page[rec_base..rec_base + rec_size].fill(0);

        if use_external {
            page[rec_base] = 0;
            page[rec_base + 1] = 0xC0;
        } else if len_bytes == 1 {
            page[rec_base] = comp_len as u8;
        } else {
            page[rec_base] = (comp_len & 0xFF) as u8;
            page[rec_base + 1] = ((comp_len >> 8) as u8) | 0x80;
        }

        rec_set_heap_no(page, origin, (PAGE_HEAP_NO_USER_LOW + i) as u16);
        rec_set_status(page, origin, REC_STATUS_ORDINARY);
        rec_set_n_owned(page, origin, 0);

        codec::write_u32(page, origin + SDI_REC_OFF_TYPE, entry.sdi_type as u32);
        codec::write_u64(page, origin + SDI_REC_OFF_ID, entry.sdi_id);
        codec::write_u48(page, origin + SDI_REC_OFF_TRX_ID, 0);
        codec::write_u56(page, origin + SDI_REC_OFF_ROLL_PTR, 0);
        codec::write_u32(page, origin + SDI_REC_OFF_UNCOMP_LEN, uncomp_len);
        codec::write_u32(page, origin + SDI_REC_OFF_COMP_LEN, comp_len as u32);

        if use_external {
            let ref_off = origin + SDI_REC_OFF_DATA;
            codec::write_u32(page, ref_off + BTR_EXTERN_SPACE_ID, space_id);
            codec::write_u32(page, ref_off + BTR_EXTERN_PAGE_NO, first_blob_page);
            codec::write_u32(page, ref_off + BTR_EXTERN_OFFSET, FIL_PAGE_DATA as u32);
            codec::write_u64(page, ref_off + BTR_EXTERN_LEN, comp_len as u64);
        } else {
            page[origin + SDI_REC_OFF_DATA..origin + SDI_REC_OFF_DATA + comp_len]
                .copy_from_slice(&comp);
        }

        recs.push(RecInfo { origin });
        heap_top += rec_size;
    }

    codec::write_u16(page, PAGE_HEADER + PAGE_N_RECS, entries.len() as u16);
    codec::write_u16(page, PAGE_HEADER + PAGE_HEAP_TOP, heap_top as u16);
    codec::write_u16(
        page,
        PAGE_HEADER + PAGE_N_HEAP,
        0x8000 | (PAGE_HEAP_NO_USER_LOW + entries.len()) as u16,
    );
    codec::write_u16(page, PAGE_HEADER + PAGE_N_DIR_SLOTS, n_slots as u16);
    codec::write_u16(page, PAGE_HEADER + PAGE_LEVEL, 0);
    codec::write_u64(page, PAGE_HEADER + PAGE_INDEX_ID, SDI_INDEX_ID);
    codec::write_u64(page, PAGE_HEADER + PAGE_MAX_TRX_ID, 0);

    // Record chain: infimum -> first .. last -> supremum.
    rec_set_n_owned(page, PAGE_NEW_INFIMUM, 1);
    let first = recs.first().map_or(PAGE_NEW_SUPREMUM, |r| r.origin);
    rec_set_next_offs(page, PAGE_NEW_INFIMUM, first);
    for i in 0..recs.len() {
        let next = recs.get(i + 1).map_or(PAGE_NEW_SUPREMUM, |r| r.origin);
        rec_set_next_offs(page, recs[i].origin, next);
    }
    rec_set_next_offs(page, PAGE_NEW_SUPREMUM, 0);

    // Ownership and directory slots.
    let mut rec_index = 0usize;
    for &group in &groups {
        rec_index += group - 1;
        if rec_index >= recs.len() {
            rec_set_n_owned(page, PAGE_NEW_SUPREMUM, group as u8);
        } else {
            rec_set_n_owned(page, recs[rec_index].origin, group as u8);
        }
        rec_index += 1;
    }

    codec::write_u16(
        page,
        page_size - PAGE_DIR - PAGE_DIR_SLOT_SIZE,
        PAGE_NEW_INFIMUM as u16,
    );
    let mut slot = 1usize;
    rec_index = 0;
    for &group in &groups {
        rec_index += group - 1;
        let owner = if rec_index < recs.len() {
            recs[rec_index].origin
        } else {
            PAGE_NEW_SUPREMUM
        };
        codec::write_u16(
            page,
            page_size - PAGE_DIR - PAGE_DIR_SLOT_SIZE * (slot + 1),
            owner as u16,
        );
        slot += 1;
        rec_index += 1;
    }

    Ok(())
}

/// Scan a tablespace for existing SDI-BLOB pages; these become the free
/// pool the rebuild draws on when re-synthesizing blob chains.
pub fn collect_sdi_blob_pages(ts: &mut Tablespace) -> Result<Vec<u32>, IbxError> {
    let mut pages = Vec::new();
    ts.for_each_page(|page_no, page| {
        let t = page_type_of(page);
        if t == PageType::SdiBlob || t == PageType::SdiZblob {
            pages.push(page_no as u32);
        }
        Ok(())
    })?;
    Ok(pages)
}
