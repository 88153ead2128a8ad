//! COMPACT record parsing.
//!
//! A compact record grows in two directions around its origin byte: the
//! 5-byte extra header, the null bitmap, and the variable-length array sit
//! below it (descending addresses), the field payloads above it. Offset
//! computation is a reverse cursor over the pre-origin region producing one
//! `(end_offset, null, extern)` slot per field in index order.
//!
//! The chain walk starts at infimum, follows signed 16-bit next-record
//! deltas modulo the page size, and stops at supremum or after
//! `max(page_size / 6, PAGE_N_RECS + 2)` steps.

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::page_types::PageType;
use crate::innodb::schema::RowLayout;

/// Record status from the low 3 bits of the type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Ordinary,
    NodePtr,
    Infimum,
    Supremum,
}

impl RecordStatus {
    pub fn from_bits(bits: u8) -> RecordStatus {
        match bits & 0x07 {
            REC_STATUS_NODE_PTR => RecordStatus::NodePtr,
            REC_STATUS_INFIMUM => RecordStatus::Infimum,
            REC_STATUS_SUPREMUM => RecordStatus::Supremum,
            _ => RecordStatus::Ordinary,
        }
    }
}

/// The 5 extra bytes preceding a compact record origin.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub info_bits: u8,
    pub n_owned: u8,
    pub heap_no: u16,
    pub status: RecordStatus,
    pub next_delta: i16,
}

impl RecordHeader {
    /// Parse the header of the record whose origin is at `origin`.
    pub fn parse(page: &[u8], origin: usize) -> Option<RecordHeader> {
        if origin < REC_N_NEW_EXTRA_BYTES || origin > page.len() {
            return None;
        }
        let extra = &page[origin - REC_N_NEW_EXTRA_BYTES..origin];
        let two = codec::read_u16(extra, 1);
        Some(RecordHeader {
            info_bits: extra[0] & 0xF0,
            n_owned: extra[0] & 0x0F,
            heap_no: (two >> 3) & 0x1FFF,
            status: RecordStatus::from_bits((two & 0x07) as u8),
            next_delta: codec::read_u16(extra, 3) as i16,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.info_bits & REC_INFO_DELETED_FLAG != 0
    }

    pub fn has_version(&self) -> bool {
        self.info_bits & REC_INFO_VERSION_FLAG != 0
    }

    pub fn has_instant(&self) -> bool {
        self.info_bits & REC_INFO_INSTANT_FLAG != 0
    }
}

/// Writer duals used when synthesizing pages (SDI rebuild, fixtures).
pub fn rec_set_status(page: &mut [u8], origin: usize, status: u8) {
    let b = page[origin - 3];
    page[origin - 3] = (b & !0x07) | (status & 0x07);
}

pub fn rec_set_heap_no(page: &mut [u8], origin: usize, heap_no: u16) {
    let status = page[origin - 3] & 0x07;
    codec::write_u16(page, origin - 4, (heap_no << 3) | status as u16);
}

pub fn rec_set_n_owned(page: &mut [u8], origin: usize, n_owned: u8) {
    let b = page[origin - REC_N_NEW_EXTRA_BYTES];
    page[origin - REC_N_NEW_EXTRA_BYTES] = (b & 0xF0) | (n_owned & 0x0F);
}

/// Store the next-record link as a delta from `origin`; 0 ends the list.
pub fn rec_set_next_offs(page: &mut [u8], origin: usize, next_origin: usize) {
    let delta = if next_origin == 0 {
        0u16
    } else {
        (next_origin as u16).wrapping_sub(origin as u16)
    };
    codec::write_u16(page, origin - REC_NEXT, delta);
}

/// Resolve the next record origin: delta added to the current origin,
/// taken modulo the page size. Rejects zero deltas and positions outside
/// the record area.
pub fn next_record_offset(page: &[u8], origin: usize, page_size: usize) -> Option<usize> {
    if origin < REC_NEXT || origin >= page_size {
        return None;
    }
    let delta = codec::read_u16(page, origin - REC_NEXT) as i16;
    if delta == 0 {
        return None;
    }
    let raw = origin as i32 + delta as i32;
    let mut wrapped = raw % page_size as i32;
    if wrapped < 0 {
        wrapped += page_size as i32;
    }
    let next = wrapped as usize;
    if !(PAGE_NEW_INFIMUM..page_size).contains(&next) {
        return None;
    }
    Some(next)
}

/// One field slot from offset computation.
#[derive(Debug, Clone, Copy)]
pub struct FieldSlot {
    /// End offset of the field payload, relative to the record origin.
    pub end: u16,
    pub is_null: bool,
    pub is_extern: bool,
}

/// Resolved field bytes.
#[derive(Debug)]
pub enum FieldData<'a> {
    Null,
    Bytes { data: &'a [u8], external: bool },
}

/// Compute the per-field offset slots of the record at `origin`, in the
/// field order of `layout`. Returns `None` when the pre-origin region runs
/// out of the page or an offset escapes it.
pub fn compute_offsets(page: &[u8], origin: usize, layout: &RowLayout) -> Option<Vec<FieldSlot>> {
    let header = RecordHeader::parse(page, origin)?;
    if header.status != RecordStatus::Ordinary {
        return None;
    }

    // Reverse cursor: start just below the extra bytes.
    let mut nulls = origin.checked_sub(REC_N_NEW_EXTRA_BYTES + 1)?;
    if header.has_version() {
        nulls = nulls.checked_sub(1)?;
    } else if header.has_instant() {
        // A 1-2 byte column-count override precedes the null bitmap.
        let len = if page[nulls] & REC_N_FIELDS_TWO_BYTES_FLAG != 0 {
            2
        } else {
            1
        };
        nulls = nulls.checked_sub(len)?;
    }

    let null_bytes = layout.n_nullable.div_ceil(8);
    let mut lens = nulls.checked_sub(null_bytes)?;

    let mut slots = Vec::with_capacity(layout.fields.len());
    let mut offs: usize = 0;
    let mut null_mask: u32 = 1;
    let mut nulls_idx = nulls;

    for field in &layout.fields {
        let mut is_null = false;
        let mut is_extern = false;

        if field.nullable {
            if null_mask == 0x100 {
                nulls_idx = nulls_idx.checked_sub(1)?;
                null_mask = 1;
            }
            if page[nulls_idx] & (null_mask as u8) != 0 {
                is_null = true;
            }
            null_mask <<= 1;
        }

        if !is_null {
            if field.fixed_len == 0 {
                let mut lenbyte = page[lens] as usize;
                lens = lens.checked_sub(1)?;
                if (field.max_len > 255 || field.kind.is_big_field())
                    && lenbyte & 0x80 != 0
                {
                    lenbyte = (lenbyte << 8) | page[lens] as usize;
                    lens = lens.checked_sub(1)?;
                    offs += lenbyte & 0x3FFF;
                    if lenbyte & 0x4000 != 0 {
                        is_extern = true;
                    }
                } else {
                    offs += lenbyte;
                }
            } else {
                offs += field.fixed_len as usize;
            }
        }

        offs &= 0xFFFF;
        if origin + offs > page.len() {
            return None;
        }
        slots.push(FieldSlot {
            end: offs as u16,
            is_null,
            is_extern,
        });
    }

    Some(slots)
}

/// Fetch the `i`-th field's payload bytes for a computed slot array.
pub fn field_data<'a>(
    page: &'a [u8],
    origin: usize,
    slots: &[FieldSlot],
    i: usize,
) -> FieldData<'a> {
    let slot = slots[i];
    if slot.is_null {
        return FieldData::Null;
    }
    let start = if i == 0 { 0 } else { slots[i - 1].end as usize };
    let end = slot.end as usize;
    FieldData::Bytes {
        data: &page[origin + start..origin + end],
        external: slot.is_extern,
    }
}

/// Total payload size of a record (end offset of its last field).
pub fn record_data_size(slots: &[FieldSlot]) -> usize {
    slots.last().map_or(0, |s| s.end as usize)
}

/// The §4.5 validation gate. Accepts a record iff its origin leaves room for
/// the smallest possible header, offset computation stays inside the page,
/// each field length lies within its column's bounds, and the total data
/// size is within the table's bounds.
pub fn check_record(page: &[u8], origin: usize, layout: &RowLayout) -> Option<Vec<FieldSlot>> {
    if origin < layout.min_rec_header_len + REC_N_NEW_EXTRA_BYTES {
        return None;
    }
    let slots = compute_offsets(page, origin, layout)?;

    let data_size = record_data_size(&slots);
    if data_size < layout.data_min_size || data_size > layout.data_max_size {
        return None;
    }

    for (i, field) in layout.fields.iter().enumerate() {
        let slot = slots[i];
        if slot.is_null {
            continue;
        }
        let start = if i == 0 { 0 } else { slots[i - 1].end as usize };
        let len = slot.end as usize - start;
        if slot.is_extern {
            // An external field stores a prefix plus the 20-byte reference.
            if len < FIELD_REF_SIZE {
                return None;
            }
            continue;
        }
        if len < field.min_len as usize || len > field.max_len as usize {
            return None;
        }
    }

    Some(slots)
}

/// True when the page header's compact bit is set.
pub fn page_is_compact(page: &[u8]) -> bool {
    codec::read_u16(page, PAGE_HEADER + PAGE_N_HEAP) & 0x8000 != 0
}

pub fn page_level(page: &[u8]) -> u16 {
    codec::read_u16(page, PAGE_HEADER + PAGE_LEVEL)
}

pub fn page_index_id(page: &[u8]) -> u64 {
    codec::read_u64(page, PAGE_HEADER + PAGE_INDEX_ID)
}

pub fn page_n_recs(page: &[u8]) -> u16 {
    codec::read_u16(page, PAGE_HEADER + PAGE_N_RECS)
}

/// One accepted record from a leaf page.
#[derive(Debug)]
pub struct ParsedRecord {
    pub origin: usize,
    pub deleted: bool,
    pub slots: Vec<FieldSlot>,
}

/// Outcome of scanning one leaf page.
#[derive(Debug, Default)]
pub struct LeafScan {
    pub records: Vec<ParsedRecord>,
    pub n_deleted_skipped: usize,
    pub n_invalid: usize,
}

/// Walk one leaf page of the target index and validate each user record.
///
/// Pages that are not COMPACT INDEX leaves of `target_index_id` yield an
/// empty scan.
pub fn parse_leaf_page(
    page: &[u8],
    page_size: usize,
    layout: &RowLayout,
    target_index_id: u64,
    include_deleted: bool,
) -> LeafScan {
    let mut scan = LeafScan::default();

    if page.len() < page_size
        || crate::innodb::page::page_type_of(page) != PageType::Index
        || page_level(page) != 0
        || !page_is_compact(page)
        || page_index_id(page) != target_index_id
    {
        return scan;
    }

    let n_recs = page_n_recs(page) as usize;
    let max_steps = (page_size / (REC_N_NEW_EXTRA_BYTES + 1)).max(n_recs + 2);

    let mut origin = PAGE_NEW_INFIMUM;
    let mut steps = 0;
    while steps < max_steps {
        let Some(header) = RecordHeader::parse(page, origin) else {
            scan.n_invalid += 1;
            break;
        };
        if header.status == RecordStatus::Supremum {
            break;
        }

        if header.status == RecordStatus::Ordinary {
            let deleted = header.is_deleted();
            if !deleted || include_deleted {
                match check_record(page, origin, layout) {
                    Some(slots) => scan.records.push(ParsedRecord {
                        origin,
                        deleted,
                        slots,
                    }),
                    None => scan.n_invalid += 1,
                }
            } else {
                scan.n_deleted_skipped += 1;
            }
        }

        match next_record_offset(page, origin, page_size) {
            Some(next) if next != origin && next < page_size => {
                origin = next;
                steps += 1;
            }
            _ => {
                scan.n_invalid += 1;
                break;
            }
        }
    }

    scan
}
