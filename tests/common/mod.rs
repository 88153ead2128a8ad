//! Shared fixture builders: synthetic tablespaces, schema JSON, keyrings.
#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

use ibx::innodb::checksum::stamp_page_lsn_and_crc32;
use ibx::innodb::codec;
use ibx::innodb::compression::compress_page;
use ibx::innodb::constants::*;
use ibx::innodb::page_types::PageType;
use ibx::innodb::record::{rec_set_heap_no, rec_set_next_offs, rec_set_status};
use ibx::innodb::tablespace::PageSize;

pub const SPACE_ID: u32 = 23;

pub fn uncompressed_page_size() -> PageSize {
    PageSize {
        physical: 16384,
        logical: 16384,
    }
}

pub fn compressed_page_size() -> PageSize {
    PageSize {
        physical: 8192,
        logical: 16384,
    }
}

pub fn uncompressed_flags() -> u32 {
    FSP_FLAGS_MASK_POST_ANTELOPE | (5 << FSP_FLAGS_POS_PAGE_SSIZE)
}

pub fn uncompressed_flags_with_sdi() -> u32 {
    uncompressed_flags() | FSP_FLAGS_MASK_SDI
}

pub fn compressed_flags() -> u32 {
    FSP_FLAGS_MASK_POST_ANTELOPE | FSP_FLAGS_MASK_ATOMIC_BLOBS | (4 << FSP_FLAGS_POS_ZIP_SSIZE)
}

pub fn compressed_flags_with_sdi() -> u32 {
    compressed_flags() | FSP_FLAGS_MASK_SDI
}

/// Page 0 at `physical` size with the FSP header and, optionally, the SDI
/// sub-header `(version 1, root)` at the flags-derived offset.
pub fn build_page0(physical: usize, flags: u32, n_pages: u32, sdi_root: Option<u32>) -> Vec<u8> {
    let mut page = vec![0u8; physical];
    codec::write_u32(&mut page, FIL_PAGE_OFFSET, 0);
    codec::write_u32(&mut page, FIL_PAGE_PREV, FIL_NULL);
    codec::write_u32(&mut page, FIL_PAGE_NEXT, FIL_NULL);
    codec::write_u16(&mut page, FIL_PAGE_TYPE, PageType::FspHdr.as_u16());
    codec::write_u32(&mut page, FIL_PAGE_SPACE_ID, SPACE_ID);

    codec::write_u32(&mut page, FIL_PAGE_DATA + FSP_SPACE_ID, SPACE_ID);
    codec::write_u32(&mut page, FIL_PAGE_DATA + FSP_SIZE, n_pages);
    codec::write_u32(&mut page, FIL_PAGE_DATA + FSP_FREE_LIMIT, n_pages);
    codec::write_u32(&mut page, FIL_PAGE_DATA + FSP_SPACE_FLAGS, flags);

    if let Some(root) = sdi_root {
        let sdi_offset = ibx::innodb::page::FspFlags(flags).sdi_offset();
        codec::write_u32(&mut page, sdi_offset, 1);
        codec::write_u32(&mut page, sdi_offset + 4, root);
    }

    stamp_page_lsn_and_crc32(&mut page, physical, 0);
    page
}

/// An empty logical-size compact INDEX leaf.
pub fn init_index_leaf(page_size: usize, page_no: u32, index_id: u64) -> Vec<u8> {
    let mut page = vec![0u8; page_size];
    codec::write_u32(&mut page, FIL_PAGE_OFFSET, page_no);
    codec::write_u32(&mut page, FIL_PAGE_PREV, FIL_NULL);
    codec::write_u32(&mut page, FIL_PAGE_NEXT, FIL_NULL);
    codec::write_u16(&mut page, FIL_PAGE_TYPE, PageType::Index.as_u16());
    codec::write_u32(&mut page, FIL_PAGE_SPACE_ID, SPACE_ID);

    codec::write_u16(&mut page, PAGE_HEADER + PAGE_N_DIR_SLOTS, 2);
    codec::write_u16(
        &mut page,
        PAGE_HEADER + PAGE_HEAP_TOP,
        PAGE_NEW_SUPREMUM_END as u16,
    );
    codec::write_u16(
        &mut page,
        PAGE_HEADER + PAGE_N_HEAP,
        0x8000 | PAGE_HEAP_NO_USER_LOW as u16,
    );
    codec::write_u16(&mut page, PAGE_HEADER + PAGE_LEVEL, 0);
    codec::write_u64(&mut page, PAGE_HEADER + PAGE_INDEX_ID, index_id);
    page[PAGE_DATA..PAGE_NEW_SUPREMUM_END].copy_from_slice(&INFIMUM_SUPREMUM_COMPACT);

    codec::write_u16(
        &mut page,
        page_size - PAGE_DIR - PAGE_DIR_SLOT_SIZE,
        PAGE_NEW_INFIMUM as u16,
    );
    codec::write_u16(
        &mut page,
        page_size - PAGE_DIR - 2 * PAGE_DIR_SLOT_SIZE,
        PAGE_NEW_SUPREMUM as u16,
    );
    page
}

/// A clustered-index row for the sample schema `(id INT NOT NULL,
/// name VARCHAR(32) NULL)`: record order id, DB_TRX_ID, DB_ROLL_PTR, name.
pub struct PrimaryRow {
    pub id: i32,
    pub name: Option<Vec<u8>>,
    pub name_extern_ref: Option<[u8; FIELD_REF_SIZE]>,
}

impl PrimaryRow {
    pub fn new(id: i32, name: &str) -> Self {
        PrimaryRow {
            id,
            name: Some(name.as_bytes().to_vec()),
            name_extern_ref: None,
        }
    }

    pub fn with_extern(id: i32, reference: [u8; FIELD_REF_SIZE]) -> Self {
        PrimaryRow {
            id,
            name: None,
            name_extern_ref: Some(reference),
        }
    }
}

/// Append primary rows to an INDEX leaf, linking the chain and stamping the
/// page header counters.
pub fn write_primary_rows(page: &mut [u8], rows: &[PrimaryRow]) {
    let mut heap_top = PAGE_NEW_SUPREMUM_END;
    let mut origins = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let payload: Vec<u8> = match (&row.name, &row.name_extern_ref) {
            (Some(name), _) => name.clone(),
            (None, Some(reference)) => reference.to_vec(),
            (None, None) => Vec::new(),
        };
        let has_name = row.name.is_some() || row.name_extern_ref.is_some();

        // pre-origin: [var-len bytes][null bitmap][5 extra bytes]
        let two_byte_len = row.name_extern_ref.is_some();
        let var_bytes = if has_name {
            if two_byte_len {
                2
            } else {
                1
            }
        } else {
            0
        };
        let origin = heap_top + var_bytes + 1 + REC_N_NEW_EXTRA_BYTES;

        if has_name {
            if two_byte_len {
                // externally stored: 14-bit length (the 20-byte ref) + bit 14
                let val = 0x4000 | payload.len();
                page[origin - REC_N_NEW_EXTRA_BYTES - 2] = ((val >> 8) as u8) | 0x80;
                page[origin - REC_N_NEW_EXTRA_BYTES - 3] = (val & 0xFF) as u8;
            } else {
                page[origin - REC_N_NEW_EXTRA_BYTES - 2] = payload.len() as u8;
            }
            page[origin - REC_N_NEW_EXTRA_BYTES - 1] = 0;
        } else {
            page[origin - REC_N_NEW_EXTRA_BYTES - 1] = 0x01; // name IS NULL
        }

        rec_set_heap_no(page, origin, (PAGE_HEAP_NO_USER_LOW + i) as u16);
        rec_set_status(page, origin, REC_STATUS_ORDINARY);

        codec::write_be_int_flipped(&mut page[origin..origin + 4], row.id as i64);
        let name_off = origin + 4 + DATA_TRX_ID_LEN + DATA_ROLL_PTR_LEN;
        page[name_off..name_off + payload.len()].copy_from_slice(&payload);

        origins.push(origin);
        heap_top = name_off + payload.len();
    }

    let mut prev = PAGE_NEW_INFIMUM;
    for &origin in &origins {
        rec_set_next_offs(page, prev, origin);
        prev = origin;
    }
    rec_set_next_offs(page, prev, PAGE_NEW_SUPREMUM);
    rec_set_next_offs(page, PAGE_NEW_SUPREMUM, 0);

    codec::write_u16(page, PAGE_HEADER + PAGE_N_RECS, rows.len() as u16);
    codec::write_u16(page, PAGE_HEADER + PAGE_HEAP_TOP, heap_top as u16);
    codec::write_u16(
        page,
        PAGE_HEADER + PAGE_N_HEAP,
        0x8000 | (PAGE_HEAP_NO_USER_LOW + rows.len()) as u16,
    );
}

/// Append `(name, id)` rows for the BY_NAME secondary index.
pub fn write_secondary_rows(page: &mut [u8], rows: &[(&str, i32)]) {
    let mut heap_top = PAGE_NEW_SUPREMUM_END;
    let mut origins = Vec::new();

    for (i, (name, id)) in rows.iter().enumerate() {
        let name_bytes = name.as_bytes();
        let origin = heap_top + 1 + 1 + REC_N_NEW_EXTRA_BYTES;
        page[origin - REC_N_NEW_EXTRA_BYTES - 2] = name_bytes.len() as u8;
        page[origin - REC_N_NEW_EXTRA_BYTES - 1] = 0;

        rec_set_heap_no(page, origin, (PAGE_HEAP_NO_USER_LOW + i) as u16);
        rec_set_status(page, origin, REC_STATUS_ORDINARY);

        page[origin..origin + name_bytes.len()].copy_from_slice(name_bytes);
        let id_off = origin + name_bytes.len();
        codec::write_be_int_flipped(&mut page[id_off..id_off + 4], *id as i64);

        origins.push(origin);
        heap_top = id_off + 4;
    }

    let mut prev = PAGE_NEW_INFIMUM;
    for &origin in &origins {
        rec_set_next_offs(page, prev, origin);
        prev = origin;
    }
    rec_set_next_offs(page, prev, PAGE_NEW_SUPREMUM);
    rec_set_next_offs(page, PAGE_NEW_SUPREMUM, 0);

    codec::write_u16(page, PAGE_HEADER + PAGE_N_RECS, rows.len() as u16);
    codec::write_u16(page, PAGE_HEADER + PAGE_HEAP_TOP, heap_top as u16);
    codec::write_u16(
        page,
        PAGE_HEADER + PAGE_N_HEAP,
        0x8000 | (PAGE_HEAP_NO_USER_LOW + rows.len()) as u16,
    );
}

/// An old-format BLOB chain page at `physical` size.
pub fn build_blob_page(
    physical: usize,
    page_no: u32,
    payload: &[u8],
    next_page: u32,
) -> Vec<u8> {
    let mut page = vec![0u8; physical];
    codec::write_u32(&mut page, FIL_PAGE_OFFSET, page_no);
    codec::write_u32(&mut page, FIL_PAGE_PREV, FIL_NULL);
    codec::write_u32(&mut page, FIL_PAGE_NEXT, FIL_NULL);
    codec::write_u16(&mut page, FIL_PAGE_TYPE, PageType::Blob.as_u16());
    codec::write_u32(&mut page, FIL_PAGE_SPACE_ID, SPACE_ID);

    codec::write_u32(&mut page, FIL_PAGE_DATA + LOB_HDR_PART_LEN, payload.len() as u32);
    codec::write_u32(&mut page, FIL_PAGE_DATA + LOB_HDR_NEXT_PAGE_NO, next_page);
    let start = FIL_PAGE_DATA + LOB_HDR_SIZE;
    page[start..start + payload.len()].copy_from_slice(payload);
    page
}

/// A 20-byte external reference.
pub fn extern_ref(page_no: u32, total_len: u64) -> [u8; FIELD_REF_SIZE] {
    let mut reference = [0u8; FIELD_REF_SIZE];
    codec::write_u32(&mut reference, BTR_EXTERN_SPACE_ID, SPACE_ID);
    codec::write_u32(&mut reference, BTR_EXTERN_PAGE_NO, page_no);
    codec::write_u32(&mut reference, BTR_EXTERN_OFFSET, FIL_PAGE_DATA as u32);
    codec::write_u64(&mut reference, BTR_EXTERN_LEN, total_len);
    reference
}

/// A generic filler page (type ALLOCATED) at `physical` size.
pub fn build_filler_page(physical: usize, page_no: u32) -> Vec<u8> {
    let mut page = vec![0u8; physical];
    codec::write_u32(&mut page, FIL_PAGE_OFFSET, page_no);
    page
}

/// An SDI_BLOB page placeholder (rebuild collects these into its pool).
pub fn build_sdi_blob_page(physical: usize, page_no: u32) -> Vec<u8> {
    let mut page = vec![0u8; physical];
    codec::write_u32(&mut page, FIL_PAGE_OFFSET, page_no);
    codec::write_u16(&mut page, FIL_PAGE_TYPE, PageType::SdiBlob.as_u16());
    page
}

/// Compress a logical page into a physical block (fixture dual of the
/// decompressor).
pub fn compress(logical_page: &[u8], page_size: PageSize) -> Vec<u8> {
    compress_page(logical_page, page_size).expect("fixture page must compress")
}

/// Write pages back to back into a temp file.
pub fn write_tablespace_file(pages: &[Vec<u8>]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().unwrap();
    for page in pages {
        tmp.write_all(page).unwrap();
    }
    tmp.flush().unwrap();
    tmp
}

/// The sample schema: `test/t1 (id INT NOT NULL PK, name VARCHAR(32) NULL)`
/// with PRIMARY (id 42, root 4) and BY_NAME (id 43, root 5).
pub fn sample_schema_json() -> String {
    schema_json_with_ids(42, 43)
}

/// Same shape with different index ids (remap fixtures).
pub fn schema_json_with_ids(primary_id: u64, secondary_id: u64) -> String {
    format!(
        r#"[
  "ibd2sdi",
  {{
    "type": 1,
    "id": 330,
    "object": {{
      "mysqld_version_id": 80029,
      "dd_object_type": "Table",
      "dd_object": {{
        "name": "t1",
        "schema_ref": "test",
        "options": "avg_row_length=0;key_block_size=8;",
        "se_private_data": "autoinc=0;version=0;",
        "row_format": 2,
        "collation_id": 8,
        "columns": [
          {{"name": "id", "type": 4, "is_nullable": false, "is_unsigned": false,
           "is_virtual": false, "hidden": 1, "ordinal_position": 1,
           "char_length": 11, "numeric_precision": 10, "numeric_scale": 0,
           "datetime_precision": 0, "collation_id": 8,
           "column_type_utf8": "int", "se_private_data": "table_id=1199;", "elements": []}},
          {{"name": "name", "type": 16, "is_nullable": true, "is_unsigned": false,
           "is_virtual": false, "hidden": 1, "ordinal_position": 2,
           "char_length": 32, "numeric_precision": 0, "numeric_scale": 0,
           "datetime_precision": 0, "collation_id": 8,
           "column_type_utf8": "varchar(32)", "se_private_data": "table_id=1199;", "elements": []}},
          {{"name": "DB_TRX_ID", "type": 10, "is_nullable": false, "is_unsigned": false,
           "is_virtual": false, "hidden": 2, "ordinal_position": 3,
           "char_length": 6, "collation_id": 63, "column_type_utf8": "", "elements": []}},
          {{"name": "DB_ROLL_PTR", "type": 9, "is_nullable": false, "is_unsigned": false,
           "is_virtual": false, "hidden": 2, "ordinal_position": 4,
           "char_length": 7, "collation_id": 63, "column_type_utf8": "", "elements": []}}
        ],
        "indexes": [
          {{"name": "PRIMARY", "type": 1, "hidden": false, "options": "flags=0;",
           "se_private_data": "id={primary_id};root=4;space_id=23;table_id=1199;trx_id=2569;",
           "elements": [
             {{"ordinal_position": 1, "length": 4, "order": 2, "hidden": false, "column_opx": 0}},
             {{"ordinal_position": 2, "length": 4294967295, "order": 2, "hidden": true, "column_opx": 2}},
             {{"ordinal_position": 3, "length": 4294967295, "order": 2, "hidden": true, "column_opx": 3}},
             {{"ordinal_position": 4, "length": 4294967295, "order": 2, "hidden": true, "column_opx": 1}}
           ]}},
          {{"name": "BY_NAME", "type": 3, "hidden": false, "options": "flags=0;",
           "se_private_data": "id={secondary_id};root=5;space_id=23;table_id=1199;trx_id=2569;",
           "elements": [
             {{"ordinal_position": 1, "length": 4294967295, "order": 2, "hidden": false, "column_opx": 1}},
             {{"ordinal_position": 2, "length": 4294967295, "order": 2, "hidden": true, "column_opx": 0}}
           ]}}
        ]
      }}
    }}
  }},
  {{
    "type": 2,
    "id": 6,
    "object": {{
      "mysqld_version_id": 80029,
      "dd_object_type": "Tablespace",
      "dd_object": {{
        "name": "test/t1",
        "options": "encryption=N;",
        "se_private_data": "flags=16417;id=23;server_version=80029;space_version=1;",
        "files": [{{"ordinal_position": 1, "filename": "./test/t1.ibd"}}]
      }}
    }}
  }}
]"#
    )
}

/// A schema JSON written to a temp file.
pub fn write_schema_file(json: &str) -> NamedTempFile {
    let tmp = NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), json).unwrap();
    tmp
}

// ---------------------------------------------------------------------------
// Keyring / encryption fixtures
// ---------------------------------------------------------------------------

const OBFUSCATE_KEY: &[u8] = b"*305=Ljt0*!@$Hnm(*-9-w;:";

fn obfuscate(data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= OBFUSCATE_KEY[i % OBFUSCATE_KEY.len()];
    }
}

/// A `keyring_file` image holding `INNODBKey-{uuid}-{key_id}`.
pub fn build_keyring_file(uuid: &str, key_id: u32, master_key: &[u8; 32]) -> NamedTempFile {
    use sha2::{Digest, Sha256};

    let full_id = format!("INNODBKey-{}-{}", uuid, key_id);
    let mut obfuscated = master_key.to_vec();
    obfuscate(&mut obfuscated);

    let pod_size = 40 + full_id.len() + 3 + 32;
    let mut data = Vec::new();
    data.extend_from_slice(&(pod_size as u64).to_le_bytes());
    data.extend_from_slice(&(full_id.len() as u64).to_le_bytes());
    data.extend_from_slice(&3u64.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.extend_from_slice(&32u64.to_le_bytes());
    data.extend_from_slice(full_id.as_bytes());
    data.extend_from_slice(b"AES");
    data.extend_from_slice(&obfuscated);

    let digest = Sha256::digest(&data);
    data.extend_from_slice(&digest);

    let tmp = NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), &data).unwrap();
    tmp
}

/// Install the wrapped key+IV blob into page 0 at the flags-derived offset.
pub fn install_encryption_info(
    page0: &mut [u8],
    flags: u32,
    master_key: &[u8; 32],
    key: &[u8; 32],
    iv: &[u8; 32],
    master_key_id: u32,
    uuid: &str,
) {
    use aes::cipher::block_padding::NoPadding;
    use aes::cipher::{BlockEncryptMut, KeyInit};

    let mut plain = [0u8; 64];
    plain[..32].copy_from_slice(key);
    plain[32..].copy_from_slice(iv);
    let crc = crc32c::crc32c(&plain);

    let mut wrapped = plain;
    let encryptor = ecb::Encryptor::<aes::Aes256>::new_from_slice(master_key).unwrap();
    encryptor
        .encrypt_padded_mut::<NoPadding>(&mut wrapped, 64)
        .unwrap();

    let offset = ibx::innodb::page::FspFlags(flags).encryption_offset();
    let blob = &mut page0[offset..];
    blob[..3].copy_from_slice(b"lCC");
    codec::write_u32(blob, 3, master_key_id);
    let uuid_bytes = uuid.as_bytes();
    blob[7..7 + uuid_bytes.len().min(36)].copy_from_slice(&uuid_bytes[..uuid_bytes.len().min(36)]);
    blob[43..43 + 64].copy_from_slice(&wrapped);
    codec::write_u32(blob, 107, crc);
}

/// AES-256-CBC encrypt a page body the way the engine does (type 15 marker,
/// original type saved at byte 26).
pub fn encrypt_page(page: &mut [u8], physical: usize, key: &[u8; 32], iv: &[u8; 32]) {
    use aes::cipher::block_padding::NoPadding;
    use aes::cipher::{BlockEncryptMut, KeyIvInit};

    let original_type = codec::read_u16(page, FIL_PAGE_TYPE);
    codec::write_u16(page, FIL_PAGE_ORIGINAL_TYPE_V1, original_type);

    let start = SIZE_FIL_HEAD;
    let end = physical - SIZE_FIL_TRAILER;
    let main_len = ((end - start) / AES_BLOCK_SIZE) * AES_BLOCK_SIZE;

    let cbc_iv: [u8; 16] = iv[..16].try_into().unwrap();
    let encryptor = cbc::Encryptor::<aes::Aes256>::new_from_slices(key, &cbc_iv).unwrap();
    encryptor
        .encrypt_padded_mut::<NoPadding>(&mut page[start..start + main_len], main_len)
        .unwrap();

    codec::write_u16(page, FIL_PAGE_TYPE, PageType::Encrypted.as_u16());
}

/// Variant schema whose `name` column is VARCHAR(1000): large enough that
/// the two-byte length / external-storage encoding applies.
pub fn lob_schema_json() -> String {
    sample_schema_json()
        .replace("\"char_length\": 32", "\"char_length\": 1000")
        .replace("varchar(32)", "varchar(1000)")
}
