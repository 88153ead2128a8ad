//! `.cfg` sidecar generation (format v7).
//!
//! The engine's tablespace-import path consumes a binary descriptor next to
//! the `.ibd`: big-endian throughout, strings as `(u32 len_incl_nul, bytes)`.
//! Building one from the schema JSON requires reproducing the dictionary's
//! column typing (`mtype`/`prtype`/`len`/`mbminmaxlen`), table flags, instant
//! add/drop bookkeeping, and per-index field geometry.

use std::io::Write;

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::page::FspFlags;
use crate::innodb::schema::{
    charset_max_bytes, collation_is_latin1, decimal_storage_bytes, parse_kv_string, DdColumn,
    Schema,
};
use crate::IbxError;

pub const IB_EXPORT_CFG_VERSION_V7: u32 = 7;

// dd::enum_column_types codes
pub const DD_COL_DECIMAL: u64 = 1;
pub const DD_COL_TINY: u64 = 2;
pub const DD_COL_SHORT: u64 = 3;
pub const DD_COL_LONG: u64 = 4;
pub const DD_COL_FLOAT: u64 = 5;
pub const DD_COL_DOUBLE: u64 = 6;
pub const DD_COL_TYPE_NULL: u64 = 7;
pub const DD_COL_TIMESTAMP: u64 = 8;
pub const DD_COL_LONGLONG: u64 = 9;
pub const DD_COL_INT24: u64 = 10;
pub const DD_COL_DATE: u64 = 11;
pub const DD_COL_TIME: u64 = 12;
pub const DD_COL_DATETIME: u64 = 13;
pub const DD_COL_YEAR: u64 = 14;
pub const DD_COL_NEWDATE: u64 = 15;
pub const DD_COL_VARCHAR: u64 = 16;
pub const DD_COL_BIT: u64 = 17;
pub const DD_COL_TIMESTAMP2: u64 = 18;
pub const DD_COL_DATETIME2: u64 = 19;
pub const DD_COL_TIME2: u64 = 20;
pub const DD_COL_NEWDECIMAL: u64 = 21;
pub const DD_COL_ENUM: u64 = 22;
pub const DD_COL_SET: u64 = 23;
pub const DD_COL_TINY_BLOB: u64 = 24;
pub const DD_COL_MEDIUM_BLOB: u64 = 25;
pub const DD_COL_LONG_BLOB: u64 = 26;
pub const DD_COL_BLOB: u64 = 27;
pub const DD_COL_VAR_STRING: u64 = 28;
pub const DD_COL_STRING: u64 = 29;
pub const DD_COL_GEOMETRY: u64 = 30;
pub const DD_COL_JSON: u64 = 31;

// enum_field_types (MYSQL_TYPE_*) codes
const MYSQL_TYPE_DECIMAL: u32 = 0;
const MYSQL_TYPE_TINY: u32 = 1;
const MYSQL_TYPE_SHORT: u32 = 2;
const MYSQL_TYPE_LONG: u32 = 3;
const MYSQL_TYPE_FLOAT: u32 = 4;
const MYSQL_TYPE_DOUBLE: u32 = 5;
const MYSQL_TYPE_NULL: u32 = 6;
const MYSQL_TYPE_TIMESTAMP: u32 = 7;
const MYSQL_TYPE_LONGLONG: u32 = 8;
const MYSQL_TYPE_INT24: u32 = 9;
const MYSQL_TYPE_DATE: u32 = 10;
const MYSQL_TYPE_TIME: u32 = 11;
const MYSQL_TYPE_DATETIME: u32 = 12;
const MYSQL_TYPE_YEAR: u32 = 13;
const MYSQL_TYPE_NEWDATE: u32 = 14;
const MYSQL_TYPE_VARCHAR: u32 = 15;
const MYSQL_TYPE_BIT: u32 = 16;
const MYSQL_TYPE_TIMESTAMP2: u32 = 17;
const MYSQL_TYPE_DATETIME2: u32 = 18;
const MYSQL_TYPE_TIME2: u32 = 19;
const MYSQL_TYPE_JSON: u32 = 245;
const MYSQL_TYPE_NEWDECIMAL: u32 = 246;
const MYSQL_TYPE_ENUM: u32 = 247;
const MYSQL_TYPE_SET: u32 = 248;
const MYSQL_TYPE_TINY_BLOB: u32 = 249;
const MYSQL_TYPE_MEDIUM_BLOB: u32 = 250;
const MYSQL_TYPE_LONG_BLOB: u32 = 251;
const MYSQL_TYPE_BLOB: u32 = 252;
const MYSQL_TYPE_VAR_STRING: u32 = 253;
const MYSQL_TYPE_STRING: u32 = 254;
const MYSQL_TYPE_GEOMETRY: u32 = 255;

// Main types (dtype mtype codes)
pub const DATA_VARCHAR: u32 = 1;
pub const DATA_CHAR: u32 = 2;
pub const DATA_FIXBINARY: u32 = 3;
pub const DATA_BINARY: u32 = 4;
pub const DATA_BLOB: u32 = 5;
pub const DATA_INT: u32 = 6;
pub const DATA_SYS: u32 = 8;
pub const DATA_GEOMETRY_MTYPE: u32 = 14;
pub const DATA_VARMYSQL: u32 = 12;
pub const DATA_MYSQL: u32 = 13;

// prtype flags
pub const DATA_ROW_ID: u32 = 0;
pub const DATA_TRX_ID: u32 = 1;
pub const DATA_ROLL_PTR: u32 = 2;
pub const DATA_NOT_NULL: u32 = 256;
pub const DATA_UNSIGNED: u32 = 512;
pub const DATA_BINARY_TYPE: u32 = 1024;
pub const DATA_LONG_TRUE_VARCHAR: u32 = 4096;

// dict_index_t type bits
pub const DICT_CLUSTERED: u32 = 1;
pub const DICT_UNIQUE: u32 = 2;
pub const DICT_FTS: u32 = 32;
pub const DICT_SPATIAL: u32 = 64;
pub const DICT_SDI: u32 = 256;

pub const DICT_MAX_FIXED_COL_LEN: u32 = 768;
const MAX_TIME_WIDTH: u32 = 10;
const MAX_DATETIME_WIDTH: u32 = 19;
const PORTABLE_SIZEOF_CHAR_PTR: u32 = 8;
const DATA_MBMAX: u32 = 8;
const BINARY_COLLATION: u64 = 63;

pub const UINT8_UNDEFINED: u8 = 0xFF;
pub const UINT32_UNDEFINED: u32 = 0xFFFF_FFFF;

fn dd_to_mysql_type(dd_type: u64) -> u32 {
    match dd_type {
        DD_COL_DECIMAL => MYSQL_TYPE_DECIMAL,
        DD_COL_TINY => MYSQL_TYPE_TINY,
        DD_COL_SHORT => MYSQL_TYPE_SHORT,
        DD_COL_LONG => MYSQL_TYPE_LONG,
        DD_COL_FLOAT => MYSQL_TYPE_FLOAT,
        DD_COL_DOUBLE => MYSQL_TYPE_DOUBLE,
        DD_COL_TYPE_NULL => MYSQL_TYPE_NULL,
        DD_COL_TIMESTAMP => MYSQL_TYPE_TIMESTAMP,
        DD_COL_LONGLONG => MYSQL_TYPE_LONGLONG,
        DD_COL_INT24 => MYSQL_TYPE_INT24,
        DD_COL_DATE => MYSQL_TYPE_DATE,
        DD_COL_TIME => MYSQL_TYPE_TIME,
        DD_COL_DATETIME => MYSQL_TYPE_DATETIME,
        DD_COL_YEAR => MYSQL_TYPE_YEAR,
        DD_COL_NEWDATE => MYSQL_TYPE_NEWDATE,
        DD_COL_VARCHAR => MYSQL_TYPE_VARCHAR,
        DD_COL_BIT => MYSQL_TYPE_BIT,
        DD_COL_TIMESTAMP2 => MYSQL_TYPE_TIMESTAMP2,
        DD_COL_DATETIME2 => MYSQL_TYPE_DATETIME2,
        DD_COL_TIME2 => MYSQL_TYPE_TIME2,
        DD_COL_NEWDECIMAL => MYSQL_TYPE_NEWDECIMAL,
        DD_COL_ENUM => MYSQL_TYPE_ENUM,
        DD_COL_SET => MYSQL_TYPE_SET,
        DD_COL_TINY_BLOB => MYSQL_TYPE_TINY_BLOB,
        DD_COL_MEDIUM_BLOB => MYSQL_TYPE_MEDIUM_BLOB,
        DD_COL_LONG_BLOB => MYSQL_TYPE_LONG_BLOB,
        DD_COL_BLOB => MYSQL_TYPE_BLOB,
        DD_COL_VAR_STRING => MYSQL_TYPE_VAR_STRING,
        DD_COL_STRING => MYSQL_TYPE_STRING,
        DD_COL_GEOMETRY => MYSQL_TYPE_GEOMETRY,
        DD_COL_JSON => MYSQL_TYPE_JSON,
        _ => MYSQL_TYPE_LONG,
    }
}

fn time_binary_length(dec: u32) -> u32 {
    3 + (dec + 1) / 2
}

fn datetime_binary_length(dec: u32) -> u32 {
    5 + (dec + 1) / 2
}

fn timestamp_binary_length(dec: u32) -> u32 {
    4 + (dec + 1) / 2
}

fn enum_pack_length(elements: u32) -> u32 {
    if elements < 256 {
        1
    } else {
        2
    }
}

fn set_pack_length(elements: u32) -> u32 {
    let len = (elements + 7) / 8;
    if len > 4 {
        8
    } else {
        len
    }
}

fn calc_pack_length(mysql_type: u32, length: u32) -> u32 {
    match mysql_type {
        MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING | MYSQL_TYPE_DECIMAL => length,
        MYSQL_TYPE_VARCHAR => length + if length < 256 { 1 } else { 2 },
        MYSQL_TYPE_YEAR | MYSQL_TYPE_TINY => 1,
        MYSQL_TYPE_SHORT => 2,
        MYSQL_TYPE_INT24 | MYSQL_TYPE_NEWDATE | MYSQL_TYPE_TIME => 3,
        MYSQL_TYPE_TIME2 => {
            if length > MAX_TIME_WIDTH {
                time_binary_length(length - MAX_TIME_WIDTH - 1)
            } else {
                3
            }
        }
        MYSQL_TYPE_TIMESTAMP => 4,
        MYSQL_TYPE_TIMESTAMP2 => {
            if length > MAX_DATETIME_WIDTH {
                timestamp_binary_length(length - MAX_DATETIME_WIDTH - 1)
            } else {
                4
            }
        }
        MYSQL_TYPE_DATE | MYSQL_TYPE_LONG => 4,
        MYSQL_TYPE_FLOAT => 4,
        MYSQL_TYPE_DOUBLE => 8,
        MYSQL_TYPE_DATETIME => 8,
        MYSQL_TYPE_DATETIME2 => {
            if length > MAX_DATETIME_WIDTH {
                datetime_binary_length(length - MAX_DATETIME_WIDTH - 1)
            } else {
                5
            }
        }
        MYSQL_TYPE_LONGLONG => 8,
        MYSQL_TYPE_NULL => 0,
        MYSQL_TYPE_TINY_BLOB => 1 + PORTABLE_SIZEOF_CHAR_PTR,
        MYSQL_TYPE_BLOB => 2 + PORTABLE_SIZEOF_CHAR_PTR,
        MYSQL_TYPE_MEDIUM_BLOB => 3 + PORTABLE_SIZEOF_CHAR_PTR,
        MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_GEOMETRY | MYSQL_TYPE_JSON => {
            4 + PORTABLE_SIZEOF_CHAR_PTR
        }
        MYSQL_TYPE_BIT => length / 8,
        _ => 0,
    }
}

fn decimal_length_to_precision(length: u32, scale: u32, unsigned: bool) -> u32 {
    let mut precision = length;
    if scale > 0 {
        precision = precision.saturating_sub(1);
    }
    if !unsigned && length > 0 {
        precision = precision.saturating_sub(1);
    }
    precision.min(65)
}

fn calc_key_length(
    mysql_type: u32,
    length: u32,
    decimals: u32,
    unsigned: bool,
    elements: u32,
) -> u32 {
    match mysql_type {
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB
        | MYSQL_TYPE_BLOB | MYSQL_TYPE_GEOMETRY | MYSQL_TYPE_JSON => 0,
        MYSQL_TYPE_VARCHAR => length,
        MYSQL_TYPE_ENUM => enum_pack_length(elements),
        MYSQL_TYPE_SET => set_pack_length(elements),
        MYSQL_TYPE_BIT => length / 8 + u32::from(length % 8 != 0),
        MYSQL_TYPE_NEWDECIMAL => {
            let precision = decimal_length_to_precision(length, decimals, unsigned);
            decimal_storage_bytes(precision, decimals)
        }
        _ => calc_pack_length(mysql_type, length),
    }
}

fn calc_pack_length_dd(
    dd_type: u64,
    char_length: u32,
    elements_count: u32,
    numeric_scale: u32,
    is_unsigned: bool,
) -> u32 {
    match dd_type {
        DD_COL_ENUM => enum_pack_length(elements_count),
        DD_COL_SET => set_pack_length(elements_count),
        // treat_bit_as_char: round up to whole bytes
        DD_COL_BIT => ((char_length + 7) & !7) / 8,
        DD_COL_NEWDECIMAL => {
            let precision = decimal_length_to_precision(char_length, numeric_scale, is_unsigned);
            decimal_storage_bytes(precision, numeric_scale)
        }
        _ => calc_pack_length(dd_to_mysql_type(dd_type), char_length),
    }
}

/// Engine typing of one column as the cfg records it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnTypeInfo {
    pub mtype: u32,
    pub prtype: u32,
    pub len: u32,
    pub mbminmaxlen: u32,
}

fn mbminmaxlen(collation_id: u64) -> u32 {
    let maxlen = charset_max_bytes(collation_id) as u32;
    DATA_MBMAX + maxlen // mbminlen is 1 for every charset handled here
}

fn is_string_mtype(mtype: u32) -> bool {
    matches!(
        mtype,
        DATA_VARCHAR | DATA_CHAR | DATA_BINARY | DATA_BLOB | DATA_VARMYSQL | DATA_MYSQL
            | DATA_FIXBINARY
    )
}

/// Port of the dictionary's dd-type to InnoDB-type mapping. Returns the
/// mtype plus the prtype flag bits contributed by the type/charset.
fn innobase_type_from_dd(col: &DdColumn) -> (u32, u32, u64) {
    let charset_binary = col.collation_id == BINARY_COLLATION || col.collation_id == 0;
    let mut unsigned_flag = 0u32;
    let mut binary_type = DATA_BINARY_TYPE;
    let mut charset_no = 0u64;

    let mtype = match col.dd_type {
        DD_COL_ENUM | DD_COL_SET => {
            unsigned_flag = DATA_UNSIGNED;
            if !charset_binary {
                binary_type = 0;
            }
            DATA_INT
        }
        DD_COL_VAR_STRING | DD_COL_VARCHAR => {
            charset_no = col.collation_id;
            if charset_binary {
                DATA_BINARY
            } else {
                binary_type = 0;
                if collation_is_latin1(col.collation_id) {
                    DATA_VARCHAR
                } else {
                    DATA_VARMYSQL
                }
            }
        }
        DD_COL_BIT => {
            unsigned_flag = DATA_UNSIGNED;
            charset_no = BINARY_COLLATION;
            DATA_FIXBINARY
        }
        DD_COL_STRING => {
            charset_no = col.collation_id;
            if charset_binary {
                DATA_FIXBINARY
            } else {
                binary_type = 0;
                if collation_is_latin1(col.collation_id) {
                    DATA_CHAR
                } else {
                    DATA_MYSQL
                }
            }
        }
        DD_COL_DECIMAL | DD_COL_FLOAT | DD_COL_DOUBLE | DD_COL_NEWDECIMAL | DD_COL_LONG
        | DD_COL_LONGLONG | DD_COL_TINY | DD_COL_SHORT | DD_COL_INT24 => {
            if col.is_unsigned {
                unsigned_flag = DATA_UNSIGNED;
            }
            if col.dd_type == DD_COL_NEWDECIMAL {
                charset_no = BINARY_COLLATION;
                DATA_FIXBINARY
            } else {
                DATA_INT
            }
        }
        DD_COL_DATE | DD_COL_NEWDATE | DD_COL_TIME | DD_COL_DATETIME => DATA_INT,
        DD_COL_YEAR | DD_COL_TIMESTAMP => {
            unsigned_flag = DATA_UNSIGNED;
            DATA_INT
        }
        DD_COL_TIME2 | DD_COL_DATETIME2 | DD_COL_TIMESTAMP2 => {
            charset_no = BINARY_COLLATION;
            DATA_FIXBINARY
        }
        DD_COL_GEOMETRY => DATA_GEOMETRY_MTYPE,
        DD_COL_TINY_BLOB | DD_COL_MEDIUM_BLOB | DD_COL_BLOB | DD_COL_LONG_BLOB => {
            charset_no = col.collation_id;
            if !charset_binary {
                binary_type = 0;
            }
            DATA_BLOB
        }
        DD_COL_JSON => {
            charset_no = 46; // utf8mb4_bin
            DATA_BLOB
        }
        _ => DATA_INT,
    };

    (mtype, unsigned_flag | binary_type, charset_no)
}

/// Build the cfg typing of one dictionary column.
pub fn build_column_type_info(col: &DdColumn) -> ColumnTypeInfo {
    let (mtype, type_flags, charset_no) = innobase_type_from_dd(col);

    let mut len = calc_pack_length_dd(
        col.dd_type,
        col.char_length,
        col.elements.len() as u32,
        col.numeric_scale,
        col.is_unsigned,
    );

    let mut long_true_varchar = 0;
    if col.dd_type == DD_COL_VARCHAR {
        let length_bytes = if col.char_length > 255 { 2 } else { 1 };
        len = len.saturating_sub(length_bytes);
        if length_bytes == 2 {
            long_true_varchar = DATA_LONG_TRUE_VARCHAR;
        }
    }

    let nulls_allowed = if col.is_nullable { 0 } else { DATA_NOT_NULL };
    let prtype = (dd_to_mysql_type(col.dd_type) | type_flags | nulls_allowed | long_true_varchar)
        | ((charset_no as u32) << 16);

    ColumnTypeInfo {
        mtype,
        prtype,
        len,
        mbminmaxlen: if is_string_mtype(mtype) {
            mbminmaxlen(col.collation_id)
        } else {
            0
        },
    }
}

/// Fixed on-disk size of a column inside an index record, 0 when variable.
fn dtype_fixed_size(info: &ColumnTypeInfo, comp: bool) -> u32 {
    match info.mtype {
        DATA_SYS | DATA_CHAR | DATA_FIXBINARY | DATA_INT => info.len,
        DATA_MYSQL => {
            // Multi-byte CHAR is variable in compact format.
            let mbmin = info.mbminmaxlen / DATA_MBMAX;
            let mbmax = info.mbminmaxlen % DATA_MBMAX;
            if comp && mbmin != mbmax {
                0
            } else {
                info.len
            }
        }
        _ => 0,
    }
}

fn calc_fixed_len(info: &ColumnTypeInfo, comp: bool, prefix_len: u32) -> u32 {
    let mut fixed_len = dtype_fixed_size(info, comp);
    if prefix_len != 0 && fixed_len > prefix_len {
        fixed_len = prefix_len;
    }
    if fixed_len > DICT_MAX_FIXED_COL_LEN {
        fixed_len = 0;
    }
    fixed_len
}

fn calc_prefix_len(col: &DdColumn, elem_length: u32) -> u32 {
    if elem_length == u32::MAX {
        return 0;
    }
    let mysql_type = dd_to_mysql_type(col.dd_type);
    let full_len = calc_key_length(
        mysql_type,
        col.char_length,
        col.numeric_scale,
        col.is_unsigned,
        col.elements.len() as u32,
    );
    if full_len != 0 && elem_length >= full_len {
        return 0;
    }
    elem_length
}

// ---------------------------------------------------------------------------
// Cfg model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CfgColumn {
    pub name: String,
    pub dd_type: u64,
    pub prtype: u32,
    pub mtype: u32,
    pub len: u32,
    pub mbminmaxlen: u32,
    pub ind: u32,
    pub ord_part: u32,
    pub max_prefix: u32,
    pub char_length: u32,
    pub numeric_scale: u32,
    pub collation_id: u64,
    pub is_nullable: bool,
    pub is_unsigned: bool,
    pub is_instant_dropped: bool,
    pub version_added: u8,
    pub version_dropped: u8,
    pub phy_pos: u32,
    pub has_instant_default: bool,
    pub instant_default_null: bool,
    pub instant_default_value: Vec<u8>,
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CfgIndexField {
    pub name: String,
    pub prefix_len: u32,
    pub fixed_len: u32,
    pub is_ascending: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CfgIndex {
    pub name: String,
    pub id: u64,
    pub space: u32,
    pub page: u32,
    pub index_type: u32,
    pub trx_id_offset: u32,
    pub n_user_defined_cols: u32,
    pub n_uniq: u32,
    pub n_nullable: u32,
    pub n_fields: u32,
    pub fields: Vec<CfgIndexField>,
}

#[derive(Debug, Clone, Default)]
pub struct CfgTable {
    pub name: String,
    pub autoinc: u64,
    pub page_size: u32,
    pub table_flags: u32,
    pub space_flags: u32,
    pub n_instant_nullable: u32,
    pub initial_col_count: u32,
    pub current_col_count: u32,
    pub total_col_count: u32,
    pub n_instant_drop_cols: u32,
    pub current_row_version: u32,
    pub compression_type: u8,
    pub has_row_versions: bool,
    pub is_comp: bool,
    pub columns: Vec<CfgColumn>,
    pub indexes: Vec<CfgIndex>,
}

fn is_system_column_name(name: &str) -> bool {
    name.starts_with("DB_ROW_ID") || name.starts_with("DB_TRX_ID") || name.starts_with("DB_ROLL_PTR")
}

/// `dict_tf_init`: COMPACT bit 0, zip shift bits 1-4, atomic-blobs bit 5,
/// data-directory bit 6, shared-space bit 7.
fn dict_tf_init(
    compact: bool,
    zip_ssize: u32,
    atomic_blobs: bool,
    data_dir: bool,
    shared_space: bool,
) -> u32 {
    u32::from(compact)
        | (zip_ssize << 1)
        | (u32::from(atomic_blobs) << 5)
        | (u32::from(data_dir) << 6)
        | (u32::from(shared_space) << 7)
}

fn parse_row_version(kv: &std::collections::HashMap<String, String>, key: &str) -> u8 {
    kv.get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|&v| v <= u8::MAX as u32)
        .map(|v| v as u8)
        .unwrap_or(UINT8_UNDEFINED)
}

/// The dictionary's instant-default coder maps each nibble to 'a'..'p'.
fn decode_instant_default_value(encoded: &str) -> Option<Vec<u8>> {
    let bytes = encoded.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        let hi = pair[0].checked_sub(b'a')?;
        let lo = pair[1].checked_sub(b'a')?;
        if hi > 15 || lo > 15 {
            return None;
        }
        out.push((hi << 4) | lo);
    }
    Some(out)
}

/// Build the full cfg model from a loaded schema plus the rebuilt file's
/// space flags, SDI root, and space id.
pub fn build_cfg_table(
    schema: &Schema,
    space_flags: FspFlags,
    sdi_root_page: u32,
    space_id: u32,
) -> Result<CfgTable, IbxError> {
    let mut cfg = CfgTable {
        name: schema.full_name(),
        space_flags: space_flags.raw(),
        page_size: UNIV_PAGE_SIZE_ORIG as u32,
        ..Default::default()
    };

    let table_kv = schema.table_private();
    let space_kv = parse_kv_string(
        schema
            .tablespace
            .as_ref()
            .map(|t| t.se_private_data.as_str())
            .unwrap_or(""),
    );
    let options_kv = parse_kv_string(&schema.table.options);

    cfg.autoinc = table_kv
        .get("autoinc")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let data_dir = table_kv.contains_key("data_directory");
    let shared_space = schema
        .tablespace
        .as_ref()
        .map(|t| !t.name.is_empty() && !t.name.contains('/'))
        .unwrap_or(false);

    let mut zip_ssize = space_flags.zip_ssize();
    if zip_ssize != 0 {
        if let Some(kb) = options_kv.get("key_block_size").and_then(|v| v.parse::<u32>().ok()) {
            if kb > 0 {
                let mut zip_size = kb * 1024;
                let mut shift = 0;
                while zip_size > 512 {
                    zip_size >>= 1;
                    shift += 1;
                }
                if shift > 0 {
                    zip_ssize = shift - 1;
                }
            }
        }
    }

    // dd::Table row formats: 1=FIXED 2=DYNAMIC 3=COMPRESSED 4=REDUNDANT 5=COMPACT
    let (compact, atomic_blobs) = match schema.table.row_format {
        4 => {
            zip_ssize = 0;
            (false, false)
        }
        5 => {
            zip_ssize = 0;
            (true, false)
        }
        3 => (true, true),
        _ => {
            zip_ssize = 0;
            (true, true)
        }
    };
    cfg.table_flags = dict_tf_init(compact, zip_ssize, atomic_blobs, data_dir, shared_space);
    cfg.is_comp = compact;

    if let Some(c) = options_kv.get("compress") {
        match c.to_lowercase().as_str() {
            "zlib" => cfg.compression_type = 1,
            "lz4" => cfg.compression_type = 2,
            _ => {}
        }
    }

    // Columns, keeping an opx -> cfg index map for later passes.
    let total_cols = schema.table.columns.len();
    let mut col_types = vec![ColumnTypeInfo::default(); total_cols];
    let mut col_dropped = vec![false; total_cols];
    let mut opx_to_col: Vec<i64> = vec![-1; total_cols];

    for (i, col) in schema.table.columns.iter().enumerate() {
        let mut type_info = build_column_type_info(col);

        let kv = parse_kv_string(&col.se_private_data);
        let v_added = parse_row_version(&kv, "version_added");
        let v_dropped = parse_row_version(&kv, "version_dropped");
        if v_dropped != UINT8_UNDEFINED && v_dropped > 0 {
            col_dropped[i] = true;
        }
        let phy_pos = kv
            .get("physical_pos")
            .and_then(|v| v.parse().ok())
            .unwrap_or(UINT32_UNDEFINED);

        if col.is_virtual {
            col_types[i] = type_info;
            continue;
        }

        let mut cfg_col = CfgColumn {
            name: col.name.clone(),
            dd_type: col.dd_type,
            char_length: col.char_length,
            numeric_scale: col.numeric_scale,
            collation_id: col.collation_id,
            is_nullable: col.is_nullable,
            is_unsigned: col.is_unsigned,
            version_added: v_added,
            version_dropped: v_dropped,
            is_instant_dropped: col_dropped[i],
            phy_pos,
            elements: col.elements.iter().map(|e| e.name.clone()).collect(),
            ..Default::default()
        };

        // System columns use DATA_SYS with the column identifier in prtype.
        match col.name.as_str() {
            "DB_TRX_ID" => {
                type_info = ColumnTypeInfo {
                    mtype: DATA_SYS,
                    prtype: DATA_TRX_ID | DATA_NOT_NULL,
                    len: DATA_TRX_ID_LEN as u32,
                    mbminmaxlen: 0,
                };
            }
            "DB_ROLL_PTR" => {
                type_info = ColumnTypeInfo {
                    mtype: DATA_SYS,
                    prtype: DATA_ROLL_PTR | DATA_NOT_NULL,
                    len: DATA_ROLL_PTR_LEN as u32,
                    mbminmaxlen: 0,
                };
            }
            _ => {}
        }
        col_types[i] = type_info;
        cfg_col.prtype = type_info.prtype;
        cfg_col.mtype = type_info.mtype;
        cfg_col.len = type_info.len;
        cfg_col.mbminmaxlen = type_info.mbminmaxlen;
        cfg_col.ind = cfg.columns.len() as u32;

        if phy_pos != UINT32_UNDEFINED {
            cfg.has_row_versions = true;
        }

        if kv.contains_key("default_null") {
            cfg_col.has_instant_default = true;
            cfg_col.instant_default_null = true;
        } else if let Some(encoded) = kv.get("default") {
            match decode_instant_default_value(encoded) {
                Some(value) => {
                    cfg_col.has_instant_default = true;
                    cfg_col.instant_default_value = value;
                }
                None => {
                    eprintln!(
                        "Warning: cannot decode instant default for column {}",
                        col.name
                    );
                }
            }
        }

        cfg.columns.push(cfg_col);
        opx_to_col[i] = cfg.columns.len() as i64 - 1;
    }

    // MySQL 8.0.29+ counts DB_ROW_ID even for tables with an explicit PK;
    // insert it before DB_TRX_ID when the dictionary lacks it.
    let has_row_id = cfg.columns.iter().any(|c| c.name == "DB_ROW_ID");
    if !has_row_id {
        let trx_pos = cfg
            .columns
            .iter()
            .position(|c| c.name == "DB_TRX_ID")
            .unwrap_or(cfg.columns.len());
        let row_id = CfgColumn {
            name: "DB_ROW_ID".into(),
            dd_type: DD_COL_LONG,
            prtype: DATA_ROW_ID | DATA_NOT_NULL,
            mtype: DATA_SYS,
            len: DATA_ROW_ID_LEN as u32,
            ind: trx_pos as u32,
            version_added: UINT8_UNDEFINED,
            version_dropped: UINT8_UNDEFINED,
            phy_pos: UINT32_UNDEFINED,
            ..Default::default()
        };
        cfg.columns.insert(trx_pos, row_id);
        for (i, col) in cfg.columns.iter_mut().enumerate().skip(trx_pos + 1) {
            col.ind = i as u32;
        }
        for idx in opx_to_col.iter_mut() {
            if *idx >= trx_pos as i64 {
                *idx += 1;
            }
        }
    }

    let space_id_val = space_kv
        .get("id")
        .and_then(|v| v.parse().ok())
        .unwrap_or(space_id);

    // Instant add/drop counters.
    let mut n_dropped = 0usize;
    let mut n_added = 0usize;
    let mut n_added_and_dropped = 0usize;
    let mut n_current = 0usize;
    let mut current_row_version = 0u32;
    for col in &schema.table.columns {
        if col.is_virtual || is_system_column_name(&col.name) {
            continue;
        }
        let kv = parse_kv_string(&col.se_private_data);
        let v_added = parse_row_version(&kv, "version_added");
        let v_dropped = parse_row_version(&kv, "version_dropped");
        if v_dropped != UINT8_UNDEFINED && v_dropped > 0 {
            n_dropped += 1;
            if v_added != UINT8_UNDEFINED && v_added > 0 {
                n_added_and_dropped += 1;
            }
            current_row_version = current_row_version.max(v_dropped as u32);
            continue;
        }
        if v_added != UINT8_UNDEFINED && v_added > 0 {
            n_added += 1;
            current_row_version = current_row_version.max(v_added as u32);
        }
        n_current += 1;
    }
    let n_orig_dropped = n_dropped - n_added_and_dropped;
    cfg.current_col_count = n_current as u32;
    cfg.initial_col_count = ((n_current - n_added) + n_orig_dropped) as u32;
    cfg.total_col_count = (n_current + n_dropped) as u32;
    cfg.n_instant_drop_cols = n_dropped as u32;
    cfg.current_row_version = current_row_version;

    if current_row_version > 0 {
        let mut nullable_before_instant = 0;
        for col in &schema.table.columns {
            if col.is_virtual || is_system_column_name(&col.name) {
                continue;
            }
            let kv = parse_kv_string(&col.se_private_data);
            let v_added = parse_row_version(&kv, "version_added");
            if (v_added == UINT8_UNDEFINED || v_added == 0) && col.is_nullable {
                nullable_before_instant += 1;
            }
        }
        cfg.n_instant_nullable = nullable_before_instant;
    }

    // Synthetic SDI index first when the space carries SDI.
    if space_flags.has_sdi() {
        let mut sdi_index = CfgIndex {
            name: "CLUST_IND_SDI".into(),
            id: SDI_INDEX_ID,
            space: space_id_val,
            page: sdi_root_page,
            index_type: DICT_CLUSTERED | DICT_UNIQUE | DICT_SDI,
            n_user_defined_cols: 2,
            n_uniq: 2,
            n_nullable: 0,
            trx_id_offset: 0,
            ..Default::default()
        };
        for (name, fixed_len) in [
            ("type", 4u32),
            ("id", 8),
            ("DB_TRX_ID", DATA_TRX_ID_LEN as u32),
            ("DB_ROLL_PTR", DATA_ROLL_PTR_LEN as u32),
            ("compressed_len", 4),
            ("uncompressed_len", 4),
            ("data", 0),
        ] {
            sdi_index.fields.push(CfgIndexField {
                name: name.into(),
                prefix_len: 0,
                fixed_len,
                is_ascending: 1,
            });
        }
        sdi_index.n_fields = sdi_index.fields.len() as u32;
        cfg.indexes.push(sdi_index);
    }

    for idx in &schema.table.indexes {
        let mut cfg_index = CfgIndex {
            name: idx.name.clone(),
            ..Default::default()
        };

        let (is_unique, is_fulltext);
        match idx.index_type {
            1 => {
                cfg_index.index_type = DICT_CLUSTERED | DICT_UNIQUE;
                is_unique = true;
                is_fulltext = false;
            }
            2 => {
                cfg_index.index_type = DICT_UNIQUE;
                is_unique = true;
                is_fulltext = false;
            }
            4 => {
                cfg_index.index_type = DICT_FTS;
                is_unique = false;
                is_fulltext = true;
            }
            5 => {
                cfg_index.index_type = DICT_SPATIAL;
                is_unique = false;
                is_fulltext = false;
            }
            _ => {
                cfg_index.index_type = 0;
                is_unique = false;
                is_fulltext = false;
            }
        }

        let idx_kv = parse_kv_string(&idx.se_private_data);
        cfg_index.id = idx_kv.get("id").and_then(|v| v.parse().ok()).unwrap_or(0);
        cfg_index.space = idx_kv
            .get("space_id")
            .and_then(|v| v.parse().ok())
            .unwrap_or(space_id_val);
        cfg_index.page = idx_kv.get("root").and_then(|v| v.parse().ok()).unwrap_or(0);

        for elem in &idx.elements {
            let opx = elem.column_opx as usize;
            let Some(col) = schema.table.columns.get(opx) else {
                continue;
            };
            let elem_length = if elem.length > u64::from(u32::MAX) {
                u32::MAX
            } else {
                elem.length as u32
            };
            let prefix_len = calc_prefix_len(col, elem_length);
            let field = CfgIndexField {
                name: col.name.clone(),
                prefix_len,
                fixed_len: calc_fixed_len(&col_types[opx], cfg.is_comp, prefix_len),
                is_ascending: u32::from(elem.order != 3),
            };
            cfg_index.fields.push(field);

            if !elem.hidden {
                cfg_index.n_user_defined_cols += 1;
            }
            if col.is_nullable && !col_dropped[opx] {
                cfg_index.n_nullable += 1;
            }
        }

        cfg_index.n_fields = cfg_index.fields.len() as u32;
        cfg_index.n_uniq = if is_fulltext {
            0
        } else if is_unique {
            cfg_index.n_user_defined_cols
        } else {
            cfg_index.n_fields
        };

        cfg.indexes.push(cfg_index);
    }

    // ord_part / max_prefix from the ordering columns of every index.
    let name_to_col: std::collections::HashMap<String, usize> = cfg
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.clone(), i))
        .collect();
    for index in &cfg.indexes {
        if index.name == "CLUST_IND_SDI" {
            continue;
        }
        let n_ord = index.n_uniq.min(index.fields.len() as u32);
        for field in index.fields.iter().take(n_ord as usize) {
            let Some(&ci) = name_to_col.get(&field.name) else {
                continue;
            };
            let col = &mut cfg.columns[ci];
            if col.ord_part == 0 {
                col.max_prefix = field.prefix_len;
                col.ord_part = 1;
            } else if field.prefix_len == 0 {
                col.max_prefix = 0;
            } else if col.max_prefix != 0 && field.prefix_len > col.max_prefix {
                col.max_prefix = field.prefix_len;
            }
        }
    }

    // Without instant history, assign physical positions: primary-key order
    // first, then the remaining columns.
    if !cfg.has_row_versions {
        let primary = schema
            .table
            .indexes
            .iter()
            .find(|i| i.index_type == 1 || i.name == "PRIMARY");
        let mut assigned = vec![false; cfg.columns.len()];
        let mut pos = 0u32;
        if let Some(primary) = primary {
            for elem in &primary.elements {
                let opx = elem.column_opx as usize;
                if opx >= opx_to_col.len() {
                    continue;
                }
                let ci = opx_to_col[opx];
                if ci < 0 {
                    continue;
                }
                let ci = ci as usize;
                if !assigned[ci] {
                    cfg.columns[ci].phy_pos = pos;
                    pos += 1;
                    assigned[ci] = true;
                }
            }
        }
        for (i, done) in assigned.iter().enumerate() {
            if !done {
                cfg.columns[i].phy_pos = pos;
                pos += 1;
            }
        }
    }

    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Binary writer
// ---------------------------------------------------------------------------

struct CfgWriter<W: Write> {
    out: W,
}

impl<W: Write> CfgWriter<W> {
    fn bytes(&mut self, buf: &[u8]) -> Result<(), IbxError> {
        self.out
            .write_all(buf)
            .map_err(|e| IbxError::CfgWrite(e.to_string()))
    }

    fn u32(&mut self, val: u32) -> Result<(), IbxError> {
        let mut buf = [0u8; 4];
        codec::write_u32(&mut buf, 0, val);
        self.bytes(&buf)
    }

    fn u64(&mut self, val: u64) -> Result<(), IbxError> {
        let mut buf = [0u8; 8];
        codec::write_u64(&mut buf, 0, val);
        self.bytes(&buf)
    }

    /// Length-prefixed string including the terminating NUL.
    fn string(&mut self, s: &str) -> Result<(), IbxError> {
        self.u32(s.len() as u32 + 1)?;
        self.bytes(s.as_bytes())?;
        self.bytes(&[0])
    }
}

/// Serialize the cfg model to `writer` in the v7 layout.
pub fn write_cfg<W: Write>(writer: W, cfg: &CfgTable) -> Result<(), IbxError> {
    let mut w = CfgWriter { out: writer };

    w.u32(IB_EXPORT_CFG_VERSION_V7)?;

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "ibx-rebuild".to_string());
    w.string(&hostname)?;
    w.string(&cfg.name)?;
    w.u64(cfg.autoinc)?;
    w.u32(cfg.page_size)?;
    w.u32(cfg.table_flags)?;
    w.u32(cfg.columns.len() as u32)?;
    w.u32(cfg.n_instant_nullable)?;
    w.u32(cfg.initial_col_count)?;
    w.u32(cfg.current_col_count)?;
    w.u32(cfg.total_col_count)?;
    w.u32(cfg.n_instant_drop_cols)?;
    w.u32(cfg.current_row_version)?;
    w.u32(cfg.space_flags)?;
    w.bytes(&[cfg.compression_type])?;

    for col in &cfg.columns {
        w.u32(col.prtype)?;
        w.u32(col.mtype)?;
        w.u32(col.len)?;
        w.u32(col.mbminmaxlen)?;
        w.u32(col.ind)?;
        w.u32(col.ord_part)?;
        w.u32(col.max_prefix)?;
        w.string(&col.name)?;

        let mut meta = [0u8; 6];
        meta[0] = col.version_added;
        meta[1] = col.version_dropped;
        codec::write_u32(&mut meta, 2, col.phy_pos);
        w.bytes(&meta)?;

        if col.is_instant_dropped {
            let mut dropped = [0u8; 22];
            dropped[0] = u8::from(col.is_nullable);
            dropped[1] = u8::from(col.is_unsigned);
            codec::write_u32(&mut dropped, 2, col.char_length);
            codec::write_u32(&mut dropped, 6, col.dd_type as u32);
            codec::write_u32(&mut dropped, 10, col.numeric_scale);
            codec::write_u64(&mut dropped, 14, col.collation_id);
            w.bytes(&dropped)?;

            if col.dd_type == DD_COL_ENUM || col.dd_type == DD_COL_SET {
                w.u32(col.elements.len() as u32)?;
                for elem in &col.elements {
                    w.string(elem)?;
                }
            }
        }

        if col.has_instant_default {
            w.bytes(&[1])?;
            w.bytes(&[u8::from(col.instant_default_null)])?;
            if !col.instant_default_null {
                w.u32(col.instant_default_value.len() as u32)?;
                w.bytes(&col.instant_default_value)?;
            }
        } else {
            w.bytes(&[0])?;
        }
    }

    w.u32(cfg.indexes.len() as u32)?;
    for index in &cfg.indexes {
        w.u64(index.id)?;
        w.u32(index.space)?;
        w.u32(index.page)?;
        w.u32(index.index_type)?;
        w.u32(index.trx_id_offset)?;
        w.u32(index.n_user_defined_cols)?;
        w.u32(index.n_uniq)?;
        w.u32(index.n_nullable)?;
        w.u32(index.n_fields)?;
        w.string(&index.name)?;

        for field in &index.fields {
            w.u32(field.prefix_len)?;
            w.u32(field.fixed_len)?;
            w.u32(field.is_ascending)?;
            w.string(&field.name)?;
        }
    }

    Ok(())
}

/// Build and write the `.cfg` file.
pub fn write_cfg_file(path: &str, cfg: &CfgTable) -> Result<(), IbxError> {
    let file = std::fs::File::create(path)
        .map_err(|e| IbxError::CfgWrite(format!("cannot create {}: {}", path, e)))?;
    let mut buf = std::io::BufWriter::new(file);
    write_cfg(&mut buf, cfg)?;
    buf.flush().map_err(|e| IbxError::CfgWrite(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::schema::test_support::sample_sdi_json;

    fn sample_flags() -> FspFlags {
        FspFlags(FSP_FLAGS_MASK_POST_ANTELOPE | FSP_FLAGS_MASK_ATOMIC_BLOBS | FSP_FLAGS_MASK_SDI)
    }

    #[test]
    fn pack_lengths() {
        assert_eq!(calc_pack_length(MYSQL_TYPE_LONG, 11), 4);
        assert_eq!(calc_pack_length(MYSQL_TYPE_VARCHAR, 32), 33);
        assert_eq!(calc_pack_length(MYSQL_TYPE_VARCHAR, 300), 302);
        assert_eq!(calc_pack_length(MYSQL_TYPE_BLOB, 0), 10);
        assert_eq!(calc_pack_length(MYSQL_TYPE_DATETIME2, 19), 5);
        assert_eq!(enum_pack_length(255), 1);
        assert_eq!(enum_pack_length(256), 2);
        assert_eq!(set_pack_length(9), 2);
        assert_eq!(set_pack_length(64), 8);
    }

    #[test]
    fn column_typing_int_not_null() {
        let col = DdColumn {
            name: "id".into(),
            dd_type: DD_COL_LONG,
            char_length: 11,
            is_nullable: false,
            collation_id: 255,
            ..Default::default()
        };
        let info = build_column_type_info(&col);
        assert_eq!(info.mtype, DATA_INT);
        assert_eq!(info.len, 4);
        assert!(info.prtype & DATA_NOT_NULL != 0);
        assert_eq!(info.prtype & 0xFF, MYSQL_TYPE_LONG);
    }

    #[test]
    fn column_typing_varchar() {
        let col = DdColumn {
            name: "name".into(),
            dd_type: DD_COL_VARCHAR,
            char_length: 32,
            is_nullable: true,
            collation_id: 8,
            ..Default::default()
        };
        let info = build_column_type_info(&col);
        assert_eq!(info.mtype, DATA_VARCHAR);
        // pack length minus the 1 length byte
        assert_eq!(info.len, 32);
        assert_eq!(info.prtype >> 16, 8); // charset folded into prtype
        assert_eq!(info.prtype & DATA_NOT_NULL, 0);
    }

    #[test]
    fn build_from_sample_schema() {
        let schema = Schema::from_json(&sample_sdi_json()).unwrap();
        let cfg = build_cfg_table(&schema, sample_flags(), 3, 23).unwrap();

        assert_eq!(cfg.name, "test/t1");
        // id, name, DB_ROW_ID (synthesized), DB_TRX_ID, DB_ROLL_PTR
        assert_eq!(cfg.columns.len(), 5);
        let names: Vec<&str> = cfg.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "DB_ROW_ID", "DB_TRX_ID", "DB_ROLL_PTR"]);
        let row_id = &cfg.columns[2];
        assert_eq!(row_id.mtype, DATA_SYS);
        assert_eq!(row_id.prtype, DATA_ROW_ID | DATA_NOT_NULL);
        assert_eq!(row_id.len, 6);

        // indices: CLUST_IND_SDI + PRIMARY + BY_NAME
        assert_eq!(cfg.indexes.len(), 3);
        assert_eq!(cfg.indexes[0].name, "CLUST_IND_SDI");
        assert_eq!(cfg.indexes[0].id, u64::MAX);
        assert_eq!(cfg.indexes[0].page, 3);
        assert_eq!(cfg.indexes[0].n_fields, 7);
        assert_eq!(cfg.indexes[1].name, "PRIMARY");
        assert_eq!(cfg.indexes[1].id, 42);
        assert_eq!(cfg.indexes[1].page, 4);
        assert!(cfg.indexes[1].index_type & DICT_CLUSTERED != 0);
        assert_eq!(cfg.indexes[2].name, "BY_NAME");
        assert_eq!(cfg.indexes[2].id, 43);

        // phy_pos: PK column first
        assert_eq!(cfg.columns[0].phy_pos, 0);
        // instant counters with no history
        assert_eq!(cfg.current_row_version, 0);
        assert_eq!(cfg.current_col_count, 2);
        assert_eq!(cfg.total_col_count, 2);
    }

    #[test]
    fn cfg_binary_layout_prefix() {
        let schema = Schema::from_json(&sample_sdi_json()).unwrap();
        let cfg = build_cfg_table(&schema, sample_flags(), 3, 23).unwrap();
        let mut buf = Vec::new();
        write_cfg(&mut buf, &cfg).unwrap();

        // version
        assert_eq!(codec::read_u32(&buf, 0), IB_EXPORT_CFG_VERSION_V7);
        // hostname: (len, bytes, NUL)
        let host_len = codec::read_u32(&buf, 4) as usize;
        assert_eq!(buf[4 + 4 + host_len - 1], 0);
        // table name follows
        let name_off = 8 + host_len;
        let name_len = codec::read_u32(&buf, name_off) as usize;
        let name =
            std::str::from_utf8(&buf[name_off + 4..name_off + 4 + name_len - 1]).unwrap();
        assert_eq!(name, "test/t1");
    }

    #[test]
    fn instant_default_coder() {
        // each nibble maps to 'a'..'p'
        assert_eq!(decode_instant_default_value("aa").unwrap(), vec![0x00]);
        assert_eq!(decode_instant_default_value("ip").unwrap(), vec![0x8F]);
        assert!(decode_instant_default_value("a").is_none());
        assert!(decode_instant_default_value("zz").is_none());
    }

    #[test]
    fn dict_flags() {
        assert_eq!(dict_tf_init(true, 0, true, false, false), 0b100001);
        assert_eq!(dict_tf_init(true, 4, true, false, false), 0b101001);
        assert_eq!(dict_tf_init(false, 0, false, false, false), 0);
    }
}
