//! Schema descriptor (`sdi.json`) loading.
//!
//! The dictionary JSON is the `ibd2sdi` form: a top-level array whose
//! elements are either the literal string `"ibd2sdi"` or an object
//! `{type, id, object:{dd_object_type, dd_object}}`. The Table branch
//! carries columns and indexes; engine-private attributes ride in
//! semicolon-separated `k=v` strings (`se_private_data`, `options`).
//!
//! Loading produces two views: the raw dictionary objects (kept for the
//! rebuild/cfg paths) and a typed row layout per index, in the physical
//! field order of that index's records.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::innodb::constants::*;
use crate::IbxError;

// ---------------------------------------------------------------------------
// Raw dictionary JSON shapes
// ---------------------------------------------------------------------------

/// Data dictionary table definition (the `dd_object` of a Table entry).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdTable {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schema_ref: String,
    /// Semicolon-separated `k=v` list.
    #[serde(default)]
    pub options: String,
    /// Semicolon-separated `k=v` list; holds `autoinc`, `data_directory`, ...
    #[serde(default)]
    pub se_private_data: String,
    /// 1=REDUNDANT, 2=COMPACT, 3=DYNAMIC, 4=COMPRESSED
    #[serde(default)]
    pub row_format: u64,
    #[serde(default)]
    pub collation_id: u64,
    #[serde(default)]
    pub columns: Vec<DdColumn>,
    #[serde(default)]
    pub indexes: Vec<DdIndex>,
}

/// Data dictionary column definition.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdColumn {
    #[serde(default)]
    pub name: String,
    /// dd_type code (dd::enum_column_types).
    #[serde(rename = "type", default)]
    pub dd_type: u64,
    /// SQL type string, e.g. "varchar(32)" or "int unsigned".
    #[serde(default)]
    pub column_type_utf8: String,
    #[serde(default)]
    pub ordinal_position: u64,
    /// 1=visible, 2=SE-hidden (DB_TRX_ID and friends), 4=user-hidden.
    #[serde(default)]
    pub hidden: u64,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_unsigned: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub char_length: u32,
    #[serde(default)]
    pub numeric_precision: u32,
    #[serde(default)]
    pub numeric_scale: u32,
    #[serde(default)]
    pub datetime_precision: u32,
    #[serde(default)]
    pub collation_id: u64,
    /// Holds `physical_pos`, `version_added`, `version_dropped`, defaults.
    #[serde(default)]
    pub se_private_data: String,
    /// ENUM/SET members; names are base64-encoded in the SDI form.
    #[serde(default)]
    pub elements: Vec<DdColumnElement>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdColumnElement {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub index: u64,
}

/// Data dictionary index definition.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdIndex {
    #[serde(default)]
    pub name: String,
    /// 1=PRIMARY, 2=UNIQUE, 3=MULTIPLE, 4=FULLTEXT, 5=SPATIAL
    #[serde(rename = "type", default)]
    pub index_type: u64,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub options: String,
    /// Holds `id`, `root`, `space_id`, `table_id`, `trx_id`.
    #[serde(default)]
    pub se_private_data: String,
    #[serde(default)]
    pub elements: Vec<DdIndexElement>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdIndexElement {
    #[serde(default)]
    pub ordinal_position: u64,
    /// Prefix length; 4294967295 means the full column.
    #[serde(default = "full_column_length")]
    pub length: u64,
    /// 2=ASC, 3=DESC (dd::Index_element::enum_index_element_order).
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub hidden: bool,
    /// 0-based index into the table's columns array.
    #[serde(default)]
    pub column_opx: u64,
}

fn full_column_length() -> u64 {
    u64::from(u32::MAX)
}

/// Data dictionary tablespace definition.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdTablespace {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: String,
    /// Holds `id`, `flags`, `server_version`, `space_version`.
    #[serde(default)]
    pub se_private_data: String,
    #[serde(default)]
    pub files: Vec<DdTablespaceFile>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DdTablespaceFile {
    #[serde(default)]
    pub ordinal_position: u64,
    #[serde(default)]
    pub filename: String,
}

// ---------------------------------------------------------------------------
// Typed layout
// ---------------------------------------------------------------------------

/// Engine-internal type category of a column (the FT_* classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Uint,
    Float,
    Double,
    Char,
    Text,
    Blob,
    Bin,
    Date,
    Time,
    DateTime,
    Timestamp,
    Year,
    Enum,
    Set,
    Bit,
    Decimal,
    Json,
    Geometry,
    Internal,
}

impl ColumnKind {
    /// True for kinds whose length byte gets the two-byte/external treatment
    /// regardless of declared max.
    pub fn is_big_field(self) -> bool {
        matches!(self, ColumnKind::Blob | ColumnKind::Text | ColumnKind::Json | ColumnKind::Geometry)
    }
}

/// One field of a row layout, in record order.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// 0 means variable-length.
    pub fixed_len: u32,
    pub min_len: u32,
    pub max_len: u32,
    pub decimal_precision: u32,
    pub decimal_scale: u32,
    pub time_precision: u32,
    pub elements: Vec<String>,
    pub collation_id: u64,
}

impl FieldDef {
    pub fn is_variable(&self) -> bool {
        self.fixed_len == 0
    }
}

/// The field order and aggregate bounds of one index's records.
#[derive(Debug, Clone)]
pub struct RowLayout {
    pub table_name: String,
    pub fields: Vec<FieldDef>,
    pub n_nullable: usize,
    /// Smallest plausible pre-origin header length for the §4.5 gate.
    pub min_rec_header_len: usize,
    pub data_min_size: usize,
    pub data_max_size: usize,
}

impl RowLayout {
    pub fn from_fields(table_name: String, fields: Vec<FieldDef>) -> RowLayout {
        let n_nullable = fields.iter().filter(|f| f.nullable).count();
        let null_bytes = n_nullable.div_ceil(8);
        let var_required = fields
            .iter()
            .filter(|f| !f.nullable && f.is_variable())
            .count();
        let data_min_size = fields
            .iter()
            .filter(|f| !f.nullable)
            .map(|f| f.min_len as usize)
            .sum();
        let data_max_size: usize = fields
            .iter()
            .map(|f| (f.max_len as usize).min(UNIV_PAGE_SIZE_ORIG))
            .sum::<usize>()
            .min(UNIV_PAGE_SIZE_MAX);

        RowLayout {
            table_name,
            fields,
            n_nullable,
            min_rec_header_len: null_bytes + var_required,
            data_min_size,
            data_max_size,
        }
    }
}

/// Index categories from the dictionary `type` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Primary,
    Unique,
    Multiple,
    Fulltext,
    Spatial,
}

impl IndexType {
    pub fn from_dd(code: u64) -> IndexType {
        match code {
            1 => IndexType::Primary,
            2 => IndexType::Unique,
            4 => IndexType::Fulltext,
            5 => IndexType::Spatial,
            _ => IndexType::Multiple,
        }
    }
}

/// A resolved index definition.
#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub id: u64,
    pub root: u32,
    pub index_type: IndexType,
    /// Elements sorted by ordinal position; hidden elements are the
    /// primary-key and system columns a secondary index appends.
    pub elements: Vec<IndexElementDef>,
}

#[derive(Debug, Clone)]
pub struct IndexElementDef {
    pub column_opx: usize,
    pub ordinal_position: u64,
    /// Prefix length in bytes, `u32::MAX` for the full column.
    pub length: u32,
    pub ascending: bool,
    pub hidden: bool,
}

/// A loaded schema: raw dictionary objects plus typed index definitions.
#[derive(Debug, Clone)]
pub struct Schema {
    pub table: DdTable,
    pub tablespace: Option<DdTablespace>,
    pub indexes: Vec<IndexDef>,
}

impl Schema {
    /// Load the Table (and Tablespace, if present) entry of an sdi.json.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Schema, IbxError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| IbxError::Io(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Schema, IbxError> {
        let doc: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| IbxError::Schema(format!("sdi.json parse error: {}", e)))?;

        let array = doc
            .as_array()
            .ok_or_else(|| IbxError::Schema("sdi.json top level is not an array".into()))?;

        let mut table: Option<DdTable> = None;
        let mut tablespace: Option<DdTablespace> = None;

        for elem in array {
            let Some(object) = elem.get("object") else {
                continue; // "ibd2sdi" marker or unrelated entry
            };
            match object.get("dd_object_type").and_then(|t| t.as_str()) {
                Some("Table") => {
                    if let Some(dd) = object.get("dd_object") {
                        table = Some(
                            serde_json::from_value(dd.clone())
                                .map_err(|e| IbxError::Schema(format!("Table object: {}", e)))?,
                        );
                    }
                }
                Some("Tablespace") => {
                    if let Some(dd) = object.get("dd_object") {
                        tablespace = serde_json::from_value(dd.clone()).ok();
                    }
                }
                _ => {}
            }
        }

        let table =
            table.ok_or_else(|| IbxError::Schema("sdi.json has no Table object".into()))?;
        let indexes = build_index_defs(&table);

        Ok(Schema {
            table,
            tablespace,
            indexes,
        })
    }

    /// `schema/table` as the engine writes qualified names.
    pub fn full_name(&self) -> String {
        if self.table.schema_ref.is_empty() {
            self.table.name.clone()
        } else {
            format!("{}/{}", self.table.schema_ref, self.table.name)
        }
    }

    /// Select an index by `--index=NAME|ID`; `None` picks PRIMARY (or the
    /// first defined index).
    pub fn select_index(&self, selector: Option<&str>) -> Result<&IndexDef, IbxError> {
        match selector {
            None => self
                .indexes
                .iter()
                .find(|i| i.index_type == IndexType::Primary)
                .or_else(|| self.indexes.first())
                .ok_or_else(|| IbxError::Schema("schema defines no indexes".into())),
            Some(sel) => {
                let lowered = sel.to_lowercase();
                if let Some(idx) = self
                    .indexes
                    .iter()
                    .find(|i| i.name.to_lowercase() == lowered)
                {
                    return Ok(idx);
                }
                if let Ok(id) = sel.parse::<u64>() {
                    if let Some(idx) = self.indexes.iter().find(|i| i.id == id && id != 0) {
                        return Ok(idx);
                    }
                }
                Err(IbxError::Schema(format!("no index matches '{}'", sel)))
            }
        }
    }

    /// Build the record layout for one index: its elements in ordinal order,
    /// each resolved against the column table and clamped to any prefix.
    pub fn row_layout(&self, index: &IndexDef) -> Result<RowLayout, IbxError> {
        let mut fields = Vec::with_capacity(index.elements.len());
        for elem in &index.elements {
            let col = self.table.columns.get(elem.column_opx).ok_or_else(|| {
                IbxError::Schema(format!(
                    "index '{}' refers to invalid column_opx {}",
                    index.name, elem.column_opx
                ))
            })?;
            if col.is_virtual {
                continue;
            }
            let mut col = col.clone();
            if elem.length != u32::MAX && elem.length > 0 {
                if col.char_length == 0 || elem.length < col.char_length {
                    col.char_length = elem.length;
                }
            }
            if let Some(field) = field_def_from_column(&col) {
                fields.push(field);
            }
        }
        if fields.is_empty() {
            return Err(IbxError::Schema(format!(
                "index '{}' resolves to no parsable fields",
                index.name
            )));
        }
        Ok(RowLayout::from_fields(self.table.name.clone(), fields))
    }

    /// Key/value view of the table's `se_private_data`.
    pub fn table_private(&self) -> HashMap<String, String> {
        parse_kv_string(&self.table.se_private_data)
    }
}

fn build_index_defs(table: &DdTable) -> Vec<IndexDef> {
    let mut defs = Vec::new();
    for idx in &table.indexes {
        if idx.name.is_empty() || idx.elements.is_empty() {
            continue;
        }
        let kv = parse_kv_string(&idx.se_private_data);
        let id = kv.get("id").and_then(|v| v.parse().ok()).unwrap_or(0u64);
        let root = kv
            .get("root")
            .and_then(|v| v.parse().ok())
            .unwrap_or(FIL_NULL);

        let mut elements: Vec<IndexElementDef> = idx
            .elements
            .iter()
            .map(|e| IndexElementDef {
                column_opx: e.column_opx as usize,
                ordinal_position: e.ordinal_position,
                length: if e.length > u64::from(u32::MAX) {
                    u32::MAX
                } else {
                    e.length as u32
                },
                ascending: e.order != 3,
                hidden: e.hidden,
            })
            .collect();
        elements.sort_by_key(|e| e.ordinal_position);

        defs.push(IndexDef {
            name: idx.name.clone(),
            id,
            root,
            index_type: IndexType::from_dd(idx.index_type),
            elements,
        });
    }
    defs
}

// ---------------------------------------------------------------------------
// Column typing
// ---------------------------------------------------------------------------

fn is_internal_column_name(name: &str) -> bool {
    matches!(name, "DB_TRX_ID" | "DB_ROLL_PTR" | "DB_ROW_ID")
}

fn internal_column_length(name: &str, fallback: u32) -> u32 {
    match name {
        "DB_TRX_ID" => DATA_TRX_ID_LEN as u32,
        "DB_ROLL_PTR" => DATA_ROLL_PTR_LEN as u32,
        "DB_ROW_ID" => DATA_ROW_ID_LEN as u32,
        _ => fallback,
    }
}

/// Bytes of a DECIMAL(p,s) in the engine's packed form.
pub fn decimal_storage_bytes(precision: u32, scale: u32) -> u32 {
    const DIG2BYTES: [u32; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];
    if precision == 0 {
        return 0;
    }
    let scale = scale.min(precision);
    let intg = precision - scale;
    (intg / 9) * 4
        + DIG2BYTES[(intg % 9) as usize]
        + (scale / 9) * 4
        + DIG2BYTES[(scale % 9) as usize]
}

/// Storage bytes of a temporal column: base + `(precision + 1) / 2`.
pub fn temporal_storage_bytes(base: u32, precision: u32) -> u32 {
    base + (precision.min(6) + 1) / 2
}

fn parse_first_paren_number(s: &str) -> Option<u32> {
    let open = s.find('(')?;
    let close = s[open..].find(')')? + open;
    s[open + 1..close]
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn parse_two_paren_numbers(s: &str) -> Option<(u32, u32)> {
    let open = s.find('(')?;
    let close = s[open..].find(')')? + open;
    let mut parts = s[open + 1..close].split(',');
    let a = parts.next()?.trim().parse().ok()?;
    let b = parts.next().map_or(Some(0), |p| p.trim().parse().ok())?;
    Some((a, b))
}

/// Multi-byte CHAR columns are stored variable-length in compact format.
fn char_is_variable_length(collation_id: u64) -> bool {
    charset_max_bytes(collation_id) > 1
}

/// Max bytes per character for a collation id (the common subset).
pub fn charset_max_bytes(collation_id: u64) -> usize {
    match collation_id {
        // latin1, ascii, binary
        5 | 8 | 11 | 15 | 31 | 47 | 48 | 49 | 63 | 65 | 94 => 1,
        // utf8mb3
        33 | 83 | 192..=215 | 223 => 3,
        // utf8mb4 and the 0900 family
        45 | 46 | 224..=247 | 255..=323 => 4,
        _ => 4,
    }
}

/// True for the latin1 collations the formatter transcodes byte-for-byte.
pub fn collation_is_latin1(collation_id: u64) -> bool {
    matches!(collation_id, 5 | 8 | 15 | 31 | 47 | 48 | 49 | 94)
}

fn decode_element_name(raw: &str) -> String {
    match BASE64.decode(raw) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn fixed(kind: ColumnKind, len: u32) -> (ColumnKind, u32, u32, u32) {
    (kind, len, len, len)
}

fn variable(kind: ColumnKind, max: u32) -> (ColumnKind, u32, u32, u32) {
    (kind, 0, 0, max)
}

fn clamp_var_max(default_len: u32, col_len: u32) -> u32 {
    if col_len > 0 && col_len < default_len {
        col_len
    } else {
        default_len
    }
}

/// Map one dictionary column to a typed field; `None` skips it (no type and
/// no usable length).
pub fn field_def_from_column(col: &DdColumn) -> Option<FieldDef> {
    let type_str = col.column_type_utf8.to_lowercase();

    let make = |kind: ColumnKind, fixed_len: u32, min_len: u32, max_len: u32| FieldDef {
        name: col.name.clone(),
        kind,
        nullable: col.is_nullable,
        fixed_len,
        min_len,
        max_len,
        decimal_precision: col.numeric_precision,
        decimal_scale: col.numeric_scale,
        time_precision: col.datetime_precision,
        elements: col
            .elements
            .iter()
            .map(|e| decode_element_name(&e.name))
            .collect(),
        collation_id: col.collation_id,
    };

    if is_internal_column_name(&col.name) || (type_str.is_empty() && col.hidden > 1) {
        let len = internal_column_length(&col.name, col.char_length);
        let (kind, f, lo, hi) = fixed(ColumnKind::Internal, len);
        return Some(make(kind, f, lo, hi));
    }
    if type_str.is_empty() {
        if col.char_length == 0 {
            return None;
        }
        let (kind, f, lo, hi) = fixed(ColumnKind::Internal, col.char_length);
        return Some(make(kind, f, lo, hi));
    }

    let int_kind = if col.is_unsigned {
        ColumnKind::Uint
    } else {
        ColumnKind::Int
    };

    let (kind, fixed_len, min_len, max_len) = if type_str.contains("tinyint")
        || type_str == "bool"
        || type_str == "boolean"
    {
        fixed(int_kind, 1)
    } else if type_str.contains("smallint") {
        fixed(int_kind, 2)
    } else if type_str.contains("mediumint") {
        fixed(int_kind, 3)
    } else if type_str.contains("bigint") {
        fixed(int_kind, 8)
    } else if type_str.contains("int") {
        fixed(int_kind, 4)
    } else if type_str.contains("float") {
        fixed(ColumnKind::Float, 4)
    } else if type_str.contains("double") {
        fixed(ColumnKind::Double, 8)
    } else if type_str.contains("decimal") || type_str.contains("numeric") {
        let (precision, scale) = if col.numeric_precision != 0 || col.numeric_scale != 0 {
            (col.numeric_precision, col.numeric_scale)
        } else {
            parse_two_paren_numbers(&type_str).unwrap_or((10, 0))
        };
        let mut len = decimal_storage_bytes(precision, scale);
        if len == 0 && col.char_length > 0 {
            len = col.char_length;
        }
        let mut field = make(ColumnKind::Decimal, len, len, len);
        field.decimal_precision = precision;
        field.decimal_scale = scale;
        return Some(field);
    } else if type_str.contains("datetime") {
        fixed(
            ColumnKind::DateTime,
            temporal_storage_bytes(5, col.datetime_precision),
        )
    } else if type_str.contains("timestamp") {
        fixed(
            ColumnKind::Timestamp,
            temporal_storage_bytes(4, col.datetime_precision),
        )
    } else if type_str.contains("time") {
        fixed(
            ColumnKind::Time,
            temporal_storage_bytes(3, col.datetime_precision),
        )
    } else if type_str.contains("date") {
        fixed(ColumnKind::Date, 3)
    } else if type_str.contains("year") {
        fixed(ColumnKind::Year, 1)
    } else if type_str.contains("bit") {
        let bits = parse_first_paren_number(&type_str).unwrap_or(col.char_length.max(1));
        fixed(ColumnKind::Bit, bits.div_ceil(8).max(1))
    } else if type_str.contains("varbinary") {
        let max = parse_first_paren_number(&type_str)
            .filter(|_| col.char_length == 0)
            .unwrap_or(col.char_length);
        variable(ColumnKind::Bin, max)
    } else if type_str.contains("binary") {
        let len = parse_first_paren_number(&type_str)
            .filter(|_| col.char_length == 0)
            .unwrap_or(col.char_length);
        fixed(ColumnKind::Bin, len)
    } else if type_str.contains("varchar") {
        let max = parse_first_paren_number(&type_str)
            .filter(|_| col.char_length == 0)
            .unwrap_or(col.char_length);
        variable(ColumnKind::Char, max)
    } else if type_str.contains("char") {
        let len = parse_first_paren_number(&type_str)
            .filter(|_| col.char_length == 0)
            .unwrap_or(col.char_length);
        if char_is_variable_length(col.collation_id) {
            variable(ColumnKind::Char, len)
        } else {
            fixed(ColumnKind::Char, len)
        }
    } else if type_str.contains("tinytext") {
        variable(ColumnKind::Text, clamp_var_max(255, col.char_length))
    } else if type_str.contains("mediumtext") {
        variable(ColumnKind::Text, clamp_var_max(16_777_215, col.char_length))
    } else if type_str.contains("longtext") {
        variable(ColumnKind::Text, clamp_var_max(u32::MAX, col.char_length))
    } else if type_str.contains("text") {
        variable(ColumnKind::Text, clamp_var_max(65_535, col.char_length))
    } else if type_str.contains("tinyblob") {
        variable(ColumnKind::Blob, clamp_var_max(255, col.char_length))
    } else if type_str.contains("mediumblob") {
        variable(ColumnKind::Blob, clamp_var_max(16_777_215, col.char_length))
    } else if type_str.contains("longblob") {
        variable(ColumnKind::Blob, clamp_var_max(u32::MAX, col.char_length))
    } else if type_str.contains("blob") {
        variable(ColumnKind::Blob, clamp_var_max(65_535, col.char_length))
    } else if type_str.contains("enum") {
        let len = if col.elements.len() > 255 { 2 } else { 1 };
        fixed(ColumnKind::Enum, len)
    } else if type_str.contains("set") {
        let len = (col.elements.len() as u32).div_ceil(8).max(1);
        fixed(ColumnKind::Set, len)
    } else if type_str.contains("json") {
        variable(ColumnKind::Json, clamp_var_max(u32::MAX, col.char_length))
    } else if type_str.contains("geometry")
        || type_str.contains("point")
        || type_str.contains("polygon")
        || type_str.contains("linestring")
    {
        variable(ColumnKind::Geometry, clamp_var_max(u32::MAX, col.char_length))
    } else {
        let max = if col.char_length > 0 { col.char_length } else { 255 };
        variable(ColumnKind::Text, max)
    };

    Some(make(kind, fixed_len, min_len, max_len))
}

// ---------------------------------------------------------------------------
// SDI entry list (rebuild input)
// ---------------------------------------------------------------------------

/// One raw SDI entry: its key and the compact-serialized `object` JSON.
#[derive(Debug, Clone)]
pub struct SdiEntry {
    pub sdi_type: u64,
    pub sdi_id: u64,
    pub json: String,
}

/// Load every `{type, id, object}` entry of an sdi.json, sorted by
/// `(type, id)` as the SDI B-tree orders its records.
pub fn load_sdi_entries<P: AsRef<Path>>(path: P) -> Result<Vec<SdiEntry>, IbxError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| IbxError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| IbxError::Schema(format!("sdi.json parse error: {}", e)))?;
    let array = doc
        .as_array()
        .ok_or_else(|| IbxError::Schema("sdi.json top level is not an array".into()))?;

    let mut entries = Vec::new();
    for elem in array {
        if !elem.is_object() {
            continue;
        }
        let (Some(sdi_type), Some(sdi_id), Some(object)) = (
            elem.get("type").and_then(|v| v.as_u64()),
            elem.get("id").and_then(|v| v.as_u64()),
            elem.get("object"),
        ) else {
            continue;
        };
        let json = serde_json::to_string(object)
            .map_err(|e| IbxError::Schema(format!("cannot re-serialize SDI object: {}", e)))?;
        entries.push(SdiEntry {
            sdi_type,
            sdi_id,
            json,
        });
    }

    if entries.is_empty() {
        return Err(IbxError::Schema(format!(
            "no SDI records found in {}",
            path.display()
        )));
    }
    entries.sort_by_key(|e| (e.sdi_type, e.sdi_id));
    Ok(entries)
}

/// Parse a semicolon-separated `k=v` attribute string.
pub fn parse_kv_string(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for part in s.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((k, v)) = part.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}
