//! Mode 3: extract typed rows from an index.

use std::fs::File;
use std::io::Write;

use colored::Colorize;

use crate::innodb::compression;
use crate::innodb::constants::*;
use crate::innodb::export::{OutputColumn, RowFormat, RowMeta, RowWriter};
use crate::innodb::field_decode::{format_extern_ref, format_field, format_null};
use crate::innodb::lob::{ExternRef, LobReader};
use crate::innodb::page::page_type_of;
use crate::innodb::page_types::PageType;
use crate::innodb::record::{field_data, page_index_id, page_level, parse_leaf_page, FieldData};
use crate::innodb::schema::{IndexDef, IndexType, Schema};
use crate::innodb::tablespace::Tablespace;
use crate::innodb::xdes::{descriptor_page, XdesCache};
use crate::util::debug_enabled;
use crate::IbxError;

pub const DEFAULT_LOB_MAX_BYTES: usize = 1_048_576;

pub struct ExtractOptions {
    pub input: String,
    pub schema_json: String,
    pub index: Option<String>,
    pub list_indexes: bool,
    pub format: String,
    pub output: Option<String>,
    pub with_meta: bool,
    pub lob_max_bytes: usize,
}

fn index_type_name(t: IndexType) -> &'static str {
    match t {
        IndexType::Primary => "PRIMARY",
        IndexType::Unique => "UNIQUE",
        IndexType::Multiple => "MULTIPLE",
        IndexType::Fulltext => "FULLTEXT",
        IndexType::Spatial => "SPATIAL",
    }
}

pub fn execute(opts: &ExtractOptions) -> Result<(), IbxError> {
    let schema = Schema::load(&opts.schema_json)?;

    if opts.list_indexes {
        println!(
            "{}",
            format!("Indexes of {}:", schema.full_name()).bold()
        );
        println!("{:<20} {:<10} {:>12} {:>6} {:>7}", "NAME", "TYPE", "ID", "ROOT", "FIELDS");
        for idx in &schema.indexes {
            println!(
                "{:<20} {:<10} {:>12} {:>6} {:>7}",
                idx.name,
                index_type_name(idx.index_type),
                idx.id,
                idx.root,
                idx.elements.len()
            );
        }
        return Ok(());
    }

    let format = RowFormat::parse(&opts.format)
        .ok_or_else(|| IbxError::Argument(format!("unknown format '{}'", opts.format)))?;

    let index = schema.select_index(opts.index.as_deref())?;
    let layout = schema.row_layout(index)?;

    let ts = Tablespace::open(&opts.input)?;
    let page_size = ts.page_size();
    let target_index_id = resolve_target_index_id(&ts, index)?;

    eprintln!(
        "Extracting index '{}' (id {}) from {}",
        index.name, target_index_id, opts.input
    );

    let out: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(
            File::create(path)
                .map_err(|e| IbxError::Io(format!("cannot create {}: {}", path, e)))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut writer = RowWriter::new(out, format, opts.with_meta, debug_enabled());
    let lob_reader = LobReader::new(&ts, opts.lob_max_bytes);

    let mut xdes = XdesCache::new();
    let mut logical_buf = vec![0u8; page_size.logical];
    let mut n_records: u64 = 0;
    let mut n_leaf_pages: u64 = 0;
    let mut n_invalid: u64 = 0;

    for page_no in 0..ts.page_count() {
        let raw = ts.read_page(page_no)?;

        // Track allocation metadata and skip free pages.
        let page_type = page_type_of(&raw);
        if page_type == PageType::FspHdr || page_type == PageType::Xdes {
            xdes.update(page_no, &raw);
            continue;
        }
        let desc_page = descriptor_page(page_size, page_no);
        if !xdes.holds(desc_page) && desc_page != page_no {
            if let Ok(desc) = ts.read_page(desc_page) {
                xdes.update(desc_page, &desc);
            }
        }
        if xdes.is_free(page_size, page_no) {
            continue;
        }

        // A page stored under the wrong slot is left alone.
        let stored_no = crate::innodb::codec::read_u32(&raw, FIL_PAGE_OFFSET) as u64;
        if stored_no != page_no {
            continue;
        }
        if page_type != PageType::Index {
            continue;
        }

        let page: &[u8] = if page_size.is_compressed() {
            match compression::decompress_page(&raw, page_size, &mut logical_buf) {
                Ok(_) => &logical_buf,
                Err(e) => {
                    eprintln!("Warning: page {}: {} (skipped)", page_no, e);
                    continue;
                }
            }
        } else {
            &raw
        };

        let scan = parse_leaf_page(page, page_size.logical, &layout, target_index_id, false);
        n_invalid += scan.n_invalid as u64;
        if scan.records.is_empty() {
            continue;
        }
        n_leaf_pages += 1;
        if debug_enabled() {
            eprintln!(
                "Page {} is index '{}' leaf: {} records ({} deleted skipped, {} invalid)",
                page_no,
                index.name,
                scan.records.len(),
                scan.n_deleted_skipped,
                scan.n_invalid
            );
        }

        for record in &scan.records {
            let mut columns = Vec::with_capacity(layout.fields.len());
            for (i, field) in layout.fields.iter().enumerate() {
                let value = match field_data(page, record.origin, &record.slots, i) {
                    FieldData::Null => format_null(),
                    FieldData::Bytes {
                        data,
                        external: false,
                    } => format_field(field, data, false),
                    FieldData::Bytes {
                        data,
                        external: true,
                    } => {
                        let prefix = &data[..data.len().saturating_sub(FIELD_REF_SIZE)];
                        match ExternRef::parse(data) {
                            Some(reference) => match lob_reader.read_external(&reference) {
                                Ok(value) => {
                                    let mut full =
                                        Vec::with_capacity(prefix.len() + value.data.len());
                                    full.extend_from_slice(prefix);
                                    full.extend_from_slice(&value.data);
                                    format_field(field, &full, value.truncated)
                                }
                                Err(e) => {
                                    if debug_enabled() {
                                        eprintln!(
                                            "Warning: page {}: external read failed: {}",
                                            page_no, e
                                        );
                                    }
                                    format_extern_ref(reference.length, data)
                                }
                            },
                            None => format_field(field, data, false),
                        }
                    }
                };
                columns.push(OutputColumn {
                    name: &field.name,
                    internal: field.kind == crate::innodb::schema::ColumnKind::Internal,
                    value,
                });
            }

            let meta = RowMeta {
                page_no,
                rec_offset: record.origin,
                deleted: record.deleted,
            };
            writer.write_row(&columns, Some(&meta))?;
            n_records += 1;
        }
    }

    writer.flush()?;
    eprintln!(
        "{}",
        format!(
            "Done. Leaf pages: {}, records: {}, invalid: {}",
            n_leaf_pages, n_records, n_invalid
        )
        .green()
        .bold()
    );
    Ok(())
}

/// The index id actually stamped on this index's pages: read from the root
/// page when it is reachable, falling back to the dictionary id, then to
/// the first INDEX page found in the file.
fn resolve_target_index_id(ts: &Tablespace, index: &IndexDef) -> Result<u64, IbxError> {
    let page_size = ts.page_size();

    if index.root != FIL_NULL && (index.root as u64) < ts.page_count() {
        if let Ok(raw) = ts.read_page(index.root as u64) {
            if page_type_of(&raw) == PageType::Index {
                let mut logical = vec![0u8; page_size.logical];
                if compression::decompress_page(&raw, page_size, &mut logical).is_ok() {
                    return Ok(page_index_id(&logical));
                }
            }
        }
    }

    if index.id != 0 {
        return Ok(index.id);
    }

    // Last resort: the first leaf INDEX page in file order names the index.
    for page_no in 0..ts.page_count() {
        let raw = ts.read_page(page_no)?;
        if page_type_of(&raw) != PageType::Index {
            continue;
        }
        let mut logical = vec![0u8; page_size.logical];
        if compression::decompress_page(&raw, page_size, &mut logical).is_ok()
            && page_level(&logical) == 0
        {
            return Ok(page_index_id(&logical));
        }
    }

    Err(IbxError::Schema(format!(
        "cannot resolve an index id for '{}'",
        index.name
    )))
}
