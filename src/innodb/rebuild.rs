//! Rebuild a compressed tablespace into an uncompressed one.
//!
//! Every page is decompressed to the 16 KiB logical size, page 0's FSP
//! flags lose their size-shift bits (relocating the SDI sub-header when its
//! offset moves), the SDI root leaf and its blob chains are re-synthesized
//! from an `sdi.json`, index ids are optionally remapped to a target
//! schema's, and every page gets fresh CRC-32C checksums. A `.cfg` sidecar
//! can be emitted so the rebuilt file is importable by a live server.
//!
//! Unlike the read-only modes, any per-page failure here is fatal: the
//! output's structural consistency depends on every page being written.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::innodb::cfg;
use crate::innodb::checksum;
use crate::innodb::codec;
use crate::innodb::compression;
use crate::innodb::constants::*;
use crate::innodb::page::{
    fsp_header_get_field, fsp_header_set_field, page_type_of, FspFlags,
};
use crate::innodb::page_types::PageType;
use crate::innodb::schema::{load_sdi_entries, parse_kv_string, Schema, SdiEntry};
use crate::innodb::sdi::{
    collect_sdi_blob_pages, init_empty_sdi_page, populate_sdi_root_page, sdi_root_from_page0,
    SdiBlobAllocator,
};
use crate::innodb::tablespace::Tablespace;
use crate::IbxError;

/// Options of the rebuild operation (mode 5).
#[derive(Debug, Default, Clone)]
pub struct RebuildOptions {
    pub source_sdi_json: Option<String>,
    pub target_sdi_json: Option<String>,
    pub index_id_map: Option<String>,
    pub cfg_out: Option<String>,
    pub target_sdi_root: Option<u32>,
    pub use_target_sdi_root: bool,
    pub use_source_sdi_root: bool,
    pub target_space_id: Option<u32>,
    pub use_target_space_id: bool,
    pub use_source_space_id: bool,
    pub target_ibd: Option<String>,
    pub validate_remap: bool,
}

/// What a completed rebuild produced.
#[derive(Debug, Default)]
pub struct RebuildSummary {
    pub pages_written: u64,
    pub blob_pages_written: usize,
    pub remap_entries: usize,
    pub cfg_written: bool,
}

impl RebuildOptions {
    fn check(&self) -> Result<(), IbxError> {
        if self.target_sdi_json.is_some() && self.source_sdi_json.is_none() {
            return Err(IbxError::Argument(
                "--target-sdi-json requires --sdi-json (source)".into(),
            ));
        }
        if self.use_target_sdi_root && self.use_source_sdi_root {
            return Err(IbxError::Argument(
                "--use-target-sdi-root and --use-source-sdi-root are mutually exclusive".into(),
            ));
        }
        if self.use_target_space_id && self.use_source_space_id {
            return Err(IbxError::Argument(
                "--use-target-space-id and --use-source-space-id are mutually exclusive".into(),
            ));
        }
        if self.cfg_out.is_some()
            && self.source_sdi_json.is_none()
            && self.target_sdi_json.is_none()
        {
            return Err(IbxError::Argument(
                "--cfg-out requires --sdi-json or --target-sdi-json".into(),
            ));
        }
        if self.validate_remap
            && (self.source_sdi_json.is_none() || self.target_sdi_json.is_none())
        {
            return Err(IbxError::Argument(
                "--validate-remap requires --sdi-json and --target-sdi-json".into(),
            ));
        }
        Ok(())
    }
}

/// Match indexes of both schemas by case-insensitive name; emit an entry for
/// every pair where both ids are nonzero and differ-able.
pub fn build_index_id_remap(source: &Schema, target: &Schema) -> HashMap<u64, u64> {
    let mut remap = HashMap::new();
    for src in &source.indexes {
        if src.id == 0 {
            continue;
        }
        let name = src.name.to_lowercase();
        if let Some(dst) = target
            .indexes
            .iter()
            .find(|t| t.id != 0 && t.name.to_lowercase() == name)
        {
            remap.insert(src.id, dst.id);
        }
    }
    remap
}

/// Parse an index-id map file: `source=target` or `source target` per line,
/// `#` starts a comment, blank lines are skipped.
pub fn load_index_id_map_file<P: AsRef<Path>>(path: P) -> Result<HashMap<u64, u64>, IbxError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| IbxError::Io(format!("cannot read {}: {}", path.display(), e)))?;

    let mut map = HashMap::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line
            .split(|c: char| c == '=' || c.is_whitespace())
            .filter(|p| !p.is_empty());
        let (Some(src), Some(dst)) = (parts.next(), parts.next()) else {
            return Err(IbxError::Parse(format!(
                "{}:{}: expected 'source_id=target_id'",
                path.display(),
                line_no + 1
            )));
        };
        let src: u64 = src.parse().map_err(|_| {
            IbxError::Parse(format!("{}:{}: bad source id", path.display(), line_no + 1))
        })?;
        let dst: u64 = dst.parse().map_err(|_| {
            IbxError::Parse(format!("{}:{}: bad target id", path.display(), line_no + 1))
        })?;
        map.insert(src, dst);
    }
    Ok(map)
}

/// Resolve a dictionary tablespace path against the data directory
/// environment (`MYSQL_DATADIR` / `IB_PARSER_DATADIR`).
fn resolve_tablespace_path(raw: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(raw);
    if direct.exists() {
        return Some(direct);
    }
    let datadir = std::env::var("MYSQL_DATADIR")
        .or_else(|_| std::env::var("IB_PARSER_DATADIR"))
        .ok()?;
    let trimmed = raw.strip_prefix("./").unwrap_or(raw);
    let joined = Path::new(&datadir).join(trimmed);
    joined.exists().then_some(joined)
}

/// Read `(version, root)` from another tablespace's page 0.
fn read_sdi_root_from_tablespace(path: &Path) -> Result<(u32, u32), IbxError> {
    let ts = Tablespace::open(path)?;
    let page0 = ts.read_page(0)?;
    sdi_root_from_page0(&page0, ts.fsp_flags())
        .ok_or_else(|| IbxError::Parse(format!("{} carries no SDI header", path.display())))
}

/// Clear the size-shift bits on page 0, relocate the SDI sub-header if its
/// offset changed, and rewrite the flags and space id. Returns the space id
/// and the new flags.
fn update_page0_for_uncompressed(
    page: &mut [u8],
    logical_size: usize,
    space_id_override: Option<u32>,
) -> Result<(u32, FspFlags), IbxError> {
    if logical_size != UNIV_PAGE_SIZE_ORIG {
        return Err(IbxError::UnsupportedPageSize(logical_size));
    }

    let space_id = match space_id_override {
        Some(id) => id,
        None => fsp_header_get_field(page, FSP_SPACE_ID),
    };
    if space_id == 0 || space_id == SPACE_UNKNOWN {
        return Err(IbxError::Parse(format!(
            "invalid space id in page 0 header: {}",
            space_id
        )));
    }

    let old_flags = FspFlags(fsp_header_get_field(page, FSP_SPACE_FLAGS));
    if !old_flags.is_valid() {
        return Err(IbxError::InvalidFspFlags(old_flags.raw()));
    }
    let new_flags = old_flags.cleared_for_uncompressed();

    let old_sdi_offset = old_flags.sdi_offset();
    let new_sdi_offset = new_flags.sdi_offset();
    if old_flags.has_sdi() && old_sdi_offset != new_sdi_offset {
        let sdi_version = codec::read_u32(page, old_sdi_offset);
        let sdi_root = codec::read_u32(page, old_sdi_offset + 4);
        if sdi_version != 0 {
            codec::write_u32(page, new_sdi_offset, sdi_version);
            codec::write_u32(page, new_sdi_offset + 4, sdi_root);
            codec::write_u32(page, old_sdi_offset, 0);
            codec::write_u32(page, old_sdi_offset + 4, 0);
        }
    }

    fsp_header_set_field(page, FSP_SPACE_FLAGS, new_flags.raw());
    fsp_header_set_field(page, FSP_SPACE_ID, space_id);

    Ok((space_id, new_flags))
}

/// Run the rebuild. With `validate_remap` set, only the computed remap is
/// reported and no output is written.
pub fn rebuild(input: &str, output: &str, opts: &RebuildOptions) -> Result<RebuildSummary, IbxError> {
    opts.check()?;

    let source_schema = opts
        .source_sdi_json
        .as_deref()
        .map(Schema::load)
        .transpose()?;
    let target_schema = opts
        .target_sdi_json
        .as_deref()
        .map(Schema::load)
        .transpose()?;

    // Index-id remap: schema-name matching, overridden by the map file.
    let mut index_id_remap = match (&source_schema, &target_schema) {
        (Some(src), Some(dst)) => build_index_id_remap(src, dst),
        _ => HashMap::new(),
    };
    if let Some(map_path) = &opts.index_id_map {
        for (src, dst) in load_index_id_map_file(map_path)? {
            if let Some(old) = index_id_remap.get(&src) {
                if *old != dst {
                    eprintln!(
                        "Warning: index-id map override for {} ({} -> {})",
                        src, old, dst
                    );
                }
            }
            index_id_remap.insert(src, dst);
        }
    }

    if opts.validate_remap {
        eprintln!("Index-id remap entries: {}", index_id_remap.len());
        let mut pairs: Vec<_> = index_id_remap.iter().collect();
        pairs.sort();
        for (src, dst) in pairs {
            println!("{}={}", src, dst);
        }
        return Ok(RebuildSummary {
            remap_entries: index_id_remap.len(),
            ..Default::default()
        });
    }

    let mut ts = Tablespace::open(input)?;
    let page_size = ts.page_size();
    if !page_size.is_compressed() {
        return Err(IbxError::Argument(
            "input tablespace does not appear compressed".into(),
        ));
    }
    if page_size.logical != UNIV_PAGE_SIZE_ORIG {
        return Err(IbxError::UnsupportedPageSize(page_size.logical));
    }
    if ts.file_size() % page_size.physical as u64 != 0 {
        return Err(IbxError::Parse(
            "file size is not a multiple of the physical page size".into(),
        ));
    }
    let num_pages = ts.page_count();

    // The SDI content comes from the target schema when supplied.
    let output_sdi_json = opts
        .target_sdi_json
        .as_deref()
        .or(opts.source_sdi_json.as_deref());
    let sdi_entries: Option<Vec<SdiEntry>> =
        output_sdi_json.map(load_sdi_entries).transpose()?;

    let sdi_blob_pool = if sdi_entries.is_some() {
        collect_sdi_blob_pages(&mut ts)?
    } else {
        Vec::new()
    };

    // Target SDI root: explicit override, then the target .ibd, then the
    // file named by the target schema's tablespace entry.
    let mut target_sdi_root: Option<u32> = opts.target_sdi_root;
    if target_sdi_root.is_none() {
        if let Some(target_ibd) = &opts.target_ibd {
            match read_sdi_root_from_tablespace(Path::new(target_ibd)) {
                Ok((version, root)) => {
                    eprintln!(
                        "Target SDI header: version={} root_page={} (file={})",
                        version, root, target_ibd
                    );
                    target_sdi_root = Some(root);
                }
                Err(e) => eprintln!("Warning: unable to read target SDI root: {}", e),
            }
        } else if let Some(target) = &target_schema {
            if let Some(file) = target
                .tablespace
                .as_ref()
                .and_then(|t| t.files.first())
                .map(|f| f.filename.clone())
            {
                match resolve_tablespace_path(&file) {
                    Some(path) => match read_sdi_root_from_tablespace(&path) {
                        Ok((version, root)) => {
                            eprintln!(
                                "Target SDI header: version={} root_page={} (file={})",
                                version,
                                root,
                                path.display()
                            );
                            target_sdi_root = Some(root);
                        }
                        Err(e) => eprintln!("Warning: unable to read target SDI root: {}", e),
                    },
                    None => eprintln!(
                        "Warning: target SDI root lookup skipped (cannot resolve '{}'). \
                         Set MYSQL_DATADIR, use --target-ibd, or pass --target-sdi-root.",
                        file
                    ),
                }
            }
        }
    }
    if opts.use_target_sdi_root && target_sdi_root.is_none() {
        return Err(IbxError::Argument(
            "--use-target-sdi-root requires target SDI root data".into(),
        ));
    }

    // Space id election.
    let space_id_override: Option<u32> = if let Some(id) = opts.target_space_id {
        Some(id)
    } else if opts.use_target_space_id {
        let id = target_schema
            .as_ref()
            .and_then(|t| t.tablespace.as_ref())
            .and_then(|t| parse_kv_string(&t.se_private_data).get("id").cloned())
            .and_then(|v| v.parse().ok());
        if id.is_none() {
            return Err(IbxError::Argument(
                "--use-target-space-id requires a target tablespace id".into(),
            ));
        }
        id
    } else {
        None
    };

    if !index_id_remap.is_empty() {
        eprintln!("Index-id remap entries: {}", index_id_remap.len());
    }

    let mut out_file = File::create(output)
        .map_err(|e| IbxError::Io(format!("cannot create {}: {}", output, e)))?;

    let mut out_buf = vec![0u8; page_size.logical];
    let mut space_id: u32 = SPACE_UNKNOWN;
    let mut space_flags = FspFlags(0);
    let mut sdi_root_page: Option<u32> = None;
    let mut blob_alloc: Option<SdiBlobAllocator> = None;

    for page_no in 0..num_pages {
        let in_buf = ts.read_page(page_no)?;
        compression::decompress_page(&in_buf, page_size, &mut out_buf)?;

        if page_no == 0 {
            if sdi_entries.is_some() {
                let old_flags = FspFlags(fsp_header_get_field(&in_buf, FSP_SPACE_FLAGS));
                if !old_flags.has_sdi() {
                    return Err(IbxError::Parse(
                        "SDI JSON provided but the tablespace has no SDI flag".into(),
                    ));
                }
                let source_root = sdi_root_from_page0(&in_buf, old_flags).map(|(_, root)| root);

                let mut chosen = source_root;
                match (target_sdi_root, source_root) {
                    (Some(t), Some(s)) if t != s => {
                        eprintln!("Warning: SDI root mismatch (source={} target={})", s, t);
                        if opts.use_target_sdi_root {
                            eprintln!("         Using target SDI root page as requested.");
                            chosen = Some(t);
                        } else {
                            eprintln!("         Using source SDI root page (default).");
                        }
                    }
                    (Some(t), _) if opts.use_target_sdi_root => chosen = Some(t),
                    _ => {}
                }
                if opts.use_source_sdi_root {
                    chosen = source_root;
                }

                let root = chosen.filter(|&r| r != 0 && r != FIL_NULL && (r as u64) < num_pages);
                sdi_root_page = Some(root.ok_or(IbxError::SdiRootInvalid(chosen.unwrap_or(0)))?);
            }

            let (sid, flags) =
                update_page0_for_uncompressed(&mut out_buf, page_size.logical, space_id_override)?;
            space_id = sid;
            space_flags = flags;

            if let Some(root) = sdi_root_page {
                let sdi_offset = flags.sdi_offset();
                codec::write_u32(&mut out_buf, sdi_offset, SDI_VERSION);
                codec::write_u32(&mut out_buf, sdi_offset + 4, root);

                blob_alloc = Some(SdiBlobAllocator::new(
                    sdi_blob_pool.clone(),
                    page_size.logical,
                    space_id,
                ));
            }
        }

        if space_id == SPACE_UNKNOWN {
            return Err(IbxError::Parse(
                "space id not established after page 0".into(),
            ));
        }

        if let (Some(entries), Some(root)) = (&sdi_entries, sdi_root_page) {
            if page_no == root as u64 {
                // Keep the root's segment headers across reinitialization.
                let mut fseg = [0u8; 2 * FSEG_HEADER_SIZE];
                fseg[..FSEG_HEADER_SIZE].copy_from_slice(
                    &out_buf[FIL_PAGE_DATA + PAGE_BTR_SEG_LEAF
                        ..FIL_PAGE_DATA + PAGE_BTR_SEG_LEAF + FSEG_HEADER_SIZE],
                );
                fseg[FSEG_HEADER_SIZE..].copy_from_slice(
                    &out_buf[FIL_PAGE_DATA + PAGE_BTR_SEG_TOP
                        ..FIL_PAGE_DATA + PAGE_BTR_SEG_TOP + FSEG_HEADER_SIZE],
                );

                init_empty_sdi_page(&mut out_buf, page_size.logical, root);
                out_buf[FIL_PAGE_DATA + PAGE_BTR_SEG_LEAF
                    ..FIL_PAGE_DATA + PAGE_BTR_SEG_LEAF + FSEG_HEADER_SIZE]
                    .copy_from_slice(&fseg[..FSEG_HEADER_SIZE]);
                out_buf[FIL_PAGE_DATA + PAGE_BTR_SEG_TOP
                    ..FIL_PAGE_DATA + PAGE_BTR_SEG_TOP + FSEG_HEADER_SIZE]
                    .copy_from_slice(&fseg[FSEG_HEADER_SIZE..]);

                let usable = blob_alloc
                    .as_mut()
                    .filter(|a| !a.pool_is_empty());
                populate_sdi_root_page(
                    &mut out_buf,
                    page_size.logical,
                    entries,
                    usable,
                    space_id,
                )?;
            }
        }

        if !index_id_remap.is_empty() {
            let page_type = page_type_of(&out_buf);
            if page_type == PageType::Index || page_type == PageType::Rtree {
                let old_id = codec::read_u64(&out_buf, PAGE_HEADER + PAGE_INDEX_ID);
                if let Some(&new_id) = index_id_remap.get(&old_id) {
                    codec::write_u64(&mut out_buf, PAGE_HEADER + PAGE_INDEX_ID, new_id);
                }
            }
        }

        codec::write_u32(&mut out_buf, FIL_PAGE_ARCH_LOG_NO_OR_SPACE_ID, space_id);
        checksum::stamp_page_lsn_and_crc32(&mut out_buf, page_size.logical, 0);

        out_file
            .write_all(&out_buf)
            .map_err(|e| IbxError::Io(format!("cannot write page {}: {}", page_no, e)))?;

        if (page_no + 1) % 100 == 0 || page_no + 1 == num_pages {
            eprintln!(
                "[PROGRESS] Rebuilt {}/{} pages ({:.1}%)",
                page_no + 1,
                num_pages,
                100.0 * (page_no + 1) as f64 / num_pages as f64
            );
        }
    }

    // Phase 4: overwrite the pool slots with the synthesized blob pages.
    let mut blob_pages_written = 0;
    if let Some(alloc) = blob_alloc {
        let mut pages: Vec<_> = alloc.out_pages.into_iter().collect();
        pages.sort_by_key(|(page_no, _)| *page_no);
        for (page_no, page) in pages {
            let offset = page_no as u64 * page_size.logical as u64;
            out_file
                .seek(SeekFrom::Start(offset))
                .map_err(|e| IbxError::Io(format!("seek to blob page {}: {}", page_no, e)))?;
            out_file
                .write_all(&page)
                .map_err(|e| IbxError::Io(format!("write blob page {}: {}", page_no, e)))?;
            blob_pages_written += 1;
        }
    }
    out_file
        .flush()
        .map_err(|e| IbxError::Io(format!("flush {}: {}", output, e)))?;

    // Phase 5: cfg sidecar.
    let mut cfg_written = false;
    if let Some(cfg_out) = &opts.cfg_out {
        let schema = target_schema
            .as_ref()
            .or(source_schema.as_ref())
            .ok_or_else(|| IbxError::Argument("--cfg-out requires SDI JSON metadata".into()))?;
        if space_flags.has_sdi() && sdi_root_page.is_none() {
            return Err(IbxError::CfgWrite(
                "SDI root page not established for cfg output".into(),
            ));
        }
        let table = cfg::build_cfg_table(
            schema,
            space_flags,
            sdi_root_page.unwrap_or(FIL_NULL),
            space_id,
        )?;
        cfg::write_cfg_file(cfg_out, &table)?;
        eprintln!("CFG written to: {}", cfg_out);
        cfg_written = true;
    }

    Ok(RebuildSummary {
        pages_written: num_pages,
        blob_pages_written,
        remap_entries: index_id_remap.len(),
        cfg_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::schema::test_support::sample_sdi_json;

    #[test]
    fn remap_by_name_case_insensitive() {
        let source = Schema::from_json(&sample_sdi_json()).unwrap();
        // Target: same shape, different ids.
        let target_json = sample_sdi_json()
            .replace("id=42;root=4", "id=4711;root=4")
            .replace("id=43;root=5", "id=4712;root=5");
        let target = Schema::from_json(&target_json).unwrap();

        let remap = build_index_id_remap(&source, &target);
        assert_eq!(remap.len(), 2);
        assert_eq!(remap[&42], 4711);
        assert_eq!(remap[&43], 4712);
    }

    #[test]
    fn map_file_formats() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "# comment\n42=4711\n43 4712\n\n  # trailing comment line\n44=9 # inline\n",
        )
        .unwrap();
        let map = load_index_id_map_file(tmp.path()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&42], 4711);
        assert_eq!(map[&43], 4712);
        assert_eq!(map[&44], 9);
    }

    #[test]
    fn map_file_rejects_garbage() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not-a-number=5\n").unwrap();
        assert!(load_index_id_map_file(tmp.path()).is_err());
    }

    #[test]
    fn option_combos_validated() {
        let mut opts = RebuildOptions {
            target_sdi_json: Some("t.json".into()),
            ..Default::default()
        };
        assert!(matches!(opts.check(), Err(IbxError::Argument(_))));

        opts.source_sdi_json = Some("s.json".into());
        assert!(opts.check().is_ok());

        opts.use_target_sdi_root = true;
        opts.use_source_sdi_root = true;
        assert!(opts.check().is_err());
    }

    #[test]
    fn page0_rewrite_clears_shifts_and_moves_sdi() {
        // Compressed flags: zip_ssize=4 (8K physical), SDI present.
        let flags = FspFlags(
            FSP_FLAGS_MASK_POST_ANTELOPE
                | FSP_FLAGS_MASK_ATOMIC_BLOBS
                | FSP_FLAGS_MASK_SDI
                | (4 << FSP_FLAGS_POS_ZIP_SSIZE),
        );
        let mut page = vec![0u8; UNIV_PAGE_SIZE_ORIG];
        fsp_header_set_field(&mut page, FSP_SPACE_ID, 23);
        fsp_header_set_field(&mut page, FSP_SPACE_FLAGS, flags.raw());
        let old_off = flags.sdi_offset();
        codec::write_u32(&mut page, old_off, 1);
        codec::write_u32(&mut page, old_off + 4, 3);

        let (space_id, new_flags) =
            update_page0_for_uncompressed(&mut page, UNIV_PAGE_SIZE_ORIG, None).unwrap();
        assert_eq!(space_id, 23);
        assert_eq!(new_flags.zip_ssize(), 0);
        assert_eq!(new_flags.page_ssize(), 0);
        assert!(new_flags.has_sdi());

        let new_off = new_flags.sdi_offset();
        assert_ne!(old_off, new_off);
        assert_eq!(codec::read_u32(&page, new_off), 1);
        assert_eq!(codec::read_u32(&page, new_off + 4), 3);
        assert_eq!(codec::read_u32(&page, old_off), 0);
        assert_eq!(codec::read_u32(&page, old_off + 4), 0);
    }

    #[test]
    fn page0_rewrite_rejects_bad_space_id() {
        let mut page = vec![0u8; UNIV_PAGE_SIZE_ORIG];
        fsp_header_set_field(&mut page, FSP_SPACE_ID, 0);
        assert!(update_page0_for_uncompressed(&mut page, UNIV_PAGE_SIZE_ORIG, None).is_err());
    }
}
