//! Mode 2: decompress a ROW_FORMAT=COMPRESSED tablespace.

use std::fs::File;
use std::io::Write;

use colored::Colorize;

use crate::innodb::compression::{self, PageTransform};
use crate::innodb::tablespace::Tablespace;
use crate::IbxError;

pub struct DecompressOptions {
    pub input: String,
    pub output: String,
}

pub fn execute(opts: &DecompressOptions) -> Result<(), IbxError> {
    let mut ts = Tablespace::open(&opts.input)?;
    let page_size = ts.page_size();
    let num_pages = ts.page_count();

    let mut out = File::create(&opts.output)
        .map_err(|e| IbxError::Io(format!("cannot create {}: {}", opts.output, e)))?;

    eprintln!(
        "{}",
        format!(
            "Decompressing {} ({} pages, physical {} / logical {}, ratio {:.2}:1)",
            opts.input,
            num_pages,
            page_size.physical,
            page_size.logical,
            page_size.logical as f64 / page_size.physical as f64
        )
        .bold()
    );

    let mut logical_buf = vec![0u8; page_size.logical];
    let mut pages_decompressed: u64 = 0;
    let mut pages_failed: u64 = 0;

    ts.for_each_page(|page_no, raw| {
        match compression::decompress_page(raw, page_size, &mut logical_buf) {
            Ok((transform, actual)) => {
                if transform == PageTransform::Decompressed {
                    pages_decompressed += 1;
                }
                if transform == PageTransform::RtreeFallback {
                    eprintln!(
                        "Warning: page {}: RTREE inflate failed, copied as stored",
                        page_no
                    );
                }
                out.write_all(&logical_buf[..actual])
                    .map_err(|e| IbxError::Io(format!("cannot write page {}: {}", page_no, e)))?;
            }
            Err(e) => {
                eprintln!("Warning: page {}: {} (copied as stored)", page_no, e);
                pages_failed += 1;
                out.write_all(raw)
                    .map_err(|e| IbxError::Io(format!("cannot write page {}: {}", page_no, e)))?;
            }
        }

        if (page_no + 1) % 100 == 0 || page_no + 1 == num_pages {
            eprintln!(
                "[PROGRESS] Processed {}/{} pages ({:.1}%)",
                page_no + 1,
                num_pages,
                100.0 * (page_no + 1) as f64 / num_pages as f64
            );
        }
        Ok(())
    })?;

    out.flush()
        .map_err(|e| IbxError::Io(format!("flush {}: {}", opts.output, e)))?;

    eprintln!(
        "{}",
        format!(
            "Done. Pages: {}, decompressed: {}, failed: {}",
            num_pages, pages_decompressed, pages_failed
        )
        .green()
        .bold()
    );
    if page_size.is_compressed() {
        eprintln!(
            "Note: INDEX/RTREE/SDI pages were inflated to {} bytes; metadata pages \
             stay at {} bytes, so the output mixes page sizes.",
            page_size.logical, page_size.physical
        );
    }
    Ok(())
}
