//! Mode 5: rebuild to uncompressed.

use colored::Colorize;

use crate::innodb::rebuild::{rebuild, RebuildOptions};
use crate::IbxError;

pub fn execute(input: &str, output: &str, opts: &RebuildOptions) -> Result<(), IbxError> {
    if opts.validate_remap {
        let summary = rebuild(input, output, opts)?;
        eprintln!(
            "{}",
            format!("Remap validated: {} entries", summary.remap_entries).green()
        );
        return Ok(());
    }

    eprintln!("{}", format!("Rebuilding {} -> {}", input, output).bold());
    let summary = rebuild(input, output, opts)?;
    eprintln!(
        "{}",
        format!(
            "Done. Pages written: {}, SDI blob pages: {}, remap entries: {}{}",
            summary.pages_written,
            summary.blob_pages_written,
            summary.remap_entries,
            if summary.cfg_written { ", cfg written" } else { "" }
        )
        .green()
        .bold()
    );
    Ok(())
}
