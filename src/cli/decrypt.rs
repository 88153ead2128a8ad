//! Modes 1 and 4: decrypt (and optionally decompress) a tablespace.

use std::fs::File;
use std::io::Write;

use colored::Colorize;

use crate::innodb::compression;
use crate::innodb::decryption::TablespaceKey;
use crate::innodb::encryption::EncryptionInfo;
use crate::innodb::keyring::Keyring;
use crate::innodb::tablespace::Tablespace;
use crate::IbxError;

pub struct DecryptOptions {
    pub master_key_id: u32,
    pub server_uuid: String,
    pub keyring_path: String,
    pub input: String,
    pub output: String,
    /// Mode 4: run the decompression transform after decryption.
    pub and_decompress: bool,
}

pub fn execute(opts: &DecryptOptions) -> Result<(), IbxError> {
    let keyring = Keyring::load(&opts.keyring_path)?;
    let master_key = keyring.innodb_master_key(&opts.server_uuid, opts.master_key_id)?;

    let mut ts = Tablespace::open(&opts.input)?;
    let page_size = ts.page_size();

    // The wrapped key+IV sit after the XDES array of page 0: offset 5270
    // for compressed tablespaces, 10390 for uncompressed.
    let page0 = ts.read_page(0)?;
    let info = EncryptionInfo::parse(&page0, ts.fsp_flags().encryption_offset())?;
    let key = TablespaceKey::unwrap(&info, &master_key)?;

    let mut out = File::create(&opts.output)
        .map_err(|e| IbxError::Io(format!("cannot create {}: {}", opts.output, e)))?;

    eprintln!(
        "{}",
        format!(
            "Decrypting {} ({} pages, physical {} / logical {})",
            opts.input,
            ts.page_count(),
            page_size.physical,
            page_size.logical
        )
        .bold()
    );

    let num_pages = ts.page_count();
    let mut pages_failed: u64 = 0;
    let mut page_buf = vec![0u8; page_size.physical];
    let mut logical_buf = vec![0u8; page_size.logical];

    ts.for_each_page(|page_no, raw| {
        page_buf.copy_from_slice(raw);

        if let Err(e) = key.decrypt_page(&mut page_buf, page_size.physical) {
            eprintln!("Warning: page {}: {} (copied as stored)", page_no, e);
            pages_failed += 1;
            page_buf.copy_from_slice(raw);
        }

        let written: &[u8] = if opts.and_decompress {
            match compression::decompress_page(&page_buf, page_size, &mut logical_buf) {
                Ok((_, actual)) => &logical_buf[..actual],
                Err(e) => {
                    eprintln!("Warning: page {}: {} (copied as stored)", page_no, e);
                    pages_failed += 1;
                    &page_buf
                }
            }
        } else {
            &page_buf
        };

        out.write_all(written)
            .map_err(|e| IbxError::Io(format!("cannot write page {}: {}", page_no, e)))?;

        if (page_no + 1) % 100 == 0 || page_no + 1 == num_pages {
            eprintln!("[PROGRESS] Processed {}/{} pages", page_no + 1, num_pages);
        }
        Ok(())
    })?;

    out.flush()
        .map_err(|e| IbxError::Io(format!("flush {}: {}", opts.output, e)))?;

    eprintln!(
        "{}",
        format!(
            "Done. Pages: {}, written: {}, failed: {}",
            num_pages, num_pages, pages_failed
        )
        .green()
        .bold()
    );
    Ok(())
}
