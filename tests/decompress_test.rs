//! End-to-end decompress (mode 2) behavior.

mod common;

use common::*;
use ibx::cli::decompress::{execute, DecompressOptions};
use ibx::innodb::codec;
use ibx::innodb::constants::*;

#[test]
fn mixed_size_output_for_compressed_tablespace() {
    let ps = compressed_page_size();

    // page 0 (physical pass-through), one compressed INDEX leaf, one BLOB page
    let page0 = build_page0(ps.physical, compressed_flags(), 3, None);

    let mut leaf = init_index_leaf(ps.logical, 1, 42);
    write_primary_rows(&mut leaf, &[PrimaryRow::new(1, "abc"), PrimaryRow::new(2, "de")]);
    let leaf_compressed = compress(&leaf, ps);

    let blob = build_blob_page(ps.physical, 2, b"blob-payload", FIL_NULL);

    let input = write_tablespace_file(&[page0.clone(), leaf_compressed, blob.clone()]);
    let output = tempfile::NamedTempFile::new().unwrap();

    execute(&DecompressOptions {
        input: input.path().to_str().unwrap().to_string(),
        output: output.path().to_str().unwrap().to_string(),
    })
    .unwrap();

    let out = std::fs::read(output.path()).unwrap();
    // page 0 at physical size + INDEX at logical size + BLOB at physical size
    assert_eq!(out.len(), ps.physical + ps.logical + ps.physical);

    // page 0 bytes unchanged
    assert_eq!(&out[..ps.physical], &page0[..]);

    // the INDEX page inflated back to its logical image
    let inflated = &out[ps.physical..ps.physical + ps.logical];
    assert_eq!(inflated, &leaf[..]);
    assert_eq!(codec::read_u16(inflated, FIL_PAGE_TYPE), 17855);

    // the BLOB page passed through at physical size
    let blob_out = &out[ps.physical + ps.logical..];
    assert_eq!(blob_out, &blob[..]);
}

#[test]
fn uncompressed_tablespace_copies_through() {
    let ps = uncompressed_page_size();
    let page0 = build_page0(ps.physical, uncompressed_flags(), 2, None);
    let mut leaf = init_index_leaf(ps.logical, 1, 42);
    write_primary_rows(&mut leaf, &[PrimaryRow::new(7, "x")]);

    let input = write_tablespace_file(&[page0.clone(), leaf.clone()]);
    let output = tempfile::NamedTempFile::new().unwrap();

    execute(&DecompressOptions {
        input: input.path().to_str().unwrap().to_string(),
        output: output.path().to_str().unwrap().to_string(),
    })
    .unwrap();

    let out = std::fs::read(output.path()).unwrap();
    assert_eq!(out.len(), 2 * ps.physical);
    assert_eq!(&out[..ps.physical], &page0[..]);
    assert_eq!(&out[ps.physical..], &leaf[..]);
}
