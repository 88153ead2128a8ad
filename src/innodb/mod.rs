//! InnoDB on-disk format engine.
//!
//! This module implements the four transforms the `ibx` binary exposes:
//! page-level decryption, page-level decompression, record extraction over
//! the COMPACT row format (with external LOB reassembly), and the rebuild of
//! a compressed tablespace into an uncompressed one with re-synthesized SDI
//! pages and regenerated checksums.
//!
//! Start with [`tablespace::Tablespace`] to open a `.ibd` file; the page-size
//! probe runs on open and yields the physical/logical split everything else
//! depends on.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | Big-endian 1..8-byte integer reads/writes, sign-flip decode |
//! | [`checksum`] | CRC-32C page checksum calculation and stamping |
//! | [`constants`] | Offsets and limits from the MySQL source headers |
//! | [`page_types`] | Page type enum mapping `u16` codes to names |
//! | [`page`] | FIL header/trailer, FSP header and flags |
//! | [`tablespace`] | Page-size probe, positional page reads, page iteration |
//! | [`xdes`] | Extent descriptor bitmaps and the free-page check |
//! | [`keyring`] | MySQL `keyring_file` plugin format reader |
//! | [`encryption`] | Wrapped-key blob parsing from page 0 |
//! | [`decryption`] | AES-256-ECB key unwrap + AES-256-CBC page transform |
//! | [`compression`] | Per-page zlib decompression policy |
//! | [`record`] | COMPACT record headers, chain walk, offset computation |
//! | [`field_decode`] | Typed field formatting (ints, temporals, DECIMAL, ...) |
//! | [`schema`] | `sdi.json` schema loader, row layouts, index selection |
//! | [`lob`] | External reference handling across the four LOB chain formats |
//! | [`sdi`] | SDI B-tree reading and SDI-BLOB reassembly |
//! | [`rebuild`] | Rebuild-to-uncompressed pipeline |
//! | [`cfg`] | `.cfg` (v7) sidecar builder and writer |
//! | [`export`] | Row sinks: pipe, CSV, JSONL |

pub mod cfg;
pub mod checksum;
pub mod codec;
pub mod compression;
pub mod constants;
pub mod decryption;
pub mod encryption;
pub mod export;
pub mod field_decode;
pub mod keyring;
pub mod lob;
pub mod page;
pub mod page_types;
pub mod record;
pub mod rebuild;
pub mod schema;
pub mod sdi;
pub mod tablespace;
pub mod xdes;
