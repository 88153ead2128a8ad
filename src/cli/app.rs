//! Top-level CLI definition for the `ibx` binary.
//!
//! The historical numeric surface (`ibx <mode> ...`, mode 1..5) is kept via
//! visible aliases on each subcommand.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ibx")]
#[command(about = "InnoDB tablespace transform and salvage toolkit")]
#[command(version)]
pub struct Cli {
    /// Control colored output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Commands,
}

/// Controls when colored output is emitted.
#[derive(Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

/// Available subcommands (modes 1-5).
#[derive(Subcommand)]
pub enum Commands {
    /// Decrypt an encrypted tablespace into a new file (mode 1)
    ///
    /// Unwraps the per-tablespace AES key+IV stored on page 0 with the
    /// keyring master key `INNODBKey-{server_uuid}-{master_key_id}`, then
    /// decrypts every page body. The FIL header and trailer of each page
    /// are stored in clear and pass through unchanged.
    #[command(visible_alias = "1")]
    Decrypt {
        /// Master key id from the encryption header
        master_key_id: u32,
        /// Server UUID the master key was registered under
        server_uuid: String,
        /// Path to the MySQL keyring_file
        keyring_path: String,
        /// Input .ibd file
        input: String,
        /// Output file
        output: String,
    },

    /// Decompress a ROW_FORMAT=COMPRESSED tablespace (mode 2)
    ///
    /// INDEX, RTREE, and SDI pages inflate to the logical page size; all
    /// other pages pass through at physical size, so the output mixes page
    /// sizes exactly the way the on-disk format stores them.
    #[command(visible_alias = "2")]
    Decompress {
        /// Input .ibd file
        input: String,
        /// Output file
        output: String,
    },

    /// Extract typed rows from an index (mode 3)
    ///
    /// Walks the leaf pages of the selected index (PRIMARY by default)
    /// using the schema descriptor JSON, reassembles externally stored
    /// column values, and emits one record per line.
    #[command(visible_alias = "3")]
    Extract {
        /// Input .ibd file
        input: String,
        /// Schema descriptor (ibd2sdi JSON)
        schema_json: String,

        /// Select an index by name or numeric id (default: PRIMARY)
        #[arg(long)]
        index: Option<String>,

        /// List the schema's indexes and exit
        #[arg(long)]
        list_indexes: bool,

        /// Output format
        #[arg(long, default_value = "pipe")]
        format: String,

        /// Write records to a file instead of stdout
        #[arg(long)]
        output: Option<String>,

        /// Prefix each record with (page_no, rec_offset, rec_deleted)
        #[arg(long)]
        with_meta: bool,

        /// Cap per-value external (LOB) reads at this many bytes
        #[arg(long, default_value_t = crate::cli::extract::DEFAULT_LOB_MAX_BYTES)]
        lob_max_bytes: usize,
    },

    /// Decrypt, then decompress, in a single pass (mode 4)
    #[command(name = "decrypt-decompress", visible_alias = "4")]
    DecryptDecompress {
        /// Master key id from the encryption header
        master_key_id: u32,
        /// Server UUID the master key was registered under
        server_uuid: String,
        /// Path to the MySQL keyring_file
        keyring_path: String,
        /// Input .ibd file
        input: String,
        /// Output file
        output: String,
    },

    /// Rebuild a compressed tablespace as uncompressed 16 KiB pages (mode 5)
    ///
    /// Decompresses every page to the logical size, clears the size bits in
    /// the FSP flags, re-synthesizes the SDI root and its blob chains from
    /// the schema JSON, optionally remaps index ids to a target schema, and
    /// stamps fresh checksums. With --cfg-out, emits the import descriptor.
    #[command(visible_alias = "5")]
    Rebuild {
        /// Input .ibd file (must be compressed, 16 KiB logical pages)
        input: String,
        /// Output file
        output: String,

        /// Source schema JSON (SDI of the input tablespace)
        #[arg(long = "sdi-json")]
        sdi_json: Option<String>,

        /// Target schema JSON (SDI of the destination server's table)
        #[arg(long = "target-sdi-json")]
        target_sdi_json: Option<String>,

        /// Index-id map file (lines of `source_id=target_id`)
        #[arg(long = "index-id-map")]
        index_id_map: Option<String>,

        /// Emit a v7 .cfg import descriptor
        #[arg(long = "cfg-out")]
        cfg_out: Option<String>,

        /// Explicit target SDI root page number
        #[arg(long = "target-sdi-root")]
        target_sdi_root: Option<u32>,

        /// Stamp the target's SDI root into the output header
        #[arg(long = "use-target-sdi-root")]
        use_target_sdi_root: bool,

        /// Keep the source's SDI root (the default)
        #[arg(long = "use-source-sdi-root")]
        use_source_sdi_root: bool,

        /// Explicit target space id
        #[arg(long = "target-space-id")]
        target_space_id: Option<u32>,

        /// Stamp the target schema's space id into every page
        #[arg(long = "use-target-space-id")]
        use_target_space_id: bool,

        /// Keep the source's space id (the default)
        #[arg(long = "use-source-space-id")]
        use_source_space_id: bool,

        /// Read the target SDI root directly from this .ibd
        #[arg(long = "target-ibd")]
        target_ibd: Option<String>,

        /// Print the computed index-id remap and exit without writing
        #[arg(long = "validate-remap")]
        validate_remap: bool,
    },
}
