use clap::Parser;
use std::process;

use ibx::cli;
use ibx::cli::app::{Cli, ColorMode, Commands};
use ibx::innodb::rebuild::RebuildOptions;

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {} // colored auto-detects tty
    }

    let result = match cli.command {
        Commands::Decrypt {
            master_key_id,
            server_uuid,
            keyring_path,
            input,
            output,
        } => cli::decrypt::execute(&cli::decrypt::DecryptOptions {
            master_key_id,
            server_uuid,
            keyring_path,
            input,
            output,
            and_decompress: false,
        }),

        Commands::Decompress { input, output } => {
            cli::decompress::execute(&cli::decompress::DecompressOptions { input, output })
        }

        Commands::Extract {
            input,
            schema_json,
            index,
            list_indexes,
            format,
            output,
            with_meta,
            lob_max_bytes,
        } => cli::extract::execute(&cli::extract::ExtractOptions {
            input,
            schema_json,
            index,
            list_indexes,
            format,
            output,
            with_meta,
            lob_max_bytes,
        }),

        Commands::DecryptDecompress {
            master_key_id,
            server_uuid,
            keyring_path,
            input,
            output,
        } => cli::decrypt::execute(&cli::decrypt::DecryptOptions {
            master_key_id,
            server_uuid,
            keyring_path,
            input,
            output,
            and_decompress: true,
        }),

        Commands::Rebuild {
            input,
            output,
            sdi_json,
            target_sdi_json,
            index_id_map,
            cfg_out,
            target_sdi_root,
            use_target_sdi_root,
            use_source_sdi_root,
            target_space_id,
            use_target_space_id,
            use_source_space_id,
            target_ibd,
            validate_remap,
        } => cli::rebuild::execute(
            &input,
            &output,
            &RebuildOptions {
                source_sdi_json: sdi_json,
                target_sdi_json,
                index_id_map,
                cfg_out,
                target_sdi_root,
                use_target_sdi_root,
                use_source_sdi_root,
                target_space_id,
                use_target_space_id,
                use_source_space_id,
                target_ibd,
                validate_remap,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
