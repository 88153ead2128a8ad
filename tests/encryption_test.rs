//! End-to-end decryption (modes 1 and 4).

mod common;

use common::*;
use ibx::cli::decompress::{execute as decompress, DecompressOptions};
use ibx::cli::decrypt::{execute as decrypt, DecryptOptions};

const MASTER_KEY_ID: u32 = 7;
const UUID: &str = "abcdefab-1234-5678-9abc-def012345678";

struct Fixture {
    plain: tempfile::NamedTempFile,
    encrypted: tempfile::NamedTempFile,
    keyring: tempfile::NamedTempFile,
}

/// A compressed tablespace in two variants: plaintext, and with the leaf
/// page AES-encrypted plus the wrapped key+IV installed on page 0.
fn build_fixture() -> Fixture {
    let ps = compressed_page_size();
    let master_key = [0xA7u8; 32];
    let ts_key = [0x42u8; 32];
    let ts_iv = [0x13u8; 32];

    let mut page0 = build_page0(ps.physical, compressed_flags(), 2, None);
    install_encryption_info(
        &mut page0,
        compressed_flags(),
        &master_key,
        &ts_key,
        &ts_iv,
        MASTER_KEY_ID,
        UUID,
    );

    let mut leaf = init_index_leaf(ps.logical, 1, 42);
    write_primary_rows(&mut leaf, &[PrimaryRow::new(1, "abc"), PrimaryRow::new(2, "de")]);
    let leaf_compressed = compress(&leaf, ps);

    let plain = write_tablespace_file(&[page0.clone(), leaf_compressed.clone()]);

    let mut leaf_encrypted = leaf_compressed;
    encrypt_page(&mut leaf_encrypted, ps.physical, &ts_key, &ts_iv);
    let encrypted = write_tablespace_file(&[page0, leaf_encrypted]);

    let keyring = build_keyring_file(UUID, MASTER_KEY_ID, &master_key);

    Fixture {
        plain,
        encrypted,
        keyring,
    }
}

#[test]
fn decrypt_restores_plaintext_file() {
    let fixture = build_fixture();
    let output = tempfile::NamedTempFile::new().unwrap();

    decrypt(&DecryptOptions {
        master_key_id: MASTER_KEY_ID,
        server_uuid: UUID.to_string(),
        keyring_path: fixture.keyring.path().to_str().unwrap().to_string(),
        input: fixture.encrypted.path().to_str().unwrap().to_string(),
        output: output.path().to_str().unwrap().to_string(),
        and_decompress: false,
    })
    .unwrap();

    let decrypted = std::fs::read(output.path()).unwrap();
    let plain = std::fs::read(fixture.plain.path()).unwrap();
    assert_eq!(decrypted, plain);
}

#[test]
fn decrypt_then_decompress_matches_decompress_of_plain() {
    let fixture = build_fixture();

    let mode4_out = tempfile::NamedTempFile::new().unwrap();
    decrypt(&DecryptOptions {
        master_key_id: MASTER_KEY_ID,
        server_uuid: UUID.to_string(),
        keyring_path: fixture.keyring.path().to_str().unwrap().to_string(),
        input: fixture.encrypted.path().to_str().unwrap().to_string(),
        output: mode4_out.path().to_str().unwrap().to_string(),
        and_decompress: true,
    })
    .unwrap();

    let mode2_out = tempfile::NamedTempFile::new().unwrap();
    decompress(&DecompressOptions {
        input: fixture.plain.path().to_str().unwrap().to_string(),
        output: mode2_out.path().to_str().unwrap().to_string(),
    })
    .unwrap();

    assert_eq!(
        std::fs::read(mode4_out.path()).unwrap(),
        std::fs::read(mode2_out.path()).unwrap()
    );
}

#[test]
fn wrong_keyring_fails_before_writing() {
    let fixture = build_fixture();
    let wrong_master = [0x55u8; 32];
    let wrong_keyring = build_keyring_file(UUID, MASTER_KEY_ID, &wrong_master);
    let output = tempfile::NamedTempFile::new().unwrap();

    let result = decrypt(&DecryptOptions {
        master_key_id: MASTER_KEY_ID,
        server_uuid: UUID.to_string(),
        keyring_path: wrong_keyring.path().to_str().unwrap().to_string(),
        input: fixture.encrypted.path().to_str().unwrap().to_string(),
        output: output.path().to_str().unwrap().to_string(),
        and_decompress: false,
    });
    assert!(matches!(
        result,
        Err(ibx::IbxError::WrappedCrcMismatch { .. })
    ));
}

#[test]
fn missing_master_key_is_reported() {
    let fixture = build_fixture();
    let output = tempfile::NamedTempFile::new().unwrap();

    let result = decrypt(&DecryptOptions {
        master_key_id: 99,
        server_uuid: UUID.to_string(),
        keyring_path: fixture.keyring.path().to_str().unwrap().to_string(),
        input: fixture.encrypted.path().to_str().unwrap().to_string(),
        output: output.path().to_str().unwrap().to_string(),
        and_decompress: false,
    });
    assert!(matches!(result, Err(ibx::IbxError::MasterKeyMissing(_))));
}
