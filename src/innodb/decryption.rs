//! Tablespace page decryption.
//!
//! Two-tier key schedule: the keyring-stored master key AES-256-ECB-unwraps
//! the per-tablespace key + IV from page 0; each page body is then
//! AES-256-CBC. The engine leaves the 38-byte FIL header and the 8-byte
//! trailer in clear, and only the block-aligned portion of the body is
//! ciphered. Encrypted pages carry type 15/16/17 with the original type
//! saved at byte 26.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyInit, KeyIvInit};
use aes::Aes256;

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::encryption::EncryptionInfo;
use crate::innodb::keyring::Keyring;
use crate::innodb::page_types::PageType;
use crate::IbxError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// The unwrapped per-tablespace key and IV.
pub struct TablespaceKey {
    key: [u8; ENCRYPTION_KEY_LEN],
    iv: [u8; ENCRYPTION_KEY_LEN],
}

impl TablespaceKey {
    /// Unwrap the key+IV with a 32-byte master key and verify the inner CRC.
    pub fn unwrap(info: &EncryptionInfo, master_key: &[u8; 32]) -> Result<Self, IbxError> {
        let mut plain = info.wrapped_key_iv;
        let decryptor = Aes256EcbDec::new_from_slice(master_key)
            .map_err(|e| IbxError::Cipher(format!("AES-256-ECB init: {}", e)))?;
        decryptor
            .decrypt_padded_mut::<NoPadding>(&mut plain)
            .map_err(|e| IbxError::Cipher(format!("AES-256-ECB decrypt: {}", e)))?;

        let computed = crc32c::crc32c(&plain);
        if computed != info.checksum {
            return Err(IbxError::WrappedCrcMismatch {
                computed,
                stored: info.checksum,
            });
        }

        let mut key = [0u8; ENCRYPTION_KEY_LEN];
        let mut iv = [0u8; ENCRYPTION_KEY_LEN];
        key.copy_from_slice(&plain[..ENCRYPTION_KEY_LEN]);
        iv.copy_from_slice(&plain[ENCRYPTION_KEY_LEN..]);
        Ok(TablespaceKey { key, iv })
    }

    /// Look up the master key in the keyring, then unwrap.
    pub fn from_keyring(info: &EncryptionInfo, keyring: &Keyring) -> Result<Self, IbxError> {
        let master_key = keyring.innodb_master_key(&info.server_uuid, info.master_key_id)?;
        Self::unwrap(info, &master_key)
    }

    /// Decrypt one page in place. `physical_size` bounds the ciphered range;
    /// in compressed tablespaces only the physical block is encrypted.
    ///
    /// Returns `Ok(true)` if the page carried an encrypted type and was
    /// transformed, `Ok(false)` if it needed no decryption.
    pub fn decrypt_page(&self, page: &mut [u8], physical_size: usize) -> Result<bool, IbxError> {
        if page.len() < physical_size {
            return Err(IbxError::ShortRead("page shorter than physical size".into()));
        }

        let page_type = PageType::from_u16(codec::read_u16(page, FIL_PAGE_TYPE));
        if !page_type.is_encrypted_type() {
            return Ok(false);
        }

        // The engine saves the pre-encryption type at byte 26.
        let original_type = codec::read_u16(page, FIL_PAGE_ORIGINAL_TYPE_V1);

        let start = SIZE_FIL_HEAD;
        let end = physical_size - SIZE_FIL_TRAILER;
        let body_len = end - start;
        if body_len < AES_BLOCK_SIZE {
            return Err(IbxError::Cipher("page body too small for AES".into()));
        }
        // The tail beyond the last full block stays as stored.
        let main_len = (body_len / AES_BLOCK_SIZE) * AES_BLOCK_SIZE;

        let iv: [u8; AES_BLOCK_SIZE] = self.iv[..AES_BLOCK_SIZE].try_into().unwrap();
        let decryptor = Aes256CbcDec::new_from_slices(&self.key, &iv)
            .map_err(|e| IbxError::Cipher(format!("AES-256-CBC init: {}", e)))?;
        decryptor
            .decrypt_padded_mut::<NoPadding>(&mut page[start..start + main_len])
            .map_err(|e| IbxError::Cipher(format!("AES-256-CBC decrypt: {}", e)))?;

        codec::write_u16(page, FIL_PAGE_TYPE, original_type);
        // The saved-type slot doubles as FIL_PAGE_FILE_FLUSH_LSN, which is
        // zero on every page but page 0; restore it.
        codec::write_u16(page, FIL_PAGE_ORIGINAL_TYPE_V1, 0);
        Ok(true)
    }
}
