//! Wrapped tablespace-key blob on page 0.
//!
//! Encrypted tablespaces store a small structure after the XDES array of
//! page 0: a 3-byte magic, the master key id, the server UUID, 64 bytes of
//! AES-256-ECB ciphertext wrapping the per-tablespace key (32 B) and IV
//! (32 B), and a CRC-32C of the decrypted 64 bytes. The known offsets are
//! 5270 for 8 KiB-physical (compressed) tablespaces and 10390 for
//! uncompressed 16 KiB pages.

use crate::innodb::codec;
use crate::innodb::constants::*;
use crate::innodb::page::FspFlags;
use crate::IbxError;

/// Parsed encryption info from page 0.
#[derive(Debug, Clone)]
pub struct EncryptionInfo {
    /// 1, 2 or 3 from the `lCA`/`lCB`/`lCC` magic.
    pub version: u8,
    pub master_key_id: u32,
    pub server_uuid: String,
    /// AES-256-ECB ciphertext of key(32) + iv(32).
    pub wrapped_key_iv: [u8; 2 * ENCRYPTION_KEY_LEN],
    /// CRC-32C over the decrypted 64 bytes.
    pub checksum: u32,
}

/// Wrapped-key blob offset for a tablespace: 5270 when compressed,
/// 10390 when not (equivalently, right after the XDES array).
pub fn encryption_info_offset(flags: FspFlags) -> usize {
    flags.encryption_offset()
}

impl EncryptionInfo {
    /// Parse the wrapped-key blob at `offset` in a page-0 buffer.
    pub fn parse(page0: &[u8], offset: usize) -> Result<Self, IbxError> {
        if page0.len() < offset + ENCRYPTION_INFO_SIZE {
            return Err(IbxError::ShortRead(format!(
                "page 0 too small for encryption info at offset {}",
                offset
            )));
        }
        let blob = &page0[offset..];

        let version = match &blob[..ENCRYPTION_MAGIC_SIZE] {
            m if m == ENCRYPTION_MAGIC_V1 => 1,
            m if m == ENCRYPTION_MAGIC_V2 => 2,
            m if m == ENCRYPTION_MAGIC_V3 => 3,
            m => {
                return Err(IbxError::BadMagic(format!(
                    "no encryption magic at offset {} (found {:02x?})",
                    offset, m
                )))
            }
        };

        let mut pos = ENCRYPTION_MAGIC_SIZE;
        let master_key_id = codec::read_u32(blob, pos);
        pos += 4;
        let server_uuid = String::from_utf8_lossy(&blob[pos..pos + ENCRYPTION_SERVER_UUID_LEN])
            .trim_end_matches('\0')
            .to_string();
        pos += ENCRYPTION_SERVER_UUID_LEN;
        let mut wrapped_key_iv = [0u8; 2 * ENCRYPTION_KEY_LEN];
        wrapped_key_iv.copy_from_slice(&blob[pos..pos + 2 * ENCRYPTION_KEY_LEN]);
        pos += 2 * ENCRYPTION_KEY_LEN;
        let checksum = codec::read_u32(blob, pos);

        Ok(EncryptionInfo {
            version,
            master_key_id,
            server_uuid,
            wrapped_key_iv,
            checksum,
        })
    }

    /// Serialize the blob back into a page-0 buffer (fixtures and tests).
    pub fn write(&self, page0: &mut [u8], offset: usize) {
        let magic: &[u8; 3] = match self.version {
            1 => ENCRYPTION_MAGIC_V1,
            2 => ENCRYPTION_MAGIC_V2,
            _ => ENCRYPTION_MAGIC_V3,
        };
        let blob = &mut page0[offset..];
        blob[..ENCRYPTION_MAGIC_SIZE].copy_from_slice(magic);
        let mut pos = ENCRYPTION_MAGIC_SIZE;
        codec::write_u32(blob, pos, self.master_key_id);
        pos += 4;
        let mut uuid = [0u8; ENCRYPTION_SERVER_UUID_LEN];
        let bytes = self.server_uuid.as_bytes();
        uuid[..bytes.len().min(ENCRYPTION_SERVER_UUID_LEN)]
            .copy_from_slice(&bytes[..bytes.len().min(ENCRYPTION_SERVER_UUID_LEN)]);
        blob[pos..pos + ENCRYPTION_SERVER_UUID_LEN].copy_from_slice(&uuid);
        pos += ENCRYPTION_SERVER_UUID_LEN;
        blob[pos..pos + 2 * ENCRYPTION_KEY_LEN].copy_from_slice(&self.wrapped_key_iv);
        pos += 2 * ENCRYPTION_KEY_LEN;
        codec::write_u32(blob, pos, self.checksum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        let info = EncryptionInfo {
            version: 3,
            master_key_id: 7,
            server_uuid: "abcdefab-1234-5678-9abc-def012345678".into(),
            wrapped_key_iv: [0x5A; 64],
            checksum: 0xDEAD_BEEF,
        };
        let mut page0 = vec![0u8; 16384];
        info.write(&mut page0, ENCRYPTION_OFFSET_UNCOMPRESSED_16K);

        let parsed = EncryptionInfo::parse(&page0, ENCRYPTION_OFFSET_UNCOMPRESSED_16K).unwrap();
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.master_key_id, 7);
        assert_eq!(parsed.server_uuid, info.server_uuid);
        assert_eq!(parsed.wrapped_key_iv, info.wrapped_key_iv);
        assert_eq!(parsed.checksum, 0xDEAD_BEEF);
    }

    #[test]
    fn bad_magic_rejected() {
        let page0 = vec![0u8; 16384];
        assert!(matches!(
            EncryptionInfo::parse(&page0, ENCRYPTION_OFFSET_UNCOMPRESSED_16K),
            Err(IbxError::BadMagic(_))
        ));
    }

    #[test]
    fn offsets_follow_flags() {
        use crate::innodb::page::FspFlags;
        let uncompressed = FspFlags(
            FSP_FLAGS_MASK_POST_ANTELOPE | (5 << FSP_FLAGS_POS_PAGE_SSIZE),
        );
        assert_eq!(
            encryption_info_offset(uncompressed),
            ENCRYPTION_OFFSET_UNCOMPRESSED_16K
        );
        let compressed = FspFlags(
            FSP_FLAGS_MASK_POST_ANTELOPE
                | FSP_FLAGS_MASK_ATOMIC_BLOBS
                | (4 << FSP_FLAGS_POS_ZIP_SSIZE),
        );
        assert_eq!(
            encryption_info_offset(compressed),
            ENCRYPTION_OFFSET_COMPRESSED_8K
        );
    }
}
