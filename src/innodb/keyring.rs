//! MySQL `keyring_file` plugin format reader.
//!
//! The legacy binary keyring serializes each key with five little-endian u64
//! length prefixes followed by the id/type/user strings and the
//! XOR-obfuscated key bytes; the file ends with a SHA-256 digest over
//! everything before it. The toolkit only ever asks it one question: the
//! 32-byte master key for `INNODBKey-{server_uuid}-{key_id}`.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::IbxError;

/// XOR obfuscation pad used by the plugin.
const OBFUSCATE_KEY: &[u8] = b"*305=Ljt0*!@$Hnm(*-9-w;:";

/// A single de-obfuscated keyring entry.
#[derive(Debug, Clone)]
pub struct KeyringEntry {
    pub key_id: String,
    pub key_type: String,
    pub user_id: String,
    pub key_data: Vec<u8>,
}

/// A parsed keyring file.
#[derive(Debug)]
pub struct Keyring {
    entries: Vec<KeyringEntry>,
}

impl Keyring {
    /// Load a keyring file, verifying the trailing SHA-256 digest.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IbxError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| IbxError::Io(format!("cannot read keyring {}: {}", path.display(), e)))?;

        if data.len() < 32 {
            return Err(IbxError::Parse(
                "keyring file too small to hold a SHA-256 digest".into(),
            ));
        }

        let (content, stored_digest) = data.split_at(data.len() - 32);
        let digest = Sha256::digest(content);
        if digest.as_slice() != stored_digest {
            return Err(IbxError::Parse(
                "keyring SHA-256 digest mismatch (file corrupt?)".into(),
            ));
        }

        Ok(Keyring {
            entries: parse_entries(content),
        })
    }

    pub fn find_key(&self, key_id: &str) -> Option<&KeyringEntry> {
        self.entries.iter().find(|e| e.key_id == key_id)
    }

    /// Look up the InnoDB master key `INNODBKey-{server_uuid}-{key_id}` and
    /// require the 32-byte length the page decryptor needs.
    pub fn innodb_master_key(&self, server_uuid: &str, key_id: u32) -> Result<[u8; 32], IbxError> {
        let full_id = format!("INNODBKey-{}-{}", server_uuid, key_id);
        let entry = self
            .find_key(&full_id)
            .ok_or_else(|| IbxError::MasterKeyMissing(full_id.clone()))?;
        entry.key_data.as_slice().try_into().map_err(|_| {
            IbxError::Parse(format!(
                "master key {} has length {}, expected 32",
                full_id,
                entry.key_data.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn deobfuscate(data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= OBFUSCATE_KEY[i % OBFUSCATE_KEY.len()];
    }
}

fn read_le_u64(data: &[u8]) -> u64 {
    u64::from_le_bytes(data[..8].try_into().unwrap())
}

fn parse_entries(mut data: &[u8]) -> Vec<KeyringEntry> {
    let mut entries = Vec::new();

    // [pod_size][key_id_len][key_type_len][user_id_len][key_len] then the
    // four payloads back to back; sizes are little-endian u64.
    while data.len() >= 40 {
        let pod_size = read_le_u64(&data[0..8]) as usize;
        let key_id_len = read_le_u64(&data[8..16]) as usize;
        let key_type_len = read_le_u64(&data[16..24]) as usize;
        let user_id_len = read_le_u64(&data[24..32]) as usize;
        let key_len = read_le_u64(&data[32..40]) as usize;

        let entry_size = 40 + key_id_len + key_type_len + user_id_len + key_len;
        if pod_size == 0 || entry_size > data.len() {
            break;
        }

        let mut offset = 40;
        let key_id = String::from_utf8_lossy(&data[offset..offset + key_id_len]).into_owned();
        offset += key_id_len;
        let key_type = String::from_utf8_lossy(&data[offset..offset + key_type_len]).into_owned();
        offset += key_type_len;
        let user_id = String::from_utf8_lossy(&data[offset..offset + user_id_len]).into_owned();
        offset += user_id_len;

        let mut key_data = data[offset..offset + key_len].to_vec();
        deobfuscate(&mut key_data);

        entries.push(KeyringEntry {
            key_id,
            key_type,
            user_id,
            key_data,
        });

        data = &data[entry_size..];
    }

    entries
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Serialize a keyring entry the way the plugin writes it.
    pub fn build_entry(key_id: &str, key_type: &str, user_id: &str, key_data: &[u8]) -> Vec<u8> {
        let mut obfuscated = key_data.to_vec();
        deobfuscate(&mut obfuscated);

        let pod_size = 40 + key_id.len() + key_type.len() + user_id.len() + key_data.len();
        let mut entry = Vec::new();
        entry.extend_from_slice(&(pod_size as u64).to_le_bytes());
        entry.extend_from_slice(&(key_id.len() as u64).to_le_bytes());
        entry.extend_from_slice(&(key_type.len() as u64).to_le_bytes());
        entry.extend_from_slice(&(user_id.len() as u64).to_le_bytes());
        entry.extend_from_slice(&(key_data.len() as u64).to_le_bytes());
        entry.extend_from_slice(key_id.as_bytes());
        entry.extend_from_slice(key_type.as_bytes());
        entry.extend_from_slice(user_id.as_bytes());
        entry.extend_from_slice(&obfuscated);
        entry
    }

    /// Concatenate entries and append the SHA-256 digest.
    pub fn build_file(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut data: Vec<u8> = entries.iter().flatten().copied().collect();
        let digest = Sha256::digest(&data);
        data.extend_from_slice(&digest);
        data
    }
}
