//! Standard Security Handler according to ISO 32000-1 7.6.3 and
//! ISO 32000-2 7.6.4 (revision 6)

#![allow(clippy::needless_range_loop)]

use rand::RngCore;
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::aes::{cbc_decrypt_no_padding, cbc_encrypt_no_padding, ecb_encrypt_block};
use super::rc4::rc4;
use super::Permissions;
use crate::error::{Result, ToolboxError};

/// Padding used in password processing
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Security handler revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityHandlerRevision {
    /// RC4 40-bit
    R2 = 2,
    /// RC4 up to 128-bit
    R3 = 3,
    /// Crypt filters, used here for AES-128
    R4 = 4,
    /// AES-256 with SHA-2 password hashing
    R6 = 6,
}

impl SecurityHandlerRevision {
    pub fn from_number(r: i64) -> Result<Self> {
        match r {
            2 => Ok(Self::R2),
            3 => Ok(Self::R3),
            4 => Ok(Self::R4),
            6 => Ok(Self::R6),
            other => Err(ToolboxError::UnsupportedEncryption(format!(
                "security handler revision {other}"
            ))),
        }
    }
}

/// Values of the encryption dictionary that take part in key derivation
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityValues {
    pub revision: SecurityHandlerRevision,
    /// File key length in bytes
    pub key_length: usize,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub oe: Vec<u8>,
    pub ue: Vec<u8>,
    pub perms: Vec<u8>,
    pub p: i32,
    pub encrypt_metadata: bool,
    /// First element of the trailer `/ID` array
    pub file_id: Vec<u8>,
}

/// Standard Security Handler
pub struct StandardSecurityHandler {
    revision: SecurityHandlerRevision,
    key_length: usize,
}

impl StandardSecurityHandler {
    pub fn rc4_40bit() -> Self {
        Self {
            revision: SecurityHandlerRevision::R2,
            key_length: 5,
        }
    }

    pub fn rc4_128bit() -> Self {
        Self {
            revision: SecurityHandlerRevision::R3,
            key_length: 16,
        }
    }

    pub fn aes_128() -> Self {
        Self {
            revision: SecurityHandlerRevision::R4,
            key_length: 16,
        }
    }

    pub fn aes_256() -> Self {
        Self {
            revision: SecurityHandlerRevision::R6,
            key_length: 32,
        }
    }

    pub fn for_values(values: &SecurityValues) -> Self {
        Self {
            revision: values.revision,
            key_length: values.key_length,
        }
    }

    pub fn revision(&self) -> SecurityHandlerRevision {
        self.revision
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    /// Pad or truncate password to 32 bytes (algorithm 2, step a)
    fn pad_password(password: &[u8]) -> [u8; 32] {
        let mut padded = [0u8; 32];
        let len = password.len().min(32);
        padded[..len].copy_from_slice(&password[..len]);
        if len < 32 {
            padded[len..].copy_from_slice(&PADDING[..32 - len]);
        }
        padded
    }

    /// Build the dictionary values for a new encryption, returning them with
    /// the file encryption key.
    pub fn create(
        &self,
        user_password: &str,
        owner_password: &str,
        permissions: Permissions,
        file_id: &[u8],
    ) -> Result<(SecurityValues, Vec<u8>)> {
        let owner_password = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };

        let mut values = SecurityValues {
            revision: self.revision,
            key_length: self.key_length,
            o: Vec::new(),
            u: Vec::new(),
            oe: Vec::new(),
            ue: Vec::new(),
            perms: Vec::new(),
            p: permissions.as_p_value(),
            encrypt_metadata: true,
            file_id: file_id.to_vec(),
        };

        if self.revision == SecurityHandlerRevision::R6 {
            let key = self.create_r6(&mut values, user_password, owner_password)?;
            return Ok((values, key));
        }

        values.o = self.compute_owner_hash(owner_password.as_bytes(), user_password.as_bytes());
        let key = self.compute_encryption_key(user_password.as_bytes(), &values);
        values.u = self.compute_user_hash(&key, &values.file_id);
        Ok((values, key))
    }

    /// Compute the `/O` entry (algorithm 3)
    pub fn compute_owner_hash(&self, owner_password: &[u8], user_password: &[u8]) -> Vec<u8> {
        let rc4_key = self.owner_rc4_key(owner_password);
        let user_pad = Self::pad_password(user_password);

        let mut result = rc4(&rc4_key, &user_pad);
        if self.revision >= SecurityHandlerRevision::R3 {
            for i in 1..=19u8 {
                let iter_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
                result = rc4(&iter_key, &result);
            }
        }
        result
    }

    fn owner_rc4_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let owner_pad = Self::pad_password(owner_password);
        let mut hash = md5::compute(owner_pad).to_vec();
        if self.revision >= SecurityHandlerRevision::R3 {
            for _ in 0..50 {
                hash = md5::compute(&hash).to_vec();
            }
        }
        hash.truncate(self.key_length);
        hash
    }

    /// Compute the file encryption key from a user password (algorithm 2)
    pub fn compute_encryption_key(&self, user_password: &[u8], values: &SecurityValues) -> Vec<u8> {
        let padded = Self::pad_password(user_password);

        let mut data = Vec::with_capacity(32 + values.o.len() + 4 + values.file_id.len() + 4);
        data.extend_from_slice(&padded);
        data.extend_from_slice(&values.o);
        data.extend_from_slice(&values.p.to_le_bytes());
        data.extend_from_slice(&values.file_id);
        if self.revision >= SecurityHandlerRevision::R4 && !values.encrypt_metadata {
            data.extend_from_slice(&[0xFF; 4]);
        }

        let mut hash = md5::compute(&data).to_vec();
        if self.revision >= SecurityHandlerRevision::R3 {
            for _ in 0..50 {
                hash = md5::compute(&hash[..self.key_length]).to_vec();
            }
        }
        hash.truncate(self.key_length);
        hash
    }

    /// Compute the `/U` entry (algorithms 4 and 5)
    pub fn compute_user_hash(&self, key: &[u8], file_id: &[u8]) -> Vec<u8> {
        if self.revision == SecurityHandlerRevision::R2 {
            return rc4(key, &PADDING);
        }

        let mut data = Vec::with_capacity(32 + file_id.len());
        data.extend_from_slice(&PADDING);
        data.extend_from_slice(file_id);
        let hash = md5::compute(&data);

        let mut result = rc4(key, &hash.0);
        for i in 1..=19u8 {
            let iter_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            result = rc4(&iter_key, &result);
        }
        // the remaining 16 bytes are arbitrary padding
        result.extend_from_slice(&PADDING[..16]);
        result
    }

    /// Try the password as user password, then as owner password.
    ///
    /// Returns the file encryption key on success.
    pub fn authenticate(&self, password: &str, values: &SecurityValues) -> Result<Option<Vec<u8>>> {
        if let Some(key) = self.authenticate_user(password.as_bytes(), values)? {
            return Ok(Some(key));
        }
        self.authenticate_owner(password.as_bytes(), values)
    }

    /// Algorithm 6 (revisions 2-4) and algorithm 11 (revision 6)
    pub fn authenticate_user(&self, password: &[u8], values: &SecurityValues) -> Result<Option<Vec<u8>>> {
        if self.revision == SecurityHandlerRevision::R6 {
            return self.authenticate_user_r6(password, values);
        }

        let key = self.compute_encryption_key(password, values);
        let u = self.compute_user_hash(&key, &values.file_id);
        let compare = if self.revision == SecurityHandlerRevision::R2 {
            32
        } else {
            16
        };
        if values.u.len() >= compare && u[..compare] == values.u[..compare] {
            Ok(Some(key))
        } else {
            Ok(None)
        }
    }

    /// Algorithm 7 (revisions 2-4) and algorithm 12 (revision 6)
    pub fn authenticate_owner(&self, password: &[u8], values: &SecurityValues) -> Result<Option<Vec<u8>>> {
        if self.revision == SecurityHandlerRevision::R6 {
            return self.authenticate_owner_r6(password, values);
        }

        let rc4_key = self.owner_rc4_key(password);
        let mut user_pad = values.o.clone();
        if self.revision == SecurityHandlerRevision::R2 {
            user_pad = rc4(&rc4_key, &user_pad);
        } else {
            for i in (0..=19u8).rev() {
                let iter_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
                user_pad = rc4(&iter_key, &user_pad);
            }
        }
        self.authenticate_user(&user_pad, values)
    }

    fn create_r6(
        &self,
        values: &mut SecurityValues,
        user_password: &str,
        owner_password: &str,
    ) -> Result<Vec<u8>> {
        let user = truncate_utf8_password(user_password);
        let owner = truncate_utf8_password(owner_password);

        let mut rng = rand::thread_rng();
        let mut file_key = vec![0u8; 32];
        rng.fill_bytes(&mut file_key);
        let mut salts = [0u8; 32];
        rng.fill_bytes(&mut salts);
        let (user_validation, rest) = salts.split_at(8);
        let (user_key_salt, rest) = rest.split_at(8);
        let (owner_validation, owner_key_salt) = rest.split_at(8);

        let zero_iv = [0u8; 16];

        let mut u = hash_r6(user, user_validation, &[])?.to_vec();
        u.extend_from_slice(user_validation);
        u.extend_from_slice(user_key_salt);
        let ue_key = hash_r6(user, user_key_salt, &[])?;
        values.ue = cbc_encrypt_no_padding(&ue_key, &zero_iv, &file_key)?;

        let mut o = hash_r6(owner, owner_validation, &u)?.to_vec();
        o.extend_from_slice(owner_validation);
        o.extend_from_slice(owner_key_salt);
        let oe_key = hash_r6(owner, owner_key_salt, &u)?;
        values.oe = cbc_encrypt_no_padding(&oe_key, &zero_iv, &file_key)?;

        values.u = u;
        values.o = o;

        let mut perms = [0u8; 16];
        perms[..4].copy_from_slice(&values.p.to_le_bytes());
        perms[4..8].copy_from_slice(&[0xFF; 4]);
        perms[8] = if values.encrypt_metadata { b'T' } else { b'F' };
        perms[9..12].copy_from_slice(b"adb");
        rng.fill_bytes(&mut perms[12..]);
        values.perms = ecb_encrypt_block(&file_key, &perms)?.to_vec();

        Ok(file_key)
    }

    fn authenticate_user_r6(&self, password: &[u8], values: &SecurityValues) -> Result<Option<Vec<u8>>> {
        if values.u.len() < 48 || values.ue.len() < 32 {
            return Err(ToolboxError::InvalidStructure(
                "revision 6 /U or /UE entry too short".to_string(),
            ));
        }
        let password = &password[..password.len().min(127)];
        let hash = hash_r6(password, &values.u[32..40], &[])?;
        if hash[..] != values.u[..32] {
            return Ok(None);
        }
        let key = hash_r6(password, &values.u[40..48], &[])?;
        cbc_decrypt_no_padding(&key, &[0u8; 16], &values.ue[..32]).map(Some)
    }

    fn authenticate_owner_r6(&self, password: &[u8], values: &SecurityValues) -> Result<Option<Vec<u8>>> {
        if values.o.len() < 48 || values.oe.len() < 32 || values.u.len() < 48 {
            return Err(ToolboxError::InvalidStructure(
                "revision 6 /O or /OE entry too short".to_string(),
            ));
        }
        let password = &password[..password.len().min(127)];
        let u = &values.u[..48];
        let hash = hash_r6(password, &values.o[32..40], u)?;
        if hash[..] != values.o[..32] {
            return Ok(None);
        }
        let key = hash_r6(password, &values.o[40..48], u)?;
        cbc_decrypt_no_padding(&key, &[0u8; 16], &values.oe[..32]).map(Some)
    }

    /// Per-object key for RC4 and AESV2 (algorithm 1). Revision 6 uses the
    /// file key directly.
    pub fn compute_object_key(&self, key: &[u8], obj_num: u32, generation: u16, aes: bool) -> Vec<u8> {
        if self.revision == SecurityHandlerRevision::R6 {
            return key.to_vec();
        }

        let mut data = Vec::with_capacity(key.len() + 9);
        data.extend_from_slice(key);
        data.extend_from_slice(&obj_num.to_le_bytes()[..3]);
        data.extend_from_slice(&generation.to_le_bytes());
        if aes {
            data.extend_from_slice(b"sAlT");
        }

        let hash = md5::compute(&data);
        let len = (key.len() + 5).min(16);
        hash.0[..len].to_vec()
    }
}

fn truncate_utf8_password(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    if bytes.len() <= 127 {
        return bytes;
    }
    let mut end = 127;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &bytes[..end]
}

/// Password hash of revision 6 (ISO 32000-2 algorithm 2.B)
pub(crate) fn hash_r6(password: &[u8], salt: &[u8], user_data: &[u8]) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.update(user_data);
    let mut k: Vec<u8> = hasher.finalize().to_vec();

    let mut round: usize = 0;
    loop {
        round += 1;

        let mut block = Vec::with_capacity(password.len() + k.len() + user_data.len());
        block.extend_from_slice(password);
        block.extend_from_slice(&k);
        block.extend_from_slice(user_data);
        let k1 = block.repeat(64);

        let mut iv = [0u8; 16];
        iv.copy_from_slice(&k[16..32]);
        let e = cbc_encrypt_no_padding(&k[..16], &iv, &k1)?;

        let modulo = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match modulo {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        let last = usize::from(*e.last().unwrap_or(&0));
        if round >= 64 && last <= round - 32 {
            break;
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values_for(handler: &StandardSecurityHandler, user: &str, owner: &str) -> (SecurityValues, Vec<u8>) {
        handler
            .create(user, owner, Permissions::new(), b"0123456789abcdef")
            .unwrap()
    }

    #[test]
    fn test_pad_password() {
        let padded = StandardSecurityHandler::pad_password(b"abc");
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(&padded[3..], &PADDING[..29]);

        let empty = StandardSecurityHandler::pad_password(b"");
        assert_eq!(empty, PADDING);

        let long = StandardSecurityHandler::pad_password(&[b'x'; 40]);
        assert_eq!(long, [b'x'; 32]);
    }

    #[test]
    fn test_rc4_handlers_authenticate_both_passwords() {
        for handler in [
            StandardSecurityHandler::rc4_40bit(),
            StandardSecurityHandler::rc4_128bit(),
            StandardSecurityHandler::aes_128(),
        ] {
            let (values, key) = values_for(&handler, "user", "owner");
            assert_eq!(key.len(), handler.key_length());
            assert_eq!(values.o.len(), 32);
            assert_eq!(values.u.len(), 32);

            assert_eq!(handler.authenticate("user", &values).unwrap(), Some(key.clone()));
            assert_eq!(handler.authenticate("owner", &values).unwrap(), Some(key));
            assert_eq!(handler.authenticate("nope", &values).unwrap(), None);
        }
    }

    #[test]
    fn test_empty_user_password_opens_document() {
        let handler = StandardSecurityHandler::rc4_128bit();
        let (values, key) = values_for(&handler, "", "owner-only");
        assert_eq!(handler.authenticate("", &values).unwrap(), Some(key));
    }

    #[test]
    fn test_r6_authenticate() {
        let handler = StandardSecurityHandler::aes_256();
        let (values, key) = values_for(&handler, "secret", "master");
        assert_eq!(key.len(), 32);
        assert_eq!(values.u.len(), 48);
        assert_eq!(values.o.len(), 48);
        assert_eq!(values.ue.len(), 32);
        assert_eq!(values.perms.len(), 16);

        assert_eq!(handler.authenticate("secret", &values).unwrap(), Some(key.clone()));
        assert_eq!(handler.authenticate("master", &values).unwrap(), Some(key));
        assert_eq!(handler.authenticate("guess", &values).unwrap(), None);
    }

    #[test]
    fn test_owner_defaults_to_user_password() {
        let handler = StandardSecurityHandler::aes_256();
        let (values, key) = values_for(&handler, "same", "");
        assert_eq!(
            handler.authenticate_owner(b"same", &values).unwrap(),
            Some(key)
        );
    }

    #[test]
    fn test_object_key_lengths() {
        let rc4_40 = StandardSecurityHandler::rc4_40bit();
        assert_eq!(rc4_40.compute_object_key(&[1; 5], 7, 0, false).len(), 10);

        let aes128 = StandardSecurityHandler::aes_128();
        let plain = aes128.compute_object_key(&[1; 16], 7, 0, false);
        let salted = aes128.compute_object_key(&[1; 16], 7, 0, true);
        assert_eq!(salted.len(), 16);
        assert_ne!(plain, salted);

        let aes256 = StandardSecurityHandler::aes_256();
        assert_eq!(aes256.compute_object_key(&[4; 32], 7, 0, true), vec![4; 32]);
    }

    #[test]
    fn test_revision_from_number() {
        assert_eq!(
            SecurityHandlerRevision::from_number(4).unwrap(),
            SecurityHandlerRevision::R4
        );
        assert!(SecurityHandlerRevision::from_number(5).is_err());
    }
}
