//! AES-CBC helpers for the AESV2 (128-bit) and AESV3 (256-bit) crypt filters

use aes::cipher::{
    block_padding::{NoPadding, Pkcs7},
    generic_array::GenericArray,
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use rand::RngCore;

use crate::error::{Result, ToolboxError};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK: usize = 16;

pub fn generate_iv() -> [u8; BLOCK] {
    let mut iv = [0u8; BLOCK];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

fn key_error(len: usize) -> ToolboxError {
    ToolboxError::Encryption(format!("invalid AES key length: {len}"))
}

/// Encrypt with PKCS#7 padding, prefixing the random IV as PDF requires.
pub fn encrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let iv = generate_iv();
    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        32 => Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        other => return Err(key_error(other)),
    };

    let mut out = Vec::with_capacity(BLOCK + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `IV || ciphertext` and strip PKCS#7 padding.
pub fn decrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < BLOCK * 2 || data.len() % BLOCK != 0 {
        return Err(ToolboxError::Encryption(format!(
            "AES data length {} is not a whole number of blocks",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(BLOCK);
    let unpad_error = |_| ToolboxError::Encryption("bad AES padding".to_string());
    match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(unpad_error),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(unpad_error),
        other => Err(key_error(other)),
    }
}

/// CBC without padding; `data` must be block aligned.
pub fn cbc_encrypt_no_padding(key: &[u8], iv: &[u8; BLOCK], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % BLOCK != 0 {
        return Err(ToolboxError::Encryption(
            "unpadded AES input must be block aligned".to_string(),
        ));
    }
    match key.len() {
        16 => Ok(Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_vec_mut::<NoPadding>(data)),
        32 => Ok(Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_vec_mut::<NoPadding>(data)),
        other => Err(key_error(other)),
    }
}

pub fn cbc_decrypt_no_padding(key: &[u8], iv: &[u8; BLOCK], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % BLOCK != 0 {
        return Err(ToolboxError::Encryption(
            "unpadded AES input must be block aligned".to_string(),
        ));
    }
    let unpad_error = |_| ToolboxError::Encryption("AES decryption failed".to_string());
    match key.len() {
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .map_err(unpad_error),
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .map_err(unpad_error),
        other => Err(key_error(other)),
    }
}

/// Single-block AES-256 in ECB mode, used for the `/Perms` entry.
pub fn ecb_encrypt_block(key: &[u8], block: &[u8; BLOCK]) -> Result<[u8; BLOCK]> {
    let cipher = aes::Aes256::new_from_slice(key).map_err(|_| key_error(key.len()))?;
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    let mut out = [0u8; BLOCK];
    out.copy_from_slice(&buf);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_128() {
        let key = [7u8; 16];
        let encrypted = encrypt_with_iv(&key, b"stream content").unwrap();
        assert_eq!(encrypted.len(), 32);
        assert_eq!(decrypt_with_iv(&key, &encrypted).unwrap(), b"stream content");
    }

    #[test]
    fn test_round_trip_256_block_aligned_input() {
        let key = [3u8; 32];
        let data = [0x41u8; 32];
        let encrypted = encrypt_with_iv(&key, &data).unwrap();
        // a full padding block is appended
        assert_eq!(encrypted.len(), 16 + 48);
        assert_eq!(decrypt_with_iv(&key, &encrypted).unwrap(), data);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = [1u8; 16];
        let a = encrypt_with_iv(&key, b"same").unwrap();
        let b = encrypt_with_iv(&key, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(encrypt_with_iv(&[0u8; 5], b"x").is_err());
        assert!(decrypt_with_iv(&[0u8; 16], &[0u8; 20]).is_err());
        assert!(cbc_encrypt_no_padding(&[0u8; 32], &[0u8; 16], &[0u8; 15]).is_err());
    }

    #[test]
    fn test_no_padding_round_trip() {
        let key = [9u8; 32];
        let iv = [0u8; 16];
        let data = [5u8; 32];
        let encrypted = cbc_encrypt_no_padding(&key, &iv, &data).unwrap();
        assert_eq!(encrypted.len(), 32);
        assert_eq!(cbc_decrypt_no_padding(&key, &iv, &encrypted).unwrap(), data);
    }

    #[test]
    fn test_wrong_key_fails_or_differs() {
        let encrypted = encrypt_with_iv(&[1u8; 16], b"secret text here").unwrap();
        match decrypt_with_iv(&[2u8; 16], &encrypted) {
            Ok(plain) => assert_ne!(plain, b"secret text here"),
            Err(_) => {}
        }
    }
}
