//! PDF encryption support according to ISO 32000-1 Chapter 7.6
//!
//! Password protection with the Standard Security Handler: RC4 40-bit
//! (revision 2), RC4 128-bit (revision 3), AES-128 (revision 4, AESV2) and
//! AES-256 (revision 6, AESV3). Documents are encrypted and decrypted in
//! memory on top of a [`lopdf::Document`]; lopdf writes the transformed
//! objects as they are.

mod aes;
mod object_encryption;
mod permissions;
mod rc4;
mod standard_security;

pub use object_encryption::{CryptMethod, Direction, ObjectCrypter};
pub use permissions::{PermissionFlags, Permissions};
pub use rc4::Rc4;
pub use standard_security::{SecurityHandlerRevision, SecurityValues, StandardSecurityHandler};

use std::path::Path;
use std::str::FromStr;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document;
use crate::error::{Result, ToolboxError};

/// Trailer key the `/Encrypt` entry is renamed to before lopdf parses an
/// encrypted file, so that the raw objects reach our own handler.
/// Same length as `/Encrypt` so cross-reference offsets stay valid.
pub(crate) const HIDDEN_ENCRYPT_KEY: &[u8] = b"EncHide";

/// Encryption algorithm offered by the encrypt panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "rc4-40")]
    Rc4_40,
    #[serde(rename = "rc4-128")]
    Rc4_128,
    #[serde(rename = "aes-128")]
    Aes128,
    #[default]
    #[serde(rename = "aes-256")]
    Aes256,
}

impl EncryptionAlgorithm {
    fn handler(&self) -> StandardSecurityHandler {
        match self {
            EncryptionAlgorithm::Rc4_40 => StandardSecurityHandler::rc4_40bit(),
            EncryptionAlgorithm::Rc4_128 => StandardSecurityHandler::rc4_128bit(),
            EncryptionAlgorithm::Aes128 => StandardSecurityHandler::aes_128(),
            EncryptionAlgorithm::Aes256 => StandardSecurityHandler::aes_256(),
        }
    }

    fn method(&self) -> CryptMethod {
        match self {
            EncryptionAlgorithm::Rc4_40 | EncryptionAlgorithm::Rc4_128 => CryptMethod::Rc4,
            EncryptionAlgorithm::Aes128 => CryptMethod::AesV2,
            EncryptionAlgorithm::Aes256 => CryptMethod::AesV3,
        }
    }

    /// Minimum PDF version able to express the algorithm
    fn min_version(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Rc4_40 => "1.3",
            EncryptionAlgorithm::Rc4_128 => "1.4",
            EncryptionAlgorithm::Aes128 => "1.6",
            EncryptionAlgorithm::Aes256 => "1.7",
        }
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = ToolboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "rc4-40" | "rc4" => Ok(EncryptionAlgorithm::Rc4_40),
            "rc4-128" => Ok(EncryptionAlgorithm::Rc4_128),
            "aes-128" | "aes128" => Ok(EncryptionAlgorithm::Aes128),
            "aes-256" | "aes256" | "aes" => Ok(EncryptionAlgorithm::Aes256),
            other => Err(ToolboxError::InvalidOption(format!(
                "unknown encryption algorithm: {other}"
            ))),
        }
    }
}

/// Options for password protecting documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptOptions {
    pub user_password: String,
    /// Falls back to the user password when empty
    pub owner_password: String,
    pub algorithm: EncryptionAlgorithm,
    pub permissions: PermissionFlags,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            user_password: String::new(),
            owner_password: String::new(),
            algorithm: EncryptionAlgorithm::Aes256,
            permissions: PermissionFlags::default(),
        }
    }
}

impl EncryptOptions {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            user_password: password.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_password.is_empty() {
            return Err(ToolboxError::InvalidOption(
                "password must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Encrypt a loaded, unencrypted document in place.
pub fn encrypt_document(doc: &mut Document, options: &EncryptOptions) -> Result<()> {
    options.validate()?;
    if doc.trailer.has(b"Encrypt") || doc.trailer.has(HIDDEN_ENCRYPT_KEY) {
        return Err(ToolboxError::InvalidOption(
            "document is already encrypted".to_string(),
        ));
    }

    strip_container_streams(doc);
    let file_id = ensure_file_id(doc);

    let handler = options.algorithm.handler();
    let permissions = Permissions::from_flags(options.permissions);
    let (values, key) = handler.create(
        &options.user_password,
        &options.owner_password,
        permissions,
        &file_id,
    )?;

    ObjectCrypter::new(&handler, &key, options.algorithm.method()).apply(
        doc,
        None,
        Direction::Encrypt,
    )?;

    let encrypt_id = doc.add_object(encryption_dictionary(&values, options.algorithm));
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    if doc.version.as_str() < options.algorithm.min_version() {
        doc.version = options.algorithm.min_version().to_string();
    }

    debug!(
        "Encrypted document with {:?} (revision {:?})",
        options.algorithm,
        handler.revision()
    );
    Ok(())
}

/// Decrypt a document whose `/Encrypt` entry was hidden at load time.
///
/// Fails with [`ToolboxError::WrongPassword`] when the password opens
/// neither as user nor as owner password, or when the document carries no
/// encryption at all.
pub fn decrypt_document(doc: &mut Document, password: &str) -> Result<()> {
    let encrypt_ref = match doc
        .trailer
        .get(HIDDEN_ENCRYPT_KEY)
        .or_else(|_| doc.trailer.get(b"Encrypt"))
    {
        Ok(obj) => obj.clone(),
        Err(_) => return Err(ToolboxError::WrongPassword),
    };

    let (encrypt_id, encrypt_dict) = match &encrypt_ref {
        Object::Reference(id) => (Some(*id), doc.get_dictionary(*id)?.clone()),
        Object::Dictionary(dict) => (None, dict.clone()),
        _ => {
            return Err(ToolboxError::InvalidStructure(
                "encryption dictionary is not a dictionary".to_string(),
            ))
        }
    };

    let filter = encrypt_dict
        .get(b"Filter")
        .and_then(Object::as_name)
        .unwrap_or(b"Standard");
    if filter != b"Standard" {
        return Err(ToolboxError::UnsupportedEncryption(format!(
            "security handler {}",
            String::from_utf8_lossy(filter)
        )));
    }

    let file_id = first_file_id(doc);
    let (values, method) = read_security_values(&encrypt_dict, file_id)?;
    let handler = StandardSecurityHandler::for_values(&values);
    let key = handler
        .authenticate(password, &values)?
        .ok_or(ToolboxError::WrongPassword)?;

    ObjectCrypter::new(&handler, &key, method).apply(doc, encrypt_id, Direction::Decrypt)?;

    expand_object_streams(doc)?;
    if let Some(id) = encrypt_id {
        doc.objects.remove(&id);
    }
    doc.trailer.remove(HIDDEN_ENCRYPT_KEY);
    doc.trailer.remove(b"Encrypt");

    debug!("Decrypted document (revision {:?})", values.revision);
    Ok(())
}

fn encryption_dictionary(values: &SecurityValues, algorithm: EncryptionAlgorithm) -> Dictionary {
    let hex = |bytes: &[u8]| Object::String(bytes.to_vec(), StringFormat::Hexadecimal);
    let mut dict = dictionary! {
        "Filter" => "Standard",
        "R" => values.revision as i64,
        "O" => hex(&values.o),
        "U" => hex(&values.u),
        "P" => i64::from(values.p)
    };

    match algorithm {
        EncryptionAlgorithm::Rc4_40 => {
            dict.set("V", 1i64);
            dict.set("Length", 40i64);
        }
        EncryptionAlgorithm::Rc4_128 => {
            dict.set("V", 2i64);
            dict.set("Length", 128i64);
        }
        EncryptionAlgorithm::Aes128 => {
            dict.set("V", 4i64);
            dict.set("Length", 128i64);
            dict.set("CF", crypt_filters(b"AESV2", 16));
            dict.set("StmF", "StdCF");
            dict.set("StrF", "StdCF");
        }
        EncryptionAlgorithm::Aes256 => {
            dict.set("V", 5i64);
            dict.set("Length", 256i64);
            dict.set("CF", crypt_filters(b"AESV3", 32));
            dict.set("StmF", "StdCF");
            dict.set("StrF", "StdCF");
            dict.set("OE", hex(&values.oe));
            dict.set("UE", hex(&values.ue));
            dict.set("Perms", hex(&values.perms));
        }
    }
    dict
}

fn crypt_filters(method: &[u8], length: i64) -> Dictionary {
    dictionary! {
        "StdCF" => dictionary! {
            "Type" => "CryptFilter",
            "CFM" => Object::Name(method.to_vec()),
            "AuthEvent" => "DocOpen",
            "Length" => length
        }
    }
}

fn read_security_values(dict: &Dictionary, file_id: Vec<u8>) -> Result<(SecurityValues, CryptMethod)> {
    let int = |key: &[u8]| dict.get(key).and_then(Object::as_i64).ok();
    let bytes = |key: &[u8]| {
        dict.get(key)
            .and_then(Object::as_str)
            .map(|b| b.to_vec())
            .unwrap_or_default()
    };

    let v = int(b"V").unwrap_or(0);
    let revision = SecurityHandlerRevision::from_number(int(b"R").unwrap_or(0))?;

    let method = match v {
        1 | 2 => CryptMethod::Rc4,
        4 | 5 => crypt_filter_method(dict)?,
        other => {
            return Err(ToolboxError::UnsupportedEncryption(format!(
                "encryption algorithm V={other}"
            )))
        }
    };

    let key_length = match (revision, method) {
        (SecurityHandlerRevision::R2, _) => 5,
        (SecurityHandlerRevision::R6, _) => 32,
        (_, CryptMethod::AesV2) => 16,
        _ => {
            let bits = int(b"Length").unwrap_or(40);
            // some writers store bytes instead of bits
            let bits = if bits <= 16 { bits * 8 } else { bits };
            (bits.clamp(40, 128) / 8) as usize
        }
    };

    let encrypt_metadata = dict
        .get(b"EncryptMetadata")
        .and_then(Object::as_bool)
        .unwrap_or(true);

    Ok((
        SecurityValues {
            revision,
            key_length,
            o: bytes(b"O"),
            u: bytes(b"U"),
            oe: bytes(b"OE"),
            ue: bytes(b"UE"),
            perms: bytes(b"Perms"),
            p: int(b"P").unwrap_or(-1) as i32,
            encrypt_metadata,
            file_id,
        },
        method,
    ))
}

fn crypt_filter_method(dict: &Dictionary) -> Result<CryptMethod> {
    let filter_name = dict
        .get(b"StmF")
        .and_then(Object::as_name)
        .unwrap_or(b"Identity")
        .to_vec();
    if filter_name == b"Identity" {
        return Err(ToolboxError::UnsupportedEncryption(
            "identity crypt filter".to_string(),
        ));
    }

    let cfm = dict
        .get(b"CF")
        .and_then(Object::as_dict)
        .and_then(|cf| cf.get(&filter_name))
        .and_then(Object::as_dict)
        .and_then(|f| f.get(b"CFM"))
        .and_then(Object::as_name)
        .map(|n| n.to_vec())
        .unwrap_or_default();

    match cfm.as_slice() {
        b"V2" => Ok(CryptMethod::Rc4),
        b"AESV2" => Ok(CryptMethod::AesV2),
        b"AESV3" => Ok(CryptMethod::AesV3),
        other => Err(ToolboxError::UnsupportedEncryption(format!(
            "crypt filter method {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn first_file_id(doc: &Document) -> Vec<u8> {
    doc.trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str().ok())
        .map(|id| id.to_vec())
        .unwrap_or_default()
}

fn ensure_file_id(doc: &mut Document) -> Vec<u8> {
    let existing = first_file_id(doc);
    if !existing.is_empty() {
        return existing;
    }
    let mut id = vec![0u8; 16];
    rand::thread_rng().fill_bytes(&mut id);
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id.clone(), StringFormat::Hexadecimal),
        ]),
    );
    id
}

/// lopdf rewrites every object on save with a classic cross-reference
/// table, so leftover object and xref streams are dropped before encrypting.
fn strip_container_streams(doc: &mut Document) {
    doc.objects.retain(|_, object| match object {
        Object::Stream(stream) => {
            !document::has_type(&stream.dict, b"ObjStm")
                && !document::has_type(&stream.dict, b"XRef")
        }
        _ => true,
    });
}

/// Object streams could not be parsed while still encrypted; unpack them now.
fn expand_object_streams(doc: &mut Document) -> Result<()> {
    let container_ids: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, object)| match object {
            Object::Stream(stream) if document::has_type(&stream.dict, b"ObjStm") => {
                Some(*id)
            }
            _ => None,
        })
        .collect();

    for id in container_ids {
        let Some(Object::Stream(mut stream)) = doc.objects.remove(&id) else {
            continue;
        };
        match lopdf::ObjectStream::new(&mut stream) {
            Ok(object_stream) => {
                for (inner_id, object) in object_stream.objects {
                    doc.objects.entry(inner_id).or_insert(object);
                }
            }
            Err(e) => debug!("Skipping unreadable object stream {:?}: {}", id, e),
        }
    }
    Ok(())
}

/// Whether the file at `path` is password protected.
pub fn is_encrypted<P: AsRef<Path>>(path: P) -> Result<bool> {
    let bytes = std::fs::read(path.as_ref())?;
    let found = document::find_encrypt_entries(&bytes).next().is_some();
    Ok(found)
}

/// Encrypt `input` and write it to `output`.
pub fn encrypt_pdf<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &EncryptOptions,
) -> Result<u64> {
    options.validate()?;
    let mut doc = document::load(input.as_ref(), None)?;
    encrypt_document(&mut doc, options)?;
    let size = document::save(&mut doc, output.as_ref())?;
    info!(
        "Encrypted {} -> {}",
        input.as_ref().display(),
        output.as_ref().display()
    );
    Ok(size)
}

/// Decrypt `input` with `password` and write the unprotected copy to `output`.
pub fn decrypt_pdf<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q, password: &str) -> Result<u64> {
    if password.is_empty() {
        return Err(ToolboxError::InvalidOption(
            "password must not be empty".to_string(),
        ));
    }
    let mut doc = document::load_raw(input.as_ref())?;
    decrypt_document(&mut doc, password)?;
    let size = document::save(&mut doc, output.as_ref())?;
    info!(
        "Decrypted {} -> {}",
        input.as_ref().display(),
        output.as_ref().display()
    );
    Ok(size)
}
