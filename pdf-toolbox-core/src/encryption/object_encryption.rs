//! Applies a crypt method to every string and stream of a document

use lopdf::{Document, Object, ObjectId};

use super::aes::{decrypt_with_iv, encrypt_with_iv};
use super::rc4::rc4;
use super::standard_security::StandardSecurityHandler;
use crate::document::has_type;
use crate::error::Result;

/// How strings and streams are transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Rc4,
    AesV2,
    AesV3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// File key plus the rules for deriving per-object keys
pub struct ObjectCrypter<'a> {
    handler: &'a StandardSecurityHandler,
    key: &'a [u8],
    method: CryptMethod,
}

impl<'a> ObjectCrypter<'a> {
    pub fn new(handler: &'a StandardSecurityHandler, key: &'a [u8], method: CryptMethod) -> Self {
        Self {
            handler,
            key,
            method,
        }
    }

    fn transform(&self, id: ObjectId, data: &[u8], direction: Direction) -> Result<Vec<u8>> {
        let aes = self.method != CryptMethod::Rc4;
        let object_key = self.handler.compute_object_key(self.key, id.0, id.1, aes);
        match (self.method, direction) {
            (CryptMethod::Rc4, _) => Ok(rc4(&object_key, data)),
            (_, Direction::Encrypt) => encrypt_with_iv(&object_key, data),
            (_, Direction::Decrypt) => decrypt_with_iv(&object_key, data),
        }
    }

    /// Transform every indirect object except `skip` (the encryption
    /// dictionary itself). Returns the number of strings and streams touched.
    pub fn apply(&self, doc: &mut Document, skip: Option<ObjectId>, direction: Direction) -> Result<usize> {
        let mut touched = 0;
        for (&id, object) in doc.objects.iter_mut() {
            if Some(id) == skip {
                continue;
            }
            touched += self.apply_object(id, object, direction)?;
        }
        Ok(touched)
    }

    fn apply_object(&self, id: ObjectId, object: &mut Object, direction: Direction) -> Result<usize> {
        match object {
            Object::String(bytes, _) => {
                *bytes = self.transform(id, bytes, direction)?;
                Ok(1)
            }
            Object::Array(items) => {
                let mut touched = 0;
                for item in items.iter_mut() {
                    touched += self.apply_object(id, item, direction)?;
                }
                Ok(touched)
            }
            Object::Dictionary(dict) => {
                let mut touched = 0;
                for (_, value) in dict.iter_mut() {
                    touched += self.apply_object(id, value, direction)?;
                }
                Ok(touched)
            }
            Object::Stream(stream) => {
                // cross-reference streams are never encrypted
                if has_type(&stream.dict, b"XRef") {
                    return Ok(0);
                }
                let mut touched = 0;
                for (_, value) in stream.dict.iter_mut() {
                    touched += self.apply_object(id, value, direction)?;
                }
                let content = self.transform(id, &stream.content, direction)?;
                stream.set_content(content);
                Ok(touched + 1)
            }
            _ => Ok(0),
        }
    }
}
