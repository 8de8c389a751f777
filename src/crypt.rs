//! Encryption capability threading.
//!
//! The engine never implements a cipher. A [`DataCryptor`] supplied by the
//! caller is carried in [`CryptInfo`] from the document to every parse and
//! serialize call; strings and stream payloads pass through it keyed by the
//! reference of the indirect object that owns them.

use crate::error::{Error, Result};
use crate::model::dict::{read_bool, read_int, read_name, read_names, read_raw_bytes};
use crate::model::{ParseInfo, PdfDict, PdfObject};
use crate::object::{Dictionary, Object, ObjectId};
use std::fmt;
use std::sync::Arc;

/// Encrypt/decrypt capability for one document.
pub trait DataCryptor: Send + Sync {
    /// Encrypt `data` owned by the object `reference`.
    fn encrypt(&self, data: &[u8], reference: ObjectId) -> Result<Vec<u8>>;

    /// Decrypt `data` owned by the object `reference`.
    fn decrypt(&self, data: &[u8], reference: ObjectId) -> Result<Vec<u8>>;
}

/// Cryptors injected at parse and serialize time.
#[derive(Clone, Default)]
pub struct CryptInfo {
    /// Reference of the `/Encrypt` dictionary; its own strings stay plain
    pub reference: Option<ObjectId>,
    /// Cryptor for string values
    pub string_cryptor: Option<Arc<dyn DataCryptor>>,
    /// Cryptor for stream payloads
    pub stream_cryptor: Option<Arc<dyn DataCryptor>>,
}

impl fmt::Debug for CryptInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptInfo")
            .field("reference", &self.reference)
            .field("string_cryptor", &self.string_cryptor.is_some())
            .field("stream_cryptor", &self.stream_cryptor.is_some())
            .finish()
    }
}

impl CryptInfo {
    fn applies_to(&self, owner: ObjectId) -> bool {
        self.reference != Some(owner)
    }

    /// Decrypt a string value owned by `owner`.
    pub fn decrypt_string(&self, data: &[u8], owner: ObjectId) -> Result<Vec<u8>> {
        match &self.string_cryptor {
            Some(cryptor) if self.applies_to(owner) => cryptor.decrypt(data, owner).map_err(|e| {
                log::error!("string decryption failed for {}: {}", owner, e);
                e
            }),
            _ => Ok(data.to_vec()),
        }
    }

    /// Encrypt a string value owned by `owner`.
    pub fn encrypt_string(&self, data: &[u8], owner: ObjectId) -> Result<Vec<u8>> {
        match &self.string_cryptor {
            Some(cryptor) if self.applies_to(owner) => cryptor.encrypt(data, owner),
            _ => Ok(data.to_vec()),
        }
    }

    /// Decrypt a stream payload owned by `owner`.
    pub fn decrypt_stream(&self, data: &[u8], owner: ObjectId) -> Result<Vec<u8>> {
        match &self.stream_cryptor {
            Some(cryptor) if self.applies_to(owner) => cryptor.decrypt(data, owner).map_err(|e| {
                log::error!("stream decryption failed for {}: {}", owner, e);
                e
            }),
            _ => Ok(data.to_vec()),
        }
    }

    /// Encrypt a stream payload owned by `owner`.
    pub fn encrypt_stream(&self, data: &[u8], owner: ObjectId) -> Result<Vec<u8>> {
        match &self.stream_cryptor {
            Some(cryptor) if self.applies_to(owner) => cryptor.encrypt(data, owner),
            _ => Ok(data.to_vec()),
        }
    }
}

/// Encryption algorithm versions a [`CryptorProvider`] may be asked for.
pub const SUPPORTED_VERSIONS: [i64; 4] = [1, 2, 4, 5];

/// Encryption dictionary (`/Encrypt`).
///
/// Values are kept as written; interpreting them is the provider's job.
#[derive(Debug, Clone, Default)]
pub struct EncryptionDict {
    /// Base dictionary
    pub dict: PdfDict,
    /// Security handler name (`/Filter`)
    pub filter: String,
    /// `/SubFilter`
    pub sub_filter: Option<String>,
    /// Algorithm version (`/V`)
    pub version: i64,
    /// Handler revision (`/R`)
    pub revision: Option<i64>,
    /// Key length in bits (`/Length`)
    pub length: Option<i64>,
    /// Owner password hash (`/O`)
    pub owner_hash: Vec<u8>,
    /// User password hash (`/U`)
    pub user_hash: Vec<u8>,
    /// `/OE` (revision 6)
    pub owner_key: Option<Vec<u8>>,
    /// `/UE` (revision 6)
    pub user_key: Option<Vec<u8>>,
    /// `/Perms` (revision 6)
    pub perms: Option<Vec<u8>>,
    /// Permission flags (`/P`)
    pub permissions: i64,
    /// Crypt filter dictionary (`/CF`)
    pub crypt_filters: Option<Object>,
    /// Default stream filter (`/StmF`)
    pub stream_filter: Option<String>,
    /// Default string filter (`/StrF`)
    pub string_filter: Option<String>,
    /// `/EncryptMetadata`
    pub encrypt_metadata: bool,
}

impl EncryptionDict {
    /// Reject algorithm versions outside [`SUPPORTED_VERSIONS`].
    pub fn check_version(&self) -> Result<()> {
        if SUPPORTED_VERSIONS.contains(&self.version) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!("encryption algorithm version {}", self.version)))
        }
    }
}

impl PdfObject for EncryptionDict {
    fn parse(info: &ParseInfo) -> Result<Self> {
        let mut enc = EncryptionDict {
            encrypt_metadata: true,
            ..Default::default()
        };
        let mut filter = None;
        let mut dict = PdfDict::default();
        dict.parse_props(info, None, |s, name, i| {
            let next = match name {
                "/Filter" => {
                    let value = read_name(s, i)?;
                    filter = Some(value.value);
                    value.end
                },
                "/SubFilter" => {
                    let value = read_name(s, i)?;
                    enc.sub_filter = Some(value.value);
                    value.end
                },
                "/V" => {
                    let value = read_int(s, i)?;
                    enc.version = value.value;
                    value.end
                },
                "/R" => {
                    let value = read_int(s, i)?;
                    enc.revision = Some(value.value);
                    value.end
                },
                "/Length" => {
                    let value = read_int(s, i)?;
                    enc.length = Some(value.value);
                    value.end
                },
                "/O" => {
                    let value = read_raw_bytes(s, i)?;
                    enc.owner_hash = value.value;
                    value.end
                },
                "/U" => {
                    let value = read_raw_bytes(s, i)?;
                    enc.user_hash = value.value;
                    value.end
                },
                "/OE" => {
                    let value = read_raw_bytes(s, i)?;
                    enc.owner_key = Some(value.value);
                    value.end
                },
                "/UE" => {
                    let value = read_raw_bytes(s, i)?;
                    enc.user_key = Some(value.value);
                    value.end
                },
                "/Perms" => {
                    let value = read_raw_bytes(s, i)?;
                    enc.perms = Some(value.value);
                    value.end
                },
                "/P" => {
                    let value = read_int(s, i)?;
                    enc.permissions = value.value;
                    value.end
                },
                "/CF" => {
                    let value = Object::parse_at(s, i, false)
                        .ok_or_else(|| Error::parse(i, "invalid /CF"))?;
                    enc.crypt_filters = Some(value.value);
                    value.end
                },
                "/StmF" => {
                    let value = read_names(s, i)?;
                    enc.stream_filter = value.value.into_iter().next();
                    value.end
                },
                "/StrF" => {
                    let value = read_names(s, i)?;
                    enc.string_filter = value.value.into_iter().next();
                    value.end
                },
                "/EncryptMetadata" => {
                    let value = read_bool(s, i)?;
                    enc.encrypt_metadata = value.value;
                    value.end
                },
                _ => return Ok(None),
            };
            Ok(Some(next + 1))
        })?;
        enc.filter = filter.ok_or_else(|| Error::missing_key("/Filter", "Encrypt"))?;
        enc.dict = dict;
        Ok(enc)
    }

    fn dict(&self) -> &PdfDict {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    fn to_object(&self) -> Object {
        let mut dict: Dictionary = self.dict.begin_object();
        dict.insert("/Filter".into(), Object::name(&self.filter));
        if let Some(sub) = &self.sub_filter {
            dict.insert("/SubFilter".into(), Object::name(sub));
        }
        dict.insert("/V".into(), Object::Integer(self.version));
        if let Some(r) = self.revision {
            dict.insert("/R".into(), Object::Integer(r));
        }
        if let Some(len) = self.length {
            dict.insert("/Length".into(), Object::Integer(len));
        }
        dict.insert("/O".into(), Object::String(self.owner_hash.clone()));
        dict.insert("/U".into(), Object::String(self.user_hash.clone()));
        for (key, value) in [("/OE", &self.owner_key), ("/UE", &self.user_key), ("/Perms", &self.perms)] {
            if let Some(bytes) = value {
                dict.insert(key.into(), Object::String(bytes.clone()));
            }
        }
        dict.insert("/P".into(), Object::Integer(self.permissions));
        if let Some(cf) = &self.crypt_filters {
            dict.insert("/CF".into(), cf.clone());
        }
        if let Some(f) = &self.stream_filter {
            dict.insert("/StmF".into(), Object::name(f));
        }
        if let Some(f) = &self.string_filter {
            dict.insert("/StrF".into(), Object::name(f));
        }
        if !self.encrypt_metadata {
            dict.insert("/EncryptMetadata".into(), Object::Boolean(false));
        }
        self.dict.finish_object(&mut dict);
        Object::Dictionary(dict)
    }
}

/// Builds the cryptors for an encrypted document.
///
/// Called once while opening, after the version check passed.
pub trait CryptorProvider: Send + Sync {
    /// Create the cryptors for `encryption`; `file_id` is the first `/ID` entry.
    fn create(
        &self,
        encryption: &EncryptionDict,
        reference: Option<ObjectId>,
        file_id: Option<&[u8]>,
    ) -> Result<CryptInfo>;
}
