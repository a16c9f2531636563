//! Identity vault: schema-checked personal fields under a reserved root
//!
//! Every field is stored as `{"encrypted": bool, "value": ...}` beneath
//! `/identityVault`. Writes are validated before any operation is built and
//! then go through the blob as an `extend` of the root, which is the only
//! operation the engine allows against it.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{json, Map, Value};

use crate::crypto::Secret;
use crate::remote::BlobTransport;

use super::codec::{decrypt_value, encrypt_value};
use super::error::BlobError;
use super::patch::Operation;
use super::pointer::Pointer;
use super::Blob;

pub const IDENTITY_ROOT: &str = "identityVault";

macro_rules! schema_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl FromStr for $name {
            type Err = BlobError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| BlobError::Validation(format!("invalid {}: '{}'", $label, s)))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

schema_enum!(
    /// Top-level vault fields
    IdentityField, "identity field" {
        Name => "name",
        EntityType => "entityType",
        Email => "email",
        Phone => "phone",
        Address => "address",
        NationalId => "nationalID",
        Birthday => "birthday",
        Birthplace => "birthplace",
    }
);

schema_enum!(EntityType, "entity type" {
    Individual => "individual",
    Organization => "organization",
    Corporation => "corporation",
});

schema_enum!(
    /// Address parts, in the order they are printed
    AddressField, "address field" {
        Contact => "contact",
        Line1 => "line1",
        Line2 => "line2",
        City => "city",
        Region => "region",
        PostalCode => "postalCode",
        Country => "country",
    }
);

schema_enum!(NationalIdField, "nationalID field" {
    Number => "number",
    Type => "type",
    Country => "country",
});

schema_enum!(NationalIdType, "nationalID type" {
    Ssn => "ssn",
    TaxId => "taxID",
    Passport => "passport",
    DriversLicense => "driversLicense",
    Other => "other",
});

/// Result of reading one vault field
#[derive(Debug)]
pub enum IdentityRead {
    /// Stored in the clear
    Plain(Value),
    /// Stored encrypted and opened with the supplied key
    Decrypted(Value),
    /// Stored encrypted and could not be opened; the raw value is kept
    Sealed { ciphertext: Value, error: BlobError },
}

impl IdentityRead {
    pub fn value(&self) -> &Value {
        match self {
            IdentityRead::Plain(value) | IdentityRead::Decrypted(value) => value,
            IdentityRead::Sealed { ciphertext, .. } => ciphertext,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, IdentityRead::Plain(_))
    }

    pub fn error(&self) -> Option<&BlobError> {
        match self {
            IdentityRead::Sealed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Check `value` against the schema of `field`
pub fn validate(field: IdentityField, value: &Value) -> Result<(), BlobError> {
    match field {
        IdentityField::Address => {
            let Value::Object(parts) = value else {
                return Err(BlobError::Validation("address must be an object".to_string()));
            };
            for key in parts.keys() {
                AddressField::from_str(key)?;
            }
        }
        IdentityField::NationalId => {
            let Value::Object(parts) = value else {
                return Err(BlobError::Validation(
                    "nationalID must be an object".to_string(),
                ));
            };
            for (key, part) in parts {
                if NationalIdField::from_str(key)? == NationalIdField::Type {
                    let id_type = part.as_str().ok_or_else(|| {
                        BlobError::Validation(format!("invalid nationalID type: {}", part))
                    })?;
                    NationalIdType::from_str(id_type)?;
                }
            }
        }
        IdentityField::EntityType => {
            let entity = value.as_str().ok_or_else(|| {
                BlobError::Validation(format!("invalid entity type: {}", value))
            })?;
            EntityType::from_str(entity)?;
        }
        _ => {}
    }
    Ok(())
}

/// Build the operations that store `value` under `field`. Nothing is built
///  unless the field and value pass validation.
pub fn plan_set(
    document: &Value,
    field: &str,
    key: Option<&Secret>,
    value: &Value,
) -> Result<Vec<Operation>, BlobError> {
    let field = IdentityField::from_str(field)?;
    validate(field, value)?;

    let stored = match key {
        Some(key) => json!({ "encrypted": true, "value": encrypt_value(key, value)? }),
        None => json!({ "encrypted": false, "value": value }),
    };

    let root = Pointer::from_segments([IDENTITY_ROOT]);
    let mut operations = Vec::with_capacity(2);
    if document.get(IDENTITY_ROOT).is_none() {
        operations.push(Operation::Set {
            pointer: root.clone(),
            value: Value::Object(Map::new()),
        });
    }
    let mut entry = Map::new();
    entry.insert(field.as_str().to_string(), stored);
    operations.push(Operation::Extend {
        pointer: root,
        value: entry,
    });
    Ok(operations)
}

/// Read a stored field. `None` when the vault or the field is absent.
pub fn read(document: &Value, field: &str, key: Option<&Secret>) -> Option<IdentityRead> {
    let stored = document.get(IDENTITY_ROOT)?.get(field)?;
    let encrypted = stored
        .get("encrypted")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let value = stored.get("value").cloned().unwrap_or(Value::Null);

    if !encrypted {
        return Some(IdentityRead::Plain(value));
    }

    let opened = match (key, value.as_str()) {
        (None, _) => Err(BlobError::Decryption("no key supplied".to_string())),
        (Some(_), None) => Err(BlobError::Decryption(
            "encrypted value is not a string".to_string(),
        )),
        (Some(key), Some(ciphertext)) => decrypt_value(key, ciphertext),
    };
    Some(match opened {
        Ok(plain) => IdentityRead::Decrypted(plain),
        Err(error) => IdentityRead::Sealed {
            ciphertext: value,
            error,
        },
    })
}

/// Vault view over a mutable blob, see [`Blob::identity`]
pub struct Identity<'a, T: BlobTransport> {
    blob: &'a mut Blob<T>,
}

impl<'a, T: BlobTransport> Identity<'a, T> {
    pub(crate) fn new(blob: &'a mut Blob<T>) -> Self {
        Self { blob }
    }

    pub fn get(&self, field: &str, key: Option<&Secret>) -> Option<IdentityRead> {
        read(self.blob.document(), field, key)
    }

    pub fn get_all(&self, key: Option<&Secret>) -> BTreeMap<String, IdentityRead> {
        let Some(Value::Object(vault)) = self.blob.document().get(IDENTITY_ROOT) else {
            return BTreeMap::new();
        };
        vault
            .keys()
            .filter_map(|field| {
                read(self.blob.document(), field, key).map(|found| (field.clone(), found))
            })
            .collect()
    }

    /// The address as one line, parts in schema order
    pub fn full_address(&self, key: Option<&Secret>) -> String {
        let Some(address) = self.get(IdentityField::Address.as_str(), key) else {
            return String::new();
        };
        AddressField::ALL
            .iter()
            .filter_map(|part| address.value().get(part.as_str()))
            .filter_map(|part| match part {
                Value::String(text) if !text.is_empty() => Some(text.clone()),
                Value::String(_) | Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn set(
        &mut self,
        field: &str,
        key: Option<&Secret>,
        value: Value,
    ) -> Result<(), BlobError> {
        let operations = plan_set(self.blob.document(), field, key, &value)?;
        self.blob.submit_batch(operations).await
    }

    /// Remove a field. A field sealed under a different key is left alone and
    ///  the decryption error is returned.
    pub async fn unset(&mut self, field: &str, key: Option<&Secret>) -> Result<(), BlobError> {
        let field = IdentityField::from_str(field)?;
        if let Some(IdentityRead::Sealed { error, .. }) = self.get(field.as_str(), key) {
            return Err(error);
        }
        let pointer = Pointer::from_segments([IDENTITY_ROOT, field.as_str()]);
        self.blob.submit_patch(Operation::Unset { pointer }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_validation() {
        let doc = json!({});
        let ops = plan_set(&doc, "entityType", None, &json!("individual")).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            plan_set(&doc, "entityType", None, &json!("bogus")),
            Err(BlobError::Validation(_))
        ));
        assert!(matches!(
            plan_set(&doc, "entityType", None, &json!(7)),
            Err(BlobError::Validation(_))
        ));
    }

    #[test]
    fn test_structured_field_validation() {
        let doc = json!({"identityVault": {}});
        assert!(plan_set(&doc, "address", None, &json!({"city": "Oslo", "postalCode": "0150"})).is_ok());
        assert!(plan_set(&doc, "address", None, &json!({"planet": "Mars"})).is_err());
        assert!(plan_set(&doc, "address", None, &json!("Main St")).is_err());

        assert!(plan_set(&doc, "nationalID", None, &json!({"number": "1", "type": "passport"})).is_ok());
        assert!(plan_set(&doc, "nationalID", None, &json!({"type": "library card"})).is_err());
        assert!(plan_set(&doc, "nationalID", None, &json!({"issuer": "x"})).is_err());

        assert!(plan_set(&doc, "favouriteColour", None, &json!("blue")).is_err());
    }

    #[test]
    fn test_existing_root_only_extends() {
        let doc = json!({"identityVault": {}});
        let ops = plan_set(&doc, "email", None, &json!("a@example.com")).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].to_envelope(),
            json!([18, "/identityVault", {"email": {"encrypted": false, "value": "a@example.com"}}])
        );
    }

    #[test]
    fn test_read_tri_state() {
        let key = Secret::generate();
        let sealed = encrypt_value(&key, &json!({"city": "Oslo"})).unwrap();
        let doc = json!({"identityVault": {
            "name": {"encrypted": false, "value": "Ann"},
            "address": {"encrypted": true, "value": sealed}
        }});

        assert!(read(&doc, "phone", Some(&key)).is_none());
        assert!(matches!(read(&doc, "name", None), Some(IdentityRead::Plain(v)) if v == json!("Ann")));
        assert!(matches!(
            read(&doc, "address", Some(&key)),
            Some(IdentityRead::Decrypted(v)) if v == json!({"city": "Oslo"})
        ));

        let wrong = read(&doc, "address", Some(&Secret::generate())).unwrap();
        assert!(wrong.is_encrypted());
        assert!(matches!(wrong.error(), Some(BlobError::Decryption(_))));
        assert_eq!(wrong.value(), &json!(sealed));

        assert!(read(&json!({}), "name", None).is_none());
    }
}
