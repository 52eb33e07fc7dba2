//! The response schema validation contract.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ValidationError;

/// Capability trait for response schema types.
///
/// Given a raw decoded JSON body, `validate` either produces a fully valid
/// instance or a [`ValidationError`] listing the offending fields. No
/// partial or best-effort instance is ever produced.
///
/// A blanket implementation covers every [`DeserializeOwned`] type, so a
/// plain derived struct is a usable schema:
///
/// ```
/// use serde::Deserialize;
/// use serde_json::json;
/// use typedfetch_core::Validatable;
///
/// #[derive(Debug, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// let user = User::validate(json!({"id": 7, "name": "Ann"})).unwrap();
/// assert_eq!(user.id, 7);
/// ```
pub trait Validatable: Sized {
    /// Validates raw decoded JSON against the expected shape.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the raw data does not match the
    /// schema.
    fn validate(raw: Value) -> Result<Self, ValidationError>;
}

impl<T: DeserializeOwned> Validatable for T {
    fn validate(raw: Value) -> Result<Self, ValidationError> {
        // serde names the offending field in the message; the path stays
        // `$`-rooted because the Value deserializer does not track one.
        serde_json::from_value(raw).map_err(|e| ValidationError::message(e.to_string()))
    }
}
