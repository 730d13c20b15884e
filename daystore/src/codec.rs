//! Record payload encoding.
//!
//! The engine stores every record as an opaque byte payload. [`RecordCodec`]
//! is the seam between application record types and those bytes; the engine
//! is generic over it, so the record type of an [`Engine`](crate::Engine) is
//! fixed at compile time.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Conversion between an application record and its stored payload.
///
/// Implementations must be deterministic in the sense that
/// `R::decode(&r.encode()?)` yields a record equal to `r`. The engine never
/// inspects the bytes.
///
/// # Example
///
/// ```rust
/// use daystore::codec::RecordCodec;
/// use daystore::error::CodecError;
///
/// #[derive(Debug, PartialEq)]
/// struct Pid(u32);
///
/// impl RecordCodec for Pid {
///     fn encode(&self) -> Result<Vec<u8>, CodecError> {
///         Ok(self.0.to_le_bytes().to_vec())
///     }
///
///     fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
///         let raw: [u8; 4] = bytes.try_into().map_err(|_| CodecError::Decode {
///             reason: format!("expected 4 bytes, found {}", bytes.len()),
///         })?;
///         Ok(Pid(u32::from_le_bytes(raw)))
///     }
/// }
///
/// let bytes = Pid(42).encode().unwrap();
/// assert_eq!(Pid::decode(&bytes).unwrap(), Pid(42));
/// ```
pub trait RecordCodec: Sized {
    /// Encodes the record into its payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the record cannot be represented.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Decodes a record from payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the bytes are not a valid payload.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Raw payloads, stored verbatim.
impl RecordCodec for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 text payloads.
impl RecordCodec for String {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })
    }
}

/// Stores any serde type as a JSON payload.
///
/// ```rust
/// use daystore::codec::{Json, RecordCodec};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct ProcessInfo {
///     pid: u32,
///     name: String,
///     cpu: f64,
/// }
///
/// let record = Json(ProcessInfo { pid: 1, name: "init".to_string(), cpu: 0.5 });
/// let bytes = record.encode().unwrap();
/// assert_eq!(Json::<ProcessInfo>::decode(&bytes).unwrap(), record);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the inner record.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Json<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T: Serialize + DeserializeOwned> RecordCodec for Json<T> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Self(serde_json::from_slice(bytes)?))
    }
}
