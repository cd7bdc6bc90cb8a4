//! Core error types and result handling
//!
//! Register access failures are plain values: command handlers map them
//! to negative exit codes and getters to JSON error envelopes, so none
//! of these types ever crosses the cloud boundary as a panic.

use std::fmt;

use thiserror::Error;

/// Result alias for register access operations.
pub type RegisterResult<T> = Result<T, RegisterError>;

/// Integer or float width targeted by a typed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float,
    Double,
}

impl Width {
    /// Width name as spelled in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Width::Uint16 => "uint16",
            Width::Int16 => "int16",
            Width::Uint32 => "uint32",
            Width::Int32 => "int32",
            Width::Uint64 => "uint64",
            Width::Int64 => "int64",
            Width::Float => "float",
            Width::Double => "double",
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure of a typed or raw register operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// No register with the given name exists in the catalog.
    #[error("register not found")]
    NotFound,

    /// The Modbus line was never opened successfully.
    #[error("modbus not running")]
    NotInitialized,

    /// The transport reported an error while reading.
    #[error("modbus read failed")]
    BusRead,

    /// The transport reported an error while writing.
    #[error("modbus write failed")]
    BusWrite,

    /// The register's writable flag is false.
    #[error("register is not writable")]
    NotWritable,

    /// A rendered value or input string exceeds its buffer budget.
    #[error("string too long")]
    StringTooLong,

    /// The value cannot be represented in the register's width.
    #[error("cannot represent value with {0}")]
    CannotRepresent(Width),

    /// The input string is not a valid decimal number.
    #[error("string is not a number")]
    NotANumber,
}

/// Rejection reasons for inserting a descriptor into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CatalogInsertError {
    /// A descriptor with the same name already exists.
    #[error("duplicate register name")]
    DuplicateName,

    /// A descriptor with the same (function, slave, register) already exists.
    #[error("duplicate modbus tuple")]
    DuplicateModbusTuple,

    /// Every catalog slot is in use.
    #[error("catalog is full")]
    Full,
}

/// Failure of the non-volatile blob store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("blob store failure: {0}")]
    Backend(String),

    /// The requested blob does not exist.
    #[error("blob `{0}` not found")]
    Missing(String),

    /// The blob exists but could not be decoded.
    #[error("blob `{0}` could not be decoded")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_display() {
        assert_eq!(Width::Uint16.to_string(), "uint16");
        assert_eq!(Width::Double.to_string(), "double");
    }

    #[test]
    fn test_register_error_messages() {
        assert_eq!(
            RegisterError::CannotRepresent(Width::Int32).to_string(),
            "cannot represent value with int32"
        );
        assert_eq!(RegisterError::NotFound.to_string(), "register not found");
    }

    #[test]
    fn test_errors_are_values() {
        // Errors compare by value so handlers can match on them.
        assert_eq!(
            RegisterError::CannotRepresent(Width::Uint16),
            RegisterError::CannotRepresent(Width::Uint16)
        );
        assert_ne!(RegisterError::BusRead, RegisterError::BusWrite);
        assert_eq!(CatalogInsertError::Full, CatalogInsertError::Full);
    }
}
