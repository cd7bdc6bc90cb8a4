//! Gateway limits and protocol constants
//!
//! Sizing here mirrors the payload contract of the cloud transport:
//! a publish payload is capped at 2 KiB, and a single `"name":value`
//! entry must fit 144 bytes including the terminator the wire format
//! reserves. The catalog bound keeps a full save/load cycle within one
//! NVS namespace.

// ============================================================================
// Catalog Limits
// ============================================================================

/// Maximum number of register descriptors the catalog can hold.
pub const MAX_REGISTERS_NUM: usize = 60;

/// Maximum register name length in bytes (names are 1..=19 bytes).
pub const MAX_REG_NAME_LEN: usize = 19;

/// Maximum number of consecutive 16-bit words one descriptor may span.
/// String registers can span up to 10 words (20 bytes of text).
pub const MAX_REG_WORDS: usize = 10;

/// Maximum stored length of a register's latest published value.
pub const MAX_LATEST_PUBLISHED_LEN: usize = 23;

// ============================================================================
// Payload Limits
// ============================================================================

/// Maximum length of a monitored-registers publish payload.
pub const PUBLISH_PAYLOAD_MAX: usize = 2048;

/// Maximum length of a getter JSON response.
pub const GETTER_JSON_MAX: usize = 1024;

/// Maximum length of one `"name":value` entry inside a JSON payload,
/// terminator included.
pub const KEYVALUE_MAX: usize = 144;

/// Maximum length of a rendered value string, terminator included.
pub const VALUE_STRING_MAX: usize = 128;

/// Maximum length of a command argument string, terminator included.
pub const ARGS_MAX: usize = 128;

/// Maximum number of comma-separated tokens in a command argument string.
pub const MAX_TOKENS_NUM: usize = 5;

// ============================================================================
// Publish Topics
// ============================================================================

/// Topic carrying the periodic monitored-registers batch.
pub const PUBLISH_TOPIC: &str = "trackle/p";

/// Topic carrying polling-loop diagnostics.
pub const DIAG_TOPIC: &str = "mbTask";

/// Diagnostic payload emitted when a polling iteration overruns its period.
pub const PERIOD_TOO_SHORT_MSG: &str = "period too short";

// ============================================================================
// Non-Volatile Storage Keys
// ============================================================================

/// NVS namespace holding the gateway configuration.
pub const NVS_NAMESPACE: &str = "gateway-fw-cfg";

/// Key of the link configuration blob.
pub const NVS_CONFIG_KEY: &str = "firmware-config";

/// Key prefix of the per-descriptor blobs (`rad0`, `rad1`, ...).
pub const NVS_DESCRIPTOR_KEY_PREFIX: &str = "rad";

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 1;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 2;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 3;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 4;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 5;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 6;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 15;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 16;

/// Highest addressable slave on an RTU line; 0 is the broadcast sentinel.
pub const MAX_SLAVE_ADDR: u8 = 247;

/// Check that a function code is one of the four read functions.
#[inline]
pub fn is_read_function(function: u8) -> bool {
    (FC_READ_COILS..=FC_READ_INPUT_REGISTERS).contains(&function)
}

/// Check that a function code is one of the four write functions.
#[inline]
pub fn is_write_function(function: u8) -> bool {
    matches!(
        function,
        FC_WRITE_SINGLE_COIL
            | FC_WRITE_SINGLE_REGISTER
            | FC_WRITE_MULTIPLE_COILS
            | FC_WRITE_MULTIPLE_REGISTERS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_function_range() {
        assert!(!is_read_function(0));
        assert!(is_read_function(1));
        assert!(is_read_function(4));
        assert!(!is_read_function(5));
    }

    #[test]
    fn test_write_function_set() {
        assert!(is_write_function(5));
        assert!(is_write_function(6));
        assert!(is_write_function(15));
        assert!(is_write_function(16));
        assert!(!is_write_function(3));
        assert!(!is_write_function(10));
    }

    #[test]
    fn test_entry_fits_payload() {
        // A maximal entry must always fit an empty payload.
        assert!(KEYVALUE_MAX + 2 <= PUBLISH_PAYLOAD_MAX);
        // Longest value plus the quoted name stays within one entry.
        assert!(MAX_REG_NAME_LEN + 2 + 1 + MAX_LATEST_PUBLISHED_LEN < KEYVALUE_MAX);
    }
}
