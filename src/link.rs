//! # Serial Link Configuration
//!
//! The persisted record describing how the gateway talks on the RTU
//! line: serial framing, pacing, polling cadence and word order. Two
//! instances coexist at runtime: the *actual* configuration the line
//! was opened with, and the *next* one accumulated by configuration
//! commands and promoted only across a restart after a save.
//!
//! Serial framing parameters are sum types rather than raw integers:
//! 1.5 stop bits and "invalid" must never share a numeric spelling.

use serde::{Deserialize, Serialize};

use crate::words::WordOrder;

/// Schema version stamped into every saved configuration blob.
pub const FIRMWARE_VERSION: u8 = 3;

/// Number of data bits per serial character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    /// Bit count as configured over the command surface.
    pub fn bit_count(&self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }

    /// Parse a bit count; anything outside 5..=8 is invalid.
    pub fn from_bit_count(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(DataBits::Five),
            6 => Some(DataBits::Six),
            7 => Some(DataBits::Seven),
            8 => Some(DataBits::Eight),
            _ => None,
        }
    }
}

/// Serial parity mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    /// Token used by the command surface and getter JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }

    /// Parse a command-surface parity token.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(token: &str) -> Option<Self> {
        match token {
            "none" => Some(Parity::None),
            "even" => Some(Parity::Even),
            "odd" => Some(Parity::Odd),
            _ => None,
        }
    }
}

/// Number of serial stop bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    /// Numeric form used by the command surface and getter JSON.
    pub fn as_f64(&self) -> f64 {
        match self {
            StopBits::One => 1.0,
            StopBits::OneAndHalf => 1.5,
            StopBits::Two => 2.0,
        }
    }

    /// Parse the numeric form, tolerating decimal noise.
    pub fn from_f64(value: f64) -> Option<Self> {
        if (value - 1.0).abs() < 1e-5 {
            Some(StopBits::One)
        } else if (value - 1.5).abs() < 1e-5 {
            Some(StopBits::OneAndHalf)
        } else if (value - 2.0).abs() < 1e-5 {
            Some(StopBits::Two)
        } else {
            None
        }
    }
}

/// Persisted link configuration.
///
/// `known_registers_count` records how many descriptor blobs follow
/// this record in storage; it is meaningful only inside a saved blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub fw_version: u8,
    pub baudrate: i32,
    pub inter_cmd_delay_ms: u16,
    pub known_registers_count: u16,
    pub read_period_s: u8,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub word_order: WordOrder,
}

impl Default for LinkConfig {
    /// Factory defaults: 9600 8N1, 50 ms pacing, 1 s read period,
    /// MSB-first words, empty catalog.
    fn default() -> Self {
        Self {
            fw_version: FIRMWARE_VERSION,
            baudrate: 9600,
            inter_cmd_delay_ms: 50,
            known_registers_count: 0,
            read_period_s: 1,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            word_order: WordOrder::MsbFirst,
        }
    }
}

impl LinkConfig {
    /// All-zero record written over the config key when a save fails
    /// partway, so the next load observes an empty catalog instead of
    /// a size-mismatched one.
    pub fn zeroed() -> Self {
        Self {
            fw_version: 0,
            baudrate: 0,
            inter_cmd_delay_ms: 0,
            known_registers_count: 0,
            read_period_s: 0,
            data_bits: DataBits::Five,
            parity: Parity::None,
            stop_bits: StopBits::One,
            word_order: WordOrder::MsbFirst,
        }
    }
}
