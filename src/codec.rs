//! # Typed Register Codec
//!
//! Conversions between raw 16-bit register words and the user-visible
//! value strings of the four register types.
//!
//! ## Read path
//!
//! | Type | Words | Rendering |
//! |------|-------|-----------|
//! | Number | 1..=4 | scaled integer, fixed-point with `decimals` digits |
//! | Float | 2 or 4 | scaled IEEE-754, fixed-point with `decimals` digits |
//! | Raw | 1 | unsigned 16-bit decimal |
//! | Str | 1..=10 | JSON-quoted NUL-padded text |
//!
//! Scaling is `round_to_decimals(raw * factor + offset, decimals)`.
//! The write path inverts it: `(input - offset) / factor`, rounded to
//! the nearest integer for Number, range-checked against the target
//! width, and split into words per the configured word order.
//!
//! All failures are values ([`RegisterError`]); the command surface
//! maps them to exit codes and JSON envelopes.

use crate::constants::VALUE_STRING_MAX;
use crate::descriptor::{RegisterDescriptor, RegisterType};
use crate::error::{RegisterError, RegisterResult, Width};
use crate::parse;
use crate::words::{
    assemble_words, pack_string_bytes, sign_extend, split_words, unpack_string_bytes, WordOrder,
};

/// Round a value to `decimals` fractional digits.
#[inline]
pub fn round_to_decimals(value: f64, decimals: u8) -> f64 {
    let scale = 10f64.powi(i32::from(decimals));
    (value * scale).round() / scale
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode raw register words into the register's value string.
///
/// `words` must hold exactly `desc.word_count` words as read from the
/// bus. The rendered string must fit the value buffer budget; longer
/// renderings fail with [`RegisterError::StringTooLong`].
pub fn decode_value(
    words: &[u16],
    desc: &RegisterDescriptor,
    order: WordOrder,
) -> RegisterResult<String> {
    let rendered = match desc.ty {
        RegisterType::Number | RegisterType::Float => {
            let raw = decode_numeric(words, desc, order);
            let scaled = raw * desc.factor + desc.offset;
            let display = round_to_decimals(scaled, desc.decimals);
            format!("{:.*}", desc.decimals as usize, display)
        }
        RegisterType::Raw => format!("{}", words[0]),
        RegisterType::Str => {
            let bytes = unpack_string_bytes(words, order);
            let text_end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            let text = String::from_utf8_lossy(&bytes[..text_end]);
            serde_json::to_string(text.as_ref())
                .map_err(|_| RegisterError::StringTooLong)?
        }
    };

    if rendered.len() >= VALUE_STRING_MAX {
        return Err(RegisterError::StringTooLong);
    }
    Ok(rendered)
}

/// Assemble words and reinterpret them as the descriptor's numeric type.
fn decode_numeric(words: &[u16], desc: &RegisterDescriptor, order: WordOrder) -> f64 {
    let raw = assemble_words(words, order);
    match desc.ty {
        RegisterType::Number => {
            if desc.interpret_as_signed {
                sign_extend(raw, desc.word_count) as f64
            } else {
                raw as f64
            }
        }
        RegisterType::Float => match desc.word_count {
            2 => f64::from(f32::from_bits(raw as u32)),
            4 => f64::from_bits(raw),
            _ => 0.0,
        },
        _ => 0.0,
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a user-supplied value string into raw register words.
///
/// The returned vector holds exactly `desc.word_count` words laid out
/// per `order`, ready for the bus write.
pub fn encode_value(
    input: &str,
    desc: &RegisterDescriptor,
    order: WordOrder,
) -> RegisterResult<Vec<u16>> {
    match desc.ty {
        RegisterType::Number => encode_number(input, desc, order),
        RegisterType::Float => encode_float(input, desc, order),
        RegisterType::Raw => {
            let value: u16 = parse::parse_unsigned(input)
                .ok_or(RegisterError::CannotRepresent(Width::Uint16))?;
            Ok(vec![value])
        }
        RegisterType::Str => {
            let span = usize::from(desc.word_count);
            if input.len() > span * 2 {
                return Err(RegisterError::StringTooLong);
            }
            let mut words = vec![0u16; span];
            pack_string_bytes(input.as_bytes(), &mut words, order);
            Ok(words)
        }
    }
}

fn encode_number(
    input: &str,
    desc: &RegisterDescriptor,
    order: WordOrder,
) -> RegisterResult<Vec<u16>> {
    let value = parse::parse_decimal(input).ok_or(RegisterError::NotANumber)?;
    let adjusted = (value - desc.offset) / desc.factor;
    let rounded = adjusted.round();

    let bits = 16 * u32::from(desc.word_count);
    let width = integer_width(desc.interpret_as_signed, desc.word_count);
    if !rounded.is_finite() {
        return Err(RegisterError::CannotRepresent(width));
    }

    let raw = if desc.interpret_as_signed {
        let min = -((1u128 << (bits - 1)) as f64);
        let max = ((1u128 << (bits - 1)) - 1) as f64;
        if rounded < min || rounded > max {
            return Err(RegisterError::CannotRepresent(width));
        }
        rounded as i64 as u64
    } else {
        let max = ((1u128 << bits) - 1) as f64;
        if rounded < 0.0 || rounded > max {
            return Err(RegisterError::CannotRepresent(width));
        }
        rounded as u64
    };

    let mut words = vec![0u16; usize::from(desc.word_count)];
    split_words(raw, &mut words, order);
    Ok(words)
}

fn encode_float(
    input: &str,
    desc: &RegisterDescriptor,
    order: WordOrder,
) -> RegisterResult<Vec<u16>> {
    let value = parse::parse_decimal(input).ok_or(RegisterError::NotANumber)?;
    let adjusted = (value - desc.offset) / desc.factor;

    let raw = match desc.word_count {
        2 => {
            if !adjusted.is_finite() || adjusted.abs() > f64::from(f32::MAX) {
                return Err(RegisterError::CannotRepresent(Width::Float));
            }
            u64::from((adjusted as f32).to_bits())
        }
        _ => {
            if !adjusted.is_finite() {
                return Err(RegisterError::CannotRepresent(Width::Double));
            }
            adjusted.to_bits()
        }
    };

    let mut words = vec![0u16; usize::from(desc.word_count)];
    split_words(raw, &mut words, order);
    Ok(words)
}

/// Width targeted by a Number register of the given span.
fn integer_width(signed: bool, word_count: u8) -> Width {
    match (signed, word_count) {
        (false, 1) => Width::Uint16,
        (true, 1) => Width::Int16,
        (false, 2) => Width::Uint32,
        (true, 2) => Width::Int32,
        (false, _) => Width::Uint64,
        (true, _) => Width::Int64,
    }
}

// ============================================================================
// Tests
// ============================================================================
