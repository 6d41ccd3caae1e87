// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register codec
//!
//! Pure conversions between raw Modbus register words and typed values.
//!
//! Floating point values span two consecutive registers. The firmware sends the
//! low 16 bits of the IEEE-754 pattern first and the high 16 bits second
//! (often called "CDAB" word order). This is a property of the firmware, not of
//! the host platform endianness.

/// Decode a binary32 float from two registers, low word first.
///
/// Returns `0.0` when fewer than two words are supplied so that a short read
/// never aborts a polling cycle. Extra words are ignored.
pub fn decode_float(words: &[u16]) -> f32 {
    match words {
        [low, high, ..] => f32::from_bits((u32::from(*high) << 16) | u32::from(*low)),
        _ => 0.0,
    }
}

/// Encode a binary32 float as `[low, high]` register words.
pub fn encode_float(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits & 0xFFFF) as u16, (bits >> 16) as u16]
}

/// Decode a single-register unsigned value.
///
/// Missing data decodes as zero, matching the zero-fill policy of block reads.
pub fn decode_u16(words: &[u16]) -> u16 {
    words.first().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_word_order_is_low_first() {
        // 37.0f32 == 0x4214_0000
        assert_eq!(encode_float(37.0), [0x0000, 0x4214]);
        assert_relative_eq!(decode_float(&[0x0000, 0x4214]), 37.0);

        // 36.5f32 == 0x4212_0000, -1.5f32 == 0xBFC0_0000
        assert_relative_eq!(decode_float(&[0x0000, 0x4212]), 36.5);
        assert_relative_eq!(decode_float(&[0x0000, 0xBFC0]), -1.5);
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let samples = [
            0.0f32,
            -0.0,
            1.0,
            -1.0,
            37.25,
            0.1,
            f32::MIN_POSITIVE,
            f32::MIN_POSITIVE / 2.0, // subnormal
            f32::MAX,
            f32::MIN,
            f32::EPSILON,
            123_456.79,
        ];
        for v in samples {
            assert_eq!(decode_float(&encode_float(v)).to_bits(), v.to_bits());
        }

        // Walk the exponent range with an irregular mantissa
        let mut bits: u32 = 0x0012_3457;
        while bits < 0x7F80_0000 {
            let v = f32::from_bits(bits);
            assert_eq!(decode_float(&encode_float(v)).to_bits(), bits);
            assert_eq!(decode_float(&encode_float(-v)).to_bits(), (-v).to_bits());
            bits = bits.wrapping_add(0x0031_7F13);
        }
    }

    #[test]
    fn test_short_input_decodes_to_zero() {
        assert_eq!(decode_float(&[]), 0.0);
        assert_eq!(decode_float(&[0x4214]), 0.0);
        assert_eq!(decode_u16(&[]), 0);
        assert_eq!(decode_u16(&[7, 9]), 7);
    }
}
