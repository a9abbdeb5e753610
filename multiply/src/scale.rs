//! In-place sample scaling.
//!
//! Every scaler multiplies each sample of a raw little-endian buffer by a
//! gain and writes the result back over the input. Products are computed in
//! `f64`, truncated toward zero and then wrapped to the sample width: values
//! that overflow wrap around, they are never clamped.
//!
//! Trailing bytes that do not form a whole sample are left untouched.

use crate::format::Encoding;

/// Sign flag of a signed 24-bit sample, stored in bit 7 of its third byte.
pub const SIGN_BIT_MASK: u8 = 0x80;

/// Data bits of a signed 24-bit sample once the sign flag is removed.
pub const DATA_BITS_MASK: u32 = 0x7F_FFFF;

/// Data bits of an unsigned 24-bit sample.
pub const UNSIGNED_DATA_BITS_MASK: u32 = 0xFF_FFFF;

impl Encoding {
    /// Scales every sample in `buf` by `gain` in place.
    ///
    /// Returns the number of samples scaled.
    pub fn scale(self, buf: &mut [u8], gain: f32) -> usize {
        match self {
            Encoding::S8 => scale_fixed::<i8>(buf, gain),
            Encoding::U8 => scale_fixed::<u8>(buf, gain),
            Encoding::S16LE => scale_fixed::<i16>(buf, gain),
            Encoding::U16LE => scale_fixed::<u16>(buf, gain),
            Encoding::S24LE => scale_s24le(buf, gain),
            Encoding::U24LE => scale_u24le(buf, gain),
            Encoding::S32LE => scale_fixed::<i32>(buf, gain),
            Encoding::U32LE => scale_fixed::<u32>(buf, gain),
        }
    }
}

/// Multiplies in `f64`, truncates toward zero and keeps the low 64 bits.
/// Callers narrow the result with `as`, which wraps.
#[inline]
fn mul_truncate(value: f64, gain: f64) -> i64 {
    (value * gain) as i64
}

/// A fixed-width little-endian integer sample.
trait Sample: Copy {
    const BYTES: usize;

    fn read(bytes: &[u8]) -> Self;
    fn write(self, bytes: &mut [u8]);
    fn mul_wrapping(self, gain: f64) -> Self;
}

macro_rules! impl_sample {
    ($($t:ty),*) => {
        $(
            impl Sample for $t {
                const BYTES: usize = std::mem::size_of::<$t>();

                #[inline]
                fn read(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }

                #[inline]
                fn write(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn mul_wrapping(self, gain: f64) -> Self {
                    mul_truncate(f64::from(self), gain) as $t
                }
            }
        )*
    };
}

impl_sample!(i8, u8, i16, u16, i32, u32);

fn scale_fixed<T: Sample>(buf: &mut [u8], gain: f32) -> usize {
    let gain = f64::from(gain);
    let mut n = 0;
    for chunk in buf.chunks_exact_mut(T::BYTES) {
        T::read(chunk).mul_wrapping(gain).write(chunk);
        n += 1;
    }
    n
}

/// Scales packed signed 24-bit little-endian samples.
///
/// Each sample is staged into an `i32` with bit 7 of the third byte moved to
/// the top byte as a sign flag. The staged value is multiplied with
/// wraparound, masked with [`DATA_BITS_MASK`], and the flag is ORed back
/// into the third byte.
pub fn scale_s24le(buf: &mut [u8], gain: f32) -> usize {
    let gain = f64::from(gain);
    let mut n = 0;
    for sample in buf.chunks_exact_mut(3) {
        let flag = sample[2] & SIGN_BIT_MASK;
        let staged = i32::from_le_bytes([sample[0], sample[1], sample[2] & !SIGN_BIT_MASK, flag]);

        let scaled = mul_truncate(f64::from(staged), gain) as i32 as u32 & DATA_BITS_MASK;

        let [b0, b1, b2, _] = scaled.to_le_bytes();
        sample[0] = b0;
        sample[1] = b1;
        sample[2] = b2 | flag;
        n += 1;
    }
    n
}

/// Scales packed unsigned 24-bit little-endian samples.
///
/// Each sample is staged into a zero-extended `u32`, multiplied with
/// wraparound and masked with [`UNSIGNED_DATA_BITS_MASK`].
pub fn scale_u24le(buf: &mut [u8], gain: f32) -> usize {
    let gain = f64::from(gain);
    let mut n = 0;
    for sample in buf.chunks_exact_mut(3) {
        let staged = u32::from_le_bytes([sample[0], sample[1], sample[2], 0]);

        let scaled = mul_truncate(f64::from(staged), gain) as u32 & UNSIGNED_DATA_BITS_MASK;

        let [b0, b1, b2, _] = scaled.to_le_bytes();
        sample[0] = b0;
        sample[1] = b1;
        sample[2] = b2;
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[test]
    fn test_identity_gain_leaves_buffer_unchanged() {
        // 24 bytes divides evenly into 1, 2, 3 and 4 byte samples
        let mut extremes = vec![0x00, 0xFF, 0x7F, 0x80, 0x01, 0xFE];
        extremes.extend(pattern(18));

        for encoding in Encoding::ALL {
            let mut buf = extremes.clone();
            let n = encoding.scale(&mut buf, 1.0);
            assert_eq!(n, encoding.samples(24), "{encoding:?}");
            assert_eq!(buf, extremes, "{encoding:?}");
        }
    }

    #[test]
    fn test_trailing_bytes_untouched() {
        let mut buf = vec![10, 0, 20, 0, 7];
        let n = Encoding::S16LE.scale(&mut buf, 2.0);
        assert_eq!(n, 2);
        assert_eq!(buf, vec![20, 0, 40, 0, 7]);

        let mut buf = vec![1, 0, 0, 9, 9];
        assert_eq!(Encoding::U24LE.scale(&mut buf, 3.0), 1);
        assert_eq!(buf, vec![3, 0, 0, 9, 9]);
    }

    #[test]
    fn test_truncates_toward_zero() {
        let mut buf = [3i8 as u8, (-3i8) as u8, 5, (-5i8) as u8];
        Encoding::S8.scale(&mut buf, 0.5);
        assert_eq!(buf.map(|b| b as i8), [1, -1, 2, -2]);

        let mut buf = Vec::new();
        for v in [-100i16, 99, -32768] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Encoding::S16LE.scale(&mut buf, 0.5);
        let out: Vec<i16> = buf
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(out, vec![-50, 49, -16384]);
    }

    #[test]
    fn test_fixed_width_wraps() {
        let mut buf = [200u8];
        Encoding::U8.scale(&mut buf, 2.0);
        assert_eq!(buf, [144]);

        let mut buf = [100u8];
        Encoding::S8.scale(&mut buf, 2.0);
        assert_eq!(buf[0] as i8, -56);

        let mut buf = 20000i16.to_le_bytes();
        Encoding::S16LE.scale(&mut buf, 2.0);
        assert_eq!(i16::from_le_bytes(buf), -25536);

        let mut buf = 0x8000u16.to_le_bytes();
        Encoding::U16LE.scale(&mut buf, 2.0);
        assert_eq!(u16::from_le_bytes(buf), 0);

        let mut buf = i32::MAX.to_le_bytes();
        Encoding::S32LE.scale(&mut buf, 2.0);
        assert_eq!(i32::from_le_bytes(buf), -2);

        let mut buf = 0x8000_0001u32.to_le_bytes();
        Encoding::U32LE.scale(&mut buf, 2.0);
        assert_eq!(u32::from_le_bytes(buf), 2);
    }

    #[test]
    fn test_negative_gain_inverts() {
        let mut buf = 1000i16.to_le_bytes();
        Encoding::S16LE.scale(&mut buf, -1.0);
        assert_eq!(i16::from_le_bytes(buf), -1000);

        let mut buf = (-7i32).to_le_bytes();
        Encoding::S32LE.scale(&mut buf, -2.0);
        assert_eq!(i32::from_le_bytes(buf), 14);
    }

    #[test]
    fn test_s24_positive_sample() {
        let mut buf = [0x10, 0x00, 0x00];
        assert_eq!(scale_s24le(&mut buf, 2.0), 1);
        assert_eq!(buf, [0x20, 0x00, 0x00]);
    }

    #[test]
    fn test_s24_top_data_bit_masked() {
        // 0x400000 * 2 = 0x800000, which does not survive the 23-bit mask
        let mut buf = [0x00, 0x00, 0x40];
        scale_s24le(&mut buf, 2.0);
        assert_eq!(buf, [0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_s24_sign_flag_preserved() {
        let mut buf = [0x10, 0x00, 0x80];
        scale_s24le(&mut buf, 2.0);
        assert_eq!(buf, [0x20, 0x00, 0x80]);

        let mut buf = [0x00, 0x00, 0xC0];
        scale_s24le(&mut buf, 2.0);
        assert_eq!(buf, [0x00, 0x00, 0x80]);
    }

    #[test]
    fn test_u24_max_wraps_not_saturates() {
        let mut buf = [0xFF, 0xFF, 0xFF];
        scale_u24le(&mut buf, 2.0);
        assert_eq!(buf, [0xFE, 0xFF, 0xFF]);
    }

    #[test]
    fn test_u24_halves() {
        let mut buf = [0x00, 0x00, 0x80, 0x03, 0x00, 0x00];
        assert_eq!(Encoding::U24LE.scale(&mut buf, 0.5), 2);
        assert_eq!(buf, [0x00, 0x00, 0x40, 0x01, 0x00, 0x00]);
    }

    /// Decodes a sample for round-trip comparison: (sign flag, magnitude bits).
    fn decode(encoding: Encoding, bytes: &[u8]) -> (bool, i64) {
        match encoding {
            Encoding::S8 => (false, bytes[0] as i8 as i64),
            Encoding::U8 => (false, bytes[0] as i64),
            Encoding::S16LE => (false, i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            Encoding::U16LE => (false, u16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            Encoding::S24LE => {
                let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
                (bytes[2] & SIGN_BIT_MASK != 0, (raw & DATA_BITS_MASK) as i64)
            }
            Encoding::U24LE => (false, u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]) as i64),
            Encoding::S32LE => (false, i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
            Encoding::U32LE => (false, u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
        }
    }

    /// Builds samples that stay within range after doubling.
    fn half_range_samples(encoding: Encoding) -> Vec<u8> {
        let bits = encoding.bits();
        let mut buf = Vec::new();
        for step in 0..16i64 {
            let raw = match encoding {
                Encoding::S8 | Encoding::S16LE | Encoding::S32LE => {
                    let limit = 1i64 << (bits - 2);
                    (step - 8) * (limit / 16) + step
                }
                Encoding::S24LE => {
                    let magnitude = step * ((1i64 << 21) / 16) + step;
                    let flag = if step % 2 == 1 { 1i64 << 23 } else { 0 };
                    magnitude | flag
                }
                _ => step * ((1i64 << (bits - 2)) / 16) + step,
            };
            let bytes = raw.to_le_bytes();
            buf.extend_from_slice(&bytes[..encoding.sample_bytes()]);
        }
        buf
    }

    #[test]
    fn test_gain_round_trip_within_tolerance() {
        for encoding in Encoding::ALL {
            for (g, inv) in [(0.5f32, 2.0f32), (0.25, 4.0), (2.0, 0.5)] {
                let original = half_range_samples(encoding);
                let mut buf = original.clone();
                encoding.scale(&mut buf, g);
                encoding.scale(&mut buf, inv);

                let width = encoding.sample_bytes();
                let tolerance = if g < 1.0 { (inv as i64) - 1 } else { 0 };
                for (a, b) in original.chunks_exact(width).zip(buf.chunks_exact(width)) {
                    let (sa, va) = decode(encoding, a);
                    let (sb, vb) = decode(encoding, b);
                    assert_eq!(sa, sb, "{encoding:?} sign flag");
                    assert!(
                        (va - vb).abs() <= tolerance.max(1),
                        "{encoding:?} gain {g}: {va} vs {vb}"
                    );
                }
            }
        }
    }
}
