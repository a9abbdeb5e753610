//! PCM format descriptors.
//!
//! A [`FormatDescriptor`] describes how a raw buffer is laid out. Only the
//! bit depth and signedness matter for scaling; they select one of the eight
//! supported [`Encoding`]s.

use crate::error::{Error, Result};

/// Describes the layout of a raw PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    /// Number of interleaved channels.
    pub channels: i32,
    /// Storage width of one channel sample: 8, 16, 24 or 32.
    pub bits_per_sample: i32,
    /// Sample rate in Hz.
    pub sample_rate: i32,
    /// Two's-complement samples when true.
    pub signed: bool,
}

impl FormatDescriptor {
    pub const fn new(channels: i32, bits_per_sample: i32, sample_rate: i32, signed: bool) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
            signed,
        }
    }

    /// Returns the sample encoding for this format.
    ///
    /// Fails with [`Error::Configuration`] if the bit depth is not one of
    /// 8, 16, 24 or 32.
    pub fn encoding(&self) -> Result<Encoding> {
        Encoding::from_parts(self.bits_per_sample, self.signed).ok_or_else(|| {
            Error::Configuration(format!(
                "unsupported bits per sample: {}",
                self.bits_per_sample
            ))
        })
    }
}

// Common format presets
impl FormatDescriptor {
    /// 16-bit signed stereo at 44.1kHz (CD quality)
    pub const CD: FormatDescriptor = FormatDescriptor::new(2, 16, 44100, true);
    /// 16-bit signed mono at 16kHz
    pub const S16_MONO_16K: FormatDescriptor = FormatDescriptor::new(1, 16, 16000, true);
    /// 24-bit signed stereo at 48kHz
    pub const S24_STEREO_48K: FormatDescriptor = FormatDescriptor::new(2, 24, 48000, true);
    /// 8-bit unsigned mono at 8kHz
    pub const U8_MONO_8K: FormatDescriptor = FormatDescriptor::new(1, 8, 8000, false);
}

/// The closed set of supported sample encodings. All multi-byte encodings
/// are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    S8,
    U8,
    S16LE,
    U16LE,
    S24LE,
    U24LE,
    S32LE,
    U32LE,
}

impl Encoding {
    pub const ALL: [Encoding; 8] = [
        Encoding::S8,
        Encoding::U8,
        Encoding::S16LE,
        Encoding::U16LE,
        Encoding::S24LE,
        Encoding::U24LE,
        Encoding::S32LE,
        Encoding::U32LE,
    ];

    /// Maps a (bits per sample, signedness) pair to an encoding.
    pub fn from_parts(bits_per_sample: i32, signed: bool) -> Option<Self> {
        let encoding = match (bits_per_sample, signed) {
            (8, true) => Encoding::S8,
            (8, false) => Encoding::U8,
            (16, true) => Encoding::S16LE,
            (16, false) => Encoding::U16LE,
            (24, true) => Encoding::S24LE,
            (24, false) => Encoding::U24LE,
            (32, true) => Encoding::S32LE,
            (32, false) => Encoding::U32LE,
            _ => return None,
        };
        Some(encoding)
    }

    pub fn bits(self) -> u32 {
        match self {
            Encoding::S8 | Encoding::U8 => 8,
            Encoding::S16LE | Encoding::U16LE => 16,
            Encoding::S24LE | Encoding::U24LE => 24,
            Encoding::S32LE | Encoding::U32LE => 32,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Encoding::S8 | Encoding::S16LE | Encoding::S24LE | Encoding::S32LE
        )
    }

    /// Returns the number of bytes one sample occupies.
    pub fn sample_bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Returns the number of whole samples in `len` bytes.
    pub fn samples(self, len: usize) -> usize {
        len / self.sample_bytes()
    }
}

/// A partial format change. Unset fields keep their last known value when
/// merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatUpdate {
    pub channels: Option<i32>,
    pub bits_per_sample: Option<i32>,
    pub sample_rate: Option<i32>,
    pub signed: Option<bool>,
}

impl FormatUpdate {
    pub fn with_channels(mut self, channels: i32) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_bits_per_sample(mut self, bits: i32) -> Self {
        self.bits_per_sample = Some(bits);
        self
    }

    pub fn with_sample_rate(mut self, rate: i32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = Some(signed);
        self
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.channels.is_none()
            && self.bits_per_sample.is_none()
            && self.sample_rate.is_none()
            && self.signed.is_none()
    }

    /// Overwrites the fields set in `other`. Returns true if any field was set.
    pub fn merge(&mut self, other: &FormatUpdate) -> bool {
        if let Some(v) = other.channels {
            self.channels = Some(v);
        }
        if let Some(v) = other.bits_per_sample {
            self.bits_per_sample = Some(v);
        }
        if let Some(v) = other.sample_rate {
            self.sample_rate = Some(v);
        }
        if let Some(v) = other.signed {
            self.signed = Some(v);
        }
        !other.is_empty()
    }

    /// Builds a full descriptor. Every field must be set.
    pub fn resolve(&self) -> Result<FormatDescriptor> {
        let missing = |field: &str| Error::Configuration(format!("format is missing {field}"));
        Ok(FormatDescriptor {
            channels: self.channels.ok_or_else(|| missing("channels"))?,
            bits_per_sample: self.bits_per_sample.ok_or_else(|| missing("bits per sample"))?,
            sample_rate: self.sample_rate.ok_or_else(|| missing("sample rate"))?,
            signed: self.signed.ok_or_else(|| missing("signedness"))?,
        })
    }
}

impl From<FormatDescriptor> for FormatUpdate {
    fn from(f: FormatDescriptor) -> Self {
        Self {
            channels: Some(f.channels),
            bits_per_sample: Some(f.bits_per_sample),
            sample_rate: Some(f.sample_rate),
            signed: Some(f.signed),
        }
    }
}
