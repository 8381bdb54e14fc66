//! Typed, planar pixel data.
//!
//! Each channel is stored as its own plane in the numeric type the store
//! reported. Planes are never converted unless a caller asks for it with
//! [`Samples::convert_to`].

use seqmix_project_model::ChannelFormat;

use crate::error::{StoreError, StoreResult};

/// Format tags produced by the bundled stores.
pub mod format {
    pub const UINT8: &str = "uint8";
    pub const UINT16: &str = "uint16";
    pub const UINT32: &str = "uint32";
    pub const HALF: &str = "half";
    pub const FLOAT: &str = "float";

    /// Every tag [`Samples::convert_to`](super::Samples::convert_to) accepts.
    pub const ALL: [&str; 5] = [UINT8, UINT16, UINT32, HALF, FLOAT];
}

/// Samples of one channel plane, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    /// IEEE 754 binary16 bit patterns.
    F16(Vec<u16>),
    F32(Vec<f32>),
}

/// One named channel plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlane {
    pub name: String,
    pub format: ChannelFormat,
    pub samples: Samples,
}

/// Planar image data for one subimage or output frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub planes: Vec<ChannelPlane>,
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) | Samples::F16(v) => v.len(),
            Samples::U32(v) => v.len(),
            Samples::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tag of the numeric type held.
    pub fn format_tag(&self) -> &'static str {
        match self {
            Samples::U8(_) => format::UINT8,
            Samples::U16(_) => format::UINT16,
            Samples::U32(_) => format::UINT32,
            Samples::F16(_) => format::HALF,
            Samples::F32(_) => format::FLOAT,
        }
    }

    /// `count` samples of `value`, stored as `format`.
    pub fn filled(format: &ChannelFormat, count: usize, value: f32) -> StoreResult<Self> {
        Samples::F32(vec![value; count]).convert_to(format)
    }

    /// Explicit conversion. Integers map to and from the normalized `[0, 1]`
    /// float range.
    pub fn convert_to(&self, target: &ChannelFormat) -> StoreResult<Samples> {
        if self.format_tag() == target.as_str() {
            return Ok(self.clone());
        }

        let normalized = self.to_normalized();
        let converted = match target.as_str() {
            format::UINT8 => Samples::U8(
                normalized
                    .iter()
                    .map(|v| (v.clamp(0.0, 1.0) * u8::MAX as f64).round() as u8)
                    .collect(),
            ),
            format::UINT16 => Samples::U16(
                normalized
                    .iter()
                    .map(|v| (v.clamp(0.0, 1.0) * u16::MAX as f64).round() as u16)
                    .collect(),
            ),
            format::UINT32 => Samples::U32(
                normalized
                    .iter()
                    .map(|v| (v.clamp(0.0, 1.0) * u32::MAX as f64).round() as u32)
                    .collect(),
            ),
            format::HALF => Samples::F16(
                normalized
                    .iter()
                    .map(|v| f32_to_f16_bits(*v as f32))
                    .collect(),
            ),
            format::FLOAT => Samples::F32(normalized.iter().map(|v| *v as f32).collect()),
            other => {
                return Err(StoreError::unsupported(format!(
                    "no conversion from {} to '{other}'",
                    self.format_tag()
                )))
            }
        };
        Ok(converted)
    }

    fn to_normalized(&self) -> Vec<f64> {
        match self {
            Samples::U8(v) => v.iter().map(|s| *s as f64 / u8::MAX as f64).collect(),
            Samples::U16(v) => v.iter().map(|s| *s as f64 / u16::MAX as f64).collect(),
            Samples::U32(v) => v.iter().map(|s| *s as f64 / u32::MAX as f64).collect(),
            Samples::F16(v) => v.iter().map(|s| f16_bits_to_f32(*s) as f64).collect(),
            Samples::F32(v) => v.iter().map(|s| *s as f64).collect(),
        }
    }
}

impl ChannelPlane {
    pub fn new(name: impl Into<String>, samples: Samples) -> Self {
        let format = ChannelFormat::new(samples.format_tag());
        Self {
            name: name.into(),
            format,
            samples,
        }
    }
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            planes: Vec::new(),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Append a plane; its sample count must match the geometry.
    pub fn push_plane(&mut self, plane: ChannelPlane) -> StoreResult<()> {
        if plane.samples.len() != self.pixel_count() {
            return Err(StoreError::unsupported(format!(
                "channel '{}' has {} samples, expected {} for {}x{}",
                plane.name,
                plane.samples.len(),
                self.pixel_count(),
                self.width,
                self.height
            )));
        }
        self.planes.push(plane);
        Ok(())
    }

    pub fn plane(&self, name: &str) -> Option<&ChannelPlane> {
        self.planes.iter().find(|p| p.name == name)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.planes.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Decode a binary16 bit pattern.
pub fn f16_bits_to_f32(half: u16) -> f32 {
    let sign = ((half >> 15) as u32) << 31;
    let exponent = ((half >> 10) & 0x1f) as u32;
    let mantissa = (half & 0x3ff) as u32;

    let bits = match exponent {
        0 if mantissa == 0 => sign,
        0 => {
            // Subnormal: renormalize.
            let mut e = 127 - 15 + 1;
            let mut m = mantissa;
            while m & 0x400 == 0 {
                m <<= 1;
                e -= 1;
            }
            sign | (e << 23) | ((m & 0x3ff) << 13)
        }
        0x1f => sign | 0x7f80_0000 | (mantissa << 13),
        _ => sign | ((exponent + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(bits)
}

/// Encode to a binary16 bit pattern, rounding to nearest.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let e = exponent - 127 + 15;
    if e >= 0x1f {
        return sign | 0x7c00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = (mantissa | 0x80_0000) >> (14 - e);
        return sign | m as u16;
    }

    let half = sign | ((e as u16) << 10) | (mantissa >> 13) as u16;
    let round = ((mantissa >> 12) & 1) as u16;
    half + round
}
