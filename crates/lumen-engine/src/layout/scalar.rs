use core::fmt;

/// Element type of a buffer attribute.
///
/// Plain scalars are used by tightly packed vertex/index buffers. The 4-wide
/// aggregates are the only types accepted by uniform/storage block layouts;
/// for transcoding they decompose into 32-bit lanes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    /// `vec4<f32>`
    FloatVec4,
    /// `vec4<i32>`
    IntVec4,
    /// `vec4<u32>`
    UintVec4,
    /// `mat4x4<f32>`, column-major, four 16-byte columns.
    FloatMat4,
}

impl ScalarType {
    /// Size in bytes of one component of this type.
    #[inline]
    pub const fn byte_size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::FloatVec4 | Self::IntVec4 | Self::UintVec4 => 16,
            Self::FloatMat4 => 64,
        }
    }

    /// Number of 32-bit (or narrower) lanes one component decomposes into.
    #[inline]
    pub const fn lane_count(self) -> u32 {
        match self {
            Self::FloatVec4 | Self::IntVec4 | Self::UintVec4 => 4,
            Self::FloatMat4 => 16,
            _ => 1,
        }
    }

    /// The plain scalar a lane of this type is stored as.
    #[inline]
    pub const fn lane_type(self) -> ScalarType {
        match self {
            Self::FloatVec4 | Self::FloatMat4 => Self::F32,
            Self::IntVec4 => Self::I32,
            Self::UintVec4 => Self::U32,
            other => other,
        }
    }

    #[inline]
    pub const fn lane_size(self) -> u32 {
        self.lane_type().byte_size()
    }

    #[inline]
    pub const fn is_aggregate(self) -> bool {
        self.lane_count() > 1
    }

    /// Encodes one lane, little-endian, into `out[..self.lane_size()]`.
    ///
    /// Integers are truncated toward zero (NaN becomes 0, infinities saturate
    /// to the 64-bit range) and then wrapped modulo 2^bits, so `257.0` stored
    /// as `U8` reads back as `1` and `-1.0` reads back as `255`.
    pub fn encode_lane(self, value: f64, out: &mut [u8]) {
        let int = value as i64;
        match self.lane_type() {
            Self::I8 => out[..1].copy_from_slice(&(int as i8).to_le_bytes()),
            Self::U8 => out[..1].copy_from_slice(&(int as u8).to_le_bytes()),
            Self::I16 => out[..2].copy_from_slice(&(int as i16).to_le_bytes()),
            Self::U16 => out[..2].copy_from_slice(&(int as u16).to_le_bytes()),
            Self::I32 => out[..4].copy_from_slice(&(int as i32).to_le_bytes()),
            Self::U32 => out[..4].copy_from_slice(&(int as u32).to_le_bytes()),
            _ => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
        }
    }

    /// Decodes one little-endian lane from `bytes[..self.lane_size()]`.
    ///
    /// Every lane type widens to `f64` without loss.
    pub fn decode_lane(self, bytes: &[u8]) -> f64 {
        match self.lane_type() {
            Self::I8 => f64::from(i8::from_le_bytes([bytes[0]])),
            Self::U8 => f64::from(bytes[0]),
            Self::I16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            Self::U16 => f64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            Self::I32 => f64::from(i32::from_le_bytes(lane4(bytes))),
            Self::U32 => f64::from(u32::from_le_bytes(lane4(bytes))),
            _ => f64::from(f32::from_le_bytes(lane4(bytes))),
        }
    }

    /// Shader-language style name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::FloatVec4 => "vec4",
            Self::IntVec4 => "ivec4",
            Self::UintVec4 => "uvec4",
            Self::FloatMat4 => "mat4",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[inline]
fn lane4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ty: ScalarType, v: f64) -> f64 {
        let mut buf = [0u8; 4];
        ty.encode_lane(v, &mut buf);
        ty.decode_lane(&buf)
    }

    // ── sizes ─────────────────────────────────────────────────────────────

    #[test]
    fn aggregate_sizes() {
        assert_eq!(ScalarType::FloatVec4.byte_size(), 16);
        assert_eq!(ScalarType::FloatMat4.byte_size(), 64);
        assert_eq!(ScalarType::FloatMat4.lane_count(), 16);
        assert_eq!(ScalarType::UintVec4.lane_type(), ScalarType::U32);
        assert_eq!(ScalarType::FloatMat4.lane_size(), 4);
    }

    // ── narrowing ─────────────────────────────────────────────────────────

    #[test]
    fn unsigned_byte_wraps_modulo_256() {
        assert_eq!(roundtrip(ScalarType::U8, 257.0), 1.0);
        assert_eq!(roundtrip(ScalarType::U8, -1.0), 255.0);
        assert_eq!(roundtrip(ScalarType::U8, 255.9), 255.0);
    }

    #[test]
    fn signed_types_wrap_two_complement() {
        assert_eq!(roundtrip(ScalarType::I8, 128.0), -128.0);
        assert_eq!(roundtrip(ScalarType::I16, 32768.0), -32768.0);
        assert_eq!(roundtrip(ScalarType::I32, -7.9), -7.0);
    }

    #[test]
    fn u16_and_u32_wrap() {
        assert_eq!(roundtrip(ScalarType::U16, 65537.0), 1.0);
        assert_eq!(roundtrip(ScalarType::U32, 4_294_967_296.0 + 5.0), 5.0);
        assert_eq!(roundtrip(ScalarType::U32, 4_294_967_295.0), 4_294_967_295.0);
    }

    #[test]
    fn nan_becomes_zero_for_integers() {
        assert_eq!(roundtrip(ScalarType::I32, f64::NAN), 0.0);
        assert_eq!(roundtrip(ScalarType::U8, f64::NAN), 0.0);
    }

    #[test]
    fn floats_round_to_f32() {
        assert_eq!(roundtrip(ScalarType::F32, 0.5), 0.5);
        assert_eq!(roundtrip(ScalarType::F32, 0.1), f64::from(0.1f32));
        assert_eq!(roundtrip(ScalarType::FloatVec4, 3.25), 3.25);
    }

    #[test]
    fn lanes_are_little_endian() {
        let mut buf = [0u8; 4];
        ScalarType::U32.encode_lane(0x0102_0304 as f64, &mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
    }
}
