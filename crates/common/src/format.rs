//! Texel formats used to store linear buffers.

use half::f16;
use serde::{Deserialize, Serialize};

/// Single-channel floating point texel format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TexelFormat {
    /// 32-bit float, the format every dispatch renders into.
    #[default]
    R32Float,
    /// Packed 16-bit half float, for static weight-style inputs.
    R16Float,
}

impl TexelFormat {
    #[inline]
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            TexelFormat::R32Float => 4,
            TexelFormat::R16Float => 2,
        }
    }

    /// Zero-filled texel bytes for `count` elements.
    pub fn zeroed(self, count: usize) -> Vec<u8> {
        vec![0; count * self.bytes_per_texel()]
    }

    /// Texel bytes storing `data` in this format. Halves round to nearest.
    pub fn encode(self, data: &[f32]) -> Vec<u8> {
        match self {
            TexelFormat::R32Float => f32_texels(data).to_vec(),
            TexelFormat::R16Float => data
                .iter()
                .flat_map(|&v| f16::from_f32(v).to_le_bytes())
                .collect(),
        }
    }

    /// Texel bytes storing packed halves in this format.
    pub fn encode_half(self, data: &[f16]) -> Vec<u8> {
        match self {
            TexelFormat::R32Float => data
                .iter()
                .flat_map(|&v| v.to_f32().to_le_bytes())
                .collect(),
            TexelFormat::R16Float => f16_texels(data).to_vec(),
        }
    }

    /// Widen raw texel bytes to f32 values.
    ///
    /// Trailing bytes that do not form a whole texel are ignored.
    pub fn decode(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            TexelFormat::R32Float => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            TexelFormat::R16Float => bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
        }
    }
}

/// Reinterpret f32 values as texel bytes.
pub fn f32_texels(data: &[f32]) -> &[u8] {
    bytemuck::cast_slice(data)
}

/// Reinterpret packed halves as texel bytes.
pub fn f16_texels(data: &[f16]) -> &[u8] {
    bytemuck::cast_slice(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_texel() {
        assert_eq!(TexelFormat::R32Float.bytes_per_texel(), 4);
        assert_eq!(TexelFormat::R16Float.bytes_per_texel(), 2);
        assert_eq!(TexelFormat::R16Float.zeroed(3).len(), 6);
    }

    #[test]
    fn test_decode_f32() {
        let values = [1.5f32, -2.0, 0.0];
        let decoded = TexelFormat::R32Float.decode(f32_texels(&values));
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_encode_converts_to_format() {
        let values = [0.25f32, -8.0];
        assert_eq!(TexelFormat::R32Float.encode(&values).len(), 8);
        assert_eq!(TexelFormat::R16Float.decode(&TexelFormat::R16Float.encode(&values)), values);

        let halves = [f16::from_f32(1.5), f16::from_f32(-0.5)];
        assert_eq!(TexelFormat::R32Float.decode(&TexelFormat::R32Float.encode_half(&halves)), vec![1.5, -0.5]);
        assert_eq!(TexelFormat::R16Float.encode_half(&halves), f16_texels(&halves));
    }

    #[test]
    fn test_decode_half_widens() {
        let halves = [f16::from_f32(0.5), f16::from_f32(-3.0)];
        let decoded = TexelFormat::R16Float.decode(f16_texels(&halves));
        assert_eq!(decoded, vec![0.5, -3.0]);
    }
}
