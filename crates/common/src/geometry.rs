//! Texture shapes and the linear index to texel mapping.

use crate::error::{GpgpuError, GpgpuResult};
use serde::{Deserialize, Serialize};

/// Width and height of a texture that stores a linear buffer row by row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureShape {
    pub width: u32,
    pub height: u32,
}

impl TextureShape {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Lay `count` elements out in a grid no wider or taller than
    /// `max_dimension`.
    ///
    /// A single row is used whenever it fits. Otherwise the height is the
    /// smallest exact divisor of `count` that brings the row width under the
    /// limit. Counts with no such divisor (large primes, for instance) are
    /// rejected rather than padded.
    pub fn factorize(count: usize, max_dimension: u32) -> GpgpuResult<Self> {
        if count == 0 {
            return Err(GpgpuError::EmptyBuffer);
        }

        let max = max_dimension as usize;
        if count <= max {
            return Ok(Self::new(count as u32, 1));
        }

        (2..=max)
            .find(|&height| count % height == 0 && count / height <= max)
            .map(|height| Self::new((count / height) as u32, height as u32))
            .ok_or(GpgpuError::DimensionOverflow {
                count,
                max_dimension,
            })
    }

    /// Number of texels in the grid.
    #[inline]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn fits_within(&self, max_dimension: u32) -> bool {
        self.width <= max_dimension && self.height <= max_dimension
    }

    /// Normalized coordinate of the center of the texel holding `index`.
    ///
    /// Mirrors the `read` helper of the generated fragment preamble.
    pub fn texel_center(&self, index: usize) -> (f32, f32) {
        let width = self.width as usize;
        let x = ((index % width) as f32 + 0.5) / self.width as f32;
        let y = ((index / width) as f32 + 0.5) / self.height as f32;
        (x, y)
    }

    /// Linear index of the texel a nearest-filtered, clamp-to-edge sample
    /// at `(u, v)` lands on.
    pub fn index_at(&self, u: f32, v: f32) -> usize {
        let x = ((u * self.width as f32).floor().max(0.0) as u32).min(self.width - 1);
        let y = ((v * self.height as f32).floor().max(0.0) as u32).min(self.height - 1);
        y as usize * self.width as usize + x as usize
    }

    /// Linear index of the fragment whose window-space center is
    /// `(frag_x, frag_y)`.
    ///
    /// Mirrors the epilogue of the generated fragment stage.
    pub fn fragment_index(&self, frag_x: f32, frag_y: f32) -> usize {
        (frag_y - 0.5) as usize * self.width as usize + (frag_x - 0.5) as usize
    }
}
