//! Integer pixel rectangles and normalized UV rectangles shared by the packer and the group.

use glam::{UVec2, Vec2};

// ---------------------------------------------------------------------------
// PixelRect
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle in texel space, `min` inclusive, `min + size` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    /// Top-left corner.
    pub min: UVec2,
    /// Width and height in texels.
    pub size: UVec2,
}

impl PixelRect {
    /// Creates a rectangle at `min` with the given `size`.
    pub fn new(min: UVec2, size: UVec2) -> Self {
        Self { min, size }
    }

    /// Exclusive bottom-right corner.
    pub fn max(&self) -> UVec2 {
        self.min + self.size
    }

    /// Number of texels covered, widened so large canvases cannot overflow.
    pub fn area(&self) -> u64 {
        u64::from(self.size.x) * u64::from(self.size.y)
    }

    /// Returns `true` if the rectangle covers no texels.
    pub fn is_empty(&self) -> bool {
        self.size.x == 0 || self.size.y == 0
    }

    /// Bounding-box overlap test. Empty rectangles overlap nothing.
    pub fn overlaps(&self, other: &PixelRect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (a_max, b_max) = (self.max(), other.max());
        self.min.x < b_max.x && other.min.x < a_max.x && self.min.y < b_max.y && other.min.y < a_max.y
    }

    /// Returns `true` if the rectangle lies entirely inside a `canvas`-sized area at the origin.
    pub fn fits_within(&self, canvas: UVec2) -> bool {
        u64::from(self.min.x) + u64::from(self.size.x) <= u64::from(canvas.x)
            && u64::from(self.min.y) + u64::from(self.size.y) <= u64::from(canvas.y)
    }

    /// Divides position and size by the canvas resolution, yielding a rect in `[0,1]²`.
    pub fn normalized(&self, canvas: UVec2) -> UvRect {
        let res = canvas.as_vec2();
        UvRect {
            origin: self.min.as_vec2() / res,
            size: self.size.as_vec2() / res,
        }
    }

    /// Scales the rectangle by a per-axis coefficient.
    ///
    /// Both corners are floored independently, so two disjoint rectangles stay disjoint
    /// after scaling by the same coefficient.
    pub fn scaled(&self, coefficient: Vec2) -> PixelRect {
        let min = scale_floor(self.min, coefficient);
        let max = scale_floor(self.max(), coefficient);
        PixelRect {
            min,
            size: max.saturating_sub(min),
        }
    }
}

/// Multiplies an extent by a coefficient and floors each component.
pub fn scale_floor(value: UVec2, coefficient: Vec2) -> UVec2 {
    (value.as_vec2() * coefficient).floor().as_uvec2()
}

// ---------------------------------------------------------------------------
// UvRect
// ---------------------------------------------------------------------------

/// Rectangle in normalized texture coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UvRect {
    /// Lower corner in UV space.
    pub origin: Vec2,
    /// Extent in UV space.
    pub size: Vec2,
}

impl UvRect {
    /// Maps a UV in the material's own `[0,1]²` space into this atlas cell:
    /// `uv * size + origin`.
    pub fn remap(&self, uv: Vec2) -> Vec2 {
        uv * self.size + self.origin
    }

    /// Inverse of [`UvRect::remap`]. Degenerate axes map back to zero.
    pub fn invert(&self, uv: Vec2) -> Vec2 {
        let delta = uv - self.origin;
        Vec2::new(
            if self.size.x != 0.0 { delta.x / self.size.x } else { 0.0 },
            if self.size.y != 0.0 { delta.y / self.size.y } else { 0.0 },
        )
    }
}
