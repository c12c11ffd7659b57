//! Greedy scanline rectangle packer.
//!
//! Rectangles are placed largest-area first. Each one scans rightward from a running
//! cursor in `skip_distance` steps, wrapping to the next row band when it runs off the
//! right edge, until it finds a spot that overlaps nothing already placed or runs off
//! the bottom. Deterministic, single canvas, no rotation, not optimal.

use glam::UVec2;

use crate::geometry::PixelRect;

/// Default scan step in texels.
pub const DEFAULT_SKIP_DISTANCE: u32 = 8;

// ---------------------------------------------------------------------------
// PackableRect
// ---------------------------------------------------------------------------

/// One item to pack: an owner key, a fixed size, and the position the packer assigns.
#[derive(Clone, Debug, PartialEq)]
pub struct PackableRect<K> {
    key: K,
    size: UVec2,
    position: UVec2,
}

impl<K> PackableRect<K> {
    /// Creates an unplaced rect. The size never changes afterwards.
    pub fn new(key: K, size: UVec2) -> Self {
        Self {
            key,
            size,
            position: UVec2::ZERO,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Last position assigned by [`RectPacker::pack`].
    pub fn position(&self) -> UVec2 {
        self.position
    }

    pub fn area(&self) -> u64 {
        u64::from(self.size.x) * u64::from(self.size.y)
    }

    /// Placed bounds in texels.
    pub fn rect(&self) -> PixelRect {
        PixelRect::new(self.position, self.size)
    }

    fn place(&mut self, position: UVec2) {
        self.position = position;
    }
}

// ---------------------------------------------------------------------------
// PackingResult
// ---------------------------------------------------------------------------

/// Outcome of one packing pass.
///
/// `placed` and `unfitted` partition the input: every rect lands in exactly one.
#[derive(Clone, Debug, PartialEq)]
pub struct PackingResult<K> {
    /// Placed rects in processing (area-descending) order.
    pub placed: Vec<PackableRect<K>>,
    /// Keys of rects that found no position.
    pub unfitted: Vec<K>,
}

// ---------------------------------------------------------------------------
// RectPacker
// ---------------------------------------------------------------------------

/// Owns a working set of rects and packs them into a canvas.
#[derive(Clone, Debug)]
pub struct RectPacker<K> {
    rects: Vec<PackableRect<K>>,
    skip_distance: u32,
}

impl<K: Clone> Default for RectPacker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone> RectPacker<K> {
    pub fn new() -> Self {
        Self::with_skip_distance(DEFAULT_SKIP_DISTANCE)
    }

    /// A packer scanning in steps of `skip_distance` texels (at least 1).
    pub fn with_skip_distance(skip_distance: u32) -> Self {
        Self {
            rects: Vec::new(),
            skip_distance: skip_distance.max(1),
        }
    }

    pub fn skip_distance(&self) -> u32 {
        self.skip_distance
    }

    pub fn add(&mut self, rect: PackableRect<K>) {
        self.rects.push(rect);
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Current working set, in the order of the last pass.
    pub fn rects(&self) -> &[PackableRect<K>] {
        &self.rects
    }

    /// Places every rect of the working set into `canvas`.
    ///
    /// With `allow_removal_of_unfit`, rects that could not be placed are dropped from
    /// the working set, so later passes on this packer only see the placed ones.
    pub fn pack(&mut self, canvas: UVec2, allow_removal_of_unfit: bool) -> PackingResult<K> {
        // Stable: equal areas keep insertion order.
        self.rects.sort_by(|a, b| b.area().cmp(&a.area()));

        let mut placed_bounds: Vec<PixelRect> = Vec::with_capacity(self.rects.len());
        let mut fitted = vec![false; self.rects.len()];
        let mut placed = Vec::with_capacity(self.rects.len());
        let mut unfitted = Vec::new();
        let mut cursor = UVec2::ZERO;

        for (i, rect) in self.rects.iter_mut().enumerate() {
            match find_position(rect.size, cursor, canvas, self.skip_distance, &placed_bounds) {
                Some(position) => {
                    rect.place(position);
                    placed_bounds.push(rect.rect());
                    placed.push(rect.clone());
                    fitted[i] = true;
                    cursor = UVec2::new(position.x + rect.size.x, position.y);
                }
                None => unfitted.push(rect.key.clone()),
            }
        }

        if allow_removal_of_unfit {
            let mut flags = fitted.into_iter();
            self.rects.retain(|_| flags.next().unwrap_or(false));
        }

        PackingResult { placed, unfitted }
    }
}

/// Scans from `start` for the first position where a `size` rect fits inside `canvas`
/// without overlapping `placed`.
fn find_position(
    size: UVec2,
    start: UVec2,
    canvas: UVec2,
    skip_distance: u32,
    placed: &[PixelRect],
) -> Option<UVec2> {
    // No row can ever hold it.
    if size.x > canvas.x {
        return None;
    }

    let mut scan = start;
    loop {
        if u64::from(scan.y) + u64::from(size.y) > u64::from(canvas.y) {
            return None;
        }
        if u64::from(scan.x) + u64::from(size.x) > u64::from(canvas.x) {
            scan = UVec2::new(0, scan.y.saturating_add(skip_distance));
            continue;
        }
        let candidate = PixelRect::new(scan, size);
        if placed.iter().any(|other| candidate.overlaps(other)) {
            scan.x = scan.x.saturating_add(skip_distance);
            continue;
        }
        return Some(scan);
    }
}

/// One-shot pack of `rects` into `canvas`.
pub fn pack_rects<K: Clone>(
    rects: impl IntoIterator<Item = PackableRect<K>>,
    canvas: UVec2,
    skip_distance: u32,
) -> PackingResult<K> {
    let mut packer = RectPacker::with_skip_distance(skip_distance);
    for rect in rects {
        packer.add(rect);
    }
    packer.pack(canvas, false)
}
