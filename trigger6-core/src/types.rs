//! Shared types for the frame-update pipeline.
//!
//! [`Framebuffer`] borrows the display pipeline's pixel memory for the
//! duration of one update. [`Rect`] is the damaged region within it.

// ── Framebuffer ──────────────────────────────────────────────────

/// Bytes per source pixel (XRGB8888).
pub const SOURCE_BYTES_PER_PIXEL: usize = 4;

/// A borrowed XRGB8888 framebuffer.
///
/// Pixels are little-endian 32-bit words, so each pixel is stored as
/// the bytes `B, G, R, X`. `data` holds `height` rows of `stride` bytes;
/// `stride` may exceed `width * 4`.
#[derive(Debug, Clone, Copy)]
pub struct Framebuffer<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> Framebuffer<'a> {
    /// Wrap pixel memory.
    ///
    /// # Panics
    ///
    /// Panics if `stride` is narrower than a row or `data` is shorter
    /// than `height` rows.
    pub fn new(data: &'a [u8], width: u32, height: u32, stride: usize) -> Self {
        assert!(
            stride >= width as usize * SOURCE_BYTES_PER_PIXEL,
            "stride {stride} narrower than {width} pixels"
        );
        assert!(
            data.len() >= stride * height as usize,
            "framebuffer holds {} bytes, need {}",
            data.len(),
            stride * height as usize
        );
        Self {
            data,
            width,
            height,
            stride,
        }
    }

    /// Wrap tightly packed pixel memory (`stride == width * 4`).
    pub fn packed(data: &'a [u8], width: u32, height: u32) -> Self {
        Self::new(data, width, height, width as usize * SOURCE_BYTES_PER_PIXEL)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The full bounds as a rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Visible pixels of row `y`, without padding.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * SOURCE_BYTES_PER_PIXEL]
    }
}

// ── Rect ─────────────────────────────────────────────────────────

/// A half-open rectangle `[x1, x2) x [y1, y2)` in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from origin and size.
    pub const fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// `true` when the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// `true` if the rectangle lies inside `width` x `height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2 && self.x2 <= width && self.y2 <= height
    }

    /// Expand horizontally so both edges are multiples of `granularity`.
    ///
    /// The start is rounded down and the end rounded up; the rectangle
    /// never shrinks. Already aligned rectangles are returned unchanged.
    pub fn align_horizontal(&self, granularity: u32) -> Self {
        assert!(granularity > 0, "granularity must be > 0");
        let x1 = self.x1 - self.x1 % granularity;
        let x2 = self.x2.div_ceil(granularity) * granularity;
        Self::new(x1, self.y1, x2, self.y2)
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

// ── Tests ────────────────────────────────────────────────────────
