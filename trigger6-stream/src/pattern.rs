//! Synthetic XRGB8888 content: vertical colour bars with a square that
//! bounces around the screen.
//!
//! Each [`advance`](TestPattern::advance) moves the square and returns
//! the damaged region: the union of where it was and where it is now.

use trigger6_core::{Framebuffer, Rect};

const BARS: [u32; 8] = [
    0x00ff_ffff, // white
    0x00ff_ff00, // yellow
    0x0000_ffff, // cyan
    0x0000_ff00, // green
    0x00ff_00ff, // magenta
    0x00ff_0000, // red
    0x0000_00ff, // blue
    0x0000_0000, // black
];

const BOX_COLOUR: u32 = 0x0080_8080;
const STEP: i64 = 7;

pub struct TestPattern {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    box_size: u32,
    box_rect: Rect,
    dx: i64,
    dy: i64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, box_size: u32) -> Self {
        let box_size = box_size.clamp(1, width.min(height).max(1));
        let mut pattern = Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
            box_size,
            box_rect: Rect::from_xywh(0, 0, box_size, box_size),
            dx: STEP,
            dy: STEP,
        };
        pattern.fill(pattern.bounds());
        pattern
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn framebuffer(&self) -> Framebuffer<'_> {
        Framebuffer::packed(&self.pixels, self.width, self.height)
    }

    /// Current position of the square.
    pub fn box_rect(&self) -> Rect {
        self.box_rect
    }

    /// Move the square one step and redraw; returns the damaged region.
    pub fn advance(&mut self) -> Rect {
        let old = self.box_rect;

        let max_x = i64::from(self.width - self.box_size);
        let max_y = i64::from(self.height - self.box_size);
        let (x, dx) = bounce(i64::from(old.x1), self.dx, max_x);
        let (y, dy) = bounce(i64::from(old.y1), self.dy, max_y);
        self.dx = dx;
        self.dy = dy;
        self.box_rect = Rect::from_xywh(x as u32, y as u32, self.box_size, self.box_size);

        self.fill(old);
        self.fill(self.box_rect);
        old.union(&self.box_rect)
    }

    /// Repaint `area` from the bars and the square.
    fn fill(&mut self, area: Rect) {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let stride = self.width as usize * 4;
        for y in area.y1..area.y2 {
            for x in area.x1..area.x2 {
                let inside = x >= self.box_rect.x1
                    && x < self.box_rect.x2
                    && y >= self.box_rect.y1
                    && y < self.box_rect.y2;
                let colour = if inside {
                    BOX_COLOUR
                } else {
                    BARS[((x / bar_width) as usize).min(BARS.len() - 1)]
                };
                let at = y as usize * stride + x as usize * 4;
                self.pixels[at..at + 4].copy_from_slice(&colour.to_le_bytes());
            }
        }
    }
}

fn bounce(pos: i64, delta: i64, max: i64) -> (i64, i64) {
    let next = pos + delta;
    if next < 0 {
        (0, -delta)
    } else if next > max {
        (max, -delta)
    } else {
        (next, delta)
    }
}

// ── Tests ────────────────────────────────────────────────────────
