//! XRGB8888 → wire pixel conversion.
//!
//! Converts a rectangle of a [`Framebuffer`] into one of the packed
//! encodings the adapter accepts, one line at a time:
//!
//! | Encoding  | Bytes/pixel | Layout                          |
//! |-----------|-------------|---------------------------------|
//! | `Yuv422`  | 2           | `Y0 U Y1 V` per pixel pair      |
//! | `Bgr24`   | 3           | `B G R` per pixel               |
//!
//! YUV uses the BT.601 limited-range integer transform. The chroma of
//! a pixel pair is the rounded mean of both pixels. Output depends
//! only on the input bytes, so identical inputs always produce
//! identical output.

use bytes::BytesMut;

use crate::types::{Framebuffer, Rect, SOURCE_BYTES_PER_PIXEL};

// ── WireEncoding ─────────────────────────────────────────────────

/// Pixel encoding of the payload sent to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireEncoding {
    /// Packed YUV 4:2:2 (YUYV).
    Yuv422,
    /// Packed 24-bit BGR.
    Bgr24,
}

impl WireEncoding {
    /// Bytes produced per source pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            WireEncoding::Yuv422 => 2,
            WireEncoding::Bgr24 => 3,
        }
    }

    /// Bytes produced for a rectangle.
    pub fn payload_len(self, rect: &Rect) -> usize {
        rect.width() as usize * rect.height() as usize * self.bytes_per_pixel()
    }
}

// ── Conversion ───────────────────────────────────────────────────

/// Convert `rect` of `fb` into a freshly allocated buffer.
pub fn convert(fb: &Framebuffer<'_>, rect: Rect, encoding: WireEncoding) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(encoding.payload_len(&rect));
    convert_into(fb, rect, encoding, &mut out);
    out.to_vec()
}

/// Append the converted pixels of `rect` to `out`.
///
/// Columns at or beyond the framebuffer's width are emitted as black,
/// which is what outward block alignment at the right edge needs.
///
/// # Panics
///
/// Panics if `rect` extends below the framebuffer.
pub fn convert_into(fb: &Framebuffer<'_>, rect: Rect, encoding: WireEncoding, out: &mut BytesMut) {
    assert!(
        rect.y2 <= fb.height(),
        "rect {rect} extends below framebuffer height {}",
        fb.height()
    );

    let width = rect.width() as usize;
    let line_len = width * encoding.bytes_per_pixel();
    out.reserve(line_len * rect.height() as usize);

    for y in rect.y1..rect.y2 {
        let row = fb.row(y);
        let start = out.len();
        out.resize(start + line_len, 0);
        let dst = &mut out[start..];
        match encoding {
            WireEncoding::Yuv422 => xrgb_to_yuv422_line(dst, row, rect.x1 as usize, width),
            WireEncoding::Bgr24 => xrgb_to_bgr24_line(dst, row, rect.x1 as usize, width),
        }
    }
}

/// `(r, g, b)` of pixel `x` in `row`, black past the end.
#[inline]
fn rgb_at(row: &[u8], x: usize) -> (i32, i32, i32) {
    let off = x * SOURCE_BYTES_PER_PIXEL;
    match row.get(off..off + 3) {
        Some(p) => (p[2] as i32, p[1] as i32, p[0] as i32),
        None => (0, 0, 0),
    }
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> i32 {
    ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> i32 {
    ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> i32 {
    ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128
}

/// Convert `width` pixels of `row` starting at `x` into YUYV.
///
/// An odd trailing pixel is paired with itself.
pub fn xrgb_to_yuv422_line(dst: &mut [u8], row: &[u8], x: usize, width: usize) {
    debug_assert!(dst.len() >= width * 2, "destination line too short");

    for (pair, out) in dst[..width * 2].chunks_exact_mut(4).enumerate() {
        let (r0, g0, b0) = rgb_at(row, x + pair * 2);
        let (r1, g1, b1) = rgb_at(row, x + pair * 2 + 1);

        let u = (chroma_u(r0, g0, b0) + chroma_u(r1, g1, b1) + 1) >> 1;
        let v = (chroma_v(r0, g0, b0) + chroma_v(r1, g1, b1) + 1) >> 1;

        out[0] = clamp(luma(r0, g0, b0));
        out[1] = clamp(u);
        out[2] = clamp(luma(r1, g1, b1));
        out[3] = clamp(v);
    }

    if width % 2 == 1 {
        let last = width - 1;
        let (r, g, b) = rgb_at(row, x + last);
        let out = &mut dst[last * 2..last * 2 + 2];
        out[0] = clamp(luma(r, g, b));
        out[1] = clamp(chroma_u(r, g, b));
    }
}

/// Convert `width` pixels of `row` starting at `x` into packed BGR.
pub fn xrgb_to_bgr24_line(dst: &mut [u8], row: &[u8], x: usize, width: usize) {
    debug_assert!(dst.len() >= width * 3, "destination line too short");

    for (i, out) in dst[..width * 3].chunks_exact_mut(3).enumerate() {
        let (r, g, b) = rgb_at(row, x + i);
        out[0] = b as u8;
        out[1] = g as u8;
        out[2] = r as u8;
    }
}

#[inline]
fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a packed XRGB framebuffer from `(r, g, b)` per pixel.
    fn xrgb(pixels: &[(u8, u8, u8)]) -> Vec<u8> {
        pixels.iter().flat_map(|&(r, g, b)| [b, g, r, 0xFF]).collect()
    }

    #[test]
    fn black_and_white_yuv() {
        let data = xrgb(&[(0, 0, 0), (0, 0, 0), (255, 255, 255), (255, 255, 255)]);
        let fb = Framebuffer::packed(&data, 4, 1);
        let out = convert(&fb, fb.bounds(), WireEncoding::Yuv422);

        assert_eq!(out, vec![16, 128, 16, 128, 235, 128, 235, 128]);
    }

    #[test]
    fn pure_red_chroma() {
        let data = xrgb(&[(255, 0, 0), (255, 0, 0)]);
        let fb = Framebuffer::packed(&data, 2, 1);
        let out = convert(&fb, fb.bounds(), WireEncoding::Yuv422);

        // Y = 82, U = 90, V = 240 under BT.601 limited range.
        assert_eq!(out, vec![82, 90, 82, 240]);
    }

    #[test]
    fn bgr24_drops_padding_byte() {
        let data = xrgb(&[(1, 2, 3), (4, 5, 6)]);
        let fb = Framebuffer::packed(&data, 2, 1);
        let out = convert(&fb, fb.bounds(), WireEncoding::Bgr24);
        assert_eq!(out, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn line_lengths_follow_encoding() {
        let data = vec![0x40u8; 32 * 8 * 4];
        let fb = Framebuffer::packed(&data, 32, 8);
        let rect = Rect::new(16, 2, 32, 6);

        assert_eq!(convert(&fb, rect, WireEncoding::Yuv422).len(), 16 * 4 * 2);
        assert_eq!(convert(&fb, rect, WireEncoding::Bgr24).len(), 16 * 4 * 3);
    }

    #[test]
    fn respects_stride_and_origin() {
        // 2x2 image, stride 16 (8 padding bytes per row).
        let mut data = vec![0xEEu8; 32];
        data[16..24].copy_from_slice(&xrgb(&[(9, 8, 7), (6, 5, 4)]));
        let fb = Framebuffer::new(&data, 2, 2, 16);

        let out = convert(&fb, Rect::new(1, 1, 2, 2), WireEncoding::Bgr24);
        assert_eq!(out, vec![4, 5, 6]);
    }

    #[test]
    fn columns_past_width_are_black() {
        let data = xrgb(&[(255, 255, 255); 3]);
        let fb = Framebuffer::packed(&data, 3, 1);
        let out = convert(&fb, Rect::new(0, 0, 4, 1), WireEncoding::Bgr24);
        assert_eq!(&out[9..], &[0, 0, 0]);
    }

    #[test]
    fn conversion_is_deterministic() {
        let data: Vec<u8> = (0..64 * 4 * 4).map(|i| (i * 37 % 251) as u8).collect();
        let fb = Framebuffer::packed(&data, 64, 4);
        let rect = Rect::new(3, 1, 61, 4);

        for enc in [WireEncoding::Yuv422, WireEncoding::Bgr24] {
            assert_eq!(convert(&fb, rect, enc), convert(&fb, rect, enc));
        }
    }

    #[test]
    fn odd_width_yuv_fills_every_byte() {
        let data = xrgb(&[(255, 255, 255); 3]);
        let fb = Framebuffer::packed(&data, 3, 1);
        let out = convert(&fb, fb.bounds(), WireEncoding::Yuv422);
        assert_eq!(out, vec![235, 128, 235, 128, 235, 128]);
    }
}
