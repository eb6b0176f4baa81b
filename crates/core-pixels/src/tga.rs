//! Uncompressed true-color TGA encoding for screenshots.
//!
//! Output is the classic 18-byte header followed by bottom-up pixel rows:
//! 24 bpp (BGR) for full-screen captures, 32 bpp (BGRA) when the alpha
//! channel should survive.

use crate::surface::PixelView;

/// Encode `view` as an uncompressed TGA. `with_alpha` selects 32 bpp
/// output; otherwise the alpha channel is dropped and 24 bpp is written.
pub fn encode_tga(view: PixelView<'_>, with_alpha: bool) -> Vec<u8> {
    let depth: u8 = if with_alpha { 32 } else { 24 };
    let bpp = depth as usize / 8;
    let mut out = Vec::with_capacity(18 + view.width as usize * view.height as usize * bpp);

    out.push(0); // no image ID
    out.push(0); // no color map
    out.push(2); // uncompressed truecolor
    out.extend_from_slice(&[0, 0, 0, 0, 0]); // color map spec (unused)
    out.extend_from_slice(&0u16.to_le_bytes()); // x origin
    out.extend_from_slice(&0u16.to_le_bytes()); // y origin
    out.extend_from_slice(&(view.width as u16).to_le_bytes());
    out.extend_from_slice(&(view.height as u16).to_le_bytes());
    out.push(depth);
    out.push(if with_alpha { 8 } else { 0 }); // alpha depth in descriptor

    for y in (0..view.height).rev() {
        for &px in view.row(y) {
            out.push(px as u8); // blue
            out.push((px >> 8) as u8); // green
            out.push((px >> 16) as u8); // red
            if with_alpha {
                out.push((px >> 24) as u8);
            }
        }
    }
    out
}
