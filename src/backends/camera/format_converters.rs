// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for capture buffers
//!
//! Sensors that cannot deliver RGB3 directly fall back to packed YUYV; these
//! helpers turn such buffers into the packed RGB888 layout frames use.

/// Convert YUYV (YUV 4:2:2) to packed RGB
///
/// YUYV format: Y0 U0 Y1 V0, each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients. Output is truncated to `width * height` pixels.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                return rgb;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}

/// Copy a possibly padded RGB buffer into a tight `width * 3` stride
pub fn pack_rgb_rows(data: &[u8], width: u32, height: u32, stride: usize) -> Vec<u8> {
    let row = width as usize * 3;
    if stride == row {
        return data[..data.len().min(row * height as usize)].to_vec();
    }

    let mut packed = Vec::with_capacity(row * height as usize);
    for line in data.chunks(stride.max(row)).take(height as usize) {
        packed.extend_from_slice(&line[..row.min(line.len())]);
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_stays_gray() {
        // Neutral chroma: every pixel should come out as its luma
        let data = [100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&data, 2, 1);
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_output_is_truncated() {
        let data = [0u8; 16];
        assert_eq!(yuyv_to_rgb(&data, 3, 1).len(), 9);
    }

    #[test]
    fn test_pack_rgb_rows_drops_padding() {
        let data = [1, 2, 3, 9, 4, 5, 6, 9];
        assert_eq!(pack_rgb_rows(&data, 1, 2, 4), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(pack_rgb_rows(&[7, 8, 9], 1, 1, 3), vec![7, 8, 9]);
    }
}
