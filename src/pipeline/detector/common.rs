//! Image preprocessing and output decoding shared by the landmark models.

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::Frame;

pub const POSE_INPUT_SIZE: u32 = 256;
pub const HAND_INPUT_SIZE: u32 = 224;

/// Letterbox a camera frame into a `target_size` square NHWC tensor with
/// channel values scaled to [0, 1]. Aspect ratio is preserved; the borders
/// stay black.
pub fn prepare_frame(frame: &Frame, target_size: u32) -> Result<Array4<f32>> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    for px in canvas.chunks_mut(4) {
        px[3] = 255;
    }
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))
}

/// Split a flat model output into `count` (x, y, z) keypoints, scaled from
/// input-square pixels to normalized coordinates.
pub fn decode_keypoints(flat: &[f32], count: usize, input_size: u32) -> Result<Vec<[f32; 3]>> {
    if flat.len() < count * 3 {
        return Err(anyhow!(
            "unexpected keypoint output length: got {}, need {}",
            flat.len(),
            count * 3
        ));
    }

    let scale = input_size as f32;
    let mut points = Vec::with_capacity(count);
    for chunk in flat.chunks_exact(3).take(count) {
        points.push([chunk[0] / scale, chunk[1] / scale, chunk[2] / scale]);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keypoints_scales_and_chunks() {
        let flat = [0.0, 112.0, 224.0, 56.0, 56.0, 56.0, 1.0, 1.0, 1.0];
        let points = decode_keypoints(&flat, 2, 224).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], [0.0, 0.5, 1.0]);
        assert_eq!(points[1], [0.25, 0.25, 0.25]);
    }

    #[test]
    fn decode_keypoints_rejects_short_output() {
        assert!(decode_keypoints(&[1.0, 2.0], 1, 224).is_err());
    }
}
