use image::{imageops, imageops::FilterType, GrayImage};

use super::{Correspondence, Descriptor, DescriptorSet, ImageCapability, ImageError, Raster};

pub const MAX_DIMENSION: u32 = 512;
pub const DESCRIPTOR_LEN: usize = PATCH_GRID * PATCH_GRID;

const PATCH_GRID: usize = 8;
const PATCH_RADIUS: f32 = 10.0;
const ORIENTATION_RADIUS: i32 = 8;
const BORDER: usize = 16;
const CELL_SIZE: usize = 16;
const HARRIS_K: f32 = 0.04;
const WINDOW_RADIUS: usize = 2;
const RESPONSE_FLOOR: f32 = 0.01;
const MAX_KEYPOINTS: usize = 500;

#[derive(Debug, Clone, Copy, Default)]
pub struct OrientedPatchExtractor;

impl OrientedPatchExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCapability for OrientedPatchExtractor {
    fn decode_and_normalize(&self, bytes: &[u8]) -> Result<Raster, ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(downsample(decoded.to_luma8()))
    }

    fn extract_descriptors(&self, raster: &Raster) -> DescriptorSet {
        let (w, h) = (raster.width() as usize, raster.height() as usize);
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return DescriptorSet::default();
        }

        let response = harris_response(raster);
        let descriptors = select_keypoints(&response, w, h)
            .into_iter()
            .filter_map(|(x, y)| {
                let angle = orientation(raster, x, y);
                describe(raster, x as f32, y as f32, angle)
            })
            .collect();
        DescriptorSet { descriptors }
    }

    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        train: &DescriptorSet,
        k: usize,
    ) -> Vec<Vec<Correspondence>> {
        query
            .descriptors
            .iter()
            .enumerate()
            .map(|(qi, q)| nearest(qi, q, train, k))
            .collect()
    }
}

pub fn downsample(mut gray: GrayImage) -> GrayImage {
    while gray.width() > MAX_DIMENSION || gray.height() > MAX_DIMENSION {
        let w = (gray.width() / 2).max(1);
        let h = (gray.height() / 2).max(1);
        gray = imageops::resize(&gray, w, h, FilterType::Triangle);
    }
    gray
}

fn harris_response(img: &GrayImage) -> Vec<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let px = |x: usize, y: usize| img.get_pixel(x as u32, y as u32)[0] as f32 / 255.0;

    let mut ixx = vec![0f32; w * h];
    let mut iyy = vec![0f32; w * h];
    let mut ixy = vec![0f32; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = 0.5 * (px(x + 1, y) - px(x - 1, y));
            let gy = 0.5 * (px(x, y + 1) - px(x, y - 1));
            let i = y * w + x;
            ixx[i] = gx * gx;
            iyy[i] = gy * gy;
            ixy[i] = gx * gy;
        }
    }

    let mut response = vec![0f32; w * h];
    let r = WINDOW_RADIUS;
    for y in r + 1..h - r - 1 {
        for x in r + 1..w - r - 1 {
            let (mut sxx, mut syy, mut sxy) = (0f32, 0f32, 0f32);
            for wy in y - r..=y + r {
                for wx in x - r..=x + r {
                    let i = wy * w + wx;
                    sxx += ixx[i];
                    syy += iyy[i];
                    sxy += ixy[i];
                }
            }
            let det = sxx * syy - sxy * sxy;
            let trace = sxx + syy;
            response[y * w + x] = det - HARRIS_K * trace * trace;
        }
    }
    response
}

fn select_keypoints(response: &[f32], w: usize, h: usize) -> Vec<(usize, usize)> {
    let strongest = response.iter().copied().fold(0f32, f32::max);
    if strongest <= 0.0 {
        return Vec::new();
    }
    let floor = strongest * RESPONSE_FLOOR;

    let mut picks: Vec<(usize, usize, f32)> = Vec::new();
    for cy in (BORDER..h - BORDER).step_by(CELL_SIZE) {
        for cx in (BORDER..w - BORDER).step_by(CELL_SIZE) {
            let mut best: Option<(usize, usize, f32)> = None;
            for y in cy..(cy + CELL_SIZE).min(h - BORDER) {
                for x in cx..(cx + CELL_SIZE).min(w - BORDER) {
                    let value = response[y * w + x];
                    if value > floor && best.map_or(true, |(_, _, b)| value > b) {
                        best = Some((x, y, value));
                    }
                }
            }
            picks.extend(best);
        }
    }
    picks.sort_by(|a, b| b.2.total_cmp(&a.2));
    picks.truncate(MAX_KEYPOINTS);
    picks.into_iter().map(|(x, y, _)| (x, y)).collect()
}

fn orientation(img: &GrayImage, x: usize, y: usize) -> f32 {
    let (mut m10, mut m01) = (0f32, 0f32);
    let r = ORIENTATION_RADIUS;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let px = (x as i32 + dx) as u32;
            let py = (y as i32 + dy) as u32;
            let value = img.get_pixel(px, py)[0] as f32;
            m10 += dx as f32 * value;
            m01 += dy as f32 * value;
        }
    }
    m01.atan2(m10)
}

fn describe(img: &GrayImage, x: f32, y: f32, angle: f32) -> Option<Descriptor> {
    let (sin, cos) = angle.sin_cos();
    let step = 2.0 * PATCH_RADIUS / PATCH_GRID as f32;
    let mut out = [0f32; DESCRIPTOR_LEN];
    for j in 0..PATCH_GRID {
        for i in 0..PATCH_GRID {
            let u = -PATCH_RADIUS + step * (i as f32 + 0.5);
            let v = -PATCH_RADIUS + step * (j as f32 + 0.5);
            let sx = x + u * cos - v * sin;
            let sy = y + u * sin + v * cos;
            out[j * PATCH_GRID + i] = bilinear(img, sx, sy);
        }
    }

    let mean = out.iter().sum::<f32>() / DESCRIPTOR_LEN as f32;
    out.iter_mut().for_each(|v| *v -= mean);
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < 1e-3 {
        return None;
    }
    out.iter_mut().for_each(|v| *v /= norm);
    Some(out)
}

fn bilinear(img: &GrayImage, x: f32, y: f32) -> f32 {
    let max_x = (img.width() - 1) as f32;
    let max_y = (img.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let (x0, y0) = (x.floor(), y.floor());
    let (x1, y1) = ((x0 + 1.0).min(max_x), (y0 + 1.0).min(max_y));
    let (fx, fy) = (x - x0, y - y0);
    let p = |px: f32, py: f32| img.get_pixel(px as u32, py as u32)[0] as f32;
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

fn nearest(qi: usize, q: &Descriptor, train: &DescriptorSet, k: usize) -> Vec<Correspondence> {
    let mut best: Vec<Correspondence> = Vec::with_capacity(k + 1);
    if k == 0 {
        return best;
    }
    for (ti, t) in train.descriptors.iter().enumerate() {
        let distance = q
            .iter()
            .zip(t.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt();
        if best.len() == k && distance >= best[k - 1].distance {
            continue;
        }
        let pos = best
            .iter()
            .position(|c| distance < c.distance)
            .unwrap_or(best.len());
        best.insert(
            pos,
            Correspondence {
                query: qi,
                train: ti,
                distance,
            },
        );
        best.truncate(k);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encode_png, textured_image};

    #[test]
    fn oversized_images_are_halved_until_they_fit() {
        let big = GrayImage::new(1200, 300);
        let small = downsample(big);
        assert_eq!((small.width(), small.height()), (300, 75));

        let fits = GrayImage::new(512, 512);
        assert_eq!(downsample(fits).dimensions(), (512, 512));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = OrientedPatchExtractor.decode_and_normalize(b"not an image");
        assert!(matches!(err, Err(ImageError::Decode(_))));
    }

    #[test]
    fn textured_images_yield_normalized_descriptors() {
        let extractor = OrientedPatchExtractor;
        let raster = extractor
            .decode_and_normalize(&encode_png(&textured_image(7, 128)))
            .unwrap();
        let set = extractor.extract_descriptors(&raster);
        assert!(set.len() > 10, "only {} descriptors", set.len());
        for d in &set.descriptors {
            let norm = d.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn flat_and_tiny_images_have_no_descriptors() {
        let extractor = OrientedPatchExtractor;
        assert!(extractor
            .extract_descriptors(&GrayImage::from_pixel(100, 100, image::Luma([128])))
            .is_empty());
        assert!(extractor
            .extract_descriptors(&GrayImage::new(20, 20))
            .is_empty());
    }

    #[test]
    fn knn_returns_sorted_neighbours() {
        let mut a = [0f32; DESCRIPTOR_LEN];
        a[0] = 1.0;
        let mut b = [0f32; DESCRIPTOR_LEN];
        b[1] = 1.0;
        let mut c = [0f32; DESCRIPTOR_LEN];
        c[0] = 0.9;
        c[1] = 0.1;
        let query = DescriptorSet {
            descriptors: vec![a],
        };
        let train = DescriptorSet {
            descriptors: vec![b, a, c],
        };
        let matches = OrientedPatchExtractor.match_descriptors(&query, &train, 2);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].len(), 2);
        assert_eq!(matches[0][0].train, 1);
        assert_eq!(matches[0][0].distance, 0.0);
        assert_eq!(matches[0][1].train, 2);
        assert!(OrientedPatchExtractor.match_descriptors(&query, &train, 0)[0].is_empty());
    }
}
