//! Dense per-frame images exchanged with tracking and the renderer.

use glam::Vec4;

/// Row-major image of fixed resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Clone> Image<T> {
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn fill(&mut self, value: T) {
        for px in self.data.iter_mut() {
            *px = value.clone();
        }
    }
}

impl<T> Image<T> {
    /// Wrap existing row-major pixels. Returns `None` if the length does not
    /// match the resolution.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y as usize * self.width as usize + x as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.data.get_mut(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

/// Metric z-depth per pixel; 0 or non-finite marks a missing measurement
pub type DepthFrame = Image<f32>;

/// RGB color per pixel
pub type ColorFrame = Image<[u8; 3]>;

/// Camera-space or world-space points/normals; invalid pixels carry NaN in x
pub type PointMap = Image<Vec4>;

/// RGBA preview rendering
pub type PreviewImage = Image<[u8; 4]>;

impl DepthFrame {
    /// Convert raw sensor units to meters. Samples beyond `depth_cutoff`
    /// meters are dropped to 0.
    pub fn from_raw_u16(
        width: u32,
        height: u32,
        raw: &[u16],
        depth_scale: f32,
        depth_cutoff: f32,
    ) -> Option<Self> {
        if depth_scale <= 0.0 {
            return None;
        }
        let data = raw
            .iter()
            .map(|&d| {
                let meters = d as f32 / depth_scale;
                if meters > depth_cutoff {
                    0.0
                } else {
                    meters
                }
            })
            .collect();
        Self::from_vec(width, height, data)
    }

    /// Depth at (x, y) if it is a usable measurement inside [min, max]
    #[inline]
    pub fn valid_depth(&self, x: u32, y: u32, min: f32, max: f32) -> Option<f32> {
        let d = *self.get(x, y)?;
        if d.is_finite() && d >= min && d <= max {
            Some(d)
        } else {
            None
        }
    }
}

/// Invalid marker written into vertex and normal maps
pub const INVALID_POINT: Vec4 = Vec4::new(f32::NAN, f32::NAN, f32::NAN, 0.0);

#[inline]
pub fn is_valid_point(p: Vec4) -> bool {
    !p.x.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Image::from_vec(2, 2, vec![0u8; 3]).is_none());
        assert!(Image::from_vec(2, 2, vec![0u8; 4]).is_some());
    }

    #[test]
    fn test_raw_depth_conversion() {
        let depth = DepthFrame::from_raw_u16(2, 1, &[1500, 9000], 1000.0, 8.0).unwrap();
        assert_eq!(depth.get(0, 0), Some(&1.5));
        assert_eq!(depth.get(1, 0), Some(&0.0));
        assert_eq!(depth.valid_depth(1, 0, 0.1, 5.0), None);
        assert_eq!(depth.valid_depth(0, 0, 0.1, 5.0), Some(1.5));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let image = Image::filled(3, 2, 1u8);
        assert!(image.get(3, 0).is_none());
        assert!(image.get(0, 2).is_none());
        assert_eq!(image.get(2, 1), Some(&1));
    }
}
