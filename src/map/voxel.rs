use bytemuck::{Pod, Zeroable};

/// One fusion cell
///
/// `sdf` is the truncated distance normalized by the truncation margin, so it
/// lives in [-1, 1]. It carries no meaning while `weight` is zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Voxel {
    pub sdf: f32,
    pub weight: u32,
    /// RGB plus one padding byte
    pub color: [u8; 4],
}

impl Default for Voxel {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Voxel {
    pub const EMPTY: Self = Self {
        sdf: 1.0,
        weight: 0,
        color: [0; 4],
    };

    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.color[0], self.color[1], self.color[2]]
    }

    /// Weighted running average with a unit-weight sample, saturating the
    /// weight at `max_weight`.
    #[inline]
    pub fn integrate(&mut self, tsdf: f32, rgb: Option<[u8; 3]>, max_weight: u32) {
        let old_weight = self.weight as f32;
        let total = old_weight + 1.0;

        self.sdf = ((self.sdf * old_weight + tsdf) / total).clamp(-1.0, 1.0);

        if let Some(rgb) = rgb {
            for c in 0..3 {
                let blended = (self.color[c] as f32 * old_weight + rgb[c] as f32) / total;
                self.color[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }

        self.weight = (self.weight + 1).min(max_weight);
    }
}
