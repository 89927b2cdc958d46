/// Per-frame Write Passes
///
/// `update_visibility` walks the depth rays, allocates the blocks they cross
/// and rebuilds the visible entry set. `integrate_frame` then folds the
/// depth and color measurements into the voxels of those blocks.

pub mod integrate;
pub mod visibility;

pub use integrate::integrate_frame;
pub use visibility::{blocks_along_ray, update_visibility, VisibilityReport};
