//! Camera model consumed from tracking: pinhole intrinsics and a rigid pose.

mod intrinsics;
mod pose;

pub use intrinsics::CameraIntrinsics;
pub use pose::Pose;
