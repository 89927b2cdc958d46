pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod keypoints;
pub mod map;
pub mod mapping;
pub mod mesh;
pub mod persistence;
pub mod render;
pub mod synthetic;

pub use camera::{CameraIntrinsics, Pose};
pub use config::MapConfig;
pub use error::{MapError, MapResult};
pub use frame::{ColorFrame, DepthFrame, Image, PointMap, PreviewImage, INVALID_POINT};
pub use fusion::VisibilityReport;
pub use keypoints::{KeyInsert, KeyMapView, KeyPoint, KeyPointMap};
pub use map::{HashEntry, MapView, Voxel, BLOCK_SIZE, BLOCK_VOLUME};
pub use mapping::{FrameReport, MapStats, VoxelMap};
pub use mesh::{MeshTriangle, MeshVertex, TriangleBuffer};
pub use persistence::DumpCompression;
pub use render::RenderOutput;
