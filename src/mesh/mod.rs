/// Mesh Extraction
///
/// Marching cubes over the allocated blocks of the map. Cells reaching into
/// an unallocated neighbour, or touching an unobserved voxel, are skipped.

pub mod extractor;
pub mod tables;

pub use extractor::{extract_mesh, MeshTriangle, MeshVertex, TriangleBuffer};
