use glam::{IVec3, Vec3};
use rayon::prelude::*;

use crate::map::{local_index, voxel_to_world, CapacityClass, CapacityWarnings, MapView, Voxel, BLOCK_SIZE};

use super::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE, VERTEX_COUNT};

/// One vertex of an extracted triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: [u8; 3],
}

pub type MeshTriangle = [MeshVertex; 3];

/// Extracted triangles, capped at a fixed capacity
#[derive(Debug, Clone, Default)]
pub struct TriangleBuffer {
    triangles: Vec<MeshTriangle>,
    capacity: usize,
    /// Triangles generated but not stored because the buffer was full
    dropped: usize,
}

impl TriangleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn triangles(&self) -> &[MeshTriangle] {
        &self.triangles
    }

    pub fn vertices(&self) -> impl Iterator<Item = &MeshVertex> + '_ {
        self.triangles.iter().flatten()
    }

    /// Flat per-vertex arrays, three entries per triangle
    pub fn to_arrays(&self) -> (Vec<Vec3>, Vec<Vec3>, Vec<[u8; 3]>) {
        let positions = self.vertices().map(|v| v.position).collect();
        let normals = self.vertices().map(|v| v.normal).collect();
        let colors = self.vertices().map(|v| v.color).collect();
        (positions, normals, colors)
    }

    fn is_full(&self) -> bool {
        self.triangles.len() >= self.capacity
    }

    /// Append as many triangles as fit; the rest are counted as dropped.
    fn extend_capped(&mut self, triangles: impl IntoIterator<Item = MeshTriangle>) {
        for tri in triangles {
            if self.triangles.len() < self.capacity {
                self.triangles.push(tri);
            } else {
                self.dropped += 1;
            }
        }
    }
}

/// Voxel lookups for a block and its seven positive-side neighbours
struct Neighborhood<'a> {
    blocks: [Option<&'a [Voxel]>; 8],
}

impl<'a> Neighborhood<'a> {
    fn gather(view: &MapView<'a>, coord: IVec3) -> Self {
        let mut blocks = [None; 8];
        for (i, block) in blocks.iter_mut().enumerate() {
            let o = CORNER_OFFSETS[i];
            *block = view.block(coord + IVec3::new(o[0], o[1], o[2]));
        }
        Self { blocks }
    }

    /// Voxel at a local coordinate in `0..=BLOCK_SIZE` per axis
    #[inline]
    fn voxel(&self, local: IVec3) -> Option<&'a Voxel> {
        let carry = local / BLOCK_SIZE;
        let which = CORNER_OFFSETS
            .iter()
            .position(|o| *o == [carry.x, carry.y, carry.z])?;
        let block = self.blocks[which]?;
        Some(&block[local_index(local - carry * BLOCK_SIZE)])
    }
}

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 3] {
    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = (a[c] as f32 + (b[c] as f32 - a[c] as f32) * t).round() as u8;
    }
    out
}

/// Marching cubes over every cell whose eight corners belong to this block
/// or its positive-side neighbours.
fn polygonize_block(view: &MapView<'_>, coord: IVec3) -> Vec<MeshTriangle> {
    let hood = Neighborhood::gather(view, coord);
    let origin = coord * BLOCK_SIZE;
    let mut out = Vec::new();

    for z in 0..BLOCK_SIZE {
        for y in 0..BLOCK_SIZE {
            'cell: for x in 0..BLOCK_SIZE {
                let base = IVec3::new(x, y, z);
                let mut corners = [Voxel::EMPTY; 8];
                let mut case = 0usize;
                for (i, corner) in corners.iter_mut().enumerate() {
                    let o = CORNER_OFFSETS[i];
                    let Some(v) = hood.voxel(base + IVec3::new(o[0], o[1], o[2])) else {
                        continue 'cell;
                    };
                    if !v.is_observed() {
                        continue 'cell;
                    }
                    if v.sdf < 0.0 {
                        case |= 1 << i;
                    }
                    *corner = *v;
                }

                let crossed = EDGE_TABLE[case];
                if crossed == 0 {
                    continue;
                }

                let mut edge_vertices = [None; 12];
                for (edge, slot) in edge_vertices.iter_mut().enumerate() {
                    if crossed & (1 << edge) == 0 {
                        continue;
                    }
                    let [a, b] = EDGE_CORNERS[edge];
                    let (va, vb) = (corners[a], corners[b]);
                    let t = (va.sdf / (va.sdf - vb.sdf)).clamp(0.0, 1.0);
                    let oa = CORNER_OFFSETS[a];
                    let ob = CORNER_OFFSETS[b];
                    let pa = voxel_to_world(origin + base + IVec3::new(oa[0], oa[1], oa[2]), view.voxel_size);
                    let pb = voxel_to_world(origin + base + IVec3::new(ob[0], ob[1], ob[2]), view.voxel_size);
                    let position = pa + (pb - pa) * t;
                    *slot = Some(MeshVertex {
                        position,
                        normal: view.gradient(position).unwrap_or(Vec3::ZERO),
                        color: lerp_color(va.color, vb.color, t),
                    });
                }

                let count = VERTEX_COUNT[case] as usize;
                for tri in TRI_TABLE[case][..count].chunks_exact(3) {
                    let (Some(a), Some(b), Some(c)) = (
                        edge_vertices[tri[0] as usize],
                        edge_vertices[tri[1] as usize],
                        edge_vertices[tri[2] as usize],
                    ) else {
                        continue;
                    };
                    out.push(orient([a, b, c]));
                }
            }
        }
    }
    out
}

/// Wind the triangle so its face normal agrees with the field gradient, and
/// fill in missing vertex normals with the face normal.
fn orient(mut tri: MeshTriangle) -> MeshTriangle {
    let face = (tri[1].position - tri[0].position).cross(tri[2].position - tri[0].position);
    let gradient = tri[0].normal + tri[1].normal + tri[2].normal;
    if face.dot(gradient) < 0.0 {
        tri.swap(1, 2);
    }
    let face = (tri[1].position - tri[0].position)
        .cross(tri[2].position - tri[0].position)
        .normalize_or_zero();
    for v in &mut tri {
        if v.normal == Vec3::ZERO {
            v.normal = face;
        }
    }
    tri
}

/// Extract the zero level set of every allocated block.
///
/// Blocks are polygonized in parallel batches and concatenated in hash-entry
/// order. Once `max_triangles` are stored the remaining blocks are only
/// counted, so memory stays bounded by the cap plus one batch.
pub fn extract_mesh(view: &MapView<'_>, max_triangles: usize, warnings: &CapacityWarnings) -> TriangleBuffer {
    extract_batched(view, max_triangles, EXTRACT_BATCH, warnings)
}

/// Blocks polygonized per parallel batch
const EXTRACT_BATCH: usize = 256;

fn extract_batched(
    view: &MapView<'_>,
    max_triangles: usize,
    batch: usize,
    warnings: &CapacityWarnings,
) -> TriangleBuffer {
    let blocks = view.allocated_blocks();
    let mut buffer = TriangleBuffer::with_capacity(max_triangles);

    for chunk in blocks.chunks(batch.max(1)) {
        if buffer.is_full() {
            buffer.dropped += chunk
                .par_iter()
                .map(|&(coord, _)| polygonize_block(view, coord).len())
                .sum::<usize>();
            continue;
        }

        let per_block: Vec<Vec<MeshTriangle>> = chunk
            .par_iter()
            .map(|&(coord, _)| polygonize_block(view, coord))
            .collect();
        buffer.extend_capped(per_block.into_iter().flatten());
    }

    warnings.report(CapacityClass::Triangles, buffer.dropped);
    log::debug!(
        "Mesh: {} triangles from {} blocks ({} dropped)",
        buffer.triangle_count(),
        blocks.len(),
        buffer.dropped
    );
    buffer
}
