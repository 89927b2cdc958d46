use std::io::Write;
use std::path::Path;

use crate::error::MapResult;
use crate::mesh::TriangleBuffer;

use super::error::{atomic_write, PersistenceErrorContext};

const STL_HEADER: &[u8] = b"fusion-engine binary STL";

/// Write the triangles as binary STL: 80-byte header, little-endian
/// triangle count, then per triangle a face normal, three vertices and a
/// zero attribute word.
pub fn write_stl<W: Write>(mut writer: W, mesh: &TriangleBuffer) -> MapResult<()> {
    let mut header = [0u8; 80];
    header[..STL_HEADER.len()].copy_from_slice(STL_HEADER);
    writer.write_all(&header).persistence_context("write STL header")?;
    writer
        .write_all(&(mesh.triangle_count() as u32).to_le_bytes())
        .persistence_context("write STL triangle count")?;

    let mut record = Vec::with_capacity(50);
    for tri in mesh.triangles() {
        let face = (tri[1].position - tri[0].position)
            .cross(tri[2].position - tri[0].position)
            .normalize_or_zero();

        record.clear();
        for v in std::iter::once(face).chain(tri.iter().map(|v| v.position)) {
            for c in v.to_array() {
                record.extend_from_slice(&c.to_le_bytes());
            }
        }
        record.extend_from_slice(&0u16.to_le_bytes());
        writer.write_all(&record).persistence_context("write STL triangle")?;
    }
    Ok(())
}

pub fn save_stl(path: impl AsRef<Path>, mesh: &TriangleBuffer) -> MapResult<()> {
    let path = path.as_ref();
    atomic_write(path, |w| write_stl(w, mesh))?;
    log::info!("Saved {} triangles to {}", mesh.triangle_count(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mesh_is_header_only() {
        let mut bytes = Vec::new();
        write_stl(&mut bytes, &TriangleBuffer::with_capacity(10)).unwrap();
        assert_eq!(bytes.len(), 84);
        assert_eq!(&bytes[80..84], &[0, 0, 0, 0]);
    }
}
