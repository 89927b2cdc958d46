//! Persistence for map state and extracted meshes

pub mod error;
pub mod map_dump;
pub mod mesh_export;

pub use error::{atomic_write, PersistenceErrorContext};
pub use map_dump::{read_dump, write_dump, DumpCompression, DumpLayout, DumpSource, MapDump};
pub use mesh_export::{save_stl, write_stl};
