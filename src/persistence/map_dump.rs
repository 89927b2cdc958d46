//! Binary map dump
//!
//! Layout: a bincode-encoded `DumpHeader` followed by the payload, optionally
//! zlib-compressed. The payload is the raw `Pod` bytes of the hash entries,
//! the heap free stack and the voxel store, in that order. The header
//! records every capacity so a reload into a differently sized map is
//! rejected before any state is touched.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::config::MapConfig;
use crate::error::MapResult;
use crate::map::hash_table::entry_count;
use crate::map::{HashEntry, Voxel, BLOCK_SIZE, BLOCK_VOLUME};

use super::error::{capacity_mismatch, corrupted_data, version_mismatch, PersistenceErrorContext};

const DUMP_MAGIC: [u8; 4] = *b"VXHM";
const DUMP_VERSION: u32 = 1;

/// Payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpCompression {
    #[default]
    None,
    Zlib,
}

/// Capacities a dump must agree on with the map it is loaded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpLayout {
    pub num_buckets: u32,
    pub bucket_size: u32,
    pub num_excess: u32,
    pub num_blocks: u32,
    pub block_size: u32,
}

impl DumpLayout {
    pub fn from_config(config: &MapConfig) -> Self {
        Self {
            num_buckets: config.num_buckets,
            bucket_size: config.bucket_size,
            num_excess: config.num_excess_entries,
            num_blocks: config.num_blocks,
            block_size: BLOCK_SIZE as u32,
        }
    }

    pub fn num_entries(&self) -> usize {
        entry_count(self.num_buckets, self.bucket_size, self.num_excess) as usize
    }

    pub fn num_voxels(&self) -> usize {
        self.num_blocks as usize * BLOCK_VOLUME
    }

    fn check(&self, found: &DumpLayout) -> MapResult<()> {
        let fields = [
            ("num_buckets", self.num_buckets, found.num_buckets),
            ("bucket_size", self.bucket_size, found.bucket_size),
            ("num_excess_entries", self.num_excess, found.num_excess),
            ("num_blocks", self.num_blocks, found.num_blocks),
            ("block_size", self.block_size, found.block_size),
        ];
        for (field, expected, got) in fields {
            if expected != got {
                return Err(capacity_mismatch(field, expected as u64, got as u64));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DumpHeader {
    magic: [u8; 4],
    version: u32,
    compressed: bool,
    layout: DumpLayout,
    voxel_size: f32,
    truncation_distance: f32,
    heap_counter: u32,
    excess_used: u32,
    checksum: u32,
}

/// Everything needed to rebuild a map bit for bit
#[derive(Debug, Clone)]
pub struct MapDump {
    pub layout: DumpLayout,
    pub voxel_size: f32,
    pub truncation_distance: f32,
    pub entries: Vec<HashEntry>,
    pub heap_slots: Vec<i32>,
    pub heap_counter: u32,
    pub excess_used: u32,
    pub voxels: Vec<Voxel>,
}

/// Borrowed view of the state written by `write_dump`
pub struct DumpSource<'a> {
    pub layout: DumpLayout,
    pub voxel_size: f32,
    pub truncation_distance: f32,
    pub entries: &'a [HashEntry],
    pub heap_slots: &'a [i32],
    pub heap_counter: u32,
    pub excess_used: u32,
    pub voxels: &'a [Voxel],
}

fn payload_checksum(entries: &[HashEntry], heap_slots: &[i32], voxels: &[Voxel]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytemuck::cast_slice(entries));
    hasher.update(bytemuck::cast_slice(heap_slots));
    hasher.update(bytemuck::cast_slice(voxels));
    hasher.finalize()
}

fn write_payload<W: Write>(writer: &mut W, source: &DumpSource<'_>) -> MapResult<()> {
    writer
        .write_all(bytemuck::cast_slice(source.entries))
        .persistence_context("write hash entries")?;
    writer
        .write_all(bytemuck::cast_slice(source.heap_slots))
        .persistence_context("write heap")?;
    writer
        .write_all(bytemuck::cast_slice(source.voxels))
        .persistence_context("write voxels")?;
    Ok(())
}

/// Serialize a map snapshot.
pub fn write_dump<W: Write>(
    mut writer: W,
    source: &DumpSource<'_>,
    compression: DumpCompression,
) -> MapResult<()> {
    if source.entries.len() != source.layout.num_entries()
        || source.heap_slots.len() != source.layout.num_blocks as usize
        || source.voxels.len() != source.layout.num_voxels()
    {
        return Err(corrupted_data("snapshot sizes disagree with layout"));
    }

    let header = DumpHeader {
        magic: DUMP_MAGIC,
        version: DUMP_VERSION,
        compressed: compression == DumpCompression::Zlib,
        layout: source.layout,
        voxel_size: source.voxel_size,
        truncation_distance: source.truncation_distance,
        heap_counter: source.heap_counter,
        excess_used: source.excess_used,
        checksum: payload_checksum(source.entries, source.heap_slots, source.voxels),
    };
    bincode::serialize_into(&mut writer, &header)?;

    match compression {
        DumpCompression::None => write_payload(&mut writer, source)?,
        DumpCompression::Zlib => {
            let mut encoder = ZlibEncoder::new(&mut writer, Compression::default());
            write_payload(&mut encoder, source)?;
            encoder.finish().persistence_context("finish compressed payload")?;
        }
    }
    writer.flush().persistence_context("flush dump")?;
    Ok(())
}

fn read_pod<R: Read, T: bytemuck::Pod>(reader: &mut R, out: &mut [T], what: &str) -> MapResult<()> {
    reader
        .read_exact(bytemuck::cast_slice_mut(out))
        .persistence_context(what)
}

/// Read a dump, rejecting it unless its capacities match `expected`.
pub fn read_dump<R: Read>(mut reader: R, expected: &DumpLayout) -> MapResult<MapDump> {
    let header: DumpHeader = bincode::deserialize_from(&mut reader)?;
    if header.magic != DUMP_MAGIC {
        return Err(corrupted_data("not a map dump (bad magic)"));
    }
    if header.version != DUMP_VERSION {
        return Err(version_mismatch(DUMP_VERSION, header.version));
    }
    expected.check(&header.layout)?;

    let layout = header.layout;
    let mut entries = vec![HashEntry::EMPTY; layout.num_entries()];
    let mut heap_slots = vec![0i32; layout.num_blocks as usize];
    let mut voxels = vec![Voxel::EMPTY; layout.num_voxels()];

    let mut body: Box<dyn Read + '_> = if header.compressed {
        Box::new(ZlibDecoder::new(&mut reader))
    } else {
        Box::new(&mut reader)
    };
    read_pod(&mut body, &mut entries, "read hash entries")?;
    read_pod(&mut body, &mut heap_slots, "read heap")?;
    read_pod(&mut body, &mut voxels, "read voxels")?;

    if payload_checksum(&entries, &heap_slots, &voxels) != header.checksum {
        return Err(corrupted_data("payload checksum mismatch"));
    }

    let dump = MapDump {
        layout,
        voxel_size: header.voxel_size,
        truncation_distance: header.truncation_distance,
        entries,
        heap_slots,
        heap_counter: header.heap_counter,
        excess_used: header.excess_used,
        voxels,
    };
    validate(&dump)?;
    Ok(dump)
}

/// Structural checks a checksum cannot catch (e.g. a dump written by a
/// buggy producer)
fn validate(dump: &MapDump) -> MapResult<()> {
    let num_blocks = dump.layout.num_blocks;
    let num_entries = dump.entries.len() as i32;

    if dump.heap_counter > num_blocks {
        return Err(corrupted_data("heap counter exceeds capacity"));
    }
    if dump.excess_used > dump.layout.num_excess {
        return Err(corrupted_data("excess counter exceeds capacity"));
    }

    let mut used = vec![false; num_blocks as usize];
    let mut allocated = 0u32;
    for entry in &dump.entries {
        if entry.next != HashEntry::NO_NEXT && !(0..num_entries).contains(&entry.next) {
            return Err(corrupted_data("hash chain link out of range"));
        }
        if !entry.is_allocated() {
            continue;
        }
        let Some(seen) = usize::try_from(entry.ptr).ok().and_then(|p| used.get_mut(p)) else {
            return Err(corrupted_data("heap pointer out of range"));
        };
        if *seen {
            return Err(corrupted_data("heap slot referenced twice"));
        }
        *seen = true;
        allocated += 1;
    }

    // The free stack must cover exactly the slots no entry holds
    for &slot in &dump.heap_slots[..dump.heap_counter as usize] {
        let Some(seen) = usize::try_from(slot).ok().and_then(|p| used.get_mut(p)) else {
            return Err(corrupted_data("free heap slot out of range"));
        };
        if *seen {
            return Err(corrupted_data(format!("heap slot {} is both free and in use", slot)));
        }
        *seen = true;
    }

    if allocated + dump.heap_counter != num_blocks {
        return Err(corrupted_data(format!(
            "{} allocated blocks + {} free slots != heap capacity {}",
            allocated, dump.heap_counter, num_blocks
        )));
    }
    Ok(())
}
