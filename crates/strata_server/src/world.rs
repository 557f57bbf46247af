use std::collections::BTreeMap;

use glam::IVec3;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::info;

use strata_shared::block::BlockKind;
use strata_shared::coords::{block_key, world_to_chunk, ChunkPos, SECTOR_SIZE};
use strata_shared::worldgen::{self, WorldGenerator, WORLD_FLOOR};

/// Exclusive upper bound on block y. The floor comes from worldgen.
pub const WORLD_CEILING: i32 = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("position [{}, {}, {}] is outside the world bounds", .0.x, .0.y, .0.z)]
    InvalidPosition(IVec3),
    #[error("world size {0} is invalid: must be a positive multiple of {SECTOR_SIZE}")]
    InvalidWorldSize(i32),
}

/// One bounded transfer unit of the init stream: a 16x16 column of the world
/// keyed by local "x,y,z" strings.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    pub chunk: ChunkPos,
    pub blocks: BTreeMap<String, BlockKind>,
}

/// Single source of truth for block occupancy. Absent key = air.
pub struct WorldStore {
    blocks: FxHashMap<IVec3, BlockKind>,
    size: i32,
    seed: u64,
}

impl WorldStore {
    /// Builds the world from scratch. Failing here is fatal: the server must
    /// not start with an inconsistent world.
    pub fn generate(seed: u64, size: i32) -> Result<Self, WorldError> {
        if size <= 0 || size % SECTOR_SIZE != 0 {
            return Err(WorldError::InvalidWorldSize(size));
        }

        let generator = WorldGenerator::new(seed, size);
        let blocks: FxHashMap<IVec3, BlockKind> = generator.generate().into_iter().collect();
        info!(
            "Generated world: seed={seed}, size={size}, blocks={}, chunks={}",
            blocks.len(),
            (size / SECTOR_SIZE).pow(2)
        );

        Ok(Self { blocks, size, seed })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn in_bounds(&self, pos: IVec3) -> bool {
        (0..self.size).contains(&pos.x)
            && (0..self.size).contains(&pos.z)
            && (WORLD_FLOOR..WORLD_CEILING).contains(&pos.y)
    }

    pub fn get(&self, pos: IVec3) -> Option<BlockKind> {
        self.blocks.get(&pos).copied()
    }

    /// Writes or clears one voxel, returning the positions that changed so
    /// the caller can broadcast them. A no-op write changes nothing.
    pub fn set(&mut self, pos: IVec3, kind: Option<BlockKind>) -> Result<Vec<IVec3>, WorldError> {
        if !self.in_bounds(pos) {
            return Err(WorldError::InvalidPosition(pos));
        }

        let previous = match kind {
            Some(kind) => self.blocks.insert(pos, kind),
            None => self.blocks.remove(&pos),
        };

        if previous == kind {
            Ok(Vec::new())
        } else {
            Ok(vec![pos])
        }
    }

    /// Highest occupied y in the column, if any. Used to place spawn.
    pub fn surface_height(&self, x: i32, z: i32) -> Option<i32> {
        self.blocks
            .keys()
            .filter(|pos| pos.x == x && pos.z == z)
            .map(|pos| pos.y)
            .max()
    }

    /// Splits the whole world into chunk payloads for the init stream. Every
    /// chunk column is emitted even when empty, so the payload count is
    /// always (size / SECTOR_SIZE)^2. Callers hold the state lock while this
    /// runs, which is what makes the snapshot consistent.
    pub fn chunks(&self) -> Vec<ChunkPayload> {
        let per_side = self.size / SECTOR_SIZE;
        let mut payloads: BTreeMap<ChunkPos, BTreeMap<String, BlockKind>> = (0..per_side)
            .flat_map(|x| (0..per_side).map(move |z| (ChunkPos { x, z }, BTreeMap::new())))
            .collect();

        for (&pos, &kind) in &self.blocks {
            let (chunk, local) = world_to_chunk(pos);
            if let Some(blocks) = payloads.get_mut(&chunk) {
                blocks.insert(block_key(local), kind);
            }
        }

        payloads
            .into_iter()
            .map(|(chunk, blocks)| ChunkPayload { chunk, blocks })
            .collect()
    }

    /// Deterministic digest of the full block map.
    pub fn content_hash(&self) -> u64 {
        let mut entries: Vec<(&IVec3, &BlockKind)> = self.blocks.iter().collect();
        entries.sort_by_key(|(pos, _)| (pos.x, pos.y, pos.z));
        worldgen::content_hash(entries.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use strata_shared::block::BlockKind;
    use strata_shared::coords::{chunk_to_world, parse_block_key, SECTOR_SIZE};

    use super::{WorldError, WorldStore};

    #[test]
    fn invalid_size_is_fatal() {
        assert_eq!(
            WorldStore::generate(1, 0).err(),
            Some(WorldError::InvalidWorldSize(0))
        );
        assert_eq!(
            WorldStore::generate(1, 20).err(),
            Some(WorldError::InvalidWorldSize(20))
        );
        assert_eq!(
            WorldStore::generate(1, -16).err(),
            Some(WorldError::InvalidWorldSize(-16))
        );
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let a = WorldStore::generate(42, 32).unwrap();
        let b = WorldStore::generate(42, 32).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(a.content_hash(), b.content_hash());

        let c = WorldStore::generate(43, 32).unwrap();
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn chunk_count_matches_the_size_invariant() {
        let world = WorldStore::generate(5, 64).unwrap();
        assert_eq!(world.chunks().len(), (64 / SECTOR_SIZE as usize).pow(2));
    }

    #[test]
    fn chunk_union_reconstructs_the_block_map() {
        let world = WorldStore::generate(11, 32).unwrap();

        let mut total = 0;
        for payload in world.chunks() {
            for (key, kind) in &payload.blocks {
                let local = parse_block_key(key).expect("well-formed block key");
                let world_pos = chunk_to_world(payload.chunk, local);
                assert_eq!(world.get(world_pos), Some(*kind));
                total += 1;
            }
        }
        assert_eq!(total, world.len());
    }

    #[test]
    fn set_rejects_out_of_bounds_writes() {
        let mut world = WorldStore::generate(1, 16).unwrap();
        let outside = IVec3::new(16, 3, 0);
        assert_eq!(
            world.set(outside, Some(BlockKind::Brick)),
            Err(WorldError::InvalidPosition(outside))
        );
        assert_eq!(
            world.set(IVec3::new(0, -1, 0), None),
            Err(WorldError::InvalidPosition(IVec3::new(0, -1, 0)))
        );
    }

    #[test]
    fn set_and_clear_report_changed_positions() {
        let mut world = WorldStore::generate(1, 16).unwrap();
        let pos = IVec3::new(4, 40, 4);

        assert_eq!(world.set(pos, Some(BlockKind::Brick)).unwrap(), vec![pos]);
        assert_eq!(world.get(pos), Some(BlockKind::Brick));

        // Re-writing the same kind is a no-op.
        assert!(world.set(pos, Some(BlockKind::Brick)).unwrap().is_empty());

        assert_eq!(world.set(pos, None).unwrap(), vec![pos]);
        assert_eq!(world.get(pos), None);
        assert!(world.set(pos, None).unwrap().is_empty());
    }

    #[test]
    fn surface_height_tracks_mutations() {
        let mut world = WorldStore::generate(1, 16).unwrap();
        let base = world.surface_height(3, 3).unwrap();

        world
            .set(IVec3::new(3, base + 5, 3), Some(BlockKind::Brick))
            .unwrap();
        assert_eq!(world.surface_height(3, 3), Some(base + 5));
    }
}
