use glam::IVec3;
use noise::{NoiseFn, Perlin};

use crate::block::BlockKind;

pub const WORLD_FLOOR: i32 = 0;
pub const BASE_HEIGHT: i32 = 6;
const HEIGHT_AMPLITUDE: f64 = 5.0;
const HEIGHT_FREQUENCY: f64 = 0.045;
const SAND_LEVEL: i32 = 4;

/// Deterministic height-map terrain synthesis. The contract is hard: the same
/// seed and size must produce a byte-identical block map on every boot, which
/// is what lets two server instances (and reconnecting clients) agree on the
/// world without persistence.
#[derive(Debug, Clone)]
pub struct WorldGenerator {
    pub seed: u64,
    pub size: i32,
    height_noise: Perlin,
}

impl WorldGenerator {
    pub fn new(seed: u64, size: i32) -> Self {
        Self {
            seed,
            size,
            height_noise: Perlin::new(seed as u32),
        }
    }

    /// Terrain column height at (x, z); the surface block sits at this y.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let sample = self.height_noise.get([
            f64::from(x) * HEIGHT_FREQUENCY + 17.0,
            f64::from(z) * HEIGHT_FREQUENCY - 43.0,
        ]);
        let height = BASE_HEIGHT + (sample * HEIGHT_AMPLITUDE).round() as i32;
        height.max(WORLD_FLOOR + 1)
    }

    fn surface_kind(&self, height: i32) -> BlockKind {
        if height <= SAND_LEVEL {
            BlockKind::Sand
        } else {
            BlockKind::Grass
        }
    }

    /// Emits every block of the world in a fixed (x, z, y) order.
    pub fn generate(&self) -> Vec<(IVec3, BlockKind)> {
        let mut blocks = Vec::new();
        for x in 0..self.size {
            for z in 0..self.size {
                let height = self.surface_height(x, z);
                for y in WORLD_FLOOR..height {
                    blocks.push((IVec3::new(x, y, z), BlockKind::Stone));
                }
                blocks.push((IVec3::new(x, height, z), self.surface_kind(height)));
            }
        }
        blocks
    }
}

/// Order-sensitive hash over block entries; callers must sort first. Used to
/// verify the generation determinism contract without comparing full maps.
pub fn content_hash<'a>(entries: impl Iterator<Item = (&'a IVec3, &'a BlockKind)>) -> u64 {
    let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
    for (pos, kind) in entries {
        acc = acc
            .wrapping_mul(6364136223846793005)
            .wrapping_add(pos.x as u64 ^ (pos.y as u64).rotate_left(21) ^ (pos.z as u64).rotate_left(42));
        for byte in kind.tag().bytes() {
            acc = acc.wrapping_mul(1099511628211).wrapping_add(u64::from(byte));
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::{content_hash, WorldGenerator, WORLD_FLOOR};
    use crate::block::BlockKind;

    #[test]
    fn same_seed_generates_identical_terrain() {
        let a = WorldGenerator::new(99, 32).generate();
        let b = WorldGenerator::new(99, 32).generate();
        assert_eq!(a, b);
        assert_eq!(
            content_hash(a.iter().map(|(p, k)| (p, k))),
            content_hash(b.iter().map(|(p, k)| (p, k)))
        );
    }

    #[test]
    fn different_seeds_diverge() {
        let a = WorldGenerator::new(1, 32).generate();
        let b = WorldGenerator::new(2, 32).generate();
        assert_ne!(
            content_hash(a.iter().map(|(p, k)| (p, k))),
            content_hash(b.iter().map(|(p, k)| (p, k)))
        );
    }

    #[test]
    fn every_column_has_a_surface_block_above_the_floor() {
        let gen = WorldGenerator::new(7, 16);
        for x in 0..16 {
            for z in 0..16 {
                let height = gen.surface_height(x, z);
                assert!(height > WORLD_FLOOR, "column ({x},{z}) has no depth");
            }
        }
    }

    #[test]
    fn surface_blocks_are_grass_or_sand_over_stone() {
        let blocks = WorldGenerator::new(3, 16).generate();
        for (pos, kind) in &blocks {
            match kind {
                BlockKind::Stone => {}
                BlockKind::Grass | BlockKind::Sand => {
                    // Nothing above a surface block at generation time.
                    assert!(!blocks.iter().any(|(p, _)| p.x == pos.x
                        && p.z == pos.z
                        && p.y > pos.y));
                }
                other => panic!("unexpected generated kind {other:?}"),
            }
        }
    }
}
