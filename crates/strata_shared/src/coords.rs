use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Side length of a transfer chunk in x and z. Chunks span the full height
/// range, so a world of side `n` splits into exactly (n / SECTOR_SIZE)^2
/// chunk columns.
pub const SECTOR_SIZE: i32 = 16;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

fn div_rem_floor(value: i32, divisor: i32) -> (i32, i32) {
    let mut q = value / divisor;
    let mut r = value % divisor;
    if r < 0 {
        q -= 1;
        r += divisor;
    }
    (q, r)
}

/// Maps a world position to its chunk column and the position local to that
/// column. Local x and z are in 0..SECTOR_SIZE; y passes through unchanged.
pub fn world_to_chunk(world_pos: IVec3) -> (ChunkPos, IVec3) {
    let (chunk_x, local_x) = div_rem_floor(world_pos.x, SECTOR_SIZE);
    let (chunk_z, local_z) = div_rem_floor(world_pos.z, SECTOR_SIZE);

    (
        ChunkPos {
            x: chunk_x,
            z: chunk_z,
        },
        IVec3::new(local_x, world_pos.y, local_z),
    )
}

pub fn chunk_to_world(chunk: ChunkPos, local: IVec3) -> IVec3 {
    IVec3::new(
        chunk.x * SECTOR_SIZE + local.x,
        local.y,
        chunk.z * SECTOR_SIZE + local.z,
    )
}

/// Key format used for block maps inside JSON frames.
pub fn block_key(pos: IVec3) -> String {
    format!("{},{},{}", pos.x, pos.y, pos.z)
}

pub fn parse_block_key(key: &str) -> Option<IVec3> {
    let mut parts = key.split(',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    let z = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(IVec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::{block_key, chunk_to_world, parse_block_key, world_to_chunk, ChunkPos, SECTOR_SIZE};

    #[test]
    fn world_to_chunk_handles_negative_and_positive_coordinates() {
        let (chunk, local) = world_to_chunk(IVec3::new(-1, 5, -1));
        assert_eq!(chunk, ChunkPos { x: -1, z: -1 });
        assert_eq!(local, IVec3::new(SECTOR_SIZE - 1, 5, SECTOR_SIZE - 1));

        let (chunk, local) = world_to_chunk(IVec3::new(16, 0, 31));
        assert_eq!(chunk, ChunkPos { x: 1, z: 1 });
        assert_eq!(local, IVec3::new(0, 0, 15));

        let world = IVec3::new(-33, 95, 66);
        let (chunk, local) = world_to_chunk(world);
        assert_eq!(chunk_to_world(chunk, local), world);
    }

    #[test]
    fn block_key_round_trips() {
        let pos = IVec3::new(-7, 12, 130);
        assert_eq!(block_key(pos), "-7,12,130");
        assert_eq!(parse_block_key(&block_key(pos)), Some(pos));
        assert_eq!(parse_block_key("1,2"), None);
        assert_eq!(parse_block_key("1,2,3,4"), None);
        assert_eq!(parse_block_key("a,b,c"), None);
    }
}
