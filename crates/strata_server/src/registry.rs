use glam::IVec3;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use strata_shared::block::BlockKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown block_id '{0}'")]
    UnknownBlockId(String),
}

/// Side-table metadata for an addressable block. The world grid itself only
/// stores the kind tag; everything needed to target the block by reference
/// lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHandle {
    pub block_id: String,
    pub kind: BlockKind,
    pub position: IVec3,
    pub owner: Option<u64>,
    pub collision: bool,
    /// Fixed viewpoint rotation; camera blocks carry one, user cubes defer
    /// to the owning session's live rotation.
    pub rotation: Option<[f32; 2]>,
}

/// Assigns stable string identity to special blocks and tracks their
/// ownership and collision flags. Ids come from an explicit monotonic
/// allocator so allocation is deterministic and testable in isolation.
pub struct BlockRegistry {
    by_position: FxHashMap<IVec3, BlockHandle>,
    positions_by_id: FxHashMap<String, IVec3>,
    next_serial: u64,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            by_position: FxHashMap::default(),
            positions_by_id: FxHashMap::default(),
            next_serial: 1,
        }
    }

    /// Registers a handle for an addressable block that just entered the
    /// world. Non-addressable kinds get no handle. The collision flag
    /// defaults per kind unless overridden. Callers commit the world write
    /// and this registration in the same critical section.
    pub fn place(
        &mut self,
        position: IVec3,
        kind: BlockKind,
        owner: Option<u64>,
        collision: Option<bool>,
    ) -> Option<String> {
        if !kind.addressable() {
            return None;
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        let block_id = format!("{}_{serial}", kind.tag());

        let rotation = match kind {
            BlockKind::Camera => Some([0.0, 0.0]),
            _ => None,
        };
        let handle = BlockHandle {
            block_id: block_id.clone(),
            kind,
            position,
            owner,
            collision: collision.unwrap_or_else(|| kind.solid()),
            rotation,
        };
        debug!(
            "Registered {} at [{}, {}, {}] (owner: {owner:?})",
            handle.block_id, position.x, position.y, position.z
        );

        self.positions_by_id.insert(block_id.clone(), position);
        self.by_position.insert(position, handle);
        Some(block_id)
    }

    pub fn get(&self, position: IVec3) -> Option<&BlockHandle> {
        self.by_position.get(&position)
    }

    pub fn resolve(&self, block_id: &str) -> Result<&BlockHandle, RegistryError> {
        self.positions_by_id
            .get(block_id)
            .and_then(|pos| self.by_position.get(pos))
            .ok_or_else(|| RegistryError::UnknownBlockId(block_id.to_string()))
    }

    /// Invalidates the handle at a position when its world block goes away.
    /// Any external capture session referencing a removed camera keeps
    /// running until stopped explicitly; only the address dies here.
    pub fn remove(&mut self, position: IVec3) -> Option<BlockHandle> {
        let handle = self.by_position.remove(&position)?;
        self.positions_by_id.remove(&handle.block_id);
        debug!("Unregistered {}", handle.block_id);
        Some(handle)
    }

    pub fn cameras(&self) -> Vec<&BlockHandle> {
        let mut cameras: Vec<&BlockHandle> = self
            .by_position
            .values()
            .filter(|h| h.kind == BlockKind::Camera)
            .collect();
        cameras.sort_by(|a, b| a.block_id.cmp(&b.block_id));
        cameras
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use strata_shared::block::BlockKind;

    use super::{BlockRegistry, RegistryError};

    #[test]
    fn ids_are_distinct_and_monotonically_numbered() {
        let mut registry = BlockRegistry::new();
        let a = registry
            .place(IVec3::new(1, 5, 1), BlockKind::Camera, Some(7), None)
            .unwrap();
        let b = registry
            .place(IVec3::new(2, 5, 1), BlockKind::Camera, None, None)
            .unwrap();
        let c = registry
            .place(IVec3::new(3, 5, 1), BlockKind::User, None, None)
            .unwrap();

        assert_eq!(a, "camera_1");
        assert_eq!(b, "camera_2");
        assert_eq!(c, "user_3");
    }

    #[test]
    fn ordinary_blocks_get_no_handle() {
        let mut registry = BlockRegistry::new();
        assert_eq!(
            registry.place(IVec3::ZERO, BlockKind::Brick, None, None),
            None
        );
        assert_eq!(registry.get(IVec3::ZERO), None);
    }

    #[test]
    fn collision_default_can_be_overridden_at_placement() {
        let mut registry = BlockRegistry::new();

        // Cameras default solid, user cubes default passable.
        let ghost = registry
            .place(IVec3::new(1, 5, 1), BlockKind::Camera, None, Some(false))
            .unwrap();
        assert!(!registry.resolve(&ghost).unwrap().collision);

        let wall = registry
            .place(IVec3::new(2, 5, 1), BlockKind::User, None, Some(true))
            .unwrap();
        assert!(registry.resolve(&wall).unwrap().collision);
    }

    #[test]
    fn resolve_finds_placed_cameras_and_rejects_unknown_ids() {
        let mut registry = BlockRegistry::new();
        let pos = IVec3::new(4, 9, -2);
        let id = registry.place(pos, BlockKind::Camera, Some(3), None).unwrap();

        let handle = registry.resolve(&id).unwrap();
        assert_eq!(handle.position, pos);
        assert_eq!(handle.owner, Some(3));
        assert!(handle.collision);
        assert_eq!(handle.rotation, Some([0.0, 0.0]));

        assert_eq!(
            registry.resolve("camera_999"),
            Err(RegistryError::UnknownBlockId("camera_999".to_string()))
        );
    }

    #[test]
    fn removal_drops_the_id_with_the_handle() {
        let mut registry = BlockRegistry::new();
        let pos = IVec3::new(0, 8, 0);
        let id = registry.place(pos, BlockKind::Camera, None, None).unwrap();

        let handle = registry.remove(pos).unwrap();
        assert_eq!(handle.block_id, id);
        assert!(registry.resolve(&id).is_err());
        assert!(registry.remove(pos).is_none());
    }
}
