use glam::{IVec3, Vec3};

use strata_shared::block::BlockKind;
use strata_shared::protocol::BlockInfo;

use crate::registry::BlockRegistry;
use crate::world::WorldStore;

pub const DEFAULT_VIEW_DISTANCE: f32 = 30.0;

/// Half-angle of the cone a viewpoint can see; generous on purpose, since
/// consumers reconstruct an image from the result and clip precisely there.
const VIEW_CONE_HALF_ANGLE_DEG: f32 = 70.0;

/// Forward unit vector for a (yaw, pitch) pair in degrees. Yaw 0 looks down
/// +x, yaw 90 down +z; positive pitch looks up.
pub fn look_vector(rotation: [f32; 2]) -> Vec3 {
    let yaw = rotation[0].to_radians();
    let pitch = rotation[1].to_radians();
    Vec3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
}

fn block_info(
    registry: &BlockRegistry,
    position: IVec3,
    kind: BlockKind,
    distance: Option<f32>,
) -> BlockInfo {
    let handle = registry.get(position);
    BlockInfo {
        position,
        block_type: kind,
        block_id: handle.map(|h| h.block_id.clone()),
        collision: handle.map_or_else(|| kind.solid(), |h| h.collision),
        distance,
    }
}

fn candidates<'a>(
    world: &'a WorldStore,
    center: Vec3,
    radius: f32,
) -> impl Iterator<Item = (IVec3, BlockKind, Vec3)> + 'a {
    let lo = (center - radius).floor().as_ivec3();
    let hi = (center + radius).floor().as_ivec3();

    (lo.x..=hi.x).flat_map(move |x| {
        (lo.y..=hi.y).flat_map(move |y| {
            (lo.z..=hi.z).filter_map(move |z| {
                let pos = IVec3::new(x, y, z);
                let kind = world.get(pos)?;
                Some((pos, kind, pos.as_vec3() + 0.5))
            })
        })
    })
}

/// All blocks within `radius` of a centre point, no particular order and no
/// directional filtering.
pub fn region_query(
    world: &WorldStore,
    registry: &BlockRegistry,
    center: Vec3,
    radius: f32,
) -> Vec<BlockInfo> {
    candidates(world, center, radius)
        .filter(|(_, _, block_center)| block_center.distance(center) <= radius)
        .map(|(pos, kind, _)| block_info(registry, pos, kind, None))
        .collect()
}

/// Blocks in front of a viewpoint, each annotated with its Euclidean
/// distance and returned nearest-first. The ascending order is load-bearing:
/// image-reconstruction consumers take the first hit per direction as the
/// visible surface.
pub fn view_query(
    world: &WorldStore,
    registry: &BlockRegistry,
    origin: Vec3,
    rotation: [f32; 2],
    view_distance: f32,
) -> Vec<BlockInfo> {
    let forward = look_vector(rotation);
    let cos_limit = VIEW_CONE_HALF_ANGLE_DEG.to_radians().cos();

    let mut blocks: Vec<(f32, BlockInfo)> = candidates(world, origin, view_distance)
        .filter_map(|(pos, kind, block_center)| {
            let offset = block_center - origin;
            let distance = offset.length();
            if distance <= 1.0e-3 || distance > view_distance {
                return None;
            }
            if offset.dot(forward) < cos_limit * distance {
                return None;
            }
            Some((distance, block_info(registry, pos, kind, Some(distance))))
        })
        .collect();

    blocks.sort_by(|(a, pa), (b, pb)| {
        a.total_cmp(b)
            .then_with(|| (pa.position.x, pa.position.y, pa.position.z).cmp(&(
                pb.position.x,
                pb.position.y,
                pb.position.z,
            )))
    });
    blocks.into_iter().map(|(_, info)| info).collect()
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, Vec3};

    use strata_shared::block::BlockKind;

    use crate::registry::BlockRegistry;
    use crate::world::WorldStore;

    use super::{look_vector, region_query, view_query};

    /// Terrain tops out around y = 11, so a stage at y = 100 is isolated.
    fn stage() -> (WorldStore, BlockRegistry) {
        (WorldStore::generate(1, 64).unwrap(), BlockRegistry::new())
    }

    #[test]
    fn look_vector_conventions() {
        assert!(look_vector([0.0, 0.0]).abs_diff_eq(Vec3::X, 1.0e-6));
        assert!(look_vector([90.0, 0.0]).abs_diff_eq(Vec3::Z, 1.0e-6));
        assert!(look_vector([0.0, 90.0]).abs_diff_eq(Vec3::Y, 1.0e-6));
    }

    #[test]
    fn view_results_are_sorted_ascending_by_distance() {
        let (mut world, registry) = stage();
        let origin = Vec3::new(8.5, 100.5, 8.5);

        // Distances 5, 20 and 10 straight ahead of the viewpoint.
        world.set(IVec3::new(13, 100, 8), Some(BlockKind::Brick)).unwrap();
        world.set(IVec3::new(28, 100, 8), Some(BlockKind::Brick)).unwrap();
        world.set(IVec3::new(18, 100, 8), Some(BlockKind::Brick)).unwrap();

        let results = view_query(&world, &registry, origin, [0.0, 0.0], 25.0);
        let distances: Vec<f32> = results.iter().filter_map(|b| b.distance).collect();
        assert_eq!(distances, vec![5.0, 10.0, 20.0]);
    }

    #[test]
    fn blocks_behind_the_viewpoint_are_excluded() {
        let (mut world, registry) = stage();
        let origin = Vec3::new(8.5, 100.5, 8.5);

        world.set(IVec3::new(13, 100, 8), Some(BlockKind::Brick)).unwrap();
        world.set(IVec3::new(3, 100, 8), Some(BlockKind::Brick)).unwrap();

        let results = view_query(&world, &registry, origin, [0.0, 0.0], 25.0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].position, IVec3::new(13, 100, 8));
    }

    #[test]
    fn region_query_honors_the_radius_without_direction() {
        let (mut world, registry) = stage();
        let center = Vec3::new(8.5, 100.5, 8.5);

        world.set(IVec3::new(12, 100, 8), Some(BlockKind::Brick)).unwrap(); // dist 4
        world.set(IVec3::new(4, 100, 8), Some(BlockKind::Brick)).unwrap(); // dist 4, behind
        world.set(IVec3::new(8, 100, 20), Some(BlockKind::Brick)).unwrap(); // dist 12

        let results = region_query(&world, &registry, center, 6.0);
        let positions: Vec<IVec3> = results.iter().map(|b| b.position).collect();
        assert_eq!(positions.len(), 2);
        assert!(positions.contains(&IVec3::new(12, 100, 8)));
        assert!(positions.contains(&IVec3::new(4, 100, 8)));
        assert!(results.iter().all(|b| b.distance.is_none()));
    }

    #[test]
    fn registered_blocks_carry_their_block_id() {
        let (mut world, mut registry) = stage();
        let pos = IVec3::new(10, 100, 8);
        world.set(pos, Some(BlockKind::Camera)).unwrap();
        let id = registry.place(pos, BlockKind::Camera, None, None).unwrap();

        let results = region_query(&world, &registry, Vec3::new(8.5, 100.5, 8.5), 4.0);
        let camera = results.iter().find(|b| b.position == pos).unwrap();
        assert_eq!(camera.block_id.as_deref(), Some(id.as_str()));
        assert!(camera.collision);
    }
}
