use shardspace_common::{ShardConfig, ShardCoord, ShardGeometry};
use shardspace_kernel::EntityChangeSet;
use std::collections::BTreeMap;

/// The part of `change_set` whose effects can reach `neighbor`.
///
/// Motions and instantiations landing inside it, removals targeting it,
/// messages and broadcasts sent from within reach of it, and advertisements
/// within sensor range of it.
pub fn extract_outbound(
    change_set: &EntityChangeSet,
    neighbor: &ShardGeometry,
    config: &ShardConfig,
) -> EntityChangeSet {
    let mut out = EntityChangeSet::new();
    for motion in change_set.motions() {
        if neighbor.contains(motion.destination) {
            out.add_motion(motion.clone());
        }
    }
    for spawn in change_set.instantiations() {
        if neighbor.contains(spawn.created.position) {
            out.add_instantiation(spawn.clone());
        }
    }
    for removal in change_set.removals() {
        if neighbor.contains(removal.target.position) {
            out.add_removal(removal.clone());
        }
    }
    for message in change_set.messages() {
        if neighbor.distance_to(message.message.sender().position) <= config.interaction_range {
            out.add_message(message.clone());
        }
    }
    for broadcast in change_set.broadcasts() {
        if neighbor.distance_to(broadcast.message.sender().position) <= broadcast.radius {
            out.add_broadcast(broadcast.clone());
        }
    }
    for ad in change_set.advertisements() {
        if neighbor.distance_to(ad.contact.position()) <= config.sensor_range {
            out.add_advertisement(ad.clone());
        }
    }
    out
}

/// Outbound boundary sets for every neighbor of `own`, empty ones included.
pub fn extract_for_neighbors(
    change_set: &EntityChangeSet,
    own: ShardCoord,
    config: &ShardConfig,
) -> BTreeMap<ShardCoord, EntityChangeSet> {
    let _span = tracing::debug_span!("extract_boundary", shard = %own).entered();
    own.neighbors(config.world_extent)
        .into_iter()
        .map(|neighbor| {
            let geometry = config.shard_geometry(neighbor);
            (neighbor, extract_outbound(change_set, &geometry, config))
        })
        .collect()
}
