use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shardspace_common::EntityGuid;

/// Random source handed to behavior code. Counter-based, seeded per entity
/// and generation, never shared.
pub type EntityRng = ChaCha8Rng;

const EVOLVE_STREAM: u64 = 0x6576_6f6c_7665_0001;
const SPAWN_STREAM: u64 = 0x7370_6177_6e00_0002;

/// Random source for `guid` evolving into `generation`.
pub fn entity_rng(guid: EntityGuid, generation: u64) -> EntityRng {
    derive_rng(guid, generation, EVOLVE_STREAM)
}

/// Guid for the `index`-th entity instantiated by `origin` in `generation`.
///
/// Drawn from a stream separate from the one behavior code sees, so a
/// behavior consuming more or fewer random numbers does not shift the guids
/// of the entities it spawns.
pub fn spawn_guid(origin: EntityGuid, generation: u64, index: u32) -> EntityGuid {
    let mut rng = derive_rng(origin, generation, SPAWN_STREAM ^ u64::from(index));
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    EntityGuid::from_random_bytes(bytes)
}

fn derive_rng(guid: EntityGuid, generation: u64, stream: u64) -> EntityRng {
    let mut seed = [0u8; 32];
    seed[..16].copy_from_slice(guid.0.as_bytes());
    seed[16..24].copy_from_slice(&generation.to_le_bytes());
    seed[24..].copy_from_slice(&splitmix64(stream).to_le_bytes());
    ChaCha8Rng::from_seed(seed)
}

/// Splitmix64 step, used to spread stream tags across the seed.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
