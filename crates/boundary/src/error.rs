use shardspace_common::ShardCoord;
use shardspace_kernel::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    /// Merged history would exceed the reconstruction limit. Integrity fault:
    /// the replicas diverged further than any padding could explain.
    #[error("merged boundary history spans {span} generations, limit is {limit}")]
    HistoryOverflow { span: u64, limit: u64 },
    #[error("generation {generation} is older than the retained window (oldest {oldest})")]
    Fossil { generation: u64, oldest: u64 },
    #[error("cannot merge boundary stacks of different neighbors: {left} and {right}")]
    NeighborMismatch { left: ShardCoord, right: ShardCoord },
    #[error("boundary payload: {0}")]
    Codec(#[from] CodecError),
}
