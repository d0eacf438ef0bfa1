use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::units::{GIB, PIB, TIB};

/// Smallest memory request a server can run with
pub const MIN_MEMORY: u64 = 2 * GIB;

/// Memory limit floors by pool capacity, largest first
const LIMIT_FLOORS: [(u64, u64); 4] = [
    (PIB, 64 * GIB),
    (100 * TIB, 32 * GIB),
    (10 * TIB, 16 * GIB),
    (TIB, 8 * GIB),
];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("There is no memory available for the selected number of nodes")]
    NoneAvailable,

    #[error("There are not enough memory resources available")]
    NotEnoughAvailable,

    #[error("The requested memory size must be greater than 2Gi")]
    RequestTooSmall,

    #[error("The requested memory is greater than the max available memory for the selected number of nodes")]
    RequestTooLarge,
}

/// Memory request and limit for every server of a pool, in bytes
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryResource {
    pub request: u64,
    pub limit: u64,
}

/// Size server memory for a pool of `capacity` bytes.
///
/// `memory_gi` is the requested memory in Gi and `max_memory` what the selected
/// nodes can offer. Larger pools get a higher limit than they request.
pub fn memory_resource(
    memory_gi: u64,
    capacity: u64,
    max_memory: u64,
) -> Result<MemoryResource, MemoryError> {
    let request = memory_gi.saturating_mul(GIB);

    if max_memory == 0 {
        return Err(MemoryError::NoneAvailable);
    }
    if max_memory < MIN_MEMORY {
        return Err(MemoryError::NotEnoughAvailable);
    }
    if request < MIN_MEMORY {
        return Err(MemoryError::RequestTooSmall);
    }
    if request > max_memory {
        return Err(MemoryError::RequestTooLarge);
    }

    let limit = LIMIT_FLOORS
        .iter()
        .find(|(threshold, _)| capacity >= *threshold)
        .map_or(request, |(_, floor)| request.max(*floor));

    Ok(MemoryResource { request, limit })
}
