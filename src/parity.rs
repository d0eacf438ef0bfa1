//! Which parity levels a topology can run with.
//!
//! Drives are grouped into erasure sets of 4 to 16 drives. A set size is usable when
//! it divides the total drive count and lines up with the server count, so every
//! server contributes the same number of drives to each set. Among the usable sizes
//! the largest one is picked, and a set can dedicate at most half its drives to
//! parity (but never fewer than two).

use async_trait::async_trait;
use tracing::debug;

use crate::{api::ParityProvider, sizing::Parity, Error, Result};

/// Supported erasure set sizes
pub const SET_SIZES: std::ops::RangeInclusive<u64> = 4..=16;

/// Lowest parity a set may use
const MIN_PARITY: u64 = 2;

fn is_symmetric(set_size: u64, nodes: u64) -> bool {
    if nodes > set_size {
        nodes % set_size == 0
    } else {
        set_size % nodes == 0
    }
}

/// Pick the largest set size that yields the fewest sets
fn common_set_drive_count(total: u64, set_counts: &[u64]) -> u64 {
    let (Some(&smallest), Some(&largest)) = (set_counts.first(), set_counts.last()) else {
        return 0;
    };

    if total < largest {
        return total;
    }

    let mut prev_sets = total / smallest;
    let mut set_size = 0;
    for &count in set_counts {
        if total % count == 0 {
            let sets = total / count;
            if sets <= prev_sets {
                prev_sets = sets;
                set_size = count;
            }
        }
    }

    set_size
}

/// Erasure set size for `nodes` servers of `disks_per_node` drives
pub fn erasure_set_size(nodes: u64, disks_per_node: u64) -> Result<u64> {
    if nodes == 0 || disks_per_node == 0 {
        return Err(Error::InvalidTopology(format!(
            "{nodes} servers with {disks_per_node} drives each"
        )));
    }

    let total = nodes
        .checked_mul(disks_per_node)
        .ok_or_else(|| Error::InvalidTopology("too many drives".into()))?;
    if total < *SET_SIZES.start() {
        return Err(Error::InvalidTopology(format!(
            "incorrect number of drives provided ({total}), at least {} are required",
            SET_SIZES.start()
        )));
    }

    let divisors: Vec<u64> = SET_SIZES.filter(|size| total % size == 0).collect();
    if divisors.is_empty() {
        return Err(Error::InvalidTopology(format!(
            "number of drives {total} is not divisible by any supported erasure set size"
        )));
    }

    let symmetric: Vec<u64> = divisors
        .into_iter()
        .filter(|&size| is_symmetric(size, nodes))
        .collect();
    if symmetric.is_empty() {
        return Err(Error::InvalidTopology(format!(
            "{total} drives cannot be spread symmetrically over {nodes} servers"
        )));
    }

    let set_size = common_set_drive_count(total, &symmetric);
    if !SET_SIZES.contains(&set_size) {
        return Err(Error::InvalidTopology(format!(
            "number of drives {total} is not divisible by any supported erasure set size"
        )));
    }

    Ok(set_size)
}

/// Valid parities for the topology, highest first
pub fn possible_parity_values(nodes: u64, disks_per_node: u64) -> Result<Vec<Parity>> {
    let set_size = erasure_set_size(nodes, disks_per_node)?;
    debug!(nodes, disks_per_node, set_size, "computed erasure set size");

    Ok((MIN_PARITY..=set_size / 2)
        .rev()
        .map(|p| Parity::new(p as u32))
        .collect())
}

/// Parity provider answering from the local calculation instead of the API
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalParity;

#[async_trait]
impl ParityProvider for LocalParity {
    async fn parity_choices(&self, nodes: u32, disks_per_node: u32) -> Result<Vec<String>> {
        let parities = possible_parity_values(nodes.into(), disks_per_node.into())?;

        Ok(parities.into_iter().map(String::from).collect())
    }
}
