//! Capacity planning for new tenants.
//!
//! Everything in here is pure arithmetic over user supplied numbers: turning a
//! requested size into a per-volume layout, scoring the parity levels a layout
//! supports and sizing per-server memory. Nothing in this module performs I/O.

pub mod distribution;
pub mod erasure;
pub mod memory;
pub mod units;

pub use distribution::{
    compute_distribution, try_distribute, DeploymentShape, DistributionError, LayoutKey,
    Marketplace, SizingInput, StorageDistribution, StorageType,
};
pub use erasure::{
    annotate_default, choose_default_if_invalid, erasure_code_calc, parse_parities,
    ErasureCodeCalc, Parity, ParityChoice, StorageFactor,
};
pub use memory::{memory_resource, MemoryError, MemoryResource};
pub use units::{nice_bytes, Unit};
