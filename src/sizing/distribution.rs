use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::units::{nice_bytes, to_bytes, Unit, GIB, TIB};

/// Smallest persistent volume a pool may be made of
pub const MIN_VOLUME_SIZE: u64 = GIB;

/// Smallest supported cluster for self-managed deployments
pub const MIN_SERVERS: u32 = 4;

/// Cloud marketplaces with a managed deployment shape
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Aws,
    Azure,
    Gcp,
}

/// Instance flavour offered by a marketplace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageType {
    /// Identifier selected in the wizard
    pub value: &'static str,

    /// Name shown to the operator
    pub label: &'static str,

    /// Storage class the flavour provisions volumes from
    pub storage_class: &'static str,

    /// Drives attached to every server of this flavour
    pub drives_per_server: u32,

    /// Smallest volume the flavour can back, if it has a floor
    pub minimum_volume_size: Option<(u64, Unit)>,
}

const AWS_STORAGE_TYPES: &[StorageType] = &[
    StorageType {
        value: "performance",
        label: "Performance Optimized",
        storage_class: "performance-optimized",
        drives_per_server: 4,
        minimum_volume_size: Some((32, Unit::Gi)),
    },
    StorageType {
        value: "capacity",
        label: "Capacity Optimized",
        storage_class: "capacity-optimized",
        drives_per_server: 18,
        minimum_volume_size: Some((16, Unit::Ti)),
    },
];

const AZURE_STORAGE_TYPES: &[StorageType] = &[
    StorageType {
        value: "Standard_L8s_v2",
        label: "Standard_L8s_v2",
        storage_class: "local-nvme",
        drives_per_server: 1,
        minimum_volume_size: None,
    },
    StorageType {
        value: "Standard_L16s_v2",
        label: "Standard_L16s_v2",
        storage_class: "local-nvme",
        drives_per_server: 2,
        minimum_volume_size: None,
    },
    StorageType {
        value: "Standard_L32s_v2",
        label: "Standard_L32s_v2",
        storage_class: "local-nvme",
        drives_per_server: 4,
        minimum_volume_size: None,
    },
    StorageType {
        value: "Standard_L48s_v2",
        label: "Standard_L48s_v2",
        storage_class: "local-nvme",
        drives_per_server: 6,
        minimum_volume_size: None,
    },
    StorageType {
        value: "Standard_L64s_v2",
        label: "Standard_L64s_v2",
        storage_class: "local-nvme",
        drives_per_server: 8,
        minimum_volume_size: None,
    },
];

const GCP_STORAGE_TYPES: &[StorageType] = &[StorageType {
    value: "ssd",
    label: "SSD",
    storage_class: "local-ssd",
    drives_per_server: 24,
    minimum_volume_size: None,
}];

impl Marketplace {
    pub fn storage_types(self) -> &'static [StorageType] {
        match self {
            Marketplace::Aws => AWS_STORAGE_TYPES,
            Marketplace::Azure => AZURE_STORAGE_TYPES,
            Marketplace::Gcp => GCP_STORAGE_TYPES,
        }
    }

    pub fn storage_type(self, value: &str) -> Option<&'static StorageType> {
        self.storage_types().iter().find(|st| st.value == value)
    }
}

/// How the tenant is going to be deployed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeploymentShape {
    /// Operator managed cluster on arbitrary hardware
    #[default]
    Default,

    /// Marketplace deployment with a fixed set of instance flavours
    Managed {
        marketplace: Marketplace,
        storage_type: Option<String>,
    },
}

impl DeploymentShape {
    pub fn min_servers(&self) -> u32 {
        match self {
            DeploymentShape::Default => MIN_SERVERS,
            DeploymentShape::Managed { .. } => 1,
        }
    }

    pub fn storage_type(&self) -> Option<&'static StorageType> {
        match self {
            DeploymentShape::Default => None,
            DeploymentShape::Managed {
                marketplace,
                storage_type,
            } => storage_type
                .as_deref()
                .and_then(|value| marketplace.storage_type(value)),
        }
    }
}

/// Identifies the layout a parity request was made for
pub type LayoutKey = (u32, u32);

/// Raw values from the sizing page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizingInput {
    /// Number of servers
    pub nodes: u32,

    /// Drives attached to each server
    pub drives_per_server: u32,

    /// Requested pool size, in `unit`
    pub total_size: u64,

    pub unit: Unit,

    /// Remaining quota of the selected storage class, in bytes
    pub max_size: u64,

    pub shape: DeploymentShape,
}

impl Default for SizingInput {
    fn default() -> Self {
        Self {
            nodes: MIN_SERVERS,
            drives_per_server: 4,
            total_size: 100,
            unit: Unit::Gi,
            max_size: 16 * TIB,
            shape: DeploymentShape::Default,
        }
    }
}

impl SizingInput {
    pub fn layout_key(&self) -> LayoutKey {
        (self.nodes, self.drives_per_server)
    }
}

/// Reasons a sizing input cannot be laid out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("Unit {0} cannot be used for the pool size")]
    UnsupportedUnit(Unit),

    #[error("The requested pool size is too large")]
    SizeOverflow,

    #[error("The pool size must be greater than 1Gi")]
    TooSmall,

    #[error("The pool size must be less than {}", quota_limit(.0))]
    ExceedsQuota(u64),

    #[error("A minimum of {0} servers is required")]
    NotEnoughServers(u32),

    #[error("Number of drives must be at least 1")]
    NoDrives,

    #[error("The pool size must be divisible by the total number of volumes ({0})")]
    Indivisible(u64),

    #[error("Disk Size with this combination would be less than 1Gi, please try another combination")]
    VolumeTooSmall,

    #[error("For the {label} storage type the minimum volume size is {size}{unit}")]
    BelowStorageTypeMinimum {
        label: &'static str,
        size: u64,
        unit: Unit,
    },
}

impl DistributionError {
    /// Form field the error belongs to, `None` for errors about the combination of
    /// fields
    pub fn field(&self) -> Option<&'static str> {
        match self {
            DistributionError::NotEnoughServers(_) => Some("nodes"),
            DistributionError::NoDrives => Some("drivesps"),
            DistributionError::UnsupportedUnit(_)
            | DistributionError::SizeOverflow
            | DistributionError::TooSmall
            | DistributionError::ExceedsQuota(_) => Some("volume_size"),
            DistributionError::Indivisible(_)
            | DistributionError::VolumeTooSmall
            | DistributionError::BelowStorageTypeMinimum { .. } => None,
        }
    }
}

fn quota_limit(max_size: &u64) -> String {
    nice_bytes(*max_size, true)
}

/// Resulting layout of a pool.
///
/// `error` is empty when the layout is usable, otherwise it holds the reason it is
/// not and every count is zero.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageDistribution {
    pub error: String,
    pub nodes: u32,
    pub persistent_volumes: u64,
    pub disks: u32,
    pub pv_size: u64,
}

impl StorageDistribution {
    pub fn invalid(error: &DistributionError) -> Self {
        Self {
            error: error.to_string(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_empty()
    }

    /// Total bytes provisioned across all volumes
    pub fn raw_capacity(&self) -> u64 {
        self.persistent_volumes * self.pv_size
    }
}

/// Lay the requested capacity out over `nodes * drives_per_server` volumes.
///
/// Validation failures never escape: they are reported through
/// [`StorageDistribution::error`].
pub fn compute_distribution(input: &SizingInput) -> StorageDistribution {
    match try_distribute(input) {
        Ok(distribution) => distribution,
        Err(e) => StorageDistribution::invalid(&e),
    }
}

/// Same as [`compute_distribution`], keeping the failure typed
pub fn try_distribute(input: &SizingInput) -> Result<StorageDistribution, DistributionError> {
    if !input.unit.is_sizing_unit() {
        return Err(DistributionError::UnsupportedUnit(input.unit));
    }

    let requested =
        to_bytes(input.total_size, input.unit).ok_or(DistributionError::SizeOverflow)?;
    if requested < MIN_VOLUME_SIZE {
        return Err(DistributionError::TooSmall);
    }
    if requested > input.max_size {
        return Err(DistributionError::ExceedsQuota(input.max_size));
    }

    let min_servers = input.shape.min_servers();
    if input.nodes < min_servers {
        return Err(DistributionError::NotEnoughServers(min_servers));
    }
    if input.drives_per_server < 1 {
        return Err(DistributionError::NoDrives);
    }

    let volumes = u64::from(input.nodes) * u64::from(input.drives_per_server);
    if requested % volumes != 0 {
        return Err(DistributionError::Indivisible(volumes));
    }

    let pv_size = requested / volumes;
    if pv_size < MIN_VOLUME_SIZE {
        return Err(DistributionError::VolumeTooSmall);
    }

    if let Some(storage_type) = input.shape.storage_type() {
        if let Some((size, unit)) = storage_type.minimum_volume_size {
            let minimum = to_bytes(size, unit).unwrap_or(u64::MAX);
            if pv_size < minimum {
                return Err(DistributionError::BelowStorageTypeMinimum {
                    label: storage_type.label,
                    size,
                    unit,
                });
            }
        }
    }

    Ok(StorageDistribution {
        error: String::new(),
        nodes: input.nodes,
        persistent_volumes: volumes,
        disks: input.drives_per_server,
        pv_size,
    })
}
