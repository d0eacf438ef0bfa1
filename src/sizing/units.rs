use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;
pub const PIB: u64 = 1 << 50;
pub const EIB: u64 = 1 << 60;

const UNIT_NAMES: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
const K8S_UNIT_NAMES: [&str; 7] = ["B", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// A binary size unit, named the way Kubernetes quantities name them.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    B,
    Ki,
    Mi,
    #[default]
    Gi,
    Ti,
    Pi,
    Ei,
}

impl Unit {
    pub const ALL: [Unit; 7] = [
        Unit::B,
        Unit::Ki,
        Unit::Mi,
        Unit::Gi,
        Unit::Ti,
        Unit::Pi,
        Unit::Ei,
    ];

    /// Power of 1024 this unit stands for
    pub fn exponent(self) -> u32 {
        match self {
            Unit::B => 0,
            Unit::Ki => 1,
            Unit::Mi => 2,
            Unit::Gi => 3,
            Unit::Ti => 4,
            Unit::Pi => 5,
            Unit::Ei => 6,
        }
    }

    pub fn multiplier(self) -> u64 {
        1u64 << (10 * self.exponent())
    }

    pub fn as_str(self) -> &'static str {
        K8S_UNIT_NAMES[self.exponent() as usize]
    }

    /// Whether the unit may be used for a pool's total size.
    ///
    /// Pools smaller than a gibibyte are never valid, so the sub-gibibyte units are
    /// not offered for this input.
    pub fn is_sizing_unit(self) -> bool {
        matches!(self, Unit::Gi | Unit::Ti | Unit::Pi | Unit::Ei)
    }

    /// Units offered for the pool size input
    pub fn sizing_units() -> impl Iterator<Item = Unit> {
        Self::ALL.into_iter().filter(|u| u.is_sizing_unit())
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    /// Accepts both the Kubernetes spelling (`Gi`) and the IEC one (`GiB`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let short = trimmed.strip_suffix('B').filter(|s| !s.is_empty()).unwrap_or(trimmed);

        Self::ALL
            .into_iter()
            .find(|u| u.as_str() == short)
            .ok_or_else(|| Error::InvalidQuantity(format!("unknown unit `{s}`")))
    }
}

/// Convert `value` expressed in `unit` to bytes, `None` on overflow.
pub fn to_bytes(value: u64, unit: Unit) -> Option<u64> {
    value.checked_mul(unit.multiplier())
}

/// Human friendly rendering of a byte count, e.g. `1.0 TiB` (or `1.0 Ti` with
/// `k8s_units`).
pub fn nice_bytes(bytes: u64, k8s_units: bool) -> String {
    let mut n = bytes as f64;
    let mut level = 0;

    while n >= 1024.0 && level < UNIT_NAMES.len() - 1 {
        n /= 1024.0;
        level += 1;
    }

    let unit = if k8s_units {
        K8S_UNIT_NAMES.get(level).copied().unwrap_or("Ei")
    } else {
        UNIT_NAMES[level]
    };

    format!("{n:.1} {unit}")
}
