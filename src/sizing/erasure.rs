use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Parity used when the layout supports it
pub const DEFAULT_PARITY: Parity = Parity(4);

/// Largest parity whose erasure set still fits in a `u32`
pub const MAX_PARITY: u32 = u32::MAX / 2;

const PARITY_PREFIX: &str = "EC:";
const DEFAULT_SUFFIX: &str = " (Default)";

/// An erasure code parity level, written `EC:<n>` on the wire
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Parity(u32);

impl Parity {
    pub fn new(drives: u32) -> Self {
        Self(drives)
    }

    /// Number of parity drives per erasure set
    pub fn drives(self) -> u32 {
        self.0
    }
}

impl Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PARITY_PREFIX}{}", self.0)
    }
}

impl FromStr for Parity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix(PARITY_PREFIX)
            .and_then(|n| n.parse().ok())
            .filter(|n| (1..=MAX_PARITY).contains(n))
            .map(Parity)
            .ok_or_else(|| Error::InvalidParity(s.to_string()))
    }
}

impl TryFrom<String> for Parity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Parity> for String {
    fn from(value: Parity) -> Self {
        value.to_string()
    }
}

/// Parse the textual parities returned by the capacity planning endpoint
pub fn parse_parities<S: AsRef<str>>(values: &[S]) -> Result<Vec<Parity>> {
    values.iter().map(|v| v.as_ref().parse()).collect()
}

/// Capacity impact of one parity level
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageFactor {
    pub erasure_code: Parity,

    /// Raw bytes consumed per usable byte
    pub storage_factor: f64,

    /// Usable bytes once parity is accounted for
    pub max_capacity: u64,

    /// Drives that may fail without losing data
    pub max_failure_tolerations: u64,
}

/// Parity analysis of a layout
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErasureCodeCalc {
    pub default_ec: Parity,
    pub erasure_code_set: u32,
    pub max_ec: Parity,
    pub raw_capacity: u64,
    pub storage_factors: Vec<StorageFactor>,
}

/// Score every parity in `parities` for `total_disks` volumes of `pv_size` bytes.
///
/// The erasure stripe set is assumed to be twice the largest parity. Returns `None`
/// when there is nothing to score or the layout does not fit in a `u64`.
pub fn erasure_code_calc(
    parities: &[Parity],
    total_disks: u64,
    pv_size: u64,
) -> Option<ErasureCodeCalc> {
    let max_ec = parities.iter().copied().max()?;
    let erasure_code_set = max_ec.drives().checked_mul(2).filter(|&n| n > 0)?;
    let stripe_set = u64::from(erasure_code_set);
    let raw_capacity = total_disks.checked_mul(pv_size)?;

    let storage_factors = parities
        .iter()
        .map(|&parity| {
            let data_drives = stripe_set - u64::from(parity.drives());
            let usable = |n: u64| {
                (u128::from(n) * u128::from(data_drives) / u128::from(stripe_set)) as u64
            };

            StorageFactor {
                erasure_code: parity,
                storage_factor: stripe_set as f64 / data_drives as f64,
                max_capacity: usable(raw_capacity),
                max_failure_tolerations: total_disks - usable(total_disks),
            }
        })
        .collect();

    let default_ec = if parities.contains(&DEFAULT_PARITY) {
        DEFAULT_PARITY
    } else {
        max_ec
    };

    Some(ErasureCodeCalc {
        default_ec,
        erasure_code_set,
        max_ec,
        raw_capacity,
        storage_factors,
    })
}

/// Selectable parity entry
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ParityChoice {
    pub label: String,
    pub value: String,
}

impl ParityChoice {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }

    pub fn is_default(&self) -> bool {
        self.label.ends_with(DEFAULT_SUFFIX)
    }
}

/// Mark the entry matching `default` with a `(Default)` suffix.
///
/// Labels are rebuilt from values, so annotating twice (or with a new default)
/// never stacks suffixes.
pub fn annotate_default(choices: &[ParityChoice], default: &str) -> Vec<ParityChoice> {
    choices
        .iter()
        .map(|choice| {
            let label = if choice.value == default {
                format!("{}{DEFAULT_SUFFIX}", choice.value)
            } else {
                choice.value.clone()
            };

            ParityChoice {
                label,
                value: choice.value.clone(),
            }
        })
        .collect()
}

/// Keep `current` if it is still one of `choices`, otherwise fall back to
/// `computed_default`.
pub fn choose_default_if_invalid<S: AsRef<str>>(
    current: &str,
    choices: &[S],
    computed_default: &str,
) -> String {
    if current.is_empty() || !choices.iter().any(|c| c.as_ref() == current) {
        computed_default.to_string()
    } else {
        current.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::units::GIB;

    fn parities(values: &[&str]) -> Vec<Parity> {
        parse_parities(values).unwrap()
    }

    #[test]
    fn parses_parity_strings() {
        assert_eq!("EC:4".parse::<Parity>().unwrap(), Parity::new(4));
        assert_eq!(Parity::new(2).to_string(), "EC:2");
        assert!("EC:".parse::<Parity>().is_err());
        assert!("4".parse::<Parity>().is_err());
        assert!(parse_parities(&["EC:4", "RS:2"]).is_err());

        let json = serde_json::to_string(&Parity::new(3)).unwrap();
        assert_eq!(json, r#""EC:3""#);
        assert_eq!(serde_json::from_str::<Parity>(&json).unwrap(), Parity::new(3));
    }

    #[test]
    fn scores_every_parity() {
        let all = parities(&["EC:8", "EC:7", "EC:6", "EC:5", "EC:4", "EC:3", "EC:2"]);
        let calc = erasure_code_calc(&all, 16, 64 * GIB).unwrap();

        assert_eq!(calc.max_ec, Parity::new(8));
        assert_eq!(calc.default_ec, Parity::new(4));
        assert_eq!(calc.erasure_code_set, 16);
        assert_eq!(calc.raw_capacity, 1024 * GIB);
        assert_eq!(calc.storage_factors.len(), 7);

        let ec8 = &calc.storage_factors[0];
        assert_eq!(ec8.storage_factor, 2.0);
        assert_eq!(ec8.max_capacity, 512 * GIB);
        assert_eq!(ec8.max_failure_tolerations, 8);

        let ec4 = &calc.storage_factors[4];
        assert_eq!(ec4.erasure_code, Parity::new(4));
        assert_eq!(ec4.max_capacity, 768 * GIB);
        assert_eq!(ec4.max_failure_tolerations, 4);
    }

    #[test]
    fn defaults_to_max_without_ec4() {
        let calc = erasure_code_calc(&parities(&["EC:3", "EC:2"]), 6, GIB).unwrap();
        assert_eq!(calc.default_ec, Parity::new(3));
        assert_eq!(calc.erasure_code_set, 6);
    }

    #[test]
    fn nothing_to_score() {
        assert!(erasure_code_calc(&[], 16, GIB).is_none());
        assert!(erasure_code_calc(&[Parity::new(0)], 16, GIB).is_none());
        assert!(erasure_code_calc(&[Parity::new(u32::MAX)], 16, GIB).is_none());
        assert!(erasure_code_calc(&[Parity::new(2)], u64::MAX, GIB).is_none());
    }

    #[test]
    fn rejects_out_of_range_parities() {
        assert!("EC:0".parse::<Parity>().is_err());
        assert!("EC:3000000000".parse::<Parity>().is_err());
        assert!("EC:99999999999".parse::<Parity>().is_err());
        assert_eq!(
            format!("EC:{MAX_PARITY}").parse::<Parity>().unwrap(),
            Parity::new(MAX_PARITY)
        );
    }

    #[test]
    fn annotates_the_default() {
        let choices = vec![ParityChoice::new("EC:4"), ParityChoice::new("EC:2")];
        let annotated = annotate_default(&choices, "EC:2");

        assert_eq!(annotated[0].label, "EC:4");
        assert_eq!(annotated[1].label, "EC:2 (Default)");
        assert_eq!(annotated[1].value, "EC:2");
        assert!(annotated[1].is_default());

        // Annotating again is a no-op
        assert_eq!(annotate_default(&annotated, "EC:2"), annotated);

        // Moving the default clears the old marker
        let moved = annotate_default(&annotated, "EC:4");
        assert_eq!(moved[0].label, "EC:4 (Default)");
        assert_eq!(moved[1].label, "EC:2");
    }

    #[test]
    fn replaces_stale_choices() {
        let choices = ["EC:2", "EC:4"];

        assert_eq!(choose_default_if_invalid("", &choices, "EC:2"), "EC:2");
        assert_eq!(choose_default_if_invalid("EC:4", &choices, "EC:2"), "EC:4");
        assert_eq!(choose_default_if_invalid("EC:8", &choices, "EC:2"), "EC:2");
    }
}
