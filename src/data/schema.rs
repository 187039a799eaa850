//! Per-source schema descriptors.
//!
//! Each supported extract declares its columns once, tagged with the role the
//! column plays. Everything downstream asks the schema for "the year column"
//! instead of guessing from header names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RenewablesError;

/// The role a column plays in an extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Frequency,
    Category,
    SourceType,
    Unit,
    Region,
    Year,
    Value,
    LastUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub role: Role,
}

const fn col(name: &'static str, role: Role) -> ColumnSpec {
    ColumnSpec { name, role }
}

/// The three extracts the pipeline knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    EnergyBalance,
    RenewableShare,
    Gdp,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::EnergyBalance,
        SourceKind::RenewableShare,
        SourceKind::Gdp,
    ];

    pub fn dataset_id(&self) -> &'static str {
        match self {
            SourceKind::EnergyBalance => "nrg_bal",
            SourceKind::RenewableShare => "nrg_ind_ren",
            SourceKind::Gdp => "nama_10_gdp",
        }
    }

    pub fn from_dataset_id(id: &str) -> Result<Self, RenewablesError> {
        SourceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.dataset_id() == id.trim())
            .ok_or_else(|| RenewablesError::NotFound(format!("Unknown dataset identifier: {}", id)))
    }

    pub fn schema(&self) -> SourceSchema {
        let columns = match self {
            SourceKind::RenewableShare => vec![
                col("freq", Role::Frequency),
                col("nrg_bal", Role::Category),
                col("unit", Role::Unit),
                col("geo", Role::Region),
                col("TIME_PERIOD", Role::Year),
                col("OBS_VALUE", Role::Value),
                col("LAST UPDATE", Role::LastUpdate),
            ],
            SourceKind::EnergyBalance => vec![
                col("freq", Role::Frequency),
                col("nrg_bal", Role::Category),
                col("siec", Role::SourceType),
                col("unit", Role::Unit),
                col("geo", Role::Region),
                col("TIME_PERIOD", Role::Year),
                col("OBS_VALUE", Role::Value),
                col("LAST UPDATE", Role::LastUpdate),
            ],
            SourceKind::Gdp => vec![
                col("geo", Role::Region),
                col("TIME_PERIOD", Role::Year),
                col("OBS_VALUE", Role::Value),
                col("LAST UPDATE", Role::LastUpdate),
                col("unit", Role::Unit),
            ],
        };
        SourceSchema {
            kind: *self,
            columns,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dataset_id())
    }
}

/// Named columns with declared roles for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSchema {
    pub kind: SourceKind,
    pub columns: Vec<ColumnSpec>,
}

impl SourceSchema {
    pub fn column(&self, role: Role) -> Option<&'static str> {
        self.columns.iter().find(|c| c.role == role).map(|c| c.name)
    }

    pub fn has(&self, role: Role) -> bool {
        self.column(role).is_some()
    }

    /// Column name for a role the pipeline cannot work without.
    pub fn required(&self, role: Role) -> Result<&'static str, RenewablesError> {
        self.column(role).ok_or_else(|| {
            RenewablesError::Schema(format!(
                "Schema for {} declares no {:?} column",
                self.kind, role
            ))
        })
    }

    /// Roles that identify an observation within the source, in column order.
    /// Region and year first, then any dimension roles the schema declares.
    pub fn dedup_roles(&self) -> Vec<Role> {
        let mut roles = vec![Role::Region, Role::Year];
        for role in [Role::Category, Role::SourceType, Role::Unit] {
            if self.has(role) {
                roles.push(role);
            }
        }
        roles
    }

    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_ids_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(SourceKind::from_dataset_id(kind.dataset_id()).unwrap(), kind);
        }
        assert!(matches!(
            SourceKind::from_dataset_id("nrg_cb_e"),
            Err(RenewablesError::NotFound(_))
        ));
    }

    #[test]
    fn energy_balance_dedups_on_all_dimensions() {
        let schema = SourceKind::EnergyBalance.schema();
        assert_eq!(
            schema.dedup_roles(),
            vec![Role::Region, Role::Year, Role::Category, Role::SourceType, Role::Unit]
        );
        assert_eq!(schema.column(Role::SourceType), Some("siec"));
    }

    #[test]
    fn gdp_has_no_category() {
        let schema = SourceKind::Gdp.schema();
        assert!(!schema.has(Role::Category));
        assert_eq!(schema.dedup_roles(), vec![Role::Region, Role::Year, Role::Unit]);
        assert!(schema.required(Role::Frequency).is_err());
    }
}
