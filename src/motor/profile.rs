// Profile table: profile id -> role -> {direction pin, duty pin}

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::messages::Role;

/// Profiles shipped with the crate.
const BUILTIN_PROFILES: &str = include_str!("../../config/profiles.json");

/// Physical pins driving one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinPair {
    pub dir: u8,
    pub pwm: u8,
}

/// Immutable role -> pin mapping for one robot wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RobotConfig {
    roles: BTreeMap<Role, PinPair>,
}

impl RobotConfig {
    pub fn new(roles: impl IntoIterator<Item = (Role, PinPair)>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn pins(&self, role: Role) -> Option<PinPair> {
        self.roles.get(&role).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, PinPair)> + '_ {
        self.roles.iter().map(|(&role, &pins)| (role, pins))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Every known profile, keyed by an arbitrary identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable {
    profiles: BTreeMap<String, RobotConfig>,
}

impl ProfileTable {
    /// The table embedded from `config/profiles.json`.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_PROFILES)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn insert(&mut self, id: impl Into<String>, config: RobotConfig) {
        self.profiles.insert(id.into(), config);
    }

    pub fn get(&self, id: &str) -> Result<&RobotConfig> {
        self.profiles
            .get(id)
            .ok_or_else(|| ConfigError::UnknownProfile(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RobotConfig)> {
        self.profiles.iter().map(|(id, config)| (id.as_str(), config))
    }

    /// Union of duty pins across every profile.
    pub fn all_pwm_pins(&self) -> BTreeSet<u8> {
        self.profiles
            .values()
            .flat_map(|config| config.iter().map(|(_, pins)| pins.pwm))
            .collect()
    }

    /// Union of direction pins across every profile.
    pub fn all_dir_pins(&self) -> BTreeSet<u8> {
        self.profiles
            .values()
            .flat_map(|config| config.iter().map(|(_, pins)| pins.dir))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_parses() {
        let table = ProfileTable::builtin().unwrap();
        assert!(table.ids().count() >= 2);
        for (id, config) in table.iter() {
            for role in Role::DRIVE {
                assert!(config.pins(role).is_some(), "{id} missing {role}");
            }
        }
    }

    #[test]
    fn test_arbitrary_ids_and_role_alias() {
        let table = ProfileTable::from_json(
            r#"{
                "rover-7": {
                    "front_left": { "dir": 23, "pwm": 25 },
                    "extra_motor": { "dir": 5, "pwm": 4 }
                }
            }"#,
        )
        .unwrap();
        let config = table.get("rover-7").unwrap();
        assert_eq!(config.pins(Role::Auxiliary), Some(PinPair { dir: 5, pwm: 4 }));
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn test_unknown_profile() {
        let table = ProfileTable::default();
        assert!(matches!(
            table.get("nope"),
            Err(ConfigError::UnknownProfile(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_pin_unions_span_profiles() {
        let mut table = ProfileTable::default();
        table.insert(
            "a",
            RobotConfig::new([(Role::FrontLeft, PinPair { dir: 23, pwm: 25 })]),
        );
        table.insert(
            "b",
            RobotConfig::new([(Role::FrontLeft, PinPair { dir: 25, pwm: 23 })]),
        );
        assert_eq!(table.all_pwm_pins(), BTreeSet::from([23, 25]));
        assert_eq!(table.all_dir_pins(), BTreeSet::from([23, 25]));
    }
}
