//! Site catalog files
//!
//! A single JSON document describing a site's areas, devices and doors together
//! with its interlock and linkage rules. The replay binary and integration tests
//! load sites through this type.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use super::{CatalogError, InMemoryRuleCatalog, InterlockRule, LinkageRule};
use crate::facility::{Area, Device, Door, FacilityRegistry};

/// Facility metadata and rule rows for one site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteCatalog {
    /// Areas of the site
    pub areas: Vec<Area>,
    /// Devices installed on the site
    #[serde(default)]
    pub devices: Vec<Device>,
    /// Doors controlled by the devices
    #[serde(default)]
    pub doors: Vec<Door>,
    /// Interlock rules
    #[serde(default)]
    pub interlock_rules: Vec<InterlockRule>,
    /// Linkage rules
    #[serde(default)]
    pub linkage_rules: Vec<LinkageRule>,
}

impl SiteCatalog {
    /// Load a site catalog from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path.as_ref())?;
        let site: SiteCatalog = serde_json::from_str(&content)?;
        info!(
            "Loaded site catalog {}: {} areas, {} devices, {} doors, {} interlock rules, {} linkage rules",
            path.as_ref().display(),
            site.areas.len(),
            site.devices.len(),
            site.doors.len(),
            site.interlock_rules.len(),
            site.linkage_rules.len()
        );
        Ok(site)
    }

    /// Check references between facility entities and rules
    pub fn validate(&self) -> Result<(), CatalogError> {
        self.registry().validate().map_err(CatalogError::Invalid)?;

        let areas: HashSet<_> = self.areas.iter().map(|a| a.id).collect();
        let devices: HashSet<_> = self.devices.iter().map(|d| d.id).collect();
        let doors: HashSet<_> = self.doors.iter().map(|d| d.id).collect();

        let mut seen = HashSet::new();
        for rule in &self.interlock_rules {
            if !seen.insert(rule.id) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate interlock rule {}",
                    rule.id
                )));
            }
            for (area, door) in [(rule.area_a, rule.door_a), (rule.area_b, rule.door_b)] {
                if !areas.contains(&area) || !doors.contains(&door) {
                    return Err(CatalogError::Invalid(format!(
                        "interlock rule {} references unknown side {}/{}",
                        rule.id, area, door
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for rule in &self.linkage_rules {
            if !seen.insert(rule.id) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate linkage rule {}",
                    rule.id
                )));
            }
            if !devices.contains(&rule.trigger_device_id) || !devices.contains(&rule.target_device_id)
            {
                return Err(CatalogError::Invalid(format!(
                    "linkage rule {} references an unknown device",
                    rule.id
                )));
            }
        }

        Ok(())
    }

    /// Build the facility registry
    pub fn registry(&self) -> FacilityRegistry {
        FacilityRegistry::from_parts(self.areas.clone(), self.devices.clone(), self.doors.clone())
    }

    /// Build an in-memory rule catalog
    pub fn rule_catalog(&self) -> InMemoryRuleCatalog {
        InMemoryRuleCatalog::with_rules(self.interlock_rules.clone(), self.linkage_rules.clone())
    }
}
