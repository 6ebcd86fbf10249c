use std::collections::BTreeMap;

use crate::core::{Result, Setting};
use super::SettingsStore;

/// In-memory settings table keyed by setting id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsTable {
    values: BTreeMap<u8, f32>,
}

impl SettingsTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a setting
    pub fn get(&self, key: u8) -> Option<f32> {
        self.values.get(&key).copied()
    }

    /// Number of settings stored
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no settings are stored
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<Setting> for SettingsTable {
    fn from_iter<I: IntoIterator<Item = Setting>>(iter: I) -> Self {
        SettingsTable {
            values: iter.into_iter().map(|s| (s.key, s.value)).collect(),
        }
    }
}

impl SettingsStore for SettingsTable {
    fn list(&self) -> Vec<Setting> {
        self.values
            .iter()
            .map(|(&key, &value)| Setting { key, value })
            .collect()
    }

    fn update(&mut self, setting: Setting) -> Result<()> {
        self.values.insert(setting.key, setting.value);
        Ok(())
    }
}
