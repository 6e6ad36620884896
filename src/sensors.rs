use std::collections::{BTreeMap, btree_map};

use crate::sensor::Sensor;

/// Key of an input sensor.
#[must_use]
pub fn input_key(channel: u32) -> String {
    format!("input_{channel}")
}

/// Key of an output sensor.
#[must_use]
pub fn output_key(name: &str) -> String {
    format!("output_{name}")
}

/// Key of the energy sensor integrated since the period start.
#[must_use]
pub fn total_energy_key(key: &str) -> String {
    format!("{key}_total_energy")
}

/// Key of the energy sensor integrated since the last poll.
#[must_use]
pub fn energy_key(key: &str) -> String {
    format!("{key}_energy")
}

/// Live sensor collection keyed by entity key.
///
/// Callers get read access only, the reconciler mutates the collection in place.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sensors(BTreeMap<String, Sensor>);

impl Sensors {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Sensor> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Sensor> {
        self.0.iter()
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Sensor> {
        self.0.get_mut(key)
    }

    pub(crate) fn entry(&mut self, key: String) -> btree_map::Entry<'_, String, Sensor> {
        self.0.entry(key)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Sensor> {
        self.0.remove(key)
    }

    /// Remove the sensors not matching the predicate and return their keys.
    pub(crate) fn retain_reporting_removed(
        &mut self,
        mut predicate: impl FnMut(&Sensor) -> bool,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        self.0.retain(|key, sensor| {
            let keep = predicate(sensor);
            if !keep {
                removed.push(key.clone());
            }
            keep
        });
        removed
    }
}

impl<'a> IntoIterator for &'a Sensors {
    type Item = (&'a String, &'a Sensor);
    type IntoIter = btree_map::Iter<'a, String, Sensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
