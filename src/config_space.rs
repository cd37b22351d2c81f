//! # Configuration Space
//!
//! A [`Configuration`] is one sweep point: batch settings for graph nodes
//! (timeout in microseconds), batch settings for receive interfaces (timeout
//! in seconds) and an optional dispatcher count. Configurations are
//! immutable once built and keep their entities in insertion order.
//!
//! ## Generators
//!
//! Every generator implements [`ConfigSpace`]: a finite, deterministic and
//! restartable sequence. Calling [`ConfigSpace::configurations`] twice yields
//! the same sequence both times.
//!
//! - [`UniformSweep`]: every entity gets the same (size, timeout); sizes vary
//!   slowest
//! - [`FullCombination`]: every entity independently ranges over all
//!   (size, timeout) choices; the first entity varies slowest
//! - [`ConstrainedPair`]: a primary entity's size compared against the
//!   secondary size times the worker count
//! - [`InterfaceSweep`]: one receive interface over sizes × timeouts
//! - [`Zip`] and [`Product`]: merge two spaces over disjoint entities
//! - [`ConfigList`]: a materialized list (configuration files, shuffles)
//!
//! ## File Format
//!
//! Configuration files are JSON Lines, one configuration per line:
//!
//! ```text
//! {"dispatcher":{"num":8},"nodes":{"dispatcher":{"size":128,"timeout":180}}}
//! ```

use crate::error::ConfigurationError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

/// Batch setting of one graph node. Unset fields are left untouched on the
/// router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl NodeBatch {
    pub fn new(size: u32, timeout: u64) -> Self {
        Self {
            size: Some(size),
            timeout: Some(timeout),
        }
    }
}

/// Batch setting of one receive interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterfaceBatch {
    pub size: u32,
    /// Seconds, fractional.
    pub timeout: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatcher {
    pub num: u32,
}

/// Entity name → setting, in insertion order, without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMap<T> {
    entries: Vec<(String, T)>,
}

/// Interface entries of a configuration.
pub type InterfaceBatchMap = EntityMap<InterfaceBatch>;

impl<T> Default for EntityMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> EntityMap<T> {
    fn push(&mut self, name: String, value: T) -> Result<(), ConfigurationError> {
        if name.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "entity names must not be empty".to_string(),
            ));
        }
        if self.contains(&name) {
            return Err(ConfigurationError::DuplicateEntity(name));
        }
        self.entries.push((name, value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl<T: Serialize> Serialize for EntityMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct EntityMapVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for EntityMapVisitor<T> {
    type Value = EntityMap<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of entity names to batch settings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = EntityMap::default();
        while let Some((name, value)) = access.next_entry::<String, T>()? {
            map.push(name, value).map_err(serde::de::Error::custom)?;
        }
        Ok(map)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for EntityMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EntityMapVisitor(PhantomData))
    }
}

/// One sweep point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dispatcher: Option<Dispatcher>,
    #[serde(default)]
    nodes: EntityMap<NodeBatch>,
    #[serde(default, skip_serializing_if = "EntityMap::is_empty")]
    interfaces: EntityMap<InterfaceBatch>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.dispatcher
    }

    pub fn nodes(&self) -> &EntityMap<NodeBatch> {
        &self.nodes
    }

    pub fn interfaces(&self) -> &InterfaceBatchMap {
        &self.interfaces
    }

    /// Node and interface names, nodes first.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.names().chain(self.interfaces.names())
    }

    /// Combine two configurations over disjoint entities. Sharing an entity,
    /// or both setting a dispatcher count, is an error.
    pub fn merge(&self, other: &Configuration) -> Result<Configuration, ConfigurationError> {
        let mut builder = Configuration::builder();
        builder.dispatcher = self.dispatcher;
        if let Some(dispatcher) = other.dispatcher {
            if self.dispatcher.is_some() {
                return Err(ConfigurationError::DuplicateEntity("dispatcher".to_string()));
            }
            builder.dispatcher = Some(dispatcher);
        }
        for (name, batch) in self.nodes.iter().chain(other.nodes.iter()) {
            builder.nodes.push(name.to_string(), *batch)?;
        }
        for (name, batch) in self.interfaces.iter().chain(other.interfaces.iter()) {
            builder.interfaces.push(name.to_string(), *batch)?;
        }
        Ok(builder.into_configuration())
    }

    /// One-line JSON form, as written to configuration files.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Incremental construction of a [`Configuration`]; errors surface in
/// [`build`](ConfigurationBuilder::build).
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    dispatcher: Option<Dispatcher>,
    nodes: EntityMap<NodeBatch>,
    interfaces: EntityMap<InterfaceBatch>,
    error: Option<ConfigurationError>,
}

impl ConfigurationBuilder {
    pub fn dispatcher(mut self, num: u32) -> Self {
        self.dispatcher = Some(Dispatcher { num });
        self
    }

    pub fn node(mut self, name: impl Into<String>, batch: NodeBatch) -> Self {
        if let Err(err) = self.nodes.push(name.into(), batch) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn interface(mut self, name: impl Into<String>, batch: InterfaceBatch) -> Self {
        if let Err(err) = self.interfaces.push(name.into(), batch) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn build(self) -> Result<Configuration, ConfigurationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.into_configuration()),
        }
    }

    fn into_configuration(self) -> Configuration {
        Configuration {
            dispatcher: self.dispatcher,
            nodes: self.nodes,
            interfaces: self.interfaces,
        }
    }
}

/// A finite, deterministic, restartable sequence of configurations.
pub trait ConfigSpace {
    /// Enumerate the space from the beginning.
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_>;

    /// Number of configurations the space yields.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entity named by any configuration of the space.
    fn entities(&self) -> BTreeSet<String> {
        self.configurations()
            .flat_map(|c| c.entity_names().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

fn require_non_empty<T>(values: &[T], what: &'static str) -> Result<(), ConfigurationError> {
    if values.is_empty() {
        return Err(ConfigurationError::EmptyCandidates { what });
    }
    Ok(())
}

fn require_unique(entities: &[String]) -> Result<(), ConfigurationError> {
    let mut seen = BTreeSet::new();
    for entity in entities {
        if !seen.insert(entity.as_str()) {
            return Err(ConfigurationError::DuplicateEntity(entity.clone()));
        }
    }
    Ok(())
}

/// All entities share one (size, timeout) per configuration.
#[derive(Debug, Clone)]
pub struct UniformSweep {
    entities: Vec<String>,
    sizes: Vec<u32>,
    timeouts: Vec<u64>,
}

impl UniformSweep {
    pub fn new(
        entities: Vec<String>,
        sizes: Vec<u32>,
        timeouts: Vec<u64>,
    ) -> Result<Self, ConfigurationError> {
        require_non_empty(&entities, "node list")?;
        require_non_empty(&sizes, "batch sizes")?;
        require_non_empty(&timeouts, "batch timeouts")?;
        require_unique(&entities)?;
        Ok(Self {
            entities,
            sizes,
            timeouts,
        })
    }

    fn point(&self, batch: NodeBatch) -> Configuration {
        let mut nodes = EntityMap::default();
        nodes.entries = self.entities.iter().map(|e| (e.clone(), batch)).collect();
        Configuration {
            dispatcher: None,
            nodes,
            interfaces: EntityMap::default(),
        }
    }
}

impl ConfigSpace for UniformSweep {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(self.sizes.iter().flat_map(move |&size| {
            self.timeouts
                .iter()
                .map(move |&timeout| self.point(NodeBatch::new(size, timeout)))
        }))
    }

    fn len(&self) -> usize {
        self.sizes.len() * self.timeouts.len()
    }

    fn entities(&self) -> BTreeSet<String> {
        self.entities.iter().cloned().collect()
    }
}

/// Every entity independently takes every (size, timeout) choice.
#[derive(Debug, Clone)]
pub struct FullCombination {
    entities: Vec<String>,
    choices: Vec<NodeBatch>,
    count: usize,
}

impl FullCombination {
    /// Fails when the number of configurations would exceed `cap`.
    pub fn new(
        entities: Vec<String>,
        sizes: Vec<u32>,
        timeouts: Vec<u64>,
        cap: usize,
    ) -> Result<Self, ConfigurationError> {
        require_non_empty(&entities, "node list")?;
        require_non_empty(&sizes, "batch sizes")?;
        require_non_empty(&timeouts, "batch timeouts")?;
        require_unique(&entities)?;

        let choices: Vec<NodeBatch> = sizes
            .iter()
            .flat_map(|&size| timeouts.iter().map(move |&timeout| NodeBatch::new(size, timeout)))
            .collect();
        let count = u32::try_from(entities.len())
            .ok()
            .and_then(|exp| choices.len().checked_pow(exp));
        match count {
            Some(count) if count <= cap => Ok(Self {
                entities,
                choices,
                count,
            }),
            _ => Err(ConfigurationError::CombinationCap {
                entities: entities.len(),
                choices: choices.len(),
                requested: count.map_or_else(
                    || format!("{}^{}", choices.len(), entities.len()),
                    |c| c.to_string(),
                ),
                cap,
            }),
        }
    }
}

/// Odometer over choice indices; the last entity is the fastest digit.
struct CombinationIter<'a> {
    space: &'a FullCombination,
    digits: Vec<usize>,
    done: bool,
}

impl Iterator for CombinationIter<'_> {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        if self.done {
            return None;
        }
        let mut nodes = EntityMap::default();
        nodes.entries = self
            .space
            .entities
            .iter()
            .zip(&self.digits)
            .map(|(entity, &digit)| (entity.clone(), self.space.choices[digit]))
            .collect();

        self.done = true;
        for digit in self.digits.iter_mut().rev() {
            *digit += 1;
            if *digit < self.space.choices.len() {
                self.done = false;
                break;
            }
            *digit = 0;
        }

        Some(Configuration {
            dispatcher: None,
            nodes,
            interfaces: EntityMap::default(),
        })
    }
}

impl ConfigSpace for FullCombination {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(CombinationIter {
            space: self,
            digits: vec![0; self.entities.len()],
            done: false,
        })
    }

    fn len(&self) -> usize {
        self.count
    }

    fn entities(&self) -> BTreeSet<String> {
        self.entities.iter().cloned().collect()
    }
}

/// Relation required between the primary size and the aggregate secondary
/// size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Less,
    Greater,
}

impl Comparison {
    pub fn holds(&self, primary: u64, aggregate: u64) -> bool {
        match self {
            Comparison::Equal => primary == aggregate,
            Comparison::Less => primary < aggregate,
            Comparison::Greater => primary > aggregate,
        }
    }
}

/// Pairs of (primary size, secondary size) filtered by
/// `primary <cmp> secondary * worker_count`.
///
/// Emitted configurations set the dispatcher count to `worker_count`, the
/// primary entity, every secondary entity (all with the same size) and the
/// fixed entities, all with `timeout` unless the fixed entry says otherwise.
#[derive(Debug, Clone)]
pub struct ConstrainedPair {
    pub primary: String,
    pub primary_sizes: Vec<u32>,
    pub secondaries: Vec<String>,
    pub secondary_sizes: Vec<u32>,
    pub worker_count: u32,
    pub timeout: u64,
    pub comparison: Comparison,
    pub fixed: Vec<(String, NodeBatch)>,
}

impl ConstrainedPair {
    /// Check the inputs; the struct is otherwise built literally.
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        require_non_empty(&self.primary_sizes, "primary batch sizes")?;
        require_non_empty(&self.secondary_sizes, "secondary batch sizes")?;
        if self.worker_count == 0 {
            return Err(ConfigurationError::Invalid(
                "worker count must be positive".to_string(),
            ));
        }
        let mut names = vec![self.primary.clone()];
        names.extend(self.secondaries.iter().cloned());
        names.extend(self.fixed.iter().map(|(n, _)| n.clone()));
        require_unique(&names)?;
        Ok(self)
    }

    fn admitted(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.primary_sizes.iter().flat_map(move |&primary| {
            self.secondary_sizes
                .iter()
                .filter(move |&&secondary| {
                    self.comparison.holds(
                        u64::from(primary),
                        u64::from(secondary) * u64::from(self.worker_count),
                    )
                })
                .map(move |&secondary| (primary, secondary))
        })
    }

    fn point(&self, primary: u32, secondary: u32) -> Configuration {
        let mut nodes = EntityMap::default();
        nodes
            .entries
            .push((self.primary.clone(), NodeBatch::new(primary, self.timeout)));
        for entity in &self.secondaries {
            nodes
                .entries
                .push((entity.clone(), NodeBatch::new(secondary, self.timeout)));
        }
        nodes.entries.extend(self.fixed.iter().cloned());
        Configuration {
            dispatcher: Some(Dispatcher {
                num: self.worker_count,
            }),
            nodes,
            interfaces: EntityMap::default(),
        }
    }
}

impl ConfigSpace for ConstrainedPair {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(self.admitted().map(move |(p, s)| self.point(p, s)))
    }

    fn len(&self) -> usize {
        self.admitted().count()
    }
}

/// One receive interface over sizes × timeouts.
#[derive(Debug, Clone)]
pub struct InterfaceSweep {
    interface: String,
    sizes: Vec<u32>,
    timeouts: Vec<f64>,
}

impl InterfaceSweep {
    pub fn new(
        interface: impl Into<String>,
        sizes: Vec<u32>,
        timeouts: Vec<f64>,
    ) -> Result<Self, ConfigurationError> {
        let interface = interface.into();
        if interface.trim().is_empty() {
            return Err(ConfigurationError::InterfaceCount(0));
        }
        require_non_empty(&sizes, "interface batch sizes")?;
        require_non_empty(&timeouts, "interface batch timeouts")?;
        if timeouts.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigurationError::Invalid(
                "interface timeouts must be non-negative seconds".to_string(),
            ));
        }
        Ok(Self {
            interface,
            sizes,
            timeouts,
        })
    }
}

impl ConfigSpace for InterfaceSweep {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(self.sizes.iter().flat_map(move |&size| {
            self.timeouts.iter().map(move |&timeout| {
                let mut interfaces = EntityMap::default();
                interfaces
                    .entries
                    .push((self.interface.clone(), InterfaceBatch { size, timeout }));
                Configuration {
                    dispatcher: None,
                    nodes: EntityMap::default(),
                    interfaces,
                }
            })
        }))
    }

    fn len(&self) -> usize {
        self.sizes.len() * self.timeouts.len()
    }

    fn entities(&self) -> BTreeSet<String> {
        std::iter::once(self.interface.clone()).collect()
    }
}

fn require_disjoint(left: &dyn ConfigSpace, right: &dyn ConfigSpace) -> Result<(), ConfigurationError> {
    let left = left.entities();
    match right.entities().into_iter().find(|e| left.contains(e)) {
        Some(shared) => Err(ConfigurationError::DuplicateEntity(shared)),
        None => Ok(()),
    }
}

/// Union of two configurations already known to be disjoint.
fn union(left: &Configuration, right: &Configuration) -> Configuration {
    let mut merged = left.clone();
    merged.dispatcher = left.dispatcher.or(right.dispatcher);
    merged.nodes.entries.extend(right.nodes.entries.iter().cloned());
    merged
        .interfaces
        .entries
        .extend(right.interfaces.entries.iter().cloned());
    merged
}

/// Pairwise merge of two spaces; stops at the shorter one.
pub struct Zip<A, B> {
    left: A,
    right: B,
}

impl<A: ConfigSpace, B: ConfigSpace> Zip<A, B> {
    pub fn new(left: A, right: B) -> Result<Self, ConfigurationError> {
        require_disjoint(&left, &right)?;
        Ok(Self { left, right })
    }
}

impl<A: ConfigSpace, B: ConfigSpace> ConfigSpace for Zip<A, B> {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(
            self.left
                .configurations()
                .zip(self.right.configurations())
                .map(|(l, r)| union(&l, &r)),
        )
    }

    fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }
}

/// Cartesian product of two spaces; the left space varies slowest.
pub struct Product<A, B> {
    left: A,
    right: B,
}

impl<A: ConfigSpace, B: ConfigSpace> Product<A, B> {
    pub fn new(left: A, right: B, cap: usize) -> Result<Self, ConfigurationError> {
        require_disjoint(&left, &right)?;
        match left.len().checked_mul(right.len()) {
            Some(count) if count <= cap => Ok(Self { left, right }),
            count => Err(ConfigurationError::CombinationCap {
                entities: left.entities().len() + right.entities().len(),
                choices: right.len(),
                requested: count.map_or_else(
                    || format!("{}*{}", left.len(), right.len()),
                    |c| c.to_string(),
                ),
                cap,
            }),
        }
    }
}

impl<A: ConfigSpace, B: ConfigSpace> ConfigSpace for Product<A, B> {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(self.left.configurations().flat_map(move |l| {
            self.right.configurations().map(move |r| union(&l, &r))
        }))
    }

    fn len(&self) -> usize {
        self.left.len() * self.right.len()
    }
}

impl ConfigSpace for Box<dyn ConfigSpace> {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        self.as_ref().configurations()
    }

    fn len(&self) -> usize {
        self.as_ref().len()
    }

    fn entities(&self) -> BTreeSet<String> {
        self.as_ref().entities()
    }
}

/// A materialized sequence of configurations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigList {
    configurations: Vec<Configuration>,
}

impl ConfigList {
    pub fn new(configurations: Vec<Configuration>) -> Self {
        Self { configurations }
    }

    /// Collect any space into a list.
    pub fn collect(space: &dyn ConfigSpace) -> Self {
        Self::new(space.configurations().collect())
    }

    /// Deterministic permutation for a given seed.
    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.configurations.shuffle(&mut rng);
        self
    }

    pub fn as_slice(&self) -> &[Configuration] {
        &self.configurations
    }
}

impl ConfigSpace for ConfigList {
    fn configurations(&self) -> Box<dyn Iterator<Item = Configuration> + '_> {
        Box::new(self.configurations.iter().cloned())
    }

    fn len(&self) -> usize {
        self.configurations.len()
    }
}

/// Read a JSON Lines configuration file. Blank lines are ignored; any other
/// line that is not a valid configuration fails the whole load with its
/// line number.
pub fn load_configurations(path: &Path) -> Result<ConfigList, ConfigurationError> {
    let file = File::open(path).map_err(|e| {
        ConfigurationError::Invalid(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut configurations = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ConfigurationError::InvalidLine {
            line: index + 1,
            message: e.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let configuration: Configuration =
            serde_json::from_str(&line).map_err(|e| ConfigurationError::InvalidLine {
                line: index + 1,
                message: e.to_string(),
            })?;
        if let Some((name, _)) = configuration
            .nodes()
            .iter()
            .find(|(_, batch)| batch.size.is_none() && batch.timeout.is_none())
        {
            return Err(ConfigurationError::InvalidLine {
                line: index + 1,
                message: format!("node `{}` sets neither size nor timeout", name),
            });
        }
        configurations.push(configuration);
    }
    Ok(ConfigList::new(configurations))
}

/// Write a space as JSON Lines and return the number of lines written.
pub fn write_configurations(path: &Path, space: &dyn ConfigSpace) -> std::io::Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for configuration in space.configurations() {
        writeln!(writer, "{}", configuration.to_json())?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_uniform_sweep_sizes_outer() {
        let space = UniformSweep::new(names(&["a", "b"]), vec![32, 64], vec![100, 200]).unwrap();
        let configs: Vec<_> = space.configurations().collect();
        assert_eq!(configs.len(), 4);
        assert_eq!(space.len(), 4);
        assert_eq!(configs[1].nodes().get("a"), Some(&NodeBatch::new(32, 200)));
        assert_eq!(configs[2].nodes().get("b"), Some(&NodeBatch::new(64, 100)));
    }

    #[test]
    fn test_full_combination_count_and_order() {
        let space = FullCombination::new(names(&["a", "b"]), vec![16, 32], vec![100], 100).unwrap();
        let configs: Vec<_> = space.configurations().collect();
        assert_eq!(configs.len(), 4);
        let sizes: Vec<(u32, u32)> = configs
            .iter()
            .map(|c| {
                (
                    c.nodes().get("a").unwrap().size.unwrap(),
                    c.nodes().get("b").unwrap().size.unwrap(),
                )
            })
            .collect();
        assert_eq!(sizes, vec![(16, 16), (16, 32), (32, 16), (32, 32)]);
    }

    #[test]
    fn test_full_combination_is_restartable() {
        let space = FullCombination::new(names(&["a", "b", "c"]), vec![1, 2], vec![5, 6], 100).unwrap();
        let first: Vec<_> = space.configurations().collect();
        let second: Vec<_> = space.configurations().collect();
        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_combination_cap() {
        let err = FullCombination::new(names(&["a", "b", "c"]), vec![1, 2, 3], vec![1], 26).unwrap_err();
        assert!(matches!(err, ConfigurationError::CombinationCap { cap: 26, .. }));
        let huge = FullCombination::new(
            (0..64).map(|i| format!("n{}", i)).collect(),
            vec![1, 2, 3, 4],
            vec![1],
            usize::MAX,
        );
        assert!(huge.is_err());
    }

    #[test]
    fn test_empty_candidates_rejected() {
        assert!(matches!(
            UniformSweep::new(names(&["a"]), vec![], vec![100]),
            Err(ConfigurationError::EmptyCandidates { .. })
        ));
        assert!(matches!(
            UniformSweep::new(names(&["a", "a"]), vec![1], vec![100]),
            Err(ConfigurationError::DuplicateEntity(_))
        ));
    }

    fn constrained(comparison: Comparison) -> ConstrainedPair {
        ConstrainedPair {
            primary: "dispatcher".to_string(),
            primary_sizes: vec![128, 256],
            secondaries: names(&["protocol1", "protocol2"]),
            secondary_sizes: vec![16],
            worker_count: 8,
            timeout: 180,
            comparison,
            fixed: vec![("ip6-lookup".to_string(), NodeBatch::new(256, 0))],
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_constrained_pair_partition() {
        assert_eq!(constrained(Comparison::Equal).configurations().count(), 1);
        assert_eq!(constrained(Comparison::Less).configurations().count(), 0);
        assert_eq!(constrained(Comparison::Greater).configurations().count(), 1);
    }

    #[test]
    fn test_constrained_pair_shape() {
        let config = constrained(Comparison::Greater).configurations().next().unwrap();
        assert_eq!(config.dispatcher(), Some(Dispatcher { num: 8 }));
        assert_eq!(config.nodes().get("dispatcher"), Some(&NodeBatch::new(256, 180)));
        assert_eq!(config.nodes().get("protocol2"), Some(&NodeBatch::new(16, 180)));
        assert_eq!(config.nodes().get("ip6-lookup"), Some(&NodeBatch::new(256, 0)));
        let order: Vec<&str> = config.nodes().names().collect();
        assert_eq!(order, vec!["dispatcher", "protocol1", "protocol2", "ip6-lookup"]);
    }

    #[test]
    fn test_zip_and_product_merge() {
        let nodes = UniformSweep::new(names(&["ip4-lookup"]), vec![32, 64], vec![100]).unwrap();
        let rx = InterfaceSweep::new("Ethernet0", vec![32, 64], vec![0.0001]).unwrap();

        let zipped = Zip::new(nodes.clone(), rx.clone()).unwrap();
        let configs: Vec<_> = zipped.configurations().collect();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].interfaces().get("Ethernet0").unwrap().size, 64);
        assert_eq!(configs[1].nodes().get("ip4-lookup").unwrap().size, Some(64));

        let product = Product::new(nodes, rx, 100).unwrap();
        assert_eq!(product.len(), 4);
        let configs: Vec<_> = product.configurations().collect();
        assert_eq!(configs[1].nodes().get("ip4-lookup").unwrap().size, Some(32));
        assert_eq!(configs[1].interfaces().get("Ethernet0").unwrap().size, 64);
    }

    #[test]
    fn test_combinators_reject_shared_entities() {
        let a = UniformSweep::new(names(&["x", "y"]), vec![1], vec![1]).unwrap();
        let b = UniformSweep::new(names(&["y"]), vec![2], vec![2]).unwrap();
        assert!(matches!(
            Zip::new(a, b),
            Err(ConfigurationError::DuplicateEntity(name)) if name == "y"
        ));
    }

    #[test]
    fn test_merge_rejects_overlap() {
        let a = Configuration::builder().node("x", NodeBatch::new(1, 1)).build().unwrap();
        let b = Configuration::builder().node("x", NodeBatch::new(2, 2)).build().unwrap();
        assert!(a.merge(&b).is_err());
        let c = Configuration::builder().dispatcher(4).build().unwrap();
        let merged = a.merge(&c).unwrap();
        assert_eq!(merged.dispatcher(), Some(Dispatcher { num: 4 }));
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let space = UniformSweep::new(names(&["a"]), (1..=20).collect(), vec![1]).unwrap();
        let first = ConfigList::collect(&space).shuffled(7);
        let second = ConfigList::collect(&space).shuffled(7);
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
        assert_ne!(first, ConfigList::collect(&space));
    }

    #[test]
    fn test_file_round_trip_preserves_order() {
        let file = NamedTempFile::new().unwrap();
        let space = constrained(Comparison::Equal);
        assert_eq!(write_configurations(file.path(), &space).unwrap(), 1);

        let loaded = load_configurations(file.path()).unwrap();
        let original: Vec<_> = space.configurations().collect();
        assert_eq!(loaded.as_slice(), original.as_slice());
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with(r#"{"dispatcher":{"num":8},"nodes":{"dispatcher":{"size":128,"timeout":180}"#));
    }

    #[test]
    fn test_load_reports_bad_line() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "{\"nodes\":{\"a\":{\"size\":1}}}\n\n{\"nodes\":{\"a\":{},\"a\":{}}}\n",
        )
        .unwrap();
        let err = load_configurations(file.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidLine { line: 3, .. }));
    }

    #[test]
    fn test_load_rejects_empty_node_entry() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "{\"nodes\":{\"a\":{\"timeout\":100}}}\n{\"nodes\":{\"a\":{\"size\":32},\"b\":{}}}\n",
        )
        .unwrap();
        let err = load_configurations(file.path()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidLine {
                line: 2,
                message: "node `b` sets neither size nor timeout".to_string(),
            }
        );
    }
}
