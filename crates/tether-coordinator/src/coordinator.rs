//! The coordinator: a named registry of source nodes and strategies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tether_core::{Error, Result};
use tether_source::Source;

use crate::strategy::Strategy;

struct Node {
    sources: Vec<Arc<dyn Source>>,
}

/// Groups sources into named nodes and drives strategy activation.
///
/// The coordinator itself is pure wiring: strategies resolve sources by
/// node name (and optional index) and never mutate a peer's state directly.
pub struct Coordinator {
    nodes: Mutex<BTreeMap<String, Node>>,
    strategies: Mutex<Vec<Arc<dyn Strategy>>>,
    active: AtomicBool,
}

impl Coordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            strategies: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    /// Define a node. Fails if the name is taken.
    pub fn add_node(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(&name) {
            return Err(Error::Coordinator(format!("node {name} already defined")));
        }
        nodes.insert(name, Node { sources: Vec::new() });
        Ok(())
    }

    /// Add a source to a node, defining the node if needed.
    pub fn add_source(&self, node: impl Into<String>, source: Arc<dyn Source>) {
        let node = node.into();
        let mut nodes = self.nodes.lock().unwrap();
        nodes
            .entry(node)
            .or_insert_with(|| Node { sources: Vec::new() })
            .sources
            .push(source);
    }

    /// All node names.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.lock().unwrap().keys().cloned().collect()
    }

    /// Every source of a node.
    pub fn sources_of(&self, node: &str) -> Result<Vec<Arc<dyn Source>>> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(node)
            .map(|n| n.sources.clone())
            .ok_or_else(|| Error::Coordinator(format!("unknown node {node}")))
    }

    /// One source of a node, by index.
    pub fn source_at(&self, node: &str, index: usize) -> Result<Arc<dyn Source>> {
        let sources = self.sources_of(node)?;
        sources.get(index).cloned().ok_or_else(|| {
            Error::Coordinator(format!(
                "node {node} has {} sources, wanted index {index}",
                sources.len()
            ))
        })
    }

    /// Register a strategy for activation.
    pub fn add_strategy(&self, strategy: Arc<dyn Strategy>) {
        self.strategies.lock().unwrap().push(strategy);
    }

    /// Whether strategies are currently installed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Install every registered strategy's listeners.
    pub fn activate(&self) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::Coordinator("coordinator already active".into()));
        }
        let strategies = self.strategies.lock().unwrap().clone();
        for strategy in &strategies {
            if let Err(err) = strategy.activate(self) {
                // Unwind the strategies installed so far.
                for installed in strategies.iter().take_while(|s| !Arc::ptr_eq(s, strategy)) {
                    installed.deactivate();
                }
                self.active.store(false, Ordering::SeqCst);
                return Err(err);
            }
            tracing::debug!(strategy = strategy.name(), "strategy activated");
        }
        Ok(())
    }

    /// Remove every strategy's listeners, in reverse activation order.
    pub fn deactivate(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let strategies = self.strategies.lock().unwrap().clone();
        for strategy in strategies.iter().rev() {
            strategy.deactivate();
            tracing::debug!(strategy = strategy.name(), "strategy deactivated");
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
