//! # Address Space
//!
//! In-memory directed graph of nodes. Each node owns named variables, named
//! methods and outgoing typed references.
//!
//! ## Concurrency
//! The node table sits behind one `RwLock`. Reads run concurrently; every
//! mutation holds the write lock for exactly one check-then-act step, so an
//! operation either applies fully or not at all. Method callables run and
//! change notifications are published only after the lock is released, so
//! callables may re-enter the address space.
//!
//! ## Usage
//! ```rust
//! use ua_protocol::address_space::{AddressSpace, NodeAttributes, VariableAttributes, Variant};
//!
//! let space = AddressSpace::new();
//! space.add_node("N1", NodeAttributes::default().with_display_name("Temperature Node")).unwrap();
//! space.add_variable("N1", "temp", Variant::Double(25.3), VariableAttributes::default()).unwrap();
//! space.write_variable("N1", "temp", Variant::Double(30.5)).unwrap();
//! assert_eq!(space.read_variable("N1", "temp").unwrap(), Variant::Double(30.5));
//! ```

mod node;
pub mod value;

pub use node::{
    BrowseEntry, Method, MethodAttributes, MethodFn, Node, NodeAttributes, NodeClass, Reference,
    Variable, VariableAttributes,
};
pub use value::{DataType, Variant};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::{constants, ProtocolError, Result};

/// Variable addressed when a request names only a node
pub const DEFAULT_VARIABLE: &str = "value";

/// Capacity of the change feed before slow receivers start lagging
const CHANGE_FEED_CAPACITY: usize = 256;

/// `<node>/<variable>` address used by the request layer and subscriptions.
///
/// A bare node id addresses [`DEFAULT_VARIABLE`]. The short text form omits
/// the default variable name; [`text_forms`](Self::text_forms) lists both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariablePath {
    pub node_id: String,
    pub variable: String,
}

impl VariablePath {
    pub fn new(node_id: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            variable: variable.into(),
        }
    }

    pub fn parse(text: &str) -> Self {
        match text.rsplit_once('/') {
            Some((node, variable)) if !node.is_empty() && !variable.is_empty() => {
                Self::new(node, variable)
            }
            _ => Self::new(text, DEFAULT_VARIABLE),
        }
    }
}

impl VariablePath {
    /// Every request address naming this variable: `node/variable`, plus the
    /// bare node id for the default variable
    pub fn text_forms(&self) -> Vec<String> {
        let mut forms = vec![format!("{}/{}", self.node_id, self.variable)];
        if self.variable == DEFAULT_VARIABLE {
            forms.push(self.node_id.clone());
        }
        forms
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variable == DEFAULT_VARIABLE {
            f.write_str(&self.node_id)
        } else {
            write!(f, "{}/{}", self.node_id, self.variable)
        }
    }
}

/// Published after every successful variable write
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    pub path: VariablePath,
    pub value: Variant,
}

/// Receiving end of the address space change feed
pub type ChangeFeed = broadcast::Receiver<DataChange>;

#[derive(Default)]
struct NodeTable {
    nodes: HashMap<String, Node>,
    // Creation order for list_nodes
    order: Vec<String>,
}

impl NodeTable {
    fn node(&self, node_id: &str) -> Result<&Node> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("node {node_id}")))
    }

    fn node_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("node {node_id}")))
    }
}

/// Shared, internally synchronised node graph
pub struct AddressSpace {
    table: RwLock<NodeTable>,
    changes: broadcast::Sender<DataChange>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            table: RwLock::new(NodeTable::default()),
            changes,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, NodeTable>> {
        self.table
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_ADDRESS_SPACE_LOCK))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, NodeTable>> {
        self.table
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_ADDRESS_SPACE_LOCK))
    }

    /// Add a node; fails if the id is already taken
    pub fn add_node(&self, node_id: &str, attrs: NodeAttributes) -> Result<()> {
        let mut table = self.write()?;
        if table.nodes.contains_key(node_id) {
            return Err(ProtocolError::AlreadyExists(format!("node {node_id}")));
        }

        table.nodes.insert(node_id.to_string(), Node::new(node_id, attrs));
        table.order.push(node_id.to_string());
        debug!(node_id, "Node added");
        Ok(())
    }

    /// Add (or replace) a variable on an existing node.
    ///
    /// The data type is inferred from `value` unless declared in `attrs`.
    pub fn add_variable(
        &self,
        node_id: &str,
        name: &str,
        value: Variant,
        attrs: VariableAttributes,
    ) -> Result<()> {
        let mut table = self.write()?;
        let node = table.node_mut(node_id)?;

        let variable = Variable {
            data_type: attrs.data_type.unwrap_or_else(|| value.data_type()),
            value_rank: attrs.value_rank.unwrap_or(-1),
            value,
        };
        debug!(node_id, variable = name, data_type = variable.data_type.name(), "Variable added");
        node.variables.insert(name.to_string(), variable);
        Ok(())
    }

    pub fn read_variable(&self, node_id: &str, name: &str) -> Result<Variant> {
        let table = self.read()?;
        Ok(Self::variable(table.node(node_id)?, name)?.value.clone())
    }

    /// Declared data type and rank of a variable
    pub fn variable_info(&self, node_id: &str, name: &str) -> Result<(DataType, i32)> {
        let table = self.read()?;
        let variable = Self::variable(table.node(node_id)?, name)?;
        Ok((variable.data_type, variable.value_rank))
    }

    /// Replace a variable's value.
    ///
    /// The declared data type is kept as-is and not checked against `value`.
    pub fn write_variable(&self, node_id: &str, name: &str, value: Variant) -> Result<()> {
        self.write_with(node_id, name, |_| value).map(|_| ())
    }

    /// Replace a variable's value with one built from its declared type.
    ///
    /// `make` runs under the write lock, so the type it sees is the type in
    /// force when the value is stored. It must not call back into the space.
    pub fn write_with<F>(&self, node_id: &str, name: &str, make: F) -> Result<Variant>
    where
        F: FnOnce(DataType) -> Variant,
    {
        let value = {
            let mut table = self.write()?;
            let node = table.node_mut(node_id)?;
            let variable = node.variables.get_mut(name).ok_or_else(|| {
                ProtocolError::NotFound(format!("variable {name} in node {node_id}"))
            })?;
            variable.value = make(variable.data_type);
            variable.value.clone()
        };

        trace!(node_id, variable = name, %value, "Variable written");
        // No receivers is not an error
        let _ = self.changes.send(DataChange {
            path: VariablePath::new(node_id, name),
            value: value.clone(),
        });
        Ok(value)
    }

    pub fn add_method<F>(
        &self,
        node_id: &str,
        name: &str,
        callable: F,
        attrs: MethodAttributes,
    ) -> Result<()>
    where
        F: Fn(&[Variant]) -> Result<Variant> + Send + Sync + 'static,
    {
        let mut table = self.write()?;
        let node = table.node_mut(node_id)?;
        node.methods.insert(
            name.to_string(),
            Method {
                callable: Arc::new(callable),
                executable: attrs.executable,
            },
        );
        debug!(node_id, method = name, executable = attrs.executable, "Method added");
        Ok(())
    }

    /// Invoke a method.
    ///
    /// The callable runs without the address space lock held.
    pub fn call_method(&self, node_id: &str, name: &str, args: &[Variant]) -> Result<Variant> {
        let callable = {
            let table = self.read()?;
            let method = table.node(node_id)?.methods.get(name).ok_or_else(|| {
                ProtocolError::NotFound(format!("method {name} in node {node_id}"))
            })?;
            if !method.executable {
                return Err(ProtocolError::PreconditionViolated(format!(
                    "method {name} in node {node_id} is not executable"
                )));
            }
            method.callable.clone()
        };

        debug!(node_id, method = name, args = args.len(), "Calling method");
        callable(args)
    }

    /// Add a typed edge; both endpoints must exist
    pub fn add_reference(
        &self,
        source_id: &str,
        reference_type: &str,
        target_id: &str,
    ) -> Result<()> {
        let mut table = self.write()?;
        if !table.nodes.contains_key(source_id) {
            return Err(ProtocolError::NotFound(format!("source node {source_id}")));
        }
        if !table.nodes.contains_key(target_id) {
            return Err(ProtocolError::NotFound(format!("target node {target_id}")));
        }

        let source = table.node_mut(source_id)?;
        source.references.push(Reference {
            reference_type: reference_type.to_string(),
            target_node_id: target_id.to_string(),
        });
        debug!(source_id, reference_type, target_id, "Reference added");
        Ok(())
    }

    /// Snapshot of a node
    pub fn get_node(&self, node_id: &str) -> Result<Node> {
        Ok(self.read()?.node(node_id)?.clone())
    }

    /// Outgoing references of a node in insertion order, resolved to display names
    pub fn browse(&self, node_id: &str) -> Result<Vec<BrowseEntry>> {
        let table = self.read()?;
        let node = table.node(node_id)?;
        Ok(node
            .references
            .iter()
            .map(|reference| BrowseEntry {
                reference_type: reference.reference_type.clone(),
                target_node_id: reference.target_node_id.clone(),
                // Targets exist: checked on add_reference, and nodes are never removed
                display_name: table
                    .nodes
                    .get(&reference.target_node_id)
                    .map_or_else(|| reference.target_node_id.clone(), |t| t.display_name.clone()),
            })
            .collect())
    }

    /// All node ids in creation order
    pub fn list_nodes(&self) -> Result<Vec<String>> {
        Ok(self.read()?.order.clone())
    }

    /// Subscribe to variable writes made after this call
    pub fn subscribe_changes(&self) -> ChangeFeed {
        self.changes.subscribe()
    }

    fn variable<'a>(node: &'a Node, name: &str) -> Result<&'a Variable> {
        node.variables.get(name).ok_or_else(|| {
            ProtocolError::NotFound(format!("variable {name} in node {}", node.node_id))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn space_with_node() -> AddressSpace {
        let space = AddressSpace::new();
        space
            .add_node("N1", NodeAttributes::default().with_display_name("Temperature Node"))
            .unwrap();
        space
    }

    #[test]
    fn test_duplicate_node_keeps_original() {
        let space = space_with_node();
        let err = space
            .add_node("N1", NodeAttributes::default().with_display_name("Other"))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyExists(_)));
        assert_eq!(space.get_node("N1").unwrap().display_name, "Temperature Node");
    }

    #[test]
    fn test_default_attributes() {
        let space = space_with_node();
        space.add_node("N2", NodeAttributes::default()).unwrap();
        let node = space.get_node("N2").unwrap();
        assert_eq!(node.display_name, "N2");
        assert_eq!(node.browse_name, "N2");
        assert_eq!(node.node_class, NodeClass::Object);
    }

    #[test]
    fn test_write_then_read() {
        let space = space_with_node();
        space
            .add_variable("N1", "temp", Variant::Double(25.3), VariableAttributes::default())
            .unwrap();
        space.write_variable("N1", "temp", Variant::Double(30.5)).unwrap();
        assert_eq!(space.read_variable("N1", "temp").unwrap(), Variant::Double(30.5));
    }

    #[test]
    fn test_write_keeps_declared_type() {
        let space = space_with_node();
        space
            .add_variable("N1", "temp", Variant::Double(25.3), VariableAttributes::default())
            .unwrap();
        space.write_variable("N1", "temp", "hot".into()).unwrap();
        assert_eq!(space.variable_info("N1", "temp").unwrap(), (DataType::Double, -1));
        assert_eq!(space.read_variable("N1", "temp").unwrap(), Variant::from("hot"));
    }

    #[test]
    fn test_write_with_sees_declared_type() {
        let space = space_with_node();
        space
            .add_variable("N1", "count", Variant::UInt16(0), VariableAttributes::default())
            .unwrap();
        let mut feed = space.subscribe_changes();

        let stored = space
            .write_with("N1", "count", |declared| {
                assert_eq!(declared, DataType::UInt16);
                Variant::parse_as(declared, "12")
            })
            .unwrap();
        assert_eq!(stored, Variant::UInt16(12));
        assert_eq!(feed.try_recv().unwrap().value, Variant::UInt16(12));

        assert!(space.write_with("N1", "missing", |_| Variant::Null).is_err());
        assert!(feed.try_recv().is_err());
    }

    #[test]
    fn test_declared_type_overrides_inference() {
        let space = space_with_node();
        let attrs = VariableAttributes {
            data_type: Some(DataType::Float),
            value_rank: Some(1),
        };
        space.add_variable("N1", "samples", Variant::Double(0.0), attrs).unwrap();
        assert_eq!(space.variable_info("N1", "samples").unwrap(), (DataType::Float, 1));
    }

    #[test]
    fn test_missing_node_and_variable() {
        let space = space_with_node();
        assert!(matches!(
            space.add_variable("N9", "x", 1i32.into(), VariableAttributes::default()),
            Err(ProtocolError::NotFound(_))
        ));
        assert!(matches!(space.read_variable("N1", "x"), Err(ProtocolError::NotFound(_))));
        assert!(matches!(
            space.write_variable("N1", "x", 1i32.into()),
            Err(ProtocolError::NotFound(_))
        ));
        assert!(matches!(space.get_node("N9"), Err(ProtocolError::NotFound(_))));
    }

    #[test]
    fn test_method_reenters_address_space() {
        let space = Arc::new(space_with_node());
        space
            .add_variable("N1", "temp", Variant::Double(25.0), VariableAttributes::default())
            .unwrap();

        let inner = Arc::clone(&space);
        space
            .add_method(
                "N1",
                "increaseTemp",
                move |args| {
                    let Variant::Double(current) = inner.read_variable("N1", "temp")? else {
                        return Err(ProtocolError::Custom("temp is not a double".into()));
                    };
                    let Some(Variant::Double(step)) = args.first() else {
                        return Err(ProtocolError::Custom("expected one double".into()));
                    };
                    let next = Variant::Double(current + step);
                    inner.write_variable("N1", "temp", next.clone())?;
                    Ok(next)
                },
                MethodAttributes::default(),
            )
            .unwrap();

        let result = space.call_method("N1", "increaseTemp", &[Variant::Double(5.0)]).unwrap();
        assert_eq!(result, Variant::Double(30.0));
        assert_eq!(space.read_variable("N1", "temp").unwrap(), Variant::Double(30.0));
    }

    #[test]
    fn test_unregistered_method_is_not_found() {
        let space = space_with_node();
        assert!(matches!(
            space.call_method("N1", "reset", &[]),
            Err(ProtocolError::NotFound(_))
        ));
        assert!(matches!(
            space.call_method("N9", "reset", &[]),
            Err(ProtocolError::NotFound(_))
        ));
    }

    #[test]
    fn test_non_executable_method() {
        let space = space_with_node();
        space
            .add_method(
                "N1",
                "reset",
                |_| Ok(Variant::Null),
                MethodAttributes { executable: false },
            )
            .unwrap();
        assert!(matches!(
            space.call_method("N1", "reset", &[]),
            Err(ProtocolError::PreconditionViolated(_))
        ));
    }

    #[test]
    fn test_references_require_both_endpoints() {
        let space = space_with_node();
        space.add_node("N2", NodeAttributes::default()).unwrap();
        space.add_reference("N1", "Organizes", "N2").unwrap();
        assert!(space.add_reference("N1", "Organizes", "N3").is_err());
        assert!(space.add_reference("N3", "Organizes", "N2").is_err());

        let node = space.get_node("N1").unwrap();
        assert_eq!(
            node.references,
            vec![Reference {
                reference_type: "Organizes".to_string(),
                target_node_id: "N2".to_string(),
            }]
        );
    }

    #[test]
    fn test_browse_resolves_display_names() {
        let space = space_with_node();
        space
            .add_node("N2", NodeAttributes::default().with_display_name("Pressure Node"))
            .unwrap();
        space.add_node("N3", NodeAttributes::default()).unwrap();
        space.add_reference("N1", "Organizes", "N2").unwrap();
        space.add_reference("N1", "HasComponent", "N3").unwrap();

        let entries = space.browse("N1").unwrap();
        assert_eq!(
            entries,
            vec![
                BrowseEntry {
                    reference_type: "Organizes".to_string(),
                    target_node_id: "N2".to_string(),
                    display_name: "Pressure Node".to_string(),
                },
                BrowseEntry {
                    reference_type: "HasComponent".to_string(),
                    target_node_id: "N3".to_string(),
                    display_name: "N3".to_string(),
                },
            ]
        );
        assert!(space.browse("N2").unwrap().is_empty());
        assert!(matches!(space.browse("N9"), Err(ProtocolError::NotFound(_))));
    }

    #[test]
    fn test_list_nodes_in_creation_order() {
        let space = AddressSpace::new();
        for id in ["b", "a", "c"] {
            space.add_node(id, NodeAttributes::default()).unwrap();
        }
        assert!(space.add_node("a", NodeAttributes::default()).is_err());
        assert_eq!(space.list_nodes().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_variable_path() {
        assert_eq!(VariablePath::parse("N1"), VariablePath::new("N1", DEFAULT_VARIABLE));
        assert_eq!(VariablePath::parse("N1/temp"), VariablePath::new("N1", "temp"));
        assert_eq!(VariablePath::parse("ns=2;s=Temperature").variable, DEFAULT_VARIABLE);
        assert_eq!(VariablePath::parse("N1/").node_id, "N1/");
        assert_eq!(VariablePath::new("N1", DEFAULT_VARIABLE).to_string(), "N1");
        assert_eq!(VariablePath::new("N1", "temp").to_string(), "N1/temp");

        assert_eq!(VariablePath::parse("N1").text_forms(), vec!["N1/value", "N1"]);
        assert_eq!(VariablePath::parse("N1/temp").text_forms(), vec!["N1/temp"]);
    }

    #[tokio::test]
    async fn test_change_feed_publishes_writes() {
        let space = space_with_node();
        space
            .add_variable("N1", "temp", Variant::Double(25.3), VariableAttributes::default())
            .unwrap();
        let mut feed = space.subscribe_changes();

        space.write_variable("N1", "temp", Variant::Double(30.5)).unwrap();
        let change = feed.recv().await.unwrap();
        assert_eq!(change.path.to_string(), "N1/temp");
        assert_eq!(change.value, Variant::Double(30.5));
    }
}
