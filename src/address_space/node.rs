use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::value::{DataType, Variant};
use crate::error::Result;

/// Callable attached to a method: arguments in, value or error out
pub type MethodFn = Arc<dyn Fn(&[Variant]) -> Result<Variant> + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeClass {
    #[default]
    Object,
    Variable,
    Method,
}

impl NodeClass {
    pub fn name(self) -> &'static str {
        match self {
            NodeClass::Object => "Object",
            NodeClass::Variable => "Variable",
            NodeClass::Method => "Method",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Object" => Some(NodeClass::Object),
            "Variable" => Some(NodeClass::Variable),
            "Method" => Some(NodeClass::Method),
            _ => None,
        }
    }
}

/// Optional attributes supplied when a node is added.
///
/// Display and browse names default to the node id.
#[derive(Debug, Clone, Default)]
pub struct NodeAttributes {
    pub display_name: Option<String>,
    pub browse_name: Option<String>,
    pub node_class: NodeClass,
}

impl NodeAttributes {
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_browse_name(mut self, name: impl Into<String>) -> Self {
        self.browse_name = Some(name.into());
        self
    }

    pub fn with_node_class(mut self, class: NodeClass) -> Self {
        self.node_class = class;
        self
    }
}

/// Optional attributes supplied when a variable is added
#[derive(Debug, Clone, Default)]
pub struct VariableAttributes {
    /// Declared type; inferred from the initial value when absent
    pub data_type: Option<DataType>,
    /// Value rank; `-1` (scalar) when absent
    pub value_rank: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct MethodAttributes {
    pub executable: bool,
}

impl Default for MethodAttributes {
    fn default() -> Self {
        Self { executable: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Variant,
    pub data_type: DataType,
    pub value_rank: i32,
}

#[derive(Clone)]
pub struct Method {
    pub(crate) callable: MethodFn,
    pub executable: bool,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}

/// Directed, typed edge stored on its source node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub reference_type: String,
    pub target_node_id: String,
}

/// One outgoing reference as seen by a browse, with the target's display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEntry {
    pub reference_type: String,
    pub target_node_id: String,
    pub display_name: String,
}

/// Addressable entity of the address space graph
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: String,
    pub display_name: String,
    pub browse_name: String,
    pub node_class: NodeClass,
    pub variables: HashMap<String, Variable>,
    pub methods: HashMap<String, Method>,
    pub references: Vec<Reference>,
}

impl Node {
    pub(crate) fn new(node_id: &str, attrs: NodeAttributes) -> Self {
        Self {
            node_id: node_id.to_string(),
            display_name: attrs.display_name.unwrap_or_else(|| node_id.to_string()),
            browse_name: attrs.browse_name.unwrap_or_else(|| node_id.to_string()),
            node_class: attrs.node_class,
            variables: HashMap::new(),
            methods: HashMap::new(),
            references: Vec::new(),
        }
    }
}
