//! Browse and node-details replies.
//!
//! Both travel as the text of a value response: one record per line, fields
//! separated by tabs. A backslash, tab, carriage return or newline inside a
//! field is escaped as `\\`, `\t`, `\r` or `\n`.
//!
//! ```text
//! BROWSE N1   ->  Organizes<TAB>N2<TAB>Pressure Node
//! DETAILS N1  ->  node<TAB>N1<TAB>Object<TAB>Temperature Node<TAB>N1
//!                 variable<TAB>temp<TAB>Double<TAB>25.3
//!                 method<TAB>reset
//! ```
//!
//! A node without references browses to an empty reply.

use crate::address_space::{BrowseEntry, DataType, Node, NodeClass};
use crate::error::{constants, ProtocolError, Result};

/// Summary of one node as returned by `DETAILS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDetails {
    pub node_id: String,
    pub node_class: NodeClass,
    pub display_name: String,
    pub browse_name: String,
    /// Sorted by name
    pub variables: Vec<VariableSummary>,
    /// Sorted by name
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSummary {
    pub name: String,
    pub data_type: DataType,
    /// Current value in its text form
    pub value: String,
}

impl NodeDetails {
    pub fn from_node(node: &Node) -> Self {
        let mut variables: Vec<_> = node
            .variables
            .iter()
            .map(|(name, variable)| VariableSummary {
                name: name.clone(),
                data_type: variable.data_type,
                value: variable.value.to_string(),
            })
            .collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));

        let mut methods: Vec<_> = node.methods.keys().cloned().collect();
        methods.sort();

        Self {
            node_id: node.node_id.clone(),
            node_class: node.node_class,
            display_name: node.display_name.clone(),
            browse_name: node.browse_name.clone(),
            variables,
            methods,
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![record(&[
            "node",
            &self.node_id,
            self.node_class.name(),
            &self.display_name,
            &self.browse_name,
        ])];
        lines.extend(
            self.variables
                .iter()
                .map(|v| record(&["variable", &v.name, v.data_type.name(), &v.value])),
        );
        lines.extend(self.methods.iter().map(|m| record(&["method", m])));
        lines.join("\n")
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut details: Option<Self> = None;
        let mut variables = Vec::new();
        let mut methods = Vec::new();

        for line in text.lines() {
            let mut fields = split_record(line)?;
            let kind = fields.remove(0);
            match (kind.as_str(), fields.as_mut_slice()) {
                ("node", [node_id, class, display_name, browse_name]) => {
                    let node_class = NodeClass::from_name(class)
                        .ok_or_else(|| reply_error(constants::ERR_REPLY_NODE_CLASS))?;
                    details = Some(Self {
                        node_id: std::mem::take(node_id),
                        node_class,
                        display_name: std::mem::take(display_name),
                        browse_name: std::mem::take(browse_name),
                        variables: Vec::new(),
                        methods: Vec::new(),
                    });
                }
                ("variable", [name, data_type, value]) => {
                    let data_type = DataType::from_name(data_type)
                        .ok_or_else(|| reply_error(constants::ERR_REPLY_DATA_TYPE))?;
                    variables.push(VariableSummary {
                        name: std::mem::take(name),
                        data_type,
                        value: std::mem::take(value),
                    });
                }
                ("method", [name]) => methods.push(std::mem::take(name)),
                _ => return Err(reply_error(constants::ERR_REPLY_FIELDS)),
            }
        }

        let mut details =
            details.ok_or_else(|| reply_error(constants::ERR_REPLY_MISSING_NODE))?;
        details.variables = variables;
        details.methods = methods;
        Ok(details)
    }
}

pub fn render_browse(entries: &[BrowseEntry]) -> String {
    entries
        .iter()
        .map(|e| record(&[&e.reference_type, &e.target_node_id, &e.display_name]))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_browse(text: &str) -> Result<Vec<BrowseEntry>> {
    text.lines()
        .map(|line| {
            let mut fields = split_record(line)?;
            match fields.as_mut_slice() {
                [reference_type, target_node_id, display_name] => Ok(BrowseEntry {
                    reference_type: std::mem::take(reference_type),
                    target_node_id: std::mem::take(target_node_id),
                    display_name: std::mem::take(display_name),
                }),
                _ => Err(reply_error(constants::ERR_REPLY_FIELDS)),
            }
        })
        .collect()
}

fn reply_error(message: &'static str) -> ProtocolError {
    ProtocolError::MalformedReply(message)
}

fn record(fields: &[&str]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        for c in field.chars() {
            match c {
                '\\' => line.push_str("\\\\"),
                '\t' => line.push_str("\\t"),
                '\n' => line.push_str("\\n"),
                '\r' => line.push_str("\\r"),
                c => line.push(c),
            }
        }
    }
    line
}

/// Split on tabs and unescape; always yields at least one field
fn split_record(line: &str) -> Result<Vec<String>> {
    line.split('\t').map(unescape).collect()
}

fn unescape(field: &str) -> Result<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next() {
            Some('\\') => '\\',
            Some('t') => '\t',
            Some('n') => '\n',
            Some('r') => '\r',
            _ => return Err(reply_error(constants::ERR_REPLY_ESCAPE)),
        });
    }
    Ok(out)
}
