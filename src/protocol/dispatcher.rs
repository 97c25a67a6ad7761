use std::sync::Arc;

use tracing::{debug, warn};

use crate::address_space::{AddressSpace, Variant, VariablePath};
use crate::error::Result;
use crate::protocol::browse::{self, NodeDetails};
use crate::protocol::message::{Request, Response};
use crate::utils::metrics::{Metrics, Timer};

/// Executes decoded requests against the address space.
///
/// Every failure is turned into an `ERROR` response; nothing a peer sends can
/// make the dispatcher itself fail.
#[derive(Clone)]
pub struct Dispatcher {
    space: Arc<AddressSpace>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(space: Arc<AddressSpace>, metrics: Arc<Metrics>) -> Self {
        Self { space, metrics }
    }

    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    /// Parse and execute one plaintext request
    pub fn dispatch_bytes(&self, plaintext: &[u8]) -> Response {
        match Request::parse_bytes(plaintext) {
            Ok(request) => self.dispatch(&request),
            Err(e) => {
                warn!(error = %e, "Rejected malformed request");
                self.metrics.request_failed();
                Response::error(&e)
            }
        }
    }

    pub fn dispatch(&self, request: &Request) -> Response {
        let _timer = Timer::start(request.command());

        let result = match request {
            Request::Read { node_id } => {
                self.metrics.read_request();
                self.read(node_id).map(|value| Response::Value(value.to_string()))
            }
            Request::Write { node_id, value } => {
                self.metrics.write_request();
                self.write(node_id, value).map(|()| Response::Success)
            }
            Request::Browse { node_id } => {
                self.metrics.browse_request();
                self.space
                    .browse(node_id)
                    .map(|entries| Response::Value(browse::render_browse(&entries)))
            }
            Request::Details { node_id } => {
                self.metrics.browse_request();
                self.space
                    .get_node(node_id)
                    .map(|node| Response::Value(NodeDetails::from_node(&node).render()))
            }
        };

        result.unwrap_or_else(|e| {
            debug!(command = request.command(), error = %e, "Request failed");
            self.metrics.request_failed();
            Response::error(&e)
        })
    }

    fn read(&self, node_id: &str) -> Result<Variant> {
        let path = VariablePath::parse(node_id);
        self.space.read_variable(&path.node_id, &path.variable)
    }

    /// Text is parsed as the variable's declared type, falling back to a string
    fn write(&self, node_id: &str, text: &str) -> Result<()> {
        let path = VariablePath::parse(node_id);
        self.space
            .write_with(&path.node_id, &path.variable, |declared| {
                Variant::parse_as(declared, text)
            })
            .map(|_| ())
    }
}
