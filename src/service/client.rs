use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::address_space::{BrowseEntry, ChangeFeed, Variant};
use crate::config::{ClientConfig, MAX_FRAME_SIZE};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::browse::{self, NodeDetails};
use crate::protocol::message::{Request, Response};
use crate::service::subscription::SubscriptionTable;
use crate::transport::secure_channel::SecureChannel;
use crate::transport::session::SessionManager;
use crate::transport::tcp;
use crate::utils::timeout::with_timeout_error;
use crate::utils::Metrics;

/// Client for the read, write and browse services plus a local subscription table.
///
/// Each request is one round trip on a fresh connection: encode, send one
/// frame, await one frame within `response_timeout`, decode.
pub struct ServiceClient {
    config: ClientConfig,
    max_frame_size: usize,
    channel: Arc<SecureChannel>,
    sessions: SessionManager,
    subscriptions: Arc<SubscriptionTable>,
    metrics: Arc<Metrics>,
}

impl ServiceClient {
    pub fn new(
        config: ClientConfig,
        channel: Arc<SecureChannel>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            config,
            max_frame_size: MAX_FRAME_SIZE,
            channel,
            sessions,
            subscriptions: Arc::new(SubscriptionTable::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionTable> {
        &self.subscriptions
    }

    /// Read a variable's value as text.
    ///
    /// An `ERROR` reply from the server becomes `ProtocolError::Remote`.
    #[instrument(skip(self), fields(endpoint = %self.config.address))]
    pub async fn read_variable(&self, node_id: &str) -> Result<String> {
        self.metrics.read_request();
        let reply = self.round_trip(&Request::read(node_id)).await?;
        Response::into_read_value(reply)
    }

    /// Write a variable; true iff the server answered exactly `SUCCESS`
    #[instrument(skip(self, value), fields(endpoint = %self.config.address))]
    pub async fn write_variable(&self, node_id: &str, value: &str) -> Result<bool> {
        self.metrics.write_request();
        let reply = self.round_trip(&Request::write(node_id, value)).await?;
        let success = Response::is_write_success(&reply);
        if !success {
            debug!(reply = %reply, "Write rejected");
        }
        Ok(success)
    }

    /// References leaving `node_id`, in the order they were added
    #[instrument(skip(self), fields(endpoint = %self.config.address))]
    pub async fn browse(&self, node_id: &str) -> Result<Vec<BrowseEntry>> {
        self.metrics.browse_request();
        let reply = self.round_trip(&Request::browse(node_id)).await?;
        browse::parse_browse(&Response::into_read_value(reply)?)
    }

    #[instrument(skip(self), fields(endpoint = %self.config.address))]
    pub async fn node_details(&self, node_id: &str) -> Result<NodeDetails> {
        self.metrics.browse_request();
        let reply = self.round_trip(&Request::details(node_id)).await?;
        NodeDetails::parse(&Response::into_read_value(reply)?)
    }

    async fn round_trip(&self, request: &Request) -> Result<String> {
        let mut framed = tcp::connect(
            &self.config.address,
            self.config.connection_timeout,
            self.max_frame_size,
        )
        .await?;

        let wire = self.channel.encode(request.to_string().as_bytes())?;

        let reply = with_timeout_error(
            async {
                framed.send(wire).await?;
                framed.next().await.ok_or(ProtocolError::ConnectionClosed)?
            },
            self.config.response_timeout,
        )
        .await
        .inspect_err(|_| self.metrics.request_failed())?;

        let plaintext = self.channel.decode(&reply).inspect_err(|_| {
            self.metrics.integrity_failure();
        })?;

        String::from_utf8(plaintext)
            .map_err(|_| ProtocolError::TransportIntegrity(constants::ERR_NOT_UTF8))
    }

    pub async fn create_session(&self, client_id: &str) -> String {
        self.sessions.create_session(client_id).await
    }

    pub async fn validate_session(&self, client_id: &str, session_id: &str) -> bool {
        self.sessions.validate_session(client_id, session_id).await
    }

    /// Register a handler for value changes of `node_id`.
    ///
    /// Variable and event keys share one table and are used exactly as given.
    pub fn subscribe_variable<F>(&self, node_id: &str, handler: F) -> Result<()>
    where
        F: Fn(&Variant) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(node_id, handler)?;
        Ok(())
    }

    pub fn subscribe_event<F>(&self, event_type: &str, handler: F) -> Result<()>
    where
        F: Fn(&Variant) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(event_type, handler)?;
        Ok(())
    }

    pub fn unsubscribe(&self, key: &str) -> Result<bool> {
        self.subscriptions.unsubscribe(key)
    }

    /// Deliver a value change; false when nobody subscribed to `node_id`
    pub fn notify_subscriptions(&self, node_id: &str, value: &Variant) -> Result<bool> {
        let delivered = self.subscriptions.notify(node_id, value)?;
        self.metrics.notification(delivered);
        Ok(delivered)
    }

    pub fn notify_event(&self, event_type: &str, data: &Variant) -> Result<bool> {
        let delivered = self.subscriptions.notify(event_type, data)?;
        self.metrics.notification(delivered);
        Ok(delivered)
    }

    /// Spawn a task delivering address space changes to variable subscriptions.
    ///
    /// A change reaches the handler of every address naming the variable, so a
    /// write to `N1/value` notifies both `N1/value` and `N1`. The task ends when
    /// the feed closes. Changes missed by a lagging feed are logged and skipped.
    pub fn forward_changes(&self, mut feed: ChangeFeed) -> JoinHandle<()> {
        let subscriptions = self.subscriptions.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(change) => {
                        let mut delivered = false;
                        for key in change.path.text_forms() {
                            match subscriptions.notify(&key, &change.value) {
                                Ok(hit) => delivered |= hit,
                                Err(e) => {
                                    warn!(error = %e, "Subscription table unavailable, stopping");
                                    return;
                                }
                            }
                        }
                        metrics.notification(delivered);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged, notifications skipped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change feed closed");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::address_space::{AddressSpace, NodeAttributes, VariableAttributes};

    fn client() -> ServiceClient {
        let channel = Arc::new(SecureChannel::generate().unwrap());
        ServiceClient::new(
            ClientConfig::default(),
            channel,
            SessionManager::new(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_keys_are_used_as_given() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client
            .subscribe_variable("N1/value", move |v| sink.lock().unwrap().push(v.clone()))
            .unwrap();

        // same string through the event API reaches the same entry
        assert!(client.notify_event("N1/value", &Variant::Int32(3)).unwrap());
        assert!(client.notify_subscriptions("N1/value", &Variant::Int32(4)).unwrap());
        assert!(!client.notify_subscriptions("N1", &Variant::Int32(5)).unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![Variant::Int32(3), Variant::Int32(4)]);

        assert!(!client.unsubscribe("N1").unwrap());
        assert!(client.unsubscribe("N1/value").unwrap());
    }

    #[test]
    fn test_events_share_the_variable_namespace() {
        let client = client();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        client
            .subscribe_variable("alarm", |_| panic!("replaced handler invoked"))
            .unwrap();
        client
            .subscribe_event("alarm", move |_| *sink.lock().unwrap() += 1)
            .unwrap();

        assert!(client.notify_subscriptions("alarm", &Variant::Null).unwrap());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_notify_counts_delivery() {
        let client = client();
        client.subscribe_event("alarm", |_| {}).unwrap();
        client.notify_event("alarm", &Variant::from("X")).unwrap();
        client.notify_event("unknown", &Variant::from("X")).unwrap();

        let snapshot = client.metrics().snapshot();
        assert_eq!(snapshot.notifications_delivered, 1);
        assert_eq!(snapshot.notifications_dropped, 1);
    }

    #[tokio::test]
    async fn test_sessions_delegate_to_manager() {
        let client = client();
        let token = client.create_session("client-1").await;
        assert!(client.validate_session("client-1", &token).await);
        assert!(!client.validate_session("client-1", "deadbeef").await);
        assert!(!client.validate_session("client-2", &token).await);
    }

    #[tokio::test]
    async fn test_forward_changes_delivers_writes() {
        let space = AddressSpace::shared();
        space.add_node("N1", NodeAttributes::default()).unwrap();
        space
            .add_variable("N1", "temp", Variant::Double(25.3), VariableAttributes::default())
            .unwrap();

        let client = client();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client
            .subscribe_variable("N1/temp", move |v| {
                let _ = tx.send(v.clone());
            })
            .unwrap();

        let forwarder = client.forward_changes(space.subscribe_changes());
        space.write_variable("N1", "temp", Variant::Double(30.5)).unwrap();

        let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, Variant::Double(30.5));

        drop(space);
        tokio::time::timeout(Duration::from_secs(1), forwarder)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_forward_changes_reaches_every_address_form() {
        let space = AddressSpace::shared();
        space.add_node("N1", NodeAttributes::default()).unwrap();
        space
            .add_variable("N1", "value", Variant::Int32(0), VariableAttributes::default())
            .unwrap();

        let client = client();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for key in ["N1", "N1/value"] {
            let tx = tx.clone();
            client
                .subscribe_variable(key, move |v| {
                    let _ = tx.send((key, v.clone()));
                })
                .unwrap();
        }

        let forwarder = client.forward_changes(space.subscribe_changes());
        space.write_variable("N1", "value", Variant::Int32(9)).unwrap();

        let mut keys = Vec::new();
        for _ in 0..2 {
            let (key, value) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(value, Variant::Int32(9));
            keys.push(key);
        }
        keys.sort_unstable();
        assert_eq!(keys, vec!["N1", "N1/value"]);

        forwarder.abort();
    }

    #[tokio::test]
    async fn test_read_without_server_fails() {
        let config = ClientConfig {
            address: "127.0.0.1:1".to_string(),
            connection_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
        };
        let client = ServiceClient::new(
            config,
            Arc::new(SecureChannel::generate().unwrap()),
            SessionManager::new(Duration::from_secs(60)),
        );
        assert!(client.read_variable("N1").await.is_err());
    }
}
