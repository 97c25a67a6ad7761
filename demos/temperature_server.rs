//! Example: Temperature server with a local client
//!
//! Starts a server on 127.0.0.1:4840 with one temperature node, a simulated
//! sensor writing new readings, and a client that reads, writes and receives
//! change notifications.
//!
//! Configuration comes from `UA_PROTOCOL_*` environment variables, or from a
//! TOML file passed as the first argument.
//!
//! Run with: `cargo run --example temperature_server [config.toml]`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use ua_protocol::address_space::{
    AddressSpace, MethodAttributes, NodeAttributes, VariableAttributes, Variant,
};
use ua_protocol::config::NetworkConfig;
use ua_protocol::service::ServiceClient;
use ua_protocol::transport::Server;
use ua_protocol::utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::from_env()?,
    };
    if config.server.address == ua_protocol::config::DEFAULT_ADDRESS {
        config.server.address = "127.0.0.1:4840".to_string();
    }
    init_logging(&config.logging)?;

    let space = AddressSpace::shared();
    space.add_node(
        "Boiler",
        NodeAttributes::default().with_display_name("Boiler #1"),
    )?;
    space.add_variable("Boiler", "temp", Variant::Double(20.0), VariableAttributes::default())?;
    space.add_variable("Boiler", "value", Variant::from("idle"), VariableAttributes::default())?;
    space.add_node(
        "Burner",
        NodeAttributes::default().with_display_name("Gas burner"),
    )?;
    space.add_reference("Boiler", "HasComponent", "Burner")?;

    let reset_space = space.clone();
    space.add_method(
        "Boiler",
        "reset",
        move |_args| {
            reset_space.write_variable("Boiler", "temp", Variant::Double(20.0))?;
            Ok(Variant::Boolean(true))
        },
        MethodAttributes::default(),
    )?;

    let server = Server::bind(config.clone(), space.clone()).await?;
    config.client.address = server.local_addr()?.to_string();
    info!(key = %server.channel().export_key(), "Channel key for remote clients");

    let client = ServiceClient::new(
        config.client.clone(),
        Arc::new(server.channel().peer()),
        server.sessions().clone(),
    );
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server_task = tokio::spawn(server.run_with_shutdown(shutdown_rx));

    let session = client.create_session("demo-client").await;
    let valid = client.validate_session("demo-client", &session).await;
    info!(valid, "Session created");

    client.subscribe_variable("Boiler/temp", |value| {
        info!(%value, "Boiler temperature changed");
    })?;
    client.subscribe_event("overheat", |data| {
        info!(%data, "Overheat event");
    })?;
    let forwarder = client.forward_changes(space.subscribe_changes());

    // Simulated sensor
    let sensor_space = space.clone();
    let sensor = tokio::spawn(async move {
        let mut reading = 20.0;
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        for _ in 0..8 {
            ticker.tick().await;
            reading += 1.5;
            if sensor_space
                .write_variable("Boiler", "temp", Variant::Double(reading))
                .is_err()
            {
                break;
            }
        }
    });
    sensor.await?;

    let temp = client.read_variable("Boiler/temp").await?;
    info!(value = %temp, "Read over the channel");
    let accepted = client.write_variable("Boiler", "heating").await?;
    info!(accepted, "Wrote status");
    let status = client.read_variable("Boiler").await?;
    info!(value = %status, "Read default variable");

    for entry in client.browse("Boiler").await? {
        info!(
            reference = %entry.reference_type,
            target = %entry.target_node_id,
            name = %entry.display_name,
            "Browsed"
        );
    }
    let details = client.node_details("Boiler").await?;
    info!(
        variables = details.variables.len(),
        methods = details.methods.len(),
        "Node details"
    );

    if let Err(e) = client.read_variable("Boiler/pressure").await {
        info!(error = %e, "Expected failure for a missing variable");
    }

    space.call_method("Boiler", "reset", &[])?;
    client.notify_event("overheat", &Variant::from("sensor 3 above limit"))?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    forwarder.abort();
    shutdown_tx.send(()).await?;
    server_task.await??;

    client.metrics().log_metrics();
    Ok(())
}
