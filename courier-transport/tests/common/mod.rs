//! Shared helpers for courier-transport integration tests.

#![allow(dead_code)]

use std::time::Duration;

use courier_transport::{Communication, CommunicationConfig, Datagram, Inbound};
use tracing_subscriber::EnvFilter;

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Install a test-friendly subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Loopback config without read deadlines, so idle inbound connections stay quiet.
pub fn quiet_config() -> CommunicationConfig {
    CommunicationConfig::local().with_timeout(Duration::ZERO)
}

/// Bind and start a loopback endpoint.
pub async fn started(config: CommunicationConfig) -> Communication {
    let communication = Communication::bind(config).await.expect("bind");
    communication.start().expect("start");
    communication
}

/// Next datagram within [`WAIT`], errors included.
pub async fn next(inbound: &Inbound) -> Datagram {
    tokio::time::timeout(WAIT, inbound.recv())
        .await
        .expect("datagram within deadline")
        .expect("inbound channel open")
}

/// Next successful datagram within [`WAIT`], skipping error reports.
pub async fn next_data(inbound: &Inbound) -> Datagram {
    tokio::time::timeout(WAIT, async {
        loop {
            match inbound.recv().await {
                Some(datagram) if datagram.is_error() => continue,
                Some(datagram) => return datagram,
                None => panic!("inbound channel closed"),
            }
        }
    })
    .await
    .expect("datagram within deadline")
}
