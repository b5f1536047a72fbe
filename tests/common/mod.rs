#![allow(dead_code)]

use gp_exporter::collectors::config::ScraperConfig;
use secrecy::SecretString;
use tokio::task::JoinHandle;

/// Nothing listens on port 1; every cycle fails at the connection check.
pub const UNREACHABLE_DSN: &str = "postgresql://gpadmin@127.0.0.1:1/postgres";

/// Find an available port for testing
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;

    // Bind to port 0 lets the OS assign an available ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    listener
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Wait for server to be ready on the given port
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    use tokio::time::{Duration, sleep};

    for _ in 0..max_attempts {
        if tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok()
        {
            return true;
        }

        sleep(Duration::from_millis(100)).await;
    }

    eprintln!("Failed to connect to server on port {port} after {max_attempts} attempts");
    false
}

/// Get base URL for test server
pub fn get_test_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Start the exporter against an unreachable cluster and wait until it
/// accepts connections.
pub async fn spawn_exporter(default_metrics: bool) -> (u16, JoinHandle<anyhow::Result<()>>) {
    let port = get_available_port();

    let handle = tokio::spawn(gp_exporter::exporter::new(
        format!("127.0.0.1:{port}"),
        "/metrics".to_string(),
        default_metrics,
        SecretString::from(UNREACHABLE_DSN),
        ScraperConfig::defaults(),
    ));

    assert!(wait_for_server(port, 50).await, "Server failed to start");

    (port, handle)
}
