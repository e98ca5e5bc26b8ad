//! MySQL ledger integration tests using testcontainers.
//!
//! Run with: cargo test --test ledger_mysql --features mysql -- --nocapture
//!
//! These tests spin up MySQL (InnoDB) in a container using testcontainers-rs,
//! provision the ledger schema, and run the ledger contract.

mod ledger;

use std::time::Duration;

use airtime_ledger::config::{MysqlConfig, StorageConfig, StorageType};
use airtime_ledger::storage::init_storage;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};

/// Start MySQL container.
///
/// Returns (container, connection_string) where connection_string is suitable
/// for sqlx MySqlPool connection.
async fn start_mysql() -> (testcontainers::ContainerAsync<GenericImage>, String) {
    // The entrypoint runs a temporary server (port 0) during initialization;
    // only the final server reports port 3306.
    let image = GenericImage::new("mysql", "8.0")
        .with_exposed_port(3306.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "port: 3306  MySQL Community Server",
        ));

    let container = image
        .with_env_var("MYSQL_ROOT_PASSWORD", "airtime")
        .with_env_var("MYSQL_USER", "airtime")
        .with_env_var("MYSQL_PASSWORD", "airtime")
        .with_env_var("MYSQL_DATABASE", "airtime")
        .with_startup_timeout(Duration::from_secs(120))
        .start()
        .await
        .expect("Failed to start mysql container");

    tokio::time::sleep(Duration::from_secs(1)).await;

    let host_port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("Failed to get mapped port");

    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let connection_string = format!("mysql://airtime:airtime@{}:{}/airtime", host, host_port);

    println!("MySQL available at: {}", connection_string);

    (container, connection_string)
}

#[tokio::test]
async fn test_mysql_ledger() {
    println!("=== MySQL Ledger Tests ===");
    println!("Starting MySQL container...");

    let (_container, connection_string) = start_mysql().await;
    let config = StorageConfig {
        storage_type: StorageType::Mysql,
        max_connections: 10,
        mysql: MysqlConfig {
            uri: connection_string,
        },
        ..Default::default()
    };
    let storage = init_storage(&config)
        .await
        .expect("Failed to initialize MySQL storage");

    println!("Running Ledger tests...");
    run_ledger_tests!(&storage);

    println!("=== All MySQL Ledger tests PASSED ===");
}
