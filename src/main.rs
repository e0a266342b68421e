use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tokio::fs;
use tracing_subscriber::EnvFilter;

use leasewire::v4::options::parse_mac_address;
use leasewire::{Args, ClientConfig, DhcpClient, LeasewireError, RetryPolicy};

/// Resolves the hardware address: `--mac` wins, otherwise it is read from
/// sysfs for the given interface.
async fn resolve_mac(args: &Args) -> Result<Bytes, LeasewireError> {
    if let Some(mac) = &args.mac {
        return Ok(Bytes::from(parse_mac_address(mac)?));
    }

    let Some(interface) = &args.interface else {
        return Err(LeasewireError::MacParse(
            "either --mac or --interface is required".to_string(),
        ));
    };

    let path = format!("/sys/class/net/{interface}/address");
    let mac = fs::read_to_string(&path)
        .await
        .map_err(|_| LeasewireError::InterfaceInvalid(interface.clone()))?;
    Ok(Bytes::from(parse_mac_address(mac.trim())?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mac = resolve_mac(&args).await?;

    let mut config = ClientConfig::new(mac)
        .with_ports(args.client_port, args.server_port)
        .with_retry_policy(RetryPolicy {
            base_timeout: Duration::from_millis(args.base_timeout_ms),
            max_retries: args.max_retries,
            ..RetryPolicy::default()
        });
    if let Some(server) = args.server {
        config = config.with_server(server);
    }
    config.interface = args.interface.clone();

    let mut client = DhcpClient::new(config).await?;
    let lease = client.get_lease().await?;
    println!("{lease}");

    Ok(())
}
