//! Ping from one Linux VM to another over SSH and check the packet loss.
//!
//! # Prerequisites
//!
//! - Two Linux VMs reachable over SSH with the `user`/`user` account
//!
//! # Usage
//!
//! ```bash
//! cargo run --example ping_between_hosts -- 192.168.56.2 192.168.56.3
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use routerkit::diagnostics::packet_loss;
use routerkit::{DeviceRegistry, Session, SshSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let first_ip = args.next().unwrap_or_else(|| "192.168.56.2".to_string());
    let second_ip = args.next().unwrap_or_else(|| "192.168.56.3".to_string());

    let registry = DeviceRegistry::builtin();
    let vm1 = Arc::new(registry.create_device("linux", None, None)?);
    let vm2 = Arc::new(registry.create_device("linux", None, None)?);

    let mut first = SshSession::new(Duration::from_secs(10));
    first.connect(vm1, &first_ip).await?;
    println!("Connected to VM1: {}", first.is_connected());

    let mut second = SshSession::new(Duration::from_secs(10));
    second.connect(vm2, &second_ip).await?;
    println!("Connected to VM2: {}", second.is_connected());

    println!("Pinging from VM1 to VM2...");
    let transcript = first.ping(&second_ip, 3, Duration::from_secs(10)).await?;

    match packet_loss(&transcript) {
        Some(loss) if loss == 0.0 => println!("Ping has been successful."),
        Some(loss) => eprintln!("Packet loss should be 0, but it is {}%", loss),
        None => eprintln!("Could not read packet loss from:\n{}", transcript),
    }

    first.disconnect().await?;
    second.disconnect().await?;
    println!(
        "Disconnected: {}",
        !first.is_connected() && !second.is_connected()
    );

    Ok(())
}
