//! Connect to a Linux VM over Telnet, check the status and disconnect.
//!
//! # Prerequisites
//!
//! - A Linux VM with a Telnet server listening on port 23
//! - The `user`/`user` account of the built-in `linux` profile
//!
//! # Usage
//!
//! ```bash
//! cargo run --example connect -- --host 192.168.56.2
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use routerkit::{DeviceRegistry, Session, TelnetSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Registering device...");
    let vm = Arc::new(DeviceRegistry::builtin().create_device(
        "linux",
        args.user.as_deref(),
        args.password.as_deref(),
    )?);
    println!("Device of kind {} registered.", vm.kind);

    let mut session = TelnetSession::new(Duration::from_secs(args.timeout));
    session.connect(vm, &args.host).await?;
    println!("Connected to VM: {}", session.is_connected());

    let response = session.write_command("uname -a").await?;
    println!("{}", response.trim());

    println!("Disconnecting from device...");
    session.disconnect().await?;
    println!("Connected to VM: {}", session.is_connected());

    Ok(())
}

struct Args {
    host: String,
    user: Option<String>,
    password: Option<String>,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: "192.168.56.2".to_string(),
            user: None,
            password: None,
            timeout: 10,
        };

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => parsed.host = value.unwrap_or(parsed.host),
                "--user" | "-u" => parsed.user = value,
                "--password" | "-P" => parsed.password = value,
                "--timeout" | "-t" => {
                    parsed.timeout = value.and_then(|v| v.parse().ok()).unwrap_or(10)
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }
        parsed
    }
}
