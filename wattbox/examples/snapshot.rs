//! Snapshot example: connect to a WattBox and print its state
//!
//! Optionally switches one outlet before taking the snapshot.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example snapshot -- --host 192.168.1.50
//! cargo run --example snapshot -- --host 192.168.1.50 --protocol http --json
//! cargo run --example snapshot -- --host 192.168.1.50 --outlet 3 --action reset
//! ```

use std::env;
use std::time::Duration;

use wattbox::{Driver, DriverBuilder, OutletAction, Protocol, WattBoxDevice};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut builder = DriverBuilder::new(&args.host)
        .username(&args.user)
        .password(&args.password)
        .protocol(args.protocol)
        .timeout(Duration::from_secs(args.timeout));
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    let mut wattbox = builder.build()?;

    println!("Connecting to {} over {}...", args.host, args.protocol);
    wattbox.open().await?;

    if let (Some(outlet), Some(action)) = (args.outlet, &args.action) {
        let action: OutletAction = action.parse()?;
        let accepted = wattbox.set_outlet(outlet, action).await?;
        println!("Outlet {outlet} {action}: {}", if accepted { "OK" } else { "refused" });
    }

    let device = wattbox.get_device_info(true, args.power).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&device)?);
    } else {
        print_device(&device);
    }

    wattbox.close().await?;
    Ok(())
}

fn print_device(device: &WattBoxDevice) {
    let info = &device.system_info;
    println!("{}", "-".repeat(50));
    println!("Hostname:    {}", info.hostname);
    println!("Model:       {}", info.model);
    println!("Firmware:    {}", info.firmware);
    println!("Service tag: {}", info.service_tag);
    println!("Auto reboot: {}", device.auto_reboot_enabled);

    if let Some(power) = &device.power_status {
        println!(
            "Power:       {:.1} V  {:.2} A  {:.1} W  (safe voltage: {})",
            power.voltage_volts, power.current_amps, power.power_watts, power.safe_voltage_status
        );
    }
    match &device.ups_status {
        Some(ups) => println!(
            "UPS:         {}% charge, {}% load, {} min, battery {}",
            ups.battery_charge, ups.battery_load, ups.battery_runtime, ups.battery_health
        ),
        None if device.ups_connected => println!("UPS:         connected, status unavailable"),
        None => println!("UPS:         not connected"),
    }

    println!("{}", "-".repeat(50));
    for outlet in &device.outlets {
        let state = if outlet.status { "ON " } else { "OFF" };
        match outlet.power_watts {
            Some(watts) => println!("{:>2}  {}  {:<24} {:.1} W", outlet.index, state, outlet.name, watts),
            None => println!("{:>2}  {}  {}", outlet.index, state, outlet.name),
        }
    }
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: Option<u16>,
    user: String,
    password: String,
    protocol: Protocol,
    timeout: u64,
    outlet: Option<usize>,
    action: Option<String>,
    power: bool,
    json: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: "192.168.1.50".to_string(),
            port: None,
            user: "wattbox".to_string(),
            password: "wattbox".to_string(),
            protocol: Protocol::Telnet,
            timeout: 10,
            outlet: None,
            action: None,
            power: false,
            json: false,
        };

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => parsed.host = value.unwrap_or(parsed.host),
                "--port" | "-p" => parsed.port = value.and_then(|v| v.parse().ok()),
                "--user" | "-u" => parsed.user = value.unwrap_or(parsed.user),
                "--password" | "-P" => parsed.password = value.unwrap_or(parsed.password),
                "--protocol" => {
                    parsed.protocol = value
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(parsed.protocol)
                }
                "--timeout" | "-t" => {
                    parsed.timeout = value.and_then(|v| v.parse().ok()).unwrap_or(10)
                }
                "--outlet" | "-o" => parsed.outlet = value.and_then(|v| v.parse().ok()),
                "--action" | "-a" => parsed.action = value,
                "--power" => {
                    parsed.power = true;
                    i += 1;
                    continue;
                }
                "--json" => {
                    parsed.json = true;
                    i += 1;
                    continue;
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
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

    fn print_help() {
        println!(
            r#"wattbox snapshot example

USAGE:
    cargo run --example snapshot -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>        WattBox address [default: 192.168.1.50]
    -p, --port <PORT>        Port [default: 23 telnet, 80 http]
    -u, --user <USER>        Username [default: wattbox]
    -P, --password <PASS>    Password [default: wattbox]
    --protocol <PROTO>       telnet or http [default: telnet]
    -t, --timeout <SECS>     Connect and command timeout [default: 10]
    -o, --outlet <N>         Outlet to switch before the snapshot (0 = all)
    -a, --action <ACTION>    on, off, toggle or reset
    --power                  Include per-outlet power readings
    --json                   Print the snapshot as JSON
    --help                   Print this help message
"#
        );
    }
}
