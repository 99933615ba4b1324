//! Tool to check whether this host can run tcp-demux transparently

use std::io;
use std::net::SocketAddr;
use std::process::exit;

use tcp_demux::proxy::transparent::{is_supported, probe};
use tcp_demux::{APP_NAME, VERSION};

fn check_family(label: &str, addr: SocketAddr) -> bool {
    match probe(addr) {
        Ok(()) => {
            println!("  [OK     ] {} transparent socket option can be set", label);
            true
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            println!("  [ERROR  ] {} transparent socket option denied: {}", label, e);
            println!("            Run as root or grant CAP_NET_ADMIN");
            false
        }
        Err(e) => {
            println!("  [WARNING] {} transparent socket option unavailable: {}", label, e);
            false
        }
    }
}

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    println!("=== {} v{} Environment Check ===\n", APP_NAME, VERSION);

    if !is_supported() {
        println!("Transparent proxying available: No");
        println!("\nThis platform has no transparent socket option.");
        println!("tcp-demux will dial backends from its own address.");
        exit(1);
    }

    println!("Transparent proxying available: Yes\n");
    println!("Privilege checks:");

    let v4 = check_family("IPv4", SocketAddr::from(([127, 0, 0, 1], 0)));
    let v6 = check_family("IPv6", SocketAddr::from(([0u16, 0, 0, 0, 0, 0, 0, 1], 0)));

    println!("\n=== Summary ===");
    if v4 {
        println!("Transparent dialing is ready.");
        if !v6 {
            println!("IPv6 clients will fail to dial transparently.");
        }
        println!("\nBackends must route replies for client addresses back through this host.");
    } else {
        println!("Transparent dialing is NOT ready; start with --transparent false");
        exit(1);
    }
}
