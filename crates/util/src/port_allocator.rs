//! Loopback port allocation for multi-node tests.

use std::net::{SocketAddr, TcpListener};
use std::sync::{LazyLock, Mutex};

// Start well above the ephemeral services tests tend to collide with.
static CURSOR: LazyLock<Mutex<u16>> = LazyLock::new(|| Mutex::new(17000));

/// Allocate a loopback port that is free right now.
///
/// # Panics
///
/// Panics when no free port is found in a long scan; that only happens on
/// a machine with an exhausted ephemeral range.
pub fn allocate_port() -> u16 {
    let mut cursor = CURSOR.lock().expect("port cursor poisoned");
    for _ in 0..10000 {
        let port = *cursor;
        *cursor = cursor.checked_add(1).unwrap_or(17000);
        if is_port_available(port) {
            return port;
        }
    }
    panic!("no free loopback port found");
}

/// Whether the port can currently be bound on loopback.
#[must_use]
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).is_ok()
}

/// Allocate a full loopback socket address.
#[must_use]
pub fn allocate_socket_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], allocate_port()))
}
