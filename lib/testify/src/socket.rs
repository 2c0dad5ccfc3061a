use std::net::{Ipv4Addr, SocketAddr, TcpListener};

/// Asks the OS for a free port on the loopback interface. Nothing listens on
/// the returned address until the caller binds it, so connecting to it is
/// refused.
pub fn next_addr() -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind loopback");

    listener.local_addr().expect("local addr of bound listener")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback() {
        let addr = next_addr();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
