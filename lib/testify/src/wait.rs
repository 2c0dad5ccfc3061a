use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

/// Block until something accepts connections on `addr`, panics after 10s.
pub async fn wait_for_tcp(addr: SocketAddr) {
    let ready = async {
        while TcpStream::connect(addr).await.is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    if tokio::time::timeout(Duration::from_secs(10), ready)
        .await
        .is_err()
    {
        panic!("{addr} is not reachable after 10s");
    }
}
