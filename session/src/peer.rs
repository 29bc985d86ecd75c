//! Address discovery for the messaging front ends.

use std::net::SocketAddr;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Supplies the front-end address to dial. Called on every reconnect, so an
/// implementation may rotate through peers or re-resolve.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerFetcher: Send + Sync + 'static {
    async fn fetch_peer(&self) -> anyhow::Result<SocketAddr>;
}

/// Always returns the same address.
#[derive(Debug, Clone)]
pub struct StaticPeer {
    addr: SocketAddr,
}

impl StaticPeer {
    pub fn new(addr: SocketAddr) -> StaticPeer {
        StaticPeer { addr }
    }
}

#[async_trait]
impl PeerFetcher for StaticPeer {
    async fn fetch_peer(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.addr)
    }
}
