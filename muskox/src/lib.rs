// vim: tw=80
//! Client library for muskoxd
//!
//! Programmatic access to the daemon: pool enumeration, configuration
//! snapshots, and activity waiting.  The CLI is a thin consumer of this.

use std::path::Path;

use muskox_core::rpc::{self, Activity, ConfigPair, PoolInfo};
pub use muskox_core::{Error, Guid, Result};
use muskox_core::{
    vdev::VdevNode,
    walk::{self, PoolSource},
};
use tokio_seqpacket::UnixSeqpacket;

/// A connection to the muskoxd server
#[derive(Debug)]
pub struct Muskox {
    peer: UnixSeqpacket,
}

impl Muskox {
    /// Connect to the server whose socket is at this path
    pub async fn new(sock: &Path) -> Result<Self> {
        let peer = UnixSeqpacket::connect(sock).await.map_err(Error::from)?;
        Ok(Self { peer })
    }

    /// List all imported pools
    pub async fn pool_list(&self) -> Result<Vec<PoolInfo>> {
        self.call(rpc::pool::list()).await?.into_pool_list()
    }

    /// Fetch a pool's configuration, along with the previously sampled one
    /// if the daemon still holds it
    pub async fn pool_get(&self, pool: String) -> Result<ConfigPair> {
        self.call(rpc::pool::get(pool)).await?.into_pool_get()
    }

    /// Resample a pool's statistics.  Returns true iff the pool has gone
    /// missing, e.g. because it was exported.
    pub async fn pool_refresh(&self, pool: String) -> Result<bool> {
        self.call(rpc::pool::refresh(pool)).await?.into_pool_refresh()
    }

    /// Block until none of the given activities are in progress on the
    /// pool.  Returns true iff the call actually waited for anything.
    pub async fn pool_wait(
        &self,
        pool: String,
        activities: Vec<Activity>,
    ) -> Result<bool> {
        self.call(rpc::pool::wait(pool, activities))
            .await?
            .into_pool_wait()
    }

    /// Submit an RPC request to the server
    async fn call(&self, req: rpc::Request) -> Result<rpc::Response> {
        // Large enough for the config of a pool with hundreds of vdevs,
        // each with full histograms.
        const BUFSIZ: usize = 1 << 20;

        let encoded: Vec<u8> = bincode::serialize(&req)
            .map_err(|e| Error::Protocol(e.to_string()))?;
        let nwrite = self.peer.send(&encoded).await.map_err(Error::from)?;
        if nwrite != encoded.len() {
            return Err(Error::Protocol("short send".to_owned()));
        }

        let mut buf = vec![0u8; BUFSIZ];
        let nread = self.peer.recv(&mut buf).await.map_err(Error::from)?;
        if nread == 0 {
            Err(Error::Protocol("Server did not send response".to_owned()))
        } else if nread >= BUFSIZ {
            Err(Error::Protocol(format!(
                "Server sent unexpectedly large response {nread} bytes"
            )))
        } else {
            buf.truncate(nread);
            bincode::deserialize::<rpc::Response>(&buf[..])
                .map_err(|e| Error::Protocol(e.to_string()))
        }
    }
}

/// A one-shot snapshot of every imported pool's tree, for resolving CLI
/// arguments without a round trip per candidate.
#[derive(Debug, Default)]
pub struct ConfigSource {
    pools: Vec<(String, VdevNode)>,
}

impl ConfigSource {
    pub async fn fetch(muskox: &Muskox) -> Result<Self> {
        let mut pools = Vec::new();
        for info in muskox.pool_list().await? {
            let pair = muskox.pool_get(info.name.clone()).await?;
            let tree = VdevNode::try_from(pair.current.root)?;
            pools.push((info.name, tree));
        }
        Ok(ConfigSource { pools })
    }

    pub fn tree(&self, pool: &str) -> Option<&VdevNode> {
        self.pools
            .iter()
            .find(|(name, _)| name == pool)
            .map(|(_, tree)| tree)
    }
}

impl PoolSource for ConfigSource {
    fn pool_names(&self) -> Result<Vec<String>> {
        Ok(self.pools.iter().map(|(name, _)| name.clone()).collect())
    }

    fn vdev_guid(&self, pool: &str, token: &str) -> Result<Option<Guid>> {
        Ok(self.tree(pool).and_then(|tree| walk::find_vdev(tree, token)))
    }
}
