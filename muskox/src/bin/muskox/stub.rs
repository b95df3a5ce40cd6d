// vim: tw=80
//! An in-process muskoxd lookalike, for exercising command loops against
//! canned pool configurations.
//!
//! Pools named in `vanishing` disappear after `after_gets` successful
//! `pool_get` calls: later refreshes report them missing and later gets
//! fail, the way an exported pool behaves between two reporting intervals.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::atomic::{AtomicU32, Ordering},
};

use muskox_core::{
    rpc::{ConfigPair, PoolConfig, PoolInfo, Request, Response, VdevConfig},
    types::{Error, Guid},
    vdev::VdevStats,
};
use tokio_seqpacket::{UnixSeqpacket, UnixSeqpacketListener};

static SEQ: AtomicU32 = AtomicU32::new(0);

pub(crate) struct StubDaemon {
    pub(crate) sock: PathBuf,
}

impl StubDaemon {
    pub(crate) fn start(
        pools: Vec<PoolConfig>,
        vanishing: &[&str],
        after_gets: usize,
    ) -> std::io::Result<Self> {
        let sock = std::env::temp_dir().join(format!(
            "muskoxd-stub.{}.{}.sock",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_file(&sock);
        let mut listener = UnixSeqpacketListener::bind(&sock)?;
        let vanishing: HashSet<String> =
            vanishing.iter().map(|s| s.to_string()).collect();
        tokio::spawn(async move {
            while let Ok(peer) = listener.accept().await {
                serve(peer, &pools, &vanishing, after_gets).await;
            }
        });
        Ok(StubDaemon { sock })
    }
}

async fn serve(
    peer: UnixSeqpacket,
    pools: &[PoolConfig],
    vanishing: &HashSet<String>,
    after_gets: usize,
) {
    // Successful gets per pool, to decide when a vanishing pool is gone
    let mut gets: HashMap<String, usize> = HashMap::new();
    let vanished = |gets: &HashMap<String, usize>, name: &str| {
        vanishing.contains(name) &&
            gets.get(name).copied().unwrap_or(0) >= after_gets
    };
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let nread = match peer.recv(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let req: Request = match bincode::deserialize(&buf[..nread]) {
            Ok(r) => r,
            Err(_) => break,
        };
        let resp = match req {
            Request::PoolList => Response::PoolList(Ok(pools
                .iter()
                .filter(|p| !vanished(&gets, &p.name))
                .map(|p| PoolInfo {
                    name: p.name.clone(),
                    guid: p.guid,
                })
                .collect())),
            Request::PoolGet(get) => {
                let r = if vanished(&gets, &get.name) {
                    Err(Error::NoSuchPool(get.name))
                } else {
                    match pools.iter().find(|p| p.name == get.name) {
                        Some(p) => {
                            *gets.entry(p.name.clone()).or_insert(0) += 1;
                            Ok(ConfigPair {
                                current: p.clone(),
                                previous: None,
                            })
                        }
                        None => Err(Error::NoSuchPool(get.name)),
                    }
                };
                Response::PoolGet(r)
            }
            Request::PoolRefresh(r) => {
                Response::PoolRefresh(Ok(vanished(&gets, &r.name)))
            }
            Request::PoolWait(_) => Response::PoolWait(Ok(false)),
        };
        let encoded = match bincode::serialize(&resp) {
            Ok(e) => e,
            Err(_) => break,
        };
        if peer.send(&encoded).await.is_err() {
            break;
        }
    }
}

/// A minimal healthy pool: a root holding one disk
pub(crate) fn pool_config(name: &str, guid: u64) -> PoolConfig {
    PoolConfig {
        name: name.to_owned(),
        guid: Guid(guid),
        root: VdevConfig {
            vtype: "root".to_owned(),
            guid: Guid(guid * 100),
            stats: Some(VdevStats::default()),
            children: vec![VdevConfig {
                vtype: "disk".to_owned(),
                guid: Guid(guid * 100 + 1),
                path: Some("/dev/da0".to_owned()),
                stats: Some(VdevStats::default()),
                ..Default::default()
            }],
            ..Default::default()
        },
        ..Default::default()
    }
}
