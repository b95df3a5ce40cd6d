// vim: tw=80
//! The `muskox wait` subcommand

use std::{path::Path, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use muskox::Muskox;
use muskox_core::{
    activity::remaining_bytes,
    rpc::Activity,
    types::Result,
    vdev::VdevNode,
};
use tokio::{select, sync::Notify};

use crate::render::{self, TimestampFmt};

/// Wait for background activity to finish
#[derive(Parser, Clone, Debug)]
pub(super) struct Wait {
    /// Scripted mode: no headers, tab-separated columns
    #[clap(short = 'H')]
    scripted:   bool,
    /// Exact numbers instead of humanized ones
    #[clap(short = 'p')]
    parsable:   bool,
    /// Display a timestamp before each report: "u" for seconds since the
    /// epoch, "d" for a date
    #[clap(short = 'T')]
    timestamp:  Option<TimestampFmt>,
    /// Activities to wait for, comma delimited.  Default: all of them.
    #[clap(short = 't', value_delimiter(','))]
    activities: Vec<Activity>,
    /// Pool name
    #[clap(required(true))]
    pool:       String,
    /// Print the remaining work this often, in seconds
    interval:   Option<f64>,
}

impl Wait {
    pub(super) async fn main(self, sock: &Path) -> Result<()> {
        let activities = if self.activities.is_empty() {
            Activity::ALL.to_vec()
        } else {
            self.activities.clone()
        };
        let muskox = Muskox::new(sock).await?;
        let done = Arc::new(Notify::new());
        let printer = self.interval.map(|interval| {
            let task = StatusTask {
                pool:       self.pool.clone(),
                activities: activities.clone(),
                scripted:   self.scripted,
                parsable:   self.parsable,
                timestamp:  self.timestamp,
                interval,
                done:       done.clone(),
                sock:       sock.to_owned(),
            };
            tokio::spawn(task.run())
        });
        // The daemon returns early whenever the set of in-progress
        // activities changes; keep waiting until nothing remains.
        let r = loop {
            match muskox
                .pool_wait(self.pool.clone(), activities.clone())
                .await
            {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        done.notify_one();
        if let Some(handle) = printer {
            let _ = handle.await;
        }
        r
    }
}

/// Prints a remaining-work row every tick until woken by completion
struct StatusTask {
    pool:       String,
    activities: Vec<Activity>,
    scripted:   bool,
    parsable:   bool,
    timestamp:  Option<TimestampFmt>,
    interval:   f64,
    done:       Arc<Notify>,
    sock:       PathBuf,
}

impl StatusTask {
    const COLWIDTH: usize = 12;

    async fn run(self) -> Result<()> {
        let muskox = Muskox::new(&self.sock).await?;
        if !self.scripted {
            self.print_header();
        }
        loop {
            self.print_row(&muskox).await?;
            select! {
                _ = self.done.notified() => break,
                _ = tokio::time::sleep(
                    Duration::from_secs_f64(self.interval)) => {}
            }
        }
        Ok(())
    }

    fn print_header(&self) {
        let cells: Vec<String> = self
            .activities
            .iter()
            .map(|act| {
                format!("{:>w$}", act.label(), w = Self::COLWIDTH)
            })
            .collect();
        println!("{}", cells.join(" "));
    }

    async fn print_row(&self, muskox: &Muskox) -> Result<()> {
        let pair = muskox.pool_get(self.pool.clone()).await?;
        let freeing = pair.current.freeing;
        let tree = VdevNode::try_from(pair.current.root)?;
        if let Some(ts) = self.timestamp {
            ts.print();
        }
        let cells: Vec<String> = self
            .activities
            .iter()
            .map(|act| {
                let rem = remaining_bytes(&tree, freeing, *act);
                let s = if rem == 0 {
                    "-".to_owned()
                } else {
                    render::bytes_cell(rem, self.parsable)
                };
                if self.scripted {
                    s
                } else {
                    format!("{s:>w$}", w = Self::COLWIDTH)
                }
            })
            .collect();
        let sep = if self.scripted { "\t" } else { " " };
        println!("{}", cells.join(sep));
        Ok(())
    }
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_plain() {
        let wait = Wait::try_parse_from(["wait", "tank"]).unwrap();
        assert_eq!("tank", wait.pool);
        assert!(wait.activities.is_empty());
        assert_eq!(None, wait.interval);
    }

    #[test]
    fn parse_activities() {
        let wait = Wait::try_parse_from([
            "wait", "-t", "scrub,resilver,raidz_expand", "tank", "5",
        ])
        .unwrap();
        assert_eq!(
            vec![
                Activity::Scrub,
                Activity::Resilver,
                Activity::RaidzExpand
            ],
            wait.activities
        );
        assert_eq!(Some(5.0), wait.interval);
    }

    #[test]
    fn parse_bad_activity() {
        assert!(
            Wait::try_parse_from(["wait", "-t", "defrag", "tank"]).is_err()
        );
    }

    #[test]
    fn parse_flags() {
        let wait =
            Wait::try_parse_from(["wait", "-Hp", "-T", "u", "tank", "1"])
                .unwrap();
        assert!(wait.scripted);
        assert!(wait.parsable);
        assert_eq!(Some(TimestampFmt::Unix), wait.timestamp);
    }
}
