// vim: tw=80
//! Support for the `-c` option of iostat and status: run a script once per
//! leaf vdev and splice its output into the tables as extra columns.
//!
//! A script reports columns on its first output line as whitespace-separated
//! `name=value` tokens.  Column order is first-seen order across all vdevs;
//! a vdev that doesn't mention a column gets "-".

use std::collections::HashMap;

use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Default)]
pub(super) struct CmdColumns {
    columns: Vec<String>,
    by_path: HashMap<String, HashMap<String, String>>,
}

impl CmdColumns {
    /// Run `cmd` for every path, with the vdev's path in `$VDEV_PATH`.
    /// Scripts that fail or emit nothing contribute nothing.
    pub(super) async fn run(cmd: &str, paths: &[String]) -> Self {
        let mut out = CmdColumns::default();
        for path in paths {
            let output = Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .env("VDEV_PATH", path)
                .output()
                .await;
            match output {
                Ok(output) if output.status.success() => {
                    let text = String::from_utf8_lossy(&output.stdout);
                    if let Some(first) = text.lines().next() {
                        out.parse_line(path, first);
                    }
                }
                Ok(output) => {
                    debug!(path, status = ?output.status,
                        "vdev script failed");
                }
                Err(e) => {
                    debug!(path, error = %e, "could not run vdev script");
                }
            }
        }
        out
    }

    fn parse_line(&mut self, path: &str, line: &str) {
        let mut cells = HashMap::new();
        for token in line.split_whitespace() {
            if let Some((k, v)) = token.split_once('=') {
                if k.is_empty() {
                    continue;
                }
                if !self.columns.iter().any(|c| c == k) {
                    self.columns.push(k.to_owned());
                }
                cells.insert(k.to_owned(), v.to_owned());
            }
        }
        self.by_path.insert(path.to_owned(), cells);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(super) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(super) fn get(&self, path: &str, column: &str) -> &str {
        self.by_path
            .get(path)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("-")
    }

    /// Width needed for one column, counting its header
    pub(super) fn width(&self, column: &str) -> usize {
        self.by_path
            .values()
            .filter_map(|cells| cells.get(column))
            .map(String::len)
            .chain(std::iter::once(column.len()))
            .max()
            .unwrap_or(0)
    }
}
