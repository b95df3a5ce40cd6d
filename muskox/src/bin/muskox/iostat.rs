// vim: tw=80
//! The `muskox iostat` subcommand

use std::{
    collections::HashMap,
    io::IsTerminal,
    path::Path,
    time::Duration,
};

use clap::Parser;
use muskox::{ConfigSource, Muskox};
use muskox_core::{
    delta::{single_histo_average, sub_histo, DeltaMap},
    name::{name_of, NameStyle},
    types::{Error, Result},
    vdev::{AllocClass, IoDirection, QueueStats, VdevNode},
    walk::{self, TokenKind},
};

use crate::{
    render::{self, TimestampFmt},
    vdev_cmd::CmdColumns,
};

/// Width of one statistics column
const COLWIDTH: usize = 7;

/// Columns reserved for statistics when clamping the name column to the
/// terminal width
const STAT_RESERVE: usize = 42;

/// Display I/O statistics for pools and vdevs
#[derive(Parser, Clone, Debug)]
pub(super) struct Iostat {
    /// Run a command per leaf vdev and add its output as columns
    #[clap(short = 'c')]
    command:       Option<String>,
    /// Print vdev guids instead of names
    #[clap(short = 'g')]
    guid:          bool,
    /// Scripted mode: no headers, tab-separated columns
    #[clap(short = 'H')]
    scripted:      bool,
    /// Resolve symlinks when printing device paths
    #[clap(short = 'L')]
    follow_links:  bool,
    /// Average latency columns
    #[clap(short = 'l')]
    latency:       bool,
    /// Exact numbers instead of humanized ones
    #[clap(short = 'p')]
    parsable:      bool,
    /// Full device paths instead of basenames
    #[clap(short = 'P')]
    full_paths:    bool,
    /// Queue depth columns
    #[clap(short = 'q')]
    queues:        bool,
    /// Request-size histograms instead of the standard table
    #[clap(short = 'r')]
    size_histo:    bool,
    /// Latency histograms instead of the standard table
    #[clap(short = 'w')]
    latency_histo: bool,
    /// Per-vdev rows
    #[clap(short = 'v')]
    verbose:       bool,
    /// Omit the first report, whose statistics cover all time since boot
    #[clap(short = 'y')]
    skip_first:    bool,
    /// Display a timestamp before each report: "u" for seconds since the
    /// epoch, "d" for a date
    #[clap(short = 'T')]
    timestamp:     Option<TimestampFmt>,
    /// Pool and vdev names, optionally followed by an interval and count
    args:          Vec<String>,
}

/// Resolved positional arguments
struct Targets {
    /// Pools to report on; empty means all
    pools: Vec<String>,
    /// Restrict vdev rows to these names; empty means no restriction
    vdevs: Vec<String>,
}

impl Iostat {
    pub(super) async fn main(self, sock: &Path) -> Result<()> {
        let muskox = Muskox::new(sock).await?;
        let src = ConfigSource::fetch(&muskox).await?;
        let (tokens, interval, count) = super::split_interval_count(
            self.args.clone(),
            |t| {
                self.guid &&
                    matches!(
                        walk::classify_token(&src, None, t),
                        Ok(TokenKind::VdevInPool) |
                            Ok(TokenKind::VdevInOtherPool(_))
                    )
            },
        )?;
        let targets = resolve_targets(&src, tokens)?;
        self.run(&muskox, targets, interval, count).await
    }

    async fn run(
        &self,
        muskox: &Muskox,
        targets: Targets,
        interval: Option<f64>,
        count: Option<u64>,
    ) -> Result<()> {
        let explicit = !targets.pools.is_empty();
        let mut pools = targets.pools.clone();
        // Previous sample per pool, for delta computation
        let mut prev: HashMap<String, VdevNode> = HashMap::new();
        let mut iteration = 0u64;
        loop {
            iteration += 1;
            let names = if explicit {
                pools.clone()
            } else {
                muskox
                    .pool_list()
                    .await?
                    .into_iter()
                    .map(|info| info.name)
                    .collect()
            };
            let mut reports = Vec::new();
            for name in names {
                // Resample the pool before reading it back.  A pool that
                // was exported or destroyed drops out of the working set;
                // the remaining pools still report.
                if iteration > 1 &&
                    muskox.pool_refresh(name.clone()).await?
                {
                    eprintln!("pool '{name}' is no longer available");
                    pools.retain(|p| p != &name);
                    continue;
                }
                match muskox.pool_get(name.clone()).await {
                    Ok(pair) => {
                        let tree = VdevNode::try_from(pair.current.root)?;
                        let old = match prev.remove(&name) {
                            Some(t) => Some(t),
                            None => pair
                                .previous
                                .map(|p| VdevNode::try_from(p.root))
                                .transpose()?,
                        };
                        reports.push((name, tree, old));
                    }
                    Err(Error::NoSuchPool(_)) | Err(Error::PoolMissing)
                        if iteration > 1 =>
                    {
                        eprintln!("pool '{name}' is no longer available");
                        pools.retain(|p| p != &name);
                    }
                    Err(e) => return Err(e),
                }
            }
            if explicit && pools.is_empty() {
                return Ok(());
            }

            let quiet = self.skip_first && iteration == 1;
            if !quiet {
                self.report(&reports, &targets.vdevs).await;
            }
            for (name, tree, _) in reports {
                prev.insert(name, tree);
            }

            if count.map(|c| iteration >= c).unwrap_or(false) {
                break;
            }
            match interval {
                Some(i) => {
                    tokio::time::sleep(Duration::from_secs_f64(i)).await
                }
                None => break,
            }
        }
        Ok(())
    }

    fn style(&self) -> NameStyle {
        NameStyle {
            guid:         self.guid,
            full_path:    self.full_paths,
            follow_links: self.follow_links,
            type_id:      true,
        }
    }

    async fn report(
        &self,
        reports: &[(String, VdevNode, Option<VdevNode>)],
        vdevs: &[String],
    ) {
        let style = self.style();
        let mut namewidth = 10;
        for (name, tree, _) in reports {
            namewidth = namewidth.max(name.len());
            if self.verbose {
                namewidth = walk::max_width(tree, 0, namewidth, style);
            }
        }
        namewidth = namewidth.min(name_column_limit());

        let cmdcols = match &self.command {
            Some(cmd) => {
                let paths: Vec<String> = reports
                    .iter()
                    .flat_map(|(_, tree, _)| tree.iter())
                    .filter(|n| n.is_leaf())
                    .filter_map(|n| n.path.clone())
                    .collect();
                CmdColumns::run(cmd, &paths).await
            }
            None => CmdColumns::default(),
        };

        if let Some(ts) = self.timestamp {
            ts.print();
        }
        if self.latency_histo || self.size_histo {
            for (name, tree, old) in reports {
                let map = DeltaMap::build(old.as_ref());
                self.print_histos(name, tree, &map);
            }
            return;
        }
        if !self.scripted {
            self.print_headers(namewidth, &cmdcols);
        }
        for (name, tree, old) in reports {
            let map = DeltaMap::build(old.as_ref());
            self.print_pool(name, tree, &map, namewidth, vdevs, &cmdcols);
        }
    }

    fn groups(&self) -> Vec<(&'static str, usize)> {
        let mut groups = vec![
            ("capacity", 2),
            ("operations", 2),
            ("bandwidth", 2),
        ];
        if self.latency {
            groups.push(("total_wait", 2));
            groups.push(("disk_wait", 2));
        }
        if self.queues {
            for q in [
                "syncq_read",
                "syncq_write",
                "asyncq_read",
                "asyncq_write",
                "scrubq",
                "trimq",
                "rebuildq",
            ] {
                groups.push((q, 2));
            }
        }
        groups
    }

    fn column_names(&self) -> Vec<&'static str> {
        let mut cols = vec!["alloc", "free", "read", "write", "read",
                            "write"];
        if self.latency {
            cols.extend(["read", "write", "read", "write"]);
        }
        if self.queues {
            for _ in 0..7 {
                cols.extend(["pend", "activ"]);
            }
        }
        cols
    }

    fn print_headers(&self, namewidth: usize, cmdcols: &CmdColumns) {
        let mut line1 = format!("{:namewidth$}", "");
        for (label, span) in self.groups() {
            let span_width = span * (COLWIDTH + 1) - 1;
            line1.push(' ');
            line1.push_str(&center(label, span_width));
        }
        println!("{}", line1.trim_end());

        let mut line2 = format!("{:<namewidth$}", "pool");
        for col in self.column_names() {
            line2.push_str(&format!(" {col:>COLWIDTH$}"));
        }
        for col in cmdcols.columns() {
            line2.push_str(&format!(
                " {col:>w$}",
                w = cmdcols.width(col)
            ));
        }
        println!("{}", line2.trim_end());

        let mut line3 = "-".repeat(namewidth);
        for _ in self.column_names() {
            line3.push(' ');
            line3.push_str(&"-".repeat(COLWIDTH));
        }
        for col in cmdcols.columns() {
            line3.push(' ');
            line3.push_str(&"-".repeat(cmdcols.width(col)));
        }
        println!("{line3}");
    }

    fn print_pool(
        &self,
        name: &str,
        tree: &VdevNode,
        map: &DeltaMap,
        namewidth: usize,
        vdevs: &[String],
        cmdcols: &CmdColumns,
    ) {
        if vdevs.is_empty() {
            self.print_row(name, tree, map, namewidth, cmdcols);
        }
        if !self.verbose {
            return;
        }
        let style = self.style();
        for tl in walk::class_members(tree, AllocClass::Normal) {
            self.print_subtree(tl, 2, map, namewidth, vdevs, cmdcols,
                               style);
        }
        for class in
            [AllocClass::Special, AllocClass::Dedup, AllocClass::Log]
        {
            let members = walk::class_members(tree, class);
            if members.is_empty() {
                continue;
            }
            if vdevs.is_empty() {
                self.print_dashed(class.section(), namewidth);
            }
            for tl in members {
                self.print_subtree(tl, 2, map, namewidth, vdevs, cmdcols,
                                   style);
            }
        }
        if !tree.cache.is_empty() {
            if vdevs.is_empty() {
                self.print_dashed("cache", namewidth);
            }
            for dev in &tree.cache {
                self.print_subtree(dev, 2, map, namewidth, vdevs, cmdcols,
                                   style);
            }
        }
    }

    fn print_subtree(
        &self,
        node: &VdevNode,
        depth: usize,
        map: &DeltaMap,
        namewidth: usize,
        vdevs: &[String],
        cmdcols: &CmdColumns,
        style: NameStyle,
    ) {
        if node.is_hole() || node.is_indirect() {
            return;
        }
        // A name filter selects individual rows, never whole subtrees.
        // Selected rows print unindented, since nothing above them prints.
        if vdevs.is_empty() {
            let name = format!("{:indent$}{}", "", name_of(node, style),
                               indent = depth);
            self.print_row(&name, node, map, namewidth, cmdcols);
        } else if vdevs.iter().any(|v| walk::token_matches(node, v)) {
            let name = name_of(node, style);
            self.print_row(&name, node, map, namewidth, cmdcols);
        }
        for child in &node.children {
            self.print_subtree(child, depth + 2, map, namewidth, vdevs,
                               cmdcols, style);
        }
    }

    /// A section header row: just the name, with every stat column dashed
    fn print_dashed(&self, section: &str, namewidth: usize) {
        let mut cells = vec![if self.scripted {
            section.to_owned()
        } else {
            format!("{section:<namewidth$}")
        }];
        for _ in self.column_names() {
            cells.push(self.pad("-"));
        }
        self.emit(cells);
    }

    fn print_row(
        &self,
        name: &str,
        node: &VdevNode,
        map: &DeltaMap,
        namewidth: usize,
        cmdcols: &CmdColumns,
    ) {
        let r = IoDirection::Read as usize;
        let w = IoDirection::Write as usize;
        let mut cells = vec![if self.scripted {
            name.to_owned()
        } else {
            format!("{name:<namewidth$}")
        }];
        let dash = "-".to_owned();
        match &node.stats {
            None => {
                for _ in self.column_names() {
                    cells.push(self.pad(&dash));
                }
            }
            Some(vs) => {
                let delta = map.delta(node);
                let old = map.old_stats(node.guid);
                // capacity
                if vs.space > 0 {
                    cells.push(self.cell(render::bytes_cell(
                        vs.alloc,
                        self.parsable,
                    )));
                    cells.push(self.cell(render::bytes_cell(
                        vs.space.saturating_sub(vs.alloc),
                        self.parsable,
                    )));
                } else {
                    cells.push(self.pad(&dash));
                    cells.push(self.pad(&dash));
                }
                // operations and bandwidth
                match delta {
                    Some(d) => {
                        cells.push(self.cell(render::count_cell(
                            d.rate(d.ops[r]),
                            self.parsable,
                        )));
                        cells.push(self.cell(render::count_cell(
                            d.rate(d.ops[w]),
                            self.parsable,
                        )));
                        cells.push(self.cell(render::bytes_cell(
                            d.rate(d.bytes[r]),
                            self.parsable,
                        )));
                        cells.push(self.cell(render::bytes_cell(
                            d.rate(d.bytes[w]),
                            self.parsable,
                        )));
                    }
                    None => {
                        for _ in 0..4 {
                            cells.push(self.pad(&dash));
                        }
                    }
                }
                if self.latency {
                    for (new, old_h) in [
                        (&vs.read_latency, old.map(|o| &o.read_latency)),
                        (&vs.write_latency, old.map(|o| &o.write_latency)),
                        (
                            &vs.disk_read_latency,
                            old.map(|o| &o.disk_read_latency),
                        ),
                        (
                            &vs.disk_write_latency,
                            old.map(|o| &o.disk_write_latency),
                        ),
                    ] {
                        let d = sub_histo(
                            old_h.map(Vec::as_slice),
                            new.as_slice(),
                        );
                        let avg = single_histo_average(&d);
                        cells.push(
                            self.cell(render::nicetime(avg, self.parsable)),
                        );
                    }
                }
                if self.queues {
                    let qs = [
                        vs.queues.sync_read,
                        vs.queues.sync_write,
                        vs.queues.async_read,
                        vs.queues.async_write,
                        vs.queues.scrub,
                        vs.queues.trim,
                        vs.queues.rebuild,
                    ];
                    for QueueStats { pend, active } in qs {
                        cells.push(self.cell(render::count_cell(
                            pend,
                            self.parsable,
                        )));
                        cells.push(self.cell(render::count_cell(
                            active,
                            self.parsable,
                        )));
                    }
                }
            }
        }
        if !cmdcols.is_empty() {
            for col in cmdcols.columns() {
                let val = node
                    .path
                    .as_deref()
                    .filter(|_| node.is_leaf())
                    .map(|p| cmdcols.get(p, col))
                    .unwrap_or("-");
                cells.push(if self.scripted {
                    val.to_owned()
                } else {
                    format!("{val:>w$}", w = cmdcols.width(col))
                });
            }
        }
        self.emit(cells);
    }

    /// Histogram mode.  One block per vdev showing per-bucket event counts
    /// accumulated during the interval.
    fn print_histos(&self, name: &str, tree: &VdevNode, map: &DeltaMap) {
        let style = self.style();
        let mut nodes: Vec<(String, &VdevNode)> =
            vec![(name.to_owned(), tree)];
        if self.verbose {
            for node in tree.iter().skip(1) {
                if !node.is_hole() && !node.is_indirect() {
                    nodes.push((name_of(node, style), node));
                }
            }
        }
        for (vname, node) in nodes {
            let Some(vs) = &node.stats else { continue };
            let old = map.old_stats(node.guid);
            if self.latency_histo {
                let read = sub_histo(
                    old.map(|o| o.read_latency.as_slice()),
                    &vs.read_latency,
                );
                let write = sub_histo(
                    old.map(|o| o.write_latency.as_slice()),
                    &vs.write_latency,
                );
                println!("{vname} latency");
                self.print_histo_block("latency", &read, &write, true);
            }
            if self.size_histo {
                let read = sub_histo(
                    old.map(|o| o.read_request_size.as_slice()),
                    &vs.read_request_size,
                );
                let write = sub_histo(
                    old.map(|o| o.write_request_size.as_slice()),
                    &vs.write_request_size,
                );
                println!("{vname} request size");
                self.print_histo_block("size", &read, &write, false);
            }
            println!();
        }
    }

    fn print_histo_block(
        &self,
        label: &str,
        read: &[u64],
        write: &[u64],
        time_buckets: bool,
    ) {
        if !self.scripted {
            println!(
                "{:>10} {:>COLWIDTH$} {:>COLWIDTH$}",
                label, "read", "write"
            );
        }
        let buckets = read.len().max(write.len());
        for i in 0..buckets {
            let r = read.get(i).copied().unwrap_or(0);
            let w = write.get(i).copied().unwrap_or(0);
            if r == 0 && w == 0 {
                continue;
            }
            let bound = 1u64 << i;
            let label = if self.parsable {
                bound.to_string()
            } else if time_buckets {
                render::nicetime(bound, false)
            } else {
                render::bytes_cell(bound, false)
            };
            let rs = render::count_cell(r, self.parsable);
            let ws = render::count_cell(w, self.parsable);
            if self.scripted {
                println!("{label}\t{rs}\t{ws}");
            } else {
                println!(
                    "{label:>10} {rs:>COLWIDTH$} {ws:>COLWIDTH$}"
                );
            }
        }
    }

    fn cell(&self, s: String) -> String {
        if self.scripted {
            s
        } else {
            format!("{s:>COLWIDTH$}")
        }
    }

    fn pad(&self, s: &str) -> String {
        self.cell(s.to_owned())
    }

    fn emit(&self, cells: Vec<String>) {
        if self.scripted {
            println!("{}", cells.join("\t"));
        } else {
            println!("{}", cells.join(" ").trim_end());
        }
    }
}

/// Resolve positional tokens into pools and vdev filters
fn resolve_targets(src: &ConfigSource, tokens: Vec<String>) -> Result<Targets> {
    let mut pools: Vec<String> = Vec::new();
    let mut vdevs = Vec::new();
    for token in tokens {
        let scope = if pools.len() == 1 {
            Some(pools[0].as_str())
        } else {
            None
        };
        match walk::classify_token(src, scope, &token)? {
            TokenKind::Pool => pools.push(token),
            TokenKind::VdevInPool => vdevs.push(token),
            TokenKind::VdevInOtherPool(other) => {
                return Err(Error::Invalid(format!(
                    "vdev '{token}' belongs to pool '{other}'"
                )));
            }
            TokenKind::Unknown => {
                return Err(Error::NoSuchVdev(token));
            }
        }
    }
    if !vdevs.is_empty() && pools.len() > 1 {
        return Err(Error::Invalid(
            "vdevs may only be specified with a single pool".to_owned(),
        ));
    }
    Ok(Targets { pools, vdevs })
}

fn center(s: &str, width: usize) -> String {
    if s.len() >= width {
        return s.to_owned();
    }
    let left = (width - s.len()) / 2;
    format!("{:left$}{s}{:right$}", "", "",
            right = width - s.len() - left)
}

/// The widest the name column may be without squeezing out the statistics
fn name_column_limit() -> usize {
    if !std::io::stdout().is_terminal() {
        return usize::MAX;
    }
    let cols = std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(80);
    cols.saturating_sub(STAT_RESERVE).max(10)
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_flags() {
        let ios = Iostat::try_parse_from([
            "iostat", "-gHlpqvy", "-T", "d", "tank", "5", "3",
        ])
        .unwrap();
        assert!(ios.guid);
        assert!(ios.scripted);
        assert!(ios.latency);
        assert!(ios.parsable);
        assert!(ios.queues);
        assert!(ios.verbose);
        assert!(ios.skip_first);
        assert_eq!(Some(TimestampFmt::Date), ios.timestamp);
        assert_eq!(
            vec!["tank".to_owned(), "5".to_owned(), "3".to_owned()],
            ios.args
        );
    }

    #[test]
    fn parse_command() {
        let ios =
            Iostat::try_parse_from(["iostat", "-c", "smartctl -a $VDEV_PATH"])
                .unwrap();
        assert_eq!(Some("smartctl -a $VDEV_PATH".to_owned()), ios.command);
    }

    #[test]
    fn centering() {
        assert_eq!("  ab  ", center("ab", 6));
        assert_eq!(" abc  ", center("abc", 6));
        assert_eq!("abcdef", center("abcdef", 4));
    }

    // The second refresh reports the pool missing; the loop must drop it
    // and keep reporting on the other pool.
    #[tokio::test]
    async fn vanished_pool_drops_out_of_the_repeat_loop() {
        // two gets before vanishing: one for argument resolution, one for
        // the first report
        let daemon = crate::stub::StubDaemon::start(
            vec![
                crate::stub::pool_config("tank", 1),
                crate::stub::pool_config("dozer", 2),
            ],
            &["dozer"],
            2,
        )
        .unwrap();
        let ios = Iostat::try_parse_from([
            "iostat", "tank", "dozer", "0.01", "2",
        ])
        .unwrap();
        ios.main(&daemon.sock).await.unwrap();
    }

    #[test]
    fn header_column_counts_agree() {
        for args in [
            vec!["iostat"],
            vec!["iostat", "-l"],
            vec!["iostat", "-q"],
            vec!["iostat", "-lq"],
        ] {
            let ios = Iostat::try_parse_from(args).unwrap();
            let spanned: usize =
                ios.groups().iter().map(|(_, n)| n).sum();
            assert_eq!(spanned, ios.column_names().len());
        }
    }
}
