// vim: tw=80
//! The `muskox status` subcommand

use std::{path::Path, time::Duration};

use clap::Parser;
use muskox::Muskox;
use muskox_core::{
    activity::{
        secs_to_dhms,
        CheckpointState,
        ProgressState,
        RaidzExpandStats,
        RemovalStats,
        ScanFunc,
        ScanStats,
        ScanState,
    },
    name::{name_of, NameStyle},
    rpc::PoolConfig,
    types::Result,
    vdev::{AllocClass, VdevNode, VdevStats},
    walk,
};

use crate::{
    render::{self, TimestampFmt},
    vdev_cmd::CmdColumns,
};

/// Display detailed health information for pools
#[derive(Parser, Clone, Debug)]
pub(super) struct Status {
    /// Run a command per leaf vdev and add its output as columns
    #[clap(short = 'c')]
    command:        Option<String>,
    /// Show only unhealthy vdevs
    #[clap(short = 'e')]
    errors_only:    bool,
    /// Print vdev guids instead of names
    #[clap(short = 'g')]
    guid:           bool,
    /// Show initialization status for each leaf vdev
    #[clap(short = 'i')]
    initialize:     bool,
    /// Resolve symlinks when printing device paths
    #[clap(short = 'L')]
    follow_links:   bool,
    /// Exact numbers instead of humanized ones
    #[clap(short = 'p')]
    parsable:       bool,
    /// Full device paths instead of basenames
    #[clap(short = 'P')]
    full_paths:     bool,
    /// Show a slow-I/O column
    #[clap(short = 's')]
    slow_ios:       bool,
    /// Show trim status for each leaf vdev
    #[clap(short = 't')]
    trim:           bool,
    /// Verbose data-error information
    #[clap(short = 'v')]
    verbose:        bool,
    /// Only report on pools that are not healthy
    #[clap(short = 'x')]
    unhealthy_only: bool,
    /// Display a timestamp before each report: "u" for seconds since the
    /// epoch, "d" for a date
    #[clap(short = 'T')]
    timestamp:      Option<TimestampFmt>,
    /// Pool names, optionally followed by an interval and count
    args:           Vec<String>,
}

impl Status {
    pub(super) async fn main(self, sock: &Path) -> Result<()> {
        let muskox = Muskox::new(sock).await?;
        let (mut pools, interval, count) =
            super::split_interval_count(self.args.clone(), |_| false)?;
        let explicit = !pools.is_empty();
        let mut iteration = 0u64;
        loop {
            iteration += 1;
            if let Some(ts) = self.timestamp {
                ts.print();
            }
            self.print_once(&muskox, &mut pools, explicit, iteration)
                .await?;
            if explicit && pools.is_empty() {
                break;
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

    async fn print_once(
        &self,
        muskox: &Muskox,
        pools: &mut Vec<String>,
        explicit: bool,
        iteration: u64,
    ) -> Result<()> {
        let names: Vec<String> = if explicit {
            pools.clone()
        } else {
            muskox
                .pool_list()
                .await?
                .into_iter()
                .map(|info| info.name)
                .collect()
        };
        let mut shown = 0usize;
        let mut total = 0usize;
        for name in names {
            // Resample the pool before reading it back.  A pool that was
            // exported or destroyed drops out of the working set; the
            // remaining pools still print.
            if iteration > 1 && muskox.pool_refresh(name.clone()).await? {
                eprintln!("pool '{name}' is no longer available");
                pools.retain(|p| p != &name);
                continue;
            }
            let pair = muskox.pool_get(name).await?;
            let tree = VdevNode::try_from(pair.current.root.clone())?;
            total += 1;
            if self.unhealthy_only && pool_is_healthy(&pair.current, &tree)
            {
                continue;
            }
            shown += 1;
            self.print_pool(&pair.current, &tree).await;
        }
        if self.unhealthy_only && shown == 0 && total > 0 {
            if total == 1 {
                println!("pool is healthy");
            } else {
                println!("all pools are healthy");
            }
        }
        Ok(())
    }

    async fn print_pool(&self, cfg: &PoolConfig, tree: &VdevNode) {
        let color = render::use_color();
        let now = unix_now();
        println!("  pool: {}", cfg.name);
        let health = tree
            .stats
            .as_ref()
            .map(VdevStats::health)
            .unwrap_or("UNKNOWN");
        println!(
            " state: {}",
            render::colorize(health, render::health_color(health), color)
        );
        if let Some(sss) = &tree.scan {
            for (i, line) in scan_paragraph(sss, now).iter().enumerate() {
                if i == 0 {
                    println!("  scan: {line}");
                } else {
                    println!("\t{line}");
                }
            }
        }
        for node in tree.iter() {
            if let Some(rs) = &node.rebuild {
                if rs.is_active() {
                    println!(
                        "  scan: rebuild in progress since {}",
                        render::epoch_datetime(rs.start_time)
                    );
                    println!(
                        "\t{} rebuilt out of {}, {:.2}% done{}",
                        render::bytes_cell(rs.bytes_rebuilt, self.parsable),
                        render::bytes_cell(rs.bytes_est, self.parsable),
                        100.0 * rs.fraction_done(),
                        match rs.eta_secs() {
                            Some(eta) =>
                                format!(", {} to go", secs_to_dhms(eta)),
                            None =>
                                ", no estimated completion time".to_owned(),
                        }
                    );
                }
            }
        }
        if let Some(prs) = &tree.removal {
            for (i, line) in
                removal_paragraph(prs, now, self.parsable).iter().enumerate()
            {
                if i == 0 {
                    println!("remove: {line}");
                } else {
                    println!("\t{line}");
                }
            }
        }
        if let Some(pres) = &tree.raidz_expand {
            for (i, line) in
                expand_paragraph(pres, now, self.parsable).iter().enumerate()
            {
                if i == 0 {
                    println!("expand: {line}");
                } else {
                    println!("\t{line}");
                }
            }
        }
        if let Some(cs) = &tree.checkpoint {
            match cs.state {
                CheckpointState::Exists => println!(
                    "checkpoint: created {}, consumes {}",
                    render::epoch_datetime(cs.start_time),
                    render::bytes_cell(cs.space, self.parsable)
                ),
                CheckpointState::Discarding => println!(
                    "checkpoint: discarding, {} remaining",
                    render::bytes_cell(cs.space, self.parsable)
                ),
                CheckpointState::None => (),
            }
        }
        println!("config:");
        println!();

        let cmdcols = match &self.command {
            Some(cmd) => {
                let paths: Vec<String> = tree
                    .iter()
                    .filter(|n| n.is_leaf())
                    .filter_map(|n| n.path.clone())
                    .collect();
                CmdColumns::run(cmd, &paths).await
            }
            None => CmdColumns::default(),
        };

        let style = self.style();
        let namewidth = walk::max_width(tree, 0, cfg.name.len(), style);
        self.print_tree_header(namewidth, &cmdcols);
        let scan_active =
            tree.scan.map(|s| s.is_active()).unwrap_or(false);
        self.print_config_row(
            &cfg.name,
            tree,
            namewidth,
            scan_active,
            &cmdcols,
            color,
        );
        for tl in walk::class_members(tree, AllocClass::Normal) {
            self.print_config_subtree(
                tl, 2, namewidth, scan_active, &cmdcols, color, style,
            );
        }
        for class in
            [AllocClass::Special, AllocClass::Dedup, AllocClass::Log]
        {
            let members = walk::class_members(tree, class);
            if members.is_empty() {
                continue;
            }
            println!("\t{}", class.section());
            for tl in members {
                self.print_config_subtree(
                    tl, 2, namewidth, scan_active, &cmdcols, color, style,
                );
            }
        }
        if !tree.cache.is_empty() {
            println!("\tcache");
            for dev in &tree.cache {
                self.print_config_subtree(
                    dev, 2, namewidth, scan_active, &cmdcols, color, style,
                );
            }
        }
        if !tree.spares.is_empty() {
            println!("\tspares");
            for dev in &tree.spares {
                let name = format!("  {}", name_of(dev, style));
                let state = dev
                    .stats
                    .as_ref()
                    .map(VdevStats::spare_health)
                    .unwrap_or("-");
                println!(
                    "\t{:<namewidth$}  {}",
                    name,
                    render::colorize(
                        state,
                        render::health_color(state),
                        color
                    )
                );
            }
        }
        println!();
        if cfg.error_count == 0 {
            println!("errors: No known data errors");
        } else if self.verbose {
            println!(
                "errors: Permanent errors have been detected in {} files",
                cfg.error_count
            );
        } else {
            println!("errors: {} data errors, use '-v' for a list",
                     cfg.error_count);
        }
        println!();
    }

    fn print_tree_header(&self, namewidth: usize, cmdcols: &CmdColumns) {
        let mut line = format!(
            "\t{:<namewidth$}  {:<9} {:>5} {:>5} {:>5}",
            "NAME", "STATE", "READ", "WRITE", "CKSUM"
        );
        if self.slow_ios {
            line.push_str(&format!(" {:>5}", "SLOW"));
        }
        for col in cmdcols.columns() {
            line.push_str(&format!(" {:>w$}", col, w = cmdcols.width(col)));
        }
        println!("{}", line.trim_end());
    }

    fn print_config_subtree(
        &self,
        node: &VdevNode,
        depth: usize,
        namewidth: usize,
        scan_active: bool,
        cmdcols: &CmdColumns,
        color: bool,
        style: NameStyle,
    ) {
        if node.is_hole() || node.is_indirect() {
            return;
        }
        // With -e, fully healthy subtrees are elided
        if self.errors_only &&
            walk::is_healthy_subtree(node, self.slow_ios)
        {
            return;
        }
        let name =
            format!("{:indent$}{}", "", name_of(node, style), indent = depth);
        self.print_config_row(
            &name, node, namewidth, scan_active, cmdcols, color,
        );
        for child in &node.children {
            self.print_config_subtree(
                child,
                depth + 2,
                namewidth,
                scan_active,
                cmdcols,
                color,
                style,
            );
        }
    }

    fn print_config_row(
        &self,
        name: &str,
        node: &VdevNode,
        namewidth: usize,
        scan_active: bool,
        cmdcols: &CmdColumns,
        color: bool,
    ) {
        let mut line = format!("\t{name:<namewidth$}  ");
        match &node.stats {
            None => line.push_str(&format!("{:<9} {:>5} {:>5} {:>5}",
                                           "-", "-", "-", "-")),
            Some(vs) => {
                let state = vs.health();
                let padded = format!("{state:<9}");
                line.push_str(&render::colorize(
                    &padded,
                    render::health_color(state),
                    color,
                ));
                for errs in
                    [vs.read_errors, vs.write_errors, vs.checksum_errors]
                {
                    let cell = render::count_cell(errs, self.parsable);
                    let colored = if errs > 0 {
                        render::colorize(
                            &cell,
                            Some(render::ANSI_RED),
                            color,
                        )
                    } else {
                        cell.clone()
                    };
                    line.push_str(&format!(
                        " {}{}",
                        " ".repeat(5usize.saturating_sub(cell.len())),
                        colored
                    ));
                }
                if self.slow_ios {
                    line.push_str(&format!(
                        " {:>5}",
                        render::count_cell(vs.slow_ios, self.parsable)
                    ));
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
                line.push_str(&format!(
                    " {val:>w$}",
                    w = cmdcols.width(col)
                ));
            }
        }
        let notes = annotations(node, scan_active);
        if !notes.is_empty() {
            line.push_str(&format!("  {notes}"));
        }
        println!("{}", line.trim_end());
        if let Some(vs) = &node.stats {
            if node.is_leaf() {
                if self.initialize {
                    println!("\t{}", initialize_note(vs));
                }
                if self.trim {
                    println!("\t{}", trim_note(vs));
                }
            }
        }
    }
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn pool_is_healthy(cfg: &PoolConfig, tree: &VdevNode) -> bool {
    let online = tree
        .stats
        .as_ref()
        .map(|vs| vs.health() == "ONLINE")
        .unwrap_or(false);
    online && cfg.error_count == 0 &&
        walk::is_healthy_subtree(tree, false)
}

/// Extra notes appended after a vdev's error counters
fn annotations(node: &VdevNode, scan_active: bool) -> String {
    let mut notes = Vec::new();
    if let Some(vs) = &node.stats {
        if let Some(reason) = vs.aux.reason() {
            notes.push(reason.to_owned());
        }
        if node.not_present {
            if let Some(path) = &node.path {
                notes.push(format!("was {path}"));
            }
        }
        if node.is_leaf() &&
            vs.configured_ashift > 0 &&
            vs.configured_ashift < vs.physical_ashift
        {
            notes.push(format!(
                "block size: {}B configured, {}B native",
                1u64 << vs.configured_ashift,
                1u64 << vs.physical_ashift
            ));
        }
        if vs.removing {
            notes.push("(removing)".to_owned());
        }
        if vs.noalloc {
            notes.push("(non-allocating)".to_owned());
        }
        if vs.resilver_deferred {
            notes.push("(awaiting resilver)".to_owned());
        } else if scan_active && node.is_leaf() && vs.scan_processed > 0 {
            notes.push("(resilvering)".to_owned());
        }
    }
    if node
        .rebuild
        .as_ref()
        .map(|rs| rs.is_active())
        .unwrap_or(false)
    {
        notes.push("(resilvering)".to_owned());
    }
    notes.join("  ")
}

fn initialize_note(vs: &VdevStats) -> String {
    let ini = &vs.initialize;
    match ini.state {
        ProgressState::None => "  (uninitialized)".to_owned(),
        ProgressState::Complete => format!(
            "  (100% initialized, completed at {})",
            render::epoch_datetime(ini.action_time)
        ),
        state => format!(
            "  ({}% initialized, {}, started at {})",
            ini.percent(),
            state.adjective(),
            render::epoch_datetime(ini.action_time)
        ),
    }
}

fn trim_note(vs: &VdevStats) -> String {
    let trim = &vs.trim;
    if trim.unsupported {
        return "  (trim unsupported)".to_owned();
    }
    match trim.state {
        ProgressState::None => "  (untrimmed)".to_owned(),
        ProgressState::Complete => format!(
            "  (100% trimmed, completed at {})",
            render::epoch_datetime(trim.action_time)
        ),
        state => format!(
            "  ({}% trimmed, {}, started at {})",
            trim.percent(),
            state.adjective(),
            render::epoch_datetime(trim.action_time)
        ),
    }
}

/// The `scan:` paragraph.  First line goes after the label, the rest are
/// indented continuations.
fn scan_paragraph(sss: &ScanStats, now: u64) -> Vec<String> {
    let verb = match sss.func {
        ScanFunc::None => return Vec::new(),
        ScanFunc::Scrub => "scrub",
        ScanFunc::Resilver => "resilver",
        ScanFunc::ErrorScrub => "error scrub",
    };
    match sss.state {
        ScanState::None => Vec::new(),
        ScanState::Finished => {
            let elapsed = sss.end_time.saturating_sub(sss.start_time);
            let repaired = render::bytes_cell(sss.processed, false);
            let when = render::epoch_datetime(sss.end_time);
            let what = if sss.func == ScanFunc::Resilver {
                "resilvered"
            } else {
                "repaired"
            };
            vec![format!(
                "{verb} {what} {repaired} in {} with {} errors on {when}",
                secs_to_dhms(elapsed),
                sss.errors
            )]
        }
        ScanState::Canceled => {
            vec![format!(
                "{verb} canceled on {}",
                render::epoch_datetime(sss.end_time)
            )]
        }
        ScanState::Scanning if sss.pass_scrub_pause != 0 => {
            vec![
                format!(
                    "{verb} paused since {}",
                    render::epoch_datetime(sss.pass_scrub_pause)
                ),
                format!(
                    "{verb} started on {}",
                    render::epoch_datetime(sss.start_time)
                ),
            ]
        }
        ScanState::Scanning => {
            let eta = match sss.eta_secs(now) {
                Some(eta) => format!("{} to go", secs_to_dhms(eta)),
                None => "no estimated completion time".to_owned(),
            };
            vec![
                format!(
                    "{verb} in progress since {}",
                    render::epoch_datetime(sss.start_time)
                ),
                format!(
                    "{} scanned at {}/s, {} issued at {}/s, {} total",
                    render::bytes_cell(sss.examined, false),
                    render::bytes_cell(sss.scan_rate(now), false),
                    render::bytes_cell(sss.issued, false),
                    render::bytes_cell(sss.issue_rate(now), false),
                    render::bytes_cell(sss.to_examine, false),
                ),
                format!(
                    "{} {}, {:.2}% done, {eta}",
                    render::bytes_cell(sss.processed, false),
                    if sss.func == ScanFunc::Resilver {
                        "resilvered"
                    } else {
                        "repaired"
                    },
                    100.0 * sss.fraction_done(),
                ),
            ]
        }
    }
}

fn removal_paragraph(
    prs: &RemovalStats,
    now: u64,
    parsable: bool,
) -> Vec<String> {
    match prs.state {
        ScanState::None => Vec::new(),
        ScanState::Scanning => {
            let eta = match prs.eta_secs(now) {
                Some(eta) => format!("{} to go", secs_to_dhms(eta)),
                None => "no estimated completion time".to_owned(),
            };
            vec![
                format!(
                    "Evacuation of vdev {} in progress since {}",
                    prs.removing_vdev,
                    render::epoch_datetime(prs.start_time)
                ),
                format!(
                    "{} copied out of {} at {}/s, {eta}",
                    render::bytes_cell(prs.copied, parsable),
                    render::bytes_cell(prs.to_copy, parsable),
                    render::bytes_cell(prs.rate(now), parsable),
                ),
            ]
        }
        ScanState::Finished => vec![
            format!(
                "Removal of vdev {} completed on {}",
                prs.removing_vdev,
                render::epoch_datetime(prs.end_time)
            ),
            format!(
                "{} of memory used for indirect mappings",
                render::bytes_cell(prs.mapping_memory, parsable)
            ),
        ],
        ScanState::Canceled => vec![format!(
            "Removal of vdev {} canceled on {}",
            prs.removing_vdev,
            render::epoch_datetime(prs.end_time)
        )],
    }
}

fn expand_paragraph(
    pres: &RaidzExpandStats,
    now: u64,
    parsable: bool,
) -> Vec<String> {
    match pres.state {
        ScanState::None | ScanState::Canceled => Vec::new(),
        ScanState::Scanning => {
            let mut lines = vec![format!(
                "expansion of vdev {} in progress since {}",
                pres.expanding_vdev,
                render::epoch_datetime(pres.start_time)
            )];
            if pres.waiting_for_resilver {
                lines.push(
                    "waiting for resilver to complete".to_owned(),
                );
            }
            let eta = match pres.eta_secs(now) {
                Some(eta) => format!("{} to go", secs_to_dhms(eta)),
                None => "no estimated completion time".to_owned(),
            };
            lines.push(format!(
                "{} reflowed out of {} at {}/s, {eta}",
                render::bytes_cell(pres.reflowed, parsable),
                render::bytes_cell(pres.to_reflow, parsable),
                render::bytes_cell(pres.rate(now), parsable),
            ));
            lines
        }
        ScanState::Finished => vec![format!(
            "expansion of vdev {} completed on {}",
            pres.expanding_vdev,
            render::epoch_datetime(pres.end_time)
        )],
    }
}
