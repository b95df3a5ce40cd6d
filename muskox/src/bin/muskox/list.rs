// vim: tw=80
//! The `muskox list` subcommand

use std::{path::Path, str::FromStr, time::Duration};

use clap::Parser;
use muskox::Muskox;
use muskox_core::{
    name::{name_of, NameStyle},
    rpc::PoolConfig,
    types::{Error, Guid, Result},
    vdev::{AllocClass, VdevNode},
    walk,
};

use crate::render::{self, TimestampFmt};

/// One displayable pool property
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LabelProp {
    Name,
    Size,
    Alloc,
    Free,
    Ckpoint,
    Expandsz,
    Frag,
    Cap,
    Dedup,
    Health,
    Guid,
}

impl LabelProp {
    fn header(&self) -> &'static str {
        match self {
            LabelProp::Name => "NAME",
            LabelProp::Size => "SIZE",
            LabelProp::Alloc => "ALLOC",
            LabelProp::Free => "FREE",
            LabelProp::Ckpoint => "CKPOINT",
            LabelProp::Expandsz => "EXPANDSZ",
            LabelProp::Frag => "FRAG",
            LabelProp::Cap => "CAP",
            LabelProp::Dedup => "DEDUP",
            LabelProp::Health => "HEALTH",
            LabelProp::Guid => "GUID",
        }
    }

    fn width(&self) -> usize {
        match self {
            LabelProp::Name => 0, // computed per report
            LabelProp::Size | LabelProp::Alloc | LabelProp::Free => 9,
            LabelProp::Ckpoint => 7,
            LabelProp::Expandsz => 8,
            LabelProp::Frag => 5,
            LabelProp::Cap => 5,
            LabelProp::Dedup => 6,
            LabelProp::Health => 9,
            LabelProp::Guid => 20,
        }
    }
}

impl FromStr for LabelProp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(LabelProp::Name),
            "size" => Ok(LabelProp::Size),
            "alloc" | "allocated" => Ok(LabelProp::Alloc),
            "free" => Ok(LabelProp::Free),
            "ckpoint" | "checkpoint" => Ok(LabelProp::Ckpoint),
            "expandsz" | "expandsize" => Ok(LabelProp::Expandsz),
            "frag" | "fragmentation" => Ok(LabelProp::Frag),
            "cap" | "capacity" => Ok(LabelProp::Cap),
            "dedup" | "dedupratio" => Ok(LabelProp::Dedup),
            "health" => Ok(LabelProp::Health),
            "guid" => Ok(LabelProp::Guid),
            _ => Err(Error::Invalid(format!("invalid property '{s}'"))),
        }
    }
}

/// Everything one row might need to show.  None renders as "-".
#[derive(Debug, Default)]
struct Row {
    name:     String,
    size:     Option<u64>,
    alloc:    Option<u64>,
    free:     Option<u64>,
    ckpoint:  Option<u64>,
    expandsz: Option<u64>,
    frag:     Option<u8>,
    cap:      Option<u64>,
    dedup:    Option<u64>,
    health:   Option<&'static str>,
    guid:     Option<Guid>,
}

/// List pools and their space usage
#[derive(Parser, Clone, Debug)]
pub(super) struct List {
    /// Print vdev guids instead of names
    #[clap(short = 'g')]
    guid:         bool,
    /// Scripted mode: no headers, tab-separated columns
    #[clap(short = 'H')]
    scripted:     bool,
    /// Resolve symlinks when printing device paths
    #[clap(short = 'L')]
    follow_links: bool,
    /// Exact numbers instead of humanized ones
    #[clap(short = 'p')]
    parsable:     bool,
    /// Full device paths instead of basenames
    #[clap(short = 'P')]
    full_paths:   bool,
    /// Also list every pool's vdevs
    #[clap(short = 'v')]
    verbose:      bool,
    /// Columns to display, comma delimited
    #[clap(
        short = 'o',
        value_delimiter(','),
        default_value = "name,size,alloc,free,ckpoint,expandsz,frag,cap,\
                         dedup,health"
    )]
    properties:   Vec<LabelProp>,
    /// Display a timestamp before each report: "u" for seconds since the
    /// epoch, "d" for a date
    #[clap(short = 'T')]
    timestamp:    Option<TimestampFmt>,
    /// Pool names, optionally followed by an interval and count
    args:         Vec<String>,
}

impl List {
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
        let mut configs = Vec::new();
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
            configs.push((pair.current, tree));
        }
        let style = self.style();
        let mut namewidth = configs
            .iter()
            .map(|(cfg, _)| cfg.name.len())
            .max()
            .unwrap_or(4)
            .max(4);
        if self.verbose {
            for (_, tree) in &configs {
                namewidth = walk::max_width(tree, 0, namewidth, style);
            }
        }

        if !self.scripted {
            let cells: Vec<String> = self
                .properties
                .iter()
                .map(|p| (p.header().to_owned(), *p))
                .map(|(h, p)| self.pad(h, p, namewidth))
                .collect();
            println!("{}", cells.join("  ").trim_end());
        }
        for (cfg, tree) in &configs {
            self.print_pool(cfg, tree, namewidth);
        }
        Ok(())
    }

    fn print_pool(&self, cfg: &PoolConfig, tree: &VdevNode, namewidth: usize) {
        self.print_row(&pool_row(cfg, tree), namewidth);
        if !self.verbose {
            return;
        }
        let style = self.style();
        for tl in walk::class_members(tree, AllocClass::Normal) {
            self.print_subtree(tl, 2, namewidth, style);
        }
        for class in
            [AllocClass::Special, AllocClass::Dedup, AllocClass::Log]
        {
            let members = walk::class_members(tree, class);
            if members.is_empty() {
                continue;
            }
            self.print_row(
                &Row {
                    name: class.section().to_owned(),
                    ..Default::default()
                },
                namewidth,
            );
            for tl in members {
                self.print_subtree(tl, 2, namewidth, style);
            }
        }
        for (section, members) in
            [("cache", &tree.cache), ("spare", &tree.spares)]
        {
            if members.is_empty() {
                continue;
            }
            self.print_row(
                &Row {
                    name: section.to_owned(),
                    ..Default::default()
                },
                namewidth,
            );
            for dev in members {
                self.print_subtree(dev, 2, namewidth, style);
            }
        }
    }

    fn print_subtree(
        &self,
        node: &VdevNode,
        depth: usize,
        namewidth: usize,
        style: NameStyle,
    ) {
        if node.is_hole() || node.is_indirect() {
            return;
        }
        self.print_row(&vdev_row(node, depth, style), namewidth);
        for child in &node.children {
            self.print_subtree(child, depth + 2, namewidth, style);
        }
    }

    fn print_row(&self, row: &Row, namewidth: usize) {
        let color = render::use_color();
        let cells: Vec<String> = self
            .properties
            .iter()
            .map(|prop| {
                let raw = self.cell(row, *prop);
                if *prop == LabelProp::Health {
                    let colored = render::colorize(
                        &raw,
                        render::health_color(&raw),
                        color,
                    );
                    // Pad before coloring would count escape bytes
                    if self.scripted || raw.len() >= prop.width() {
                        colored
                    } else {
                        format!(
                            "{}{}",
                            colored,
                            " ".repeat(prop.width() - raw.len())
                        )
                    }
                } else {
                    self.pad(raw, *prop, namewidth)
                }
            })
            .collect();
        if self.scripted {
            println!("{}", cells.join("\t"));
        } else {
            println!("{}", cells.join("  ").trim_end());
        }
    }

    fn pad(&self, s: String, prop: LabelProp, namewidth: usize) -> String {
        if self.scripted {
            return s;
        }
        match prop {
            LabelProp::Name => format!("{s:<namewidth$}"),
            LabelProp::Health => format!("{s:<w$}", w = prop.width()),
            _ => format!("{s:>w$}", w = prop.width()),
        }
    }

    fn cell(&self, row: &Row, prop: LabelProp) -> String {
        let dash = || "-".to_owned();
        match prop {
            LabelProp::Name => row.name.clone(),
            LabelProp::Size => row
                .size
                .map(|v| render::bytes_cell(v, self.parsable))
                .unwrap_or_else(dash),
            LabelProp::Alloc => row
                .alloc
                .map(|v| render::bytes_cell(v, self.parsable))
                .unwrap_or_else(dash),
            LabelProp::Free => row
                .free
                .map(|v| render::bytes_cell(v, self.parsable))
                .unwrap_or_else(dash),
            LabelProp::Ckpoint => row
                .ckpoint
                .map(|v| render::bytes_cell(v, self.parsable))
                .unwrap_or_else(dash),
            LabelProp::Expandsz => row
                .expandsz
                .map(|v| render::bytes_cell(v, self.parsable))
                .unwrap_or_else(dash),
            LabelProp::Frag => row
                .frag
                .map(|v| {
                    if self.parsable {
                        v.to_string()
                    } else {
                        format!("{v}%")
                    }
                })
                .unwrap_or_else(dash),
            LabelProp::Cap => row
                .cap
                .map(|v| {
                    if self.parsable {
                        v.to_string()
                    } else {
                        format!("{v}%")
                    }
                })
                .unwrap_or_else(dash),
            LabelProp::Dedup => row
                .dedup
                .map(|v| {
                    if self.parsable {
                        v.to_string()
                    } else {
                        format!("{}.{:02}x", v / 100, v % 100)
                    }
                })
                .unwrap_or_else(dash),
            LabelProp::Health => {
                row.health.map(str::to_owned).unwrap_or_else(dash)
            }
            LabelProp::Guid => {
                row.guid.map(|g| g.to_string()).unwrap_or_else(dash)
            }
        }
    }
}

fn pool_row(cfg: &PoolConfig, tree: &VdevNode) -> Row {
    let mut row = Row {
        name: cfg.name.clone(),
        dedup: Some(cfg.dedup_ratio),
        guid: Some(cfg.guid),
        ..Default::default()
    };
    if let Some(vs) = &tree.stats {
        row.size = Some(vs.space);
        row.alloc = Some(vs.alloc);
        row.free = Some(vs.space.saturating_sub(vs.alloc));
        row.expandsz = (vs.expand_size > 0).then_some(vs.expand_size);
        row.frag = vs.fragmentation;
        if vs.space > 0 {
            row.cap = Some(vs.alloc * 100 / vs.space);
        }
        row.health = Some(vs.health());
    }
    row.ckpoint = tree.checkpoint.as_ref().and_then(|cs| {
        (cs.space > 0).then_some(cs.space)
    });
    row
}

fn vdev_row(node: &VdevNode, depth: usize, style: NameStyle) -> Row {
    let mut row = Row {
        name: format!(
            "{:indent$}{}",
            "",
            name_of(node, style),
            indent = depth
        ),
        guid: Some(node.guid),
        ..Default::default()
    };
    if let Some(vs) = &node.stats {
        // Zero space means the counters don't apply at this level
        if vs.space > 0 {
            row.size = Some(vs.space);
            row.alloc = Some(vs.alloc);
            row.free = Some(vs.space.saturating_sub(vs.alloc));
            row.frag = vs.fragmentation;
            row.cap = Some(vs.alloc * 100 / vs.space);
        }
        row.expandsz = (vs.expand_size > 0).then_some(vs.expand_size);
        row.health = Some(vs.health());
    }
    row
}
