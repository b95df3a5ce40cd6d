// vim: tw=80
//! Administrative CLI for muskoxd storage pools

use std::{path::PathBuf, process::exit};

use clap::{crate_version, Parser};
use muskox_core::{Error, Result};
use tracing_subscriber::EnvFilter;

mod iostat;
mod list;
mod render;
mod status;
#[cfg(test)]
mod stub;
mod vdev_cmd;
mod wait;

/// Separate the trailing `[interval [count]]` arguments from the pool and
/// vdev names preceding them.
///
/// A trailing numeric token is an interval (or a count, if an interval
/// precedes it) unless `is_vdev` claims it, which happens when guid-style
/// names are in use and the token names a real vdev.
fn split_interval_count(
    mut args: Vec<String>,
    mut is_vdev: impl FnMut(&str) -> bool,
) -> Result<(Vec<String>, Option<f64>, Option<u64>)> {
    let mut numerics = Vec::new();
    for arg in args.iter().rev().take(2) {
        if arg.parse::<f64>().is_ok() && !is_vdev(arg) {
            numerics.push(arg.clone());
        } else {
            break;
        }
    }
    args.truncate(args.len() - numerics.len());
    // numerics is in reverse order: [count, interval] when both exist
    let interval = match numerics.pop() {
        None => return Ok((args, None, None)),
        Some(s) => {
            let v: f64 = s
                .parse()
                .map_err(|_| Error::Invalid(format!("bad interval '{s}'")))?;
            if v <= 0.0 {
                return Err(Error::Invalid(
                    "interval must be positive".to_owned(),
                ));
            }
            Some(v)
        }
    };
    let count = match numerics.pop() {
        None => None,
        Some(s) => {
            let c: u64 = s
                .parse()
                .map_err(|_| Error::Invalid(format!("bad count '{s}'")))?;
            if c == 0 {
                return Err(Error::Invalid(
                    "count must be positive".to_owned(),
                ));
            }
            Some(c)
        }
    };
    Ok((args, interval, count))
}

#[derive(Parser, Clone, Debug)]
enum SubCommand {
    Iostat(iostat::Iostat),
    List(list::List),
    Status(status::Status),
    Wait(wait::Wait),
}

#[derive(Parser, Clone, Debug)]
#[clap(version = crate_version!())]
struct Cli {
    /// Path to the muskoxd socket
    #[clap(long, default_value = "/var/run/muskoxd.sock")]
    sock: PathBuf,
    #[clap(subcommand)]
    cmd:  SubCommand,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli: Cli = Cli::parse();
    let r = match cli.cmd {
        SubCommand::Iostat(iostat) => iostat.main(&cli.sock).await,
        SubCommand::List(list) => list.main(&cli.sock).await,
        SubCommand::Status(status) => status.main(&cli.sock).await,
        SubCommand::Wait(wait) => wait.main(&cli.sock).await,
    };
    if let Err(e) = r {
        eprintln!("muskox: {e}");
        exit(e.exit_code());
    }
}

#[cfg(test)]
mod t {
    use clap::error::ErrorKind::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Vec::new())]
    #[case(vec!["muskox"])]
    #[case(vec!["muskox", "wait"])]
    fn missing_arg(#[case] args: Vec<&str>) {
        let e = Cli::try_parse_from(args).unwrap_err();
        assert!(
            e.kind() == MissingRequiredArgument ||
                e.kind() == DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[rstest]
    #[case(vec!["muskox", "frobnicate"])]
    #[case(vec!["muskox", "list", "-Z"])]
    fn bad_args(#[case] args: Vec<&str>) {
        let e = Cli::try_parse_from(args).unwrap_err();
        assert!(
            e.kind() == InvalidSubcommand || e.kind() == UnknownArgument
        );
    }

    #[rstest]
    #[case(vec!["muskox", "list"])]
    #[case(vec!["muskox", "list", "-v", "tank"])]
    fn list(#[case] args: Vec<&str>) {
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.cmd, SubCommand::List(_)));
    }

    #[test]
    fn iostat() {
        let args = vec!["muskox", "iostat", "-v", "tank", "5"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.cmd, SubCommand::Iostat(_)));
    }

    #[test]
    fn status() {
        let args = vec!["muskox", "status", "-x"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.cmd, SubCommand::Status(_)));
    }

    #[test]
    fn wait() {
        let args = vec!["muskox", "wait", "-t", "scrub,trim", "tank"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.cmd, SubCommand::Wait(_)));
    }

    #[test]
    fn custom_sock() {
        let args = vec!["muskox", "--sock", "/tmp/m.sock", "list"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(PathBuf::from("/tmp/m.sock"), cli.sock);
    }

    mod interval_count {
        use super::*;
        use pretty_assertions::assert_eq;

        fn strs(v: &[&str]) -> Vec<String> {
            v.iter().map(|s| s.to_string()).collect()
        }

        #[test]
        fn none() {
            let (args, i, c) =
                split_interval_count(strs(&["tank"]), |_| false).unwrap();
            assert_eq!(strs(&["tank"]), args);
            assert_eq!(None, i);
            assert_eq!(None, c);
        }

        #[test]
        fn interval_only() {
            let (args, i, c) =
                split_interval_count(strs(&["tank", "5"]), |_| false)
                    .unwrap();
            assert_eq!(strs(&["tank"]), args);
            assert_eq!(Some(5.0), i);
            assert_eq!(None, c);
        }

        #[test]
        fn interval_and_count() {
            let (args, i, c) =
                split_interval_count(strs(&["2.5", "10"]), |_| false)
                    .unwrap();
            assert!(args.is_empty());
            assert_eq!(Some(2.5), i);
            assert_eq!(Some(10), c);
        }

        // A trailing number that names a vdev is a vdev, not an interval
        #[test]
        fn numeric_vdev_guid() {
            let guid = "9876543210";
            let (args, i, c) = split_interval_count(
                strs(&["tank", guid, "5"]),
                |t| t == guid,
            )
            .unwrap();
            assert_eq!(strs(&["tank", guid]), args);
            assert_eq!(Some(5.0), i);
            assert_eq!(None, c);
        }

        #[test]
        fn zero_interval_is_rejected() {
            assert!(
                split_interval_count(strs(&["0"]), |_| false).is_err()
            );
        }

        #[test]
        fn fractional_count_is_rejected() {
            assert!(
                split_interval_count(strs(&["1", "2.5"]), |_| false)
                    .is_err()
            );
        }
    }
}
