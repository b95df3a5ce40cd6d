// vim: tw=80
//! Tree traversal, filtering, and layout
//!
//! Rules shared by every tree-printing command: which children belong to
//! which section, which nodes are silently skipped, how wide the name column
//! must be, and whether a subtree is healthy enough to elide.

#[cfg(test)]
use mockall::automock;

use crate::{
    name::{name_of, NameStyle},
    types::{Guid, Result},
    vdev::{AllocClass, VdevNode, VdevStats},
};

/// Top-level children of `root` belonging to one allocation class, in
/// configuration order.
///
/// Holes and indirect vdevs never appear.  Callers print a section header
/// only when the returned list is non-empty, so empty sections vanish
/// without any state threaded through the traversal.
pub fn class_members(
    root: &VdevNode,
    class: AllocClass,
) -> Vec<&VdevNode> {
    root.children
        .iter()
        .filter(|c| !c.is_hole() && !c.is_indirect() && c.class == class)
        .collect()
}

/// The width of the widest name in the tree, with indentation.
///
/// Children, spares, and cache devices all indent two columns per level.
/// The result never falls below `min`.
pub fn max_width(
    node: &VdevNode,
    depth: usize,
    min: usize,
    style: NameStyle,
) -> usize {
    let mut max = min.max(name_of(node, style).len() + depth);
    for child in node
        .children
        .iter()
        .chain(node.spares.iter())
        .chain(node.cache.iter())
        .filter(|c| !c.is_hole() && !c.is_indirect())
    {
        max = max_width(child, depth + 2, max, style);
    }
    max
}

fn leaf_unhealthy(vs: &VdevStats, include_slow_ios: bool) -> bool {
    vs.read_errors > 0
        || vs.write_errors > 0
        || vs.checksum_errors > 0
        || vs.health() != "ONLINE"
        || (include_slow_ios && vs.slow_ios > 0)
}

/// Whether every leaf beneath `node` (inclusive) passes the health check.
///
/// Drives unhealthy-only pruning: a subtree is elided iff this returns
/// true.  A leaf with no statistics counts as unhealthy, since nothing can
/// be said in its favor.
pub fn is_healthy_subtree(node: &VdevNode, include_slow_ios: bool) -> bool {
    if node.is_leaf() {
        match &node.stats {
            Some(vs) => !leaf_unhealthy(vs, include_slow_ios),
            None => false,
        }
    } else {
        node.children
            .iter()
            .filter(|c| !c.is_hole() && !c.is_indirect())
            .all(|c| is_healthy_subtree(c, include_slow_ios))
    }
}

/// Whether this one node answers to a name a user might type: guid, full
/// path, path basename, or type-id name like "mirror-0".
///
/// Deliberately not transitive: naming a vdev selects it alone, never its
/// parent or children.
pub fn token_matches(node: &VdevNode, token: &str) -> bool {
    if token.parse::<Guid>().ok() == Some(node.guid) {
        return true;
    }
    if let Some(p) = &node.path {
        if p == token || p.rsplit('/').next() == Some(token) {
            return true;
        }
    }
    name_of(node, NameStyle::tree()) == token
}

/// Look up a vdev within one tree by any of the names a user might type
pub fn find_vdev(root: &VdevNode, token: &str) -> Option<Guid> {
    root.iter()
        .filter(|n| !n.is_hole())
        .find(|n| token_matches(n, token))
        .map(|n| n.guid)
}

/// Where pool configurations come from during argument resolution.
/// The CLI implements this over the daemon connection.
#[cfg_attr(test, automock)]
pub trait PoolSource {
    fn pool_names(&self) -> Result<Vec<String>>;

    /// Resolve a vdev name within one pool
    fn vdev_guid(&self, pool: &str, token: &str) -> Result<Option<Guid>>;
}

/// What a positional CLI argument turned out to be
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Pool,
    VdevInPool,
    /// A vdev, but of a pool other than the one being operated on
    VdevInOtherPool(String),
    Unknown,
}

/// Classify one positional argument.
///
/// `pool` narrows the vdev search to one pool; arguments that only resolve
/// elsewhere are reported as such so the caller can print a useful
/// complaint.  Also used to decide whether a trailing numeric argument is
/// an interval or a vdev named by its guid.
pub fn classify_token<S: PoolSource + ?Sized>(
    src: &S,
    pool: Option<&str>,
    token: &str,
) -> Result<TokenKind> {
    let pools = src.pool_names()?;
    if pools.iter().any(|p| p == token) {
        return Ok(TokenKind::Pool);
    }
    match pool {
        Some(p) => {
            if src.vdev_guid(p, token)?.is_some() {
                return Ok(TokenKind::VdevInPool);
            }
            for other in pools.iter().filter(|o| o.as_str() != p) {
                if src.vdev_guid(other, token)?.is_some() {
                    return Ok(TokenKind::VdevInOtherPool(other.clone()));
                }
            }
        }
        None => {
            for p in &pools {
                if src.vdev_guid(p, token)?.is_some() {
                    return Ok(TokenKind::VdevInPool);
                }
            }
        }
    }
    Ok(TokenKind::Unknown)
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::vdev::{VdevKind, VdevState};

    fn disk(guid: u64, path: &str) -> VdevNode {
        VdevNode {
            kind: VdevKind::Disk,
            guid: Guid(guid),
            path: Some(path.to_owned()),
            stats: Some(VdevStats {
                state: VdevState::Healthy,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn mirror(guid: u64, id: u64, children: Vec<VdevNode>) -> VdevNode {
        VdevNode {
            kind: VdevKind::Mirror,
            guid: Guid(guid),
            id,
            children,
            ..Default::default()
        }
    }

    /// tank with one mirror of two disks plus a log, a dedup, a hole, and
    /// an indirect child
    fn sample_tree() -> VdevNode {
        VdevNode {
            kind: VdevKind::Root,
            guid: Guid(1),
            children: vec![
                mirror(2, 0, vec![disk(3, "/dev/da0"),
                                  disk(4, "/dev/da1")]),
                VdevNode {
                    kind: VdevKind::Hole,
                    guid: Guid(5),
                    id: 1,
                    ..Default::default()
                },
                VdevNode {
                    kind: VdevKind::Indirect,
                    guid: Guid(6),
                    id: 2,
                    ..Default::default()
                },
                VdevNode {
                    class: AllocClass::Log,
                    ..disk(7, "/dev/da2")
                },
                VdevNode {
                    class: AllocClass::Dedup,
                    ..disk(8, "/dev/da3")
                },
            ],
            spares: vec![disk(9, "/dev/da4")],
            ..Default::default()
        }
    }

    mod sections {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn classes_partition_the_children() {
            let root = sample_tree();
            let normal = class_members(&root, AllocClass::Normal);
            assert_eq!(1, normal.len());
            assert_eq!(Guid(2), normal[0].guid);
            let logs = class_members(&root, AllocClass::Log);
            assert_eq!(1, logs.len());
            assert_eq!(Guid(7), logs[0].guid);
            let dedup = class_members(&root, AllocClass::Dedup);
            assert_eq!(1, dedup.len());
            // empty section => no members => caller prints no header
            assert!(class_members(&root, AllocClass::Special).is_empty());
        }

        #[test]
        fn holes_and_indirect_are_invisible() {
            let root = sample_tree();
            for class in [
                AllocClass::Normal,
                AllocClass::Log,
                AllocClass::Dedup,
                AllocClass::Special,
            ] {
                for m in class_members(&root, class) {
                    assert!(!m.is_hole());
                    assert!(!m.is_indirect());
                }
            }
        }
    }

    mod width {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn widest_indented_name_wins() {
            let root = VdevNode {
                kind: VdevKind::Root,
                path: None,
                children: vec![mirror(
                    2,
                    0,
                    vec![disk(3, "/dev/da0"), disk(4, "/dev/da1")],
                )],
                ..Default::default()
            };
            // "mirror-0" at depth 2 => 10; the leaves at depth 4 are only 7
            assert_eq!(10, max_width(&root, 0, 0, NameStyle::tree()));
        }

        #[test]
        fn floor_is_respected() {
            let root = disk(1, "/dev/da0");
            assert_eq!(10, max_width(&root, 0, 10, NameStyle::tree()));
        }

        #[test]
        fn spares_and_cache_indent_too() {
            let root = VdevNode {
                kind: VdevKind::Root,
                spares: vec![disk(2, "/dev/a-rather-long-name")],
                ..Default::default()
            };
            // 18 + 2 indent
            assert_eq!(20, max_width(&root, 0, 0, NameStyle::tree()));
        }
    }

    mod health {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn all_leaves_healthy() {
            let root = sample_tree();
            assert!(is_healthy_subtree(&root, false));
        }

        #[test]
        fn checksum_errors_count() {
            let mut root = sample_tree();
            root.children[0].children[1]
                .stats
                .as_mut()
                .unwrap()
                .checksum_errors = 1;
            assert!(!is_healthy_subtree(&root, false));
            // but the sibling mirror leaf alone is fine
            assert!(is_healthy_subtree(
                &root.children[0].children[0],
                false
            ));
        }

        #[test]
        fn slow_ios_only_when_asked() {
            let mut root = sample_tree();
            root.children[0].children[0]
                .stats
                .as_mut()
                .unwrap()
                .slow_ios = 5;
            assert!(is_healthy_subtree(&root, false));
            assert!(!is_healthy_subtree(&root, true));
        }

        #[test]
        fn degraded_state_counts() {
            let mut root = sample_tree();
            root.children[0].children[0].stats.as_mut().unwrap().state =
                VdevState::Degraded;
            assert!(!is_healthy_subtree(&root, false));
        }

        #[test]
        fn missing_stats_are_unhealthy() {
            let mut root = sample_tree();
            root.children[0].children[0].stats = None;
            assert!(!is_healthy_subtree(&root, false));
        }
    }

    mod lookup {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn by_basename_path_guid_and_type_id() {
            let root = sample_tree();
            assert_eq!(Some(Guid(3)), find_vdev(&root, "da0"));
            assert_eq!(Some(Guid(3)), find_vdev(&root, "/dev/da0"));
            assert_eq!(Some(Guid(4)), find_vdev(&root, "4"));
            assert_eq!(Some(Guid(2)), find_vdev(&root, "mirror-0"));
            assert_eq!(Some(Guid(9)), find_vdev(&root, "da4"));
            assert_eq!(None, find_vdev(&root, "da9"));
        }

        // Naming a leaf must not select its enclosing mirror, and naming
        // the mirror must not select its leaves.
        #[test]
        fn match_is_per_node_not_per_subtree() {
            let root = sample_tree();
            let m = &root.children[0];
            assert!(token_matches(m, "mirror-0"));
            assert!(!token_matches(m, "da0"));
            assert!(token_matches(&m.children[0], "da0"));
            assert!(!token_matches(&m.children[1], "da0"));
            assert!(!token_matches(&m.children[0], "mirror-0"));
        }
    }

    mod classify {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn pool_name_wins() {
            let mut src = MockPoolSource::new();
            src.expect_pool_names()
                .return_const(Ok(vec!["tank".to_owned()]));
            let kind = classify_token(&src, None, "tank").unwrap();
            assert_eq!(TokenKind::Pool, kind);
        }

        #[test]
        fn vdev_in_scoped_pool() {
            let mut src = MockPoolSource::new();
            src.expect_pool_names()
                .return_const(Ok(vec!["tank".to_owned()]));
            src.expect_vdev_guid()
                .withf(|p, t| p == "tank" && t == "da0")
                .return_const(Ok(Some(Guid(3))));
            let kind = classify_token(&src, Some("tank"), "da0").unwrap();
            assert_eq!(TokenKind::VdevInPool, kind);
        }

        #[test]
        fn vdev_of_another_pool_is_called_out() {
            let mut src = MockPoolSource::new();
            src.expect_pool_names().return_const(Ok(vec![
                "tank".to_owned(),
                "dozer".to_owned(),
            ]));
            src.expect_vdev_guid()
                .withf(|p, t| p == "tank" && t == "da8")
                .return_const(Ok(None));
            src.expect_vdev_guid()
                .withf(|p, t| p == "dozer" && t == "da8")
                .return_const(Ok(Some(Guid(77))));
            let kind = classify_token(&src, Some("tank"), "da8").unwrap();
            assert_eq!(
                TokenKind::VdevInOtherPool("dozer".to_owned()),
                kind
            );
        }

        #[test]
        fn unknown_token() {
            let mut src = MockPoolSource::new();
            src.expect_pool_names()
                .return_const(Ok(vec!["tank".to_owned()]));
            src.expect_vdev_guid().return_const(Ok(None));
            let kind = classify_token(&src, None, "nonesuch").unwrap();
            assert_eq!(TokenKind::Unknown, kind);
        }
    }
}
