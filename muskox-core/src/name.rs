// vim: tw=80
//! Display names for vdevs
//!
//! Every command that prints a tree row goes through [`name_of`], so a vdev
//! is called the same thing everywhere: in status trees, iostat rows, and
//! error messages.

use crate::vdev::{VdevKind, VdevNode};

/// How to render vdev names
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NameStyle {
    /// Print the guid instead of any name
    pub guid: bool,
    /// Print full device paths instead of basenames
    pub full_path: bool,
    /// Resolve symlinks before printing a device path
    pub follow_links: bool,
    /// Append `-<id>` to interior vdev names, e.g. "mirror-0"
    pub type_id: bool,
}

impl NameStyle {
    /// The style used by the status and iostat trees
    pub fn tree() -> Self {
        NameStyle {
            type_id: true,
            ..Default::default()
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Compute the display name of a vdev.
///
/// Sentinel kinds have fixed names that callers use to skip them, and the
/// guid style overrides everything else.  A root vdev answers to "root-0"
/// so it can be addressed like any other vdev.
pub fn name_of(node: &VdevNode, style: NameStyle) -> String {
    if style.guid {
        return node.guid.to_string();
    }
    match &node.kind {
        VdevKind::Hole => "hole".to_owned(),
        VdevKind::Missing => "missing".to_owned(),
        VdevKind::Indirect => "indirect".to_owned(),
        VdevKind::Root => "root-0".to_owned(),
        VdevKind::Disk | VdevKind::File => match &node.path {
            Some(path) => {
                let resolved;
                let mut p = path.as_str();
                if style.follow_links {
                    if let Ok(real) = std::fs::canonicalize(p) {
                        resolved = real.display().to_string();
                        p = &resolved;
                    }
                }
                if style.full_path || node.kind == VdevKind::File {
                    p.to_owned()
                } else {
                    basename(p).to_owned()
                }
            }
            // Leaves always carry a path; tolerate its absence anyway.
            None => node.kind.tag(),
        },
        kind => {
            if style.type_id {
                format!("{}-{}", kind.tag(), node.id)
            } else {
                kind.tag()
            }
        }
    }
}

#[cfg(test)]
mod t {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::{
        types::Guid,
        vdev::{VdevKind, VdevNode},
    };

    fn disk(guid: u64, path: &str) -> VdevNode {
        VdevNode {
            kind: VdevKind::Disk,
            guid: Guid(guid),
            path: Some(path.to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn disk_basename_by_default() {
        let n = disk(42, "/dev/da0");
        assert_eq!("da0", name_of(&n, NameStyle::default()));
    }

    #[test]
    fn disk_full_path() {
        let n = disk(42, "/dev/da0");
        let style = NameStyle {
            full_path: true,
            ..Default::default()
        };
        assert_eq!("/dev/da0", name_of(&n, style));
    }

    #[test]
    fn guid_overrides_everything() {
        let n = disk(42, "/dev/da0");
        let style = NameStyle {
            guid: true,
            full_path: true,
            ..Default::default()
        };
        assert_eq!("42", name_of(&n, style));
    }

    // File vdevs print their whole path even without the full-path style,
    // because a bare basename like "vdev0" identifies nothing.
    #[test]
    fn file_keeps_full_path() {
        let n = VdevNode {
            kind: VdevKind::File,
            path: Some("/var/tmp/vdev0".to_owned()),
            ..Default::default()
        };
        assert_eq!("/var/tmp/vdev0", name_of(&n, NameStyle::default()));
    }

    #[rstest]
    #[case(VdevKind::Mirror, 0, "mirror-0")]
    #[case(VdevKind::RaidZ(2), 1, "raidz2-1")]
    #[case(VdevKind::Replacing, 3, "replacing-3")]
    #[case(VdevKind::Spare, 0, "spare-0")]
    fn interior_type_id(
        #[case] kind: VdevKind,
        #[case] id: u64,
        #[case] expected: &str,
    ) {
        let n = VdevNode {
            kind,
            id,
            ..Default::default()
        };
        assert_eq!(expected, name_of(&n, NameStyle::tree()));
    }

    #[test]
    fn interior_without_type_id() {
        let n = VdevNode {
            kind: VdevKind::Mirror,
            id: 7,
            ..Default::default()
        };
        assert_eq!("mirror", name_of(&n, NameStyle::default()));
    }

    #[rstest]
    #[case(VdevKind::Hole, "hole")]
    #[case(VdevKind::Missing, "missing")]
    #[case(VdevKind::Indirect, "indirect")]
    fn sentinels(#[case] kind: VdevKind, #[case] expected: &str) {
        let n = VdevNode {
            kind,
            id: 5,
            ..Default::default()
        };
        // Sentinel names ignore the type-id style
        assert_eq!(expected, name_of(&n, NameStyle::tree()));
    }

    #[test]
    fn root_is_root_zero() {
        let n = VdevNode::default();
        assert_eq!("root-0", name_of(&n, NameStyle::default()));
    }

    // Same node, same style, same name.  The renderers rely on this when
    // they compute column widths in one pass and print in another.
    #[test]
    fn deterministic() {
        let n = disk(9, "/dev/ada3");
        let style = NameStyle::tree();
        assert_eq!(name_of(&n, style), name_of(&n, style));
    }
}
