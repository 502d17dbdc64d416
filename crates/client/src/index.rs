//! Package index for the computed upgrade list.

use std::collections::HashMap;

use pacnotify_protocol::{ItemProgress, PackageChange, ProgressKind};

/// The computed changes, in list order, addressable by package name.
#[derive(Debug, Default, Clone)]
pub struct PackageIndex {
    changes: Vec<PackageChange>,
    by_name: HashMap<String, usize>,
}

impl PackageIndex {
    pub fn new(changes: Vec<PackageChange>) -> Self {
        let by_name = changes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { changes, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&PackageChange> {
        self.by_name.get(name).map(|&i| &self.changes[i])
    }

    pub fn changes(&self) -> &[PackageChange] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changed package names joined by spaces.
    pub fn names(&self) -> String {
        self.changes
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Human-readable text for a progress report.
    pub fn describe(&self, progress: &ItemProgress) -> String {
        let verb = match progress.kind {
            ProgressKind::AddStart => "installing",
            ProgressKind::UpgradeStart => "upgrading",
            ProgressKind::DowngradeStart => "downgrading",
            ProgressKind::ReinstallStart => "reinstalling",
            ProgressKind::RemoveStart => "removing",
            ProgressKind::ConflictsStart => return "checking for file conflicts".into(),
            ProgressKind::DiskspaceStart => return "checking available disk space".into(),
            ProgressKind::IntegrityStart => return "checking package integrity".into(),
            ProgressKind::LoadStart => return "loading package files".into(),
            ProgressKind::KeyringStart => return "checking keys in keyring".into(),
        };

        let versions = match self.get(&progress.package) {
            Some(c) if c.is_removal() => format!(" {}", c.old_version),
            Some(c) if c.is_new_install() => format!(" {}", c.new_version),
            Some(c) => format!(" {} -> {}", c.old_version, c.new_version),
            None => String::new(),
        };
        format!(
            "({}/{}) {verb} {}{versions}",
            progress.current, progress.howmany, progress.package
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(name: &str, old: &str, new: &str) -> PackageChange {
        PackageChange {
            repo: Some("core".into()),
            name: name.into(),
            description: String::new(),
            old_version: old.into(),
            new_version: new.into(),
            download_size: 0,
            old_size: 0,
            new_size: 0,
        }
    }

    fn index() -> PackageIndex {
        PackageIndex::new(vec![
            change("bash", "5.2-1", "5.2-2"),
            change("zstd", PackageChange::NO_VERSION, "1.5.6-1"),
            change("oldlib", "0.9-3", PackageChange::REMOVED_VERSION),
        ])
    }

    fn item(kind: ProgressKind, package: &str, current: usize) -> ItemProgress {
        ItemProgress {
            kind,
            package: package.into(),
            percent: 0,
            howmany: 3,
            current,
        }
    }

    #[test]
    fn lookup_and_names_keep_list_order() {
        let index = index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("zstd").unwrap().new_version, "1.5.6-1");
        assert!(index.get("glibc").is_none());
        assert_eq!(index.names(), "bash zstd oldlib");
    }

    #[test]
    fn describes_package_operations() {
        let index = index();
        assert_eq!(
            index.describe(&item(ProgressKind::UpgradeStart, "bash", 1)),
            "(1/3) upgrading bash 5.2-1 -> 5.2-2"
        );
        assert_eq!(
            index.describe(&item(ProgressKind::AddStart, "zstd", 2)),
            "(2/3) installing zstd 1.5.6-1"
        );
        assert_eq!(
            index.describe(&item(ProgressKind::RemoveStart, "oldlib", 3)),
            "(3/3) removing oldlib 0.9-3"
        );
        assert_eq!(
            index.describe(&item(ProgressKind::IntegrityStart, "", 1)),
            "checking package integrity"
        );
    }
}
