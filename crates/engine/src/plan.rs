use pacnotify_protocol::PackageChange;
use serde::{Deserialize, Serialize};

/// An installed package as the local database knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub installed_size: u64,
}

/// A package the transaction installs or upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPackage {
    pub repo: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub download_size: u64,
    #[serde(default)]
    pub installed_size: u64,
    /// Currently installed version of the same package, if any.
    #[serde(default)]
    pub local: Option<InstalledPackage>,
}

/// Result of a successful prepare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    #[serde(default)]
    pub additions: Vec<PlannedPackage>,
    #[serde(default)]
    pub removals: Vec<InstalledPackage>,
    /// Bytes the commit will download.
    #[serde(default)]
    pub total_download: u64,
}

impl TransactionPlan {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Flattens the plan into wire records, additions first.
    pub fn changes(&self) -> Vec<PackageChange> {
        let additions = self.additions.iter().map(|pkg| {
            let (old_version, old_size) = match &pkg.local {
                Some(local) => (local.version.clone(), local.installed_size),
                None => (PackageChange::NO_VERSION.to_string(), 0),
            };
            PackageChange {
                repo: Some(pkg.repo.clone()),
                name: pkg.name.clone(),
                description: pkg.description.clone(),
                old_version,
                new_version: pkg.version.clone(),
                download_size: pkg.download_size,
                old_size,
                new_size: pkg.installed_size,
            }
        });
        let removals = self.removals.iter().map(|pkg| PackageChange {
            repo: None,
            name: pkg.name.clone(),
            description: pkg.description.clone(),
            old_version: pkg.version.clone(),
            new_version: PackageChange::REMOVED_VERSION.to_string(),
            download_size: 0,
            old_size: pkg.installed_size,
            new_size: 0,
        });
        additions.chain(removals).collect()
    }
}
