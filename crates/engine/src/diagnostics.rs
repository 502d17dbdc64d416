//! Per-cause failure details for prepare and commit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version constraint operator of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepModifier {
    Any,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
}

impl DepModifier {
    fn as_str(&self) -> &'static str {
        match self {
            DepModifier::Any => "",
            DepModifier::Eq => "=",
            DepModifier::Ge => ">=",
            DepModifier::Le => "<=",
            DepModifier::Gt => ">",
            DepModifier::Lt => "<",
        }
    }
}

/// A dependency as written in package metadata, e.g. `glibc>=2.38`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default = "any_modifier")]
    pub modifier: DepModifier,
    #[serde(default)]
    pub version: String,
}

fn any_modifier() -> DepModifier {
    DepModifier::Any
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifier == DepModifier::Any || self.version.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}{}{}", self.name, self.modifier.as_str(), self.version)
        }
    }
}

/// Why a transaction could not be prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum PrepareDiagnostic {
    InvalidArch {
        package: String,
    },
    UnsatisfiedDep {
        target: String,
        depend: Dependency,
        /// Package whose removal or upgrade breaks the dependency.
        #[serde(default)]
        causing: Option<String>,
    },
    Conflict {
        package1: String,
        package2: String,
        /// Empty when the engine gives no reason.
        #[serde(default)]
        reason: String,
    },
}

impl fmt::Display for PrepareDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareDiagnostic::InvalidArch { package } => {
                write!(f, "invalid architecture: {package}")
            }
            PrepareDiagnostic::UnsatisfiedDep { target, depend, .. } => {
                write!(f, "{target}: requires {depend}")
            }
            PrepareDiagnostic::Conflict {
                package1,
                package2,
                reason,
            } if reason.is_empty() => write!(f, "{package1} and {package2} are in conflict"),
            PrepareDiagnostic::Conflict {
                package1,
                package2,
                reason,
            } => write!(f, "{package1} and {package2} are in conflict ({reason})"),
        }
    }
}

/// Why a commit failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum CommitDiagnostic {
    FileConflict {
        target: String,
        file: String,
        /// Other package owning the file; `None` when the file exists on disk.
        #[serde(default)]
        conflicting: Option<String>,
    },
    InvalidPackage {
        file: String,
    },
}

impl fmt::Display for CommitDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitDiagnostic::FileConflict {
                target,
                file,
                conflicting: None,
            } => write!(f, "{target}: {file} exists in filesystem"),
            CommitDiagnostic::FileConflict {
                target,
                file,
                conflicting: Some(other),
            } => write!(f, "{target}: {file} exists in both {target} and {other}"),
            CommitDiagnostic::InvalidPackage { file } => {
                write!(f, "{file} is invalid or corrupted")
            }
        }
    }
}
