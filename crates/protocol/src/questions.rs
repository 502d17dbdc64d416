use std::fmt;

use serde::{Deserialize, Serialize};

/// A package that can satisfy a dependency in a provider selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub repo: String,
    pub name: String,
    pub version: String,
}

/// A question the package engine asks in the middle of a transaction.
///
/// Only one question can be outstanding at a time. The engine thread is
/// suspended until the client answers, the question is abandoned, or the
/// upgrade is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
    /// Install a package listed in the ignore list anyway?
    InstallIgnored { package: String },
    /// Replace an installed package with another one?
    Replace {
        old_package: String,
        new_package: String,
        repo: String,
    },
    /// Two packages conflict; remove `remove` to install `install`?
    Conflict {
        install: String,
        remove: String,
        reason: String,
    },
    /// Skip packages whose dependencies cannot be satisfied?
    RemovePackages { packages: Vec<String> },
    /// Pick one of several providers for a dependency.
    SelectProvider {
        dependency: String,
        providers: Vec<ProviderCandidate>,
    },
    /// Delete a corrupted package file from the cache?
    CorruptedPackage { file: String, reason: String },
    /// Import a missing PGP key?
    ImportKey {
        fingerprint: String,
        uid: String,
        created: i64,
    },
}

/// Discriminant of [`Question`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    InstallIgnored,
    Replace,
    Conflict,
    RemovePackages,
    SelectProvider,
    CorruptedPackage,
    ImportKey,
}

impl QuestionKind {
    /// The answer used when nobody answers.
    ///
    /// Everything is declined except deleting a corrupted package file;
    /// provider selection takes the first candidate.
    pub fn default_answer(&self) -> Answer {
        match self {
            QuestionKind::SelectProvider => Answer::Provider(0),
            QuestionKind::CorruptedPackage => Answer::Confirm(true),
            QuestionKind::InstallIgnored
            | QuestionKind::Replace
            | QuestionKind::Conflict
            | QuestionKind::RemovePackages
            | QuestionKind::ImportKey => Answer::Confirm(false),
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionKind::InstallIgnored => "install_ignored",
            QuestionKind::Replace => "replace",
            QuestionKind::Conflict => "conflict",
            QuestionKind::RemovePackages => "remove_packages",
            QuestionKind::SelectProvider => "select_provider",
            QuestionKind::CorruptedPackage => "corrupted_package",
            QuestionKind::ImportKey => "import_key",
        };
        f.write_str(name)
    }
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        match self {
            Question::InstallIgnored { .. } => QuestionKind::InstallIgnored,
            Question::Replace { .. } => QuestionKind::Replace,
            Question::Conflict { .. } => QuestionKind::Conflict,
            Question::RemovePackages { .. } => QuestionKind::RemovePackages,
            Question::SelectProvider { .. } => QuestionKind::SelectProvider,
            Question::CorruptedPackage { .. } => QuestionKind::CorruptedPackage,
            Question::ImportKey { .. } => QuestionKind::ImportKey,
        }
    }

    pub fn default_answer(&self) -> Answer {
        self.kind().default_answer()
    }

    /// Short human-readable prompt for the question.
    pub fn prompt(&self) -> String {
        match self {
            Question::InstallIgnored { package } => {
                format!("{package} is in IgnorePkg/IgnoreGroup. Install anyway?")
            }
            Question::Replace {
                old_package,
                new_package,
                repo,
            } => format!("Replace {old_package} with {repo}/{new_package}?"),
            Question::Conflict {
                install,
                remove,
                reason,
            } if reason.is_empty() => {
                format!("{install} and {remove} are in conflict. Remove {remove}?")
            }
            Question::Conflict {
                install,
                remove,
                reason,
            } => format!("{install} and {remove} are in conflict ({reason}). Remove {remove}?"),
            Question::RemovePackages { packages } => format!(
                "The following packages cannot be upgraded due to unresolvable dependencies: {}. \
                 Skip them for this upgrade?",
                packages.join(", ")
            ),
            Question::SelectProvider {
                dependency,
                providers,
            } => format!(
                "There are {} providers available for {dependency}",
                providers.len()
            ),
            Question::CorruptedPackage { file, reason } => {
                format!("File {file} is corrupted ({reason}). Delete it?")
            }
            Question::ImportKey {
                fingerprint, uid, ..
            } => format!("Import PGP key {fingerprint}, \"{uid}\"?"),
        }
    }
}

/// The client's reply to a [`Question`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    /// Yes/no answer for every kind except provider selection.
    Confirm(bool),
    /// Index into the provider list.
    Provider(usize),
}

impl Answer {
    /// Returns `true` if this answer has the shape `kind` expects.
    pub fn fits(&self, kind: QuestionKind) -> bool {
        match self {
            Answer::Provider(_) => kind == QuestionKind::SelectProvider,
            Answer::Confirm(_) => kind != QuestionKind::SelectProvider,
        }
    }

    /// The yes/no value, treating a provider index as "no".
    pub fn confirmed(&self) -> bool {
        matches!(self, Answer::Confirm(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_answers() {
        assert_eq!(
            QuestionKind::InstallIgnored.default_answer(),
            Answer::Confirm(false)
        );
        assert_eq!(QuestionKind::Replace.default_answer(), Answer::Confirm(false));
        assert_eq!(QuestionKind::Conflict.default_answer(), Answer::Confirm(false));
        assert_eq!(
            QuestionKind::RemovePackages.default_answer(),
            Answer::Confirm(false)
        );
        assert_eq!(
            QuestionKind::SelectProvider.default_answer(),
            Answer::Provider(0)
        );
        assert_eq!(
            QuestionKind::CorruptedPackage.default_answer(),
            Answer::Confirm(true)
        );
        assert_eq!(QuestionKind::ImportKey.default_answer(), Answer::Confirm(false));
    }

    #[test]
    fn question_is_tagged_by_kind() {
        let q = Question::Replace {
            old_package: "foo".into(),
            new_package: "foo-ng".into(),
            repo: "extra".into(),
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["kind"], "replace");
        assert_eq!(json["old_package"], "foo");
        assert_eq!(q.kind(), QuestionKind::Replace);
    }

    #[test]
    fn question_deserializes_provider_list() {
        let json = r#"{
            "kind": "select_provider",
            "dependency": "java-runtime",
            "providers": [
                {"repo": "extra", "name": "jre-openjdk", "version": "21-1"},
                {"repo": "extra", "name": "jre17-openjdk", "version": "17-1"}
            ]
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        match &q {
            Question::SelectProvider { providers, .. } => assert_eq!(providers.len(), 2),
            other => panic!("unexpected question: {other:?}"),
        }
        assert_eq!(q.default_answer(), Answer::Provider(0));
    }

    #[test]
    fn answer_shape_must_match_kind() {
        assert!(Answer::Provider(1).fits(QuestionKind::SelectProvider));
        assert!(!Answer::Provider(1).fits(QuestionKind::Replace));
        assert!(Answer::Confirm(true).fits(QuestionKind::ImportKey));
        assert!(!Answer::Confirm(true).fits(QuestionKind::SelectProvider));
    }

    #[test]
    fn answer_wire_format() {
        assert_eq!(
            serde_json::to_string(&Answer::Confirm(true)).unwrap(),
            r#"{"confirm":true}"#
        );
        let a: Answer = serde_json::from_str(r#"{"provider":3}"#).unwrap();
        assert_eq!(a, Answer::Provider(3));
    }

    #[test]
    fn kind_display_matches_serde() {
        let json = serde_json::to_string(&QuestionKind::CorruptedPackage).unwrap();
        assert_eq!(json, format!("\"{}\"", QuestionKind::CorruptedPackage));
    }

    #[test]
    fn prompt_mentions_payload() {
        let q = Question::InstallIgnored {
            package: "linux".into(),
        };
        assert!(q.prompt().contains("linux"));

        let conflict = Question::Conflict {
            install: "a".into(),
            remove: "b".into(),
            reason: String::new(),
        };
        assert_eq!(conflict.prompt(), "a and b are in conflict. Remove b?");
    }
}
