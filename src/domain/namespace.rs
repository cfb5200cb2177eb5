use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An independent order subsystem settling through the shared gateway account.
///
/// Each subsystem stamps its own literal prefix onto every reference it
/// creates. References carrying no known marker belong to `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Generic,
    Bulk,
    Clothing,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Generic, Namespace::Bulk, Namespace::Clothing];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Generic => "generic",
            Namespace::Bulk => "bulk",
            Namespace::Clothing => "clothing",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Generic => "PAY-",
            Namespace::Bulk => "BULK-",
            Namespace::Clothing => "CLOTH-",
        }
    }

    /// Where the subsystem mounts its payment endpoints.
    pub fn base_path(self) -> &'static str {
        match self {
            Namespace::Generic => "/payment",
            Namespace::Bulk => "/bulk/payment",
            Namespace::Clothing => "/clothing/payment",
        }
    }

    pub fn is_default(self) -> bool {
        self == Namespace::Generic
    }

    /// Owning subsystem of a reference. Never fails: unmarked references fall
    /// through to the default subsystem.
    pub fn classify(reference: &str) -> Namespace {
        Namespace::ALL
            .into_iter()
            .filter(|ns| !ns.is_default())
            .find(|ns| reference.starts_with(ns.prefix()))
            .unwrap_or(Namespace::Generic)
    }

    pub fn new_reference(self) -> String {
        format!(
            "{}{}",
            self.prefix(),
            Uuid::new_v4().simple().to_string().to_uppercase()
        )
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(Namespace::Generic),
            "bulk" => Ok(Namespace::Bulk),
            "clothing" => Ok(Namespace::Clothing),
            other => Err(format!("unknown order namespace '{}'", other)),
        }
    }
}
