use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use tandem_core::{Error, Result};

/// Visibility of concurrent commits from inside a transaction.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Reads see the latest committed value.
    #[default]
    ReadCommitted,
    /// Reads see the values committed when the transaction began.
    RepeatableRead,
    /// Like `RepeatableRead`, and commit fails if a key read or written was changed meanwhile.
    Serializable,
}

impl IsolationLevel {
    pub fn uses_snapshot(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsolationLevel::ReadCommitted => "ReadCommitted",
            IsolationLevel::RepeatableRead => "RepeatableRead",
            IsolationLevel::Serializable => "Serializable",
        })
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "readcommitted" => IsolationLevel::ReadCommitted,
            "repeatableread" | "snapshot" => IsolationLevel::RepeatableRead,
            "serializable" => IsolationLevel::Serializable,
            _ => {
                return Err(Error::msg(format!(
                    "Unknown isolation level `{}`",
                    value
                )));
            }
        })
    }
}
