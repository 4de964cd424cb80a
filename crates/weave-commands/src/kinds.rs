use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Identifies a command variant. Routing tables and capability lists are keyed
/// by kind, so adding a variant leaves existing entries valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    SubmitCode,
    RequestInput,
    RequestValue,
    RequestValueInfos,
    SendValue,
    SendEditableCode,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::SubmitCode,
        CommandKind::RequestInput,
        CommandKind::RequestValue,
        CommandKind::RequestValueInfos,
        CommandKind::SendValue,
        CommandKind::SendEditableCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SubmitCode => "SubmitCode",
            CommandKind::RequestInput => "RequestInput",
            CommandKind::RequestValue => "RequestValue",
            CommandKind::RequestValueInfos => "RequestValueInfos",
            CommandKind::SendValue => "SendValue",
            CommandKind::SendEditableCode => "SendEditableCode",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown command kind '{0}'")]
pub struct UnknownCommandKind(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommandKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownCommandKind(s.to_owned()))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CommandKind {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for kind in CommandKind::ALL {
            assert_eq!(kind.as_str().parse::<CommandKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "Quit".parse::<CommandKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown command kind 'Quit'");
    }

    #[test]
    fn serializes_as_plain_name() {
        let json = serde_json::to_string(&CommandKind::RequestValueInfos).unwrap();
        assert_eq!(json, "\"RequestValueInfos\"");
    }
}
