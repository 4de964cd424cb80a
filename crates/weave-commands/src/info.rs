use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::CommandKind;

/// Identity and advertised capabilities of a kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_name: Option<String>,
    /// Kernels with the same runtime can exchange native values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default)]
    pub supported_commands: BTreeSet<CommandKind>,
}

impl KernelInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_name: None,
            runtime: None,
            supported_commands: BTreeSet::new(),
        }
    }

    pub fn with_language(mut self, language_name: impl Into<String>) -> Self {
        self.language_name = Some(language_name.into());
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    pub fn with_commands(mut self, kinds: impl IntoIterator<Item = CommandKind>) -> Self {
        self.supported_commands.extend(kinds);
        self
    }

    pub fn supports(&self, kind: CommandKind) -> bool {
        self.supported_commands.contains(&kind)
    }

    pub fn shares_runtime_with(&self, other: &KernelInfo) -> bool {
        matches!((&self.runtime, &other.runtime), (Some(a), Some(b)) if a == b)
    }
}
