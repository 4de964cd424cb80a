//! Global CLI options.

use std::str::FromStr;

use clap::Args;

const DEFAULT_KERNELS: [&str; 2] = ["csharp:dotnet", "fsharp:dotnet"];

/// Options shared by every command. Kernel layout options can also be set
/// through `WEAVE_*` environment variables.
#[derive(Args, Debug, Clone)]
pub struct WeaveOpts {
    /// Local kernel as NAME or NAME:RUNTIME; repeatable (default: csharp and fsharp sharing the dotnet runtime)
    #[arg(short = 'k', long = "kernel", global = true, value_name = "NAME[:RUNTIME]")]
    pub kernels: Vec<KernelSpec>,

    /// Remote kernel served by a child process speaking NDJSON, as NAME=COMMAND
    #[arg(long = "remote", global = true, value_name = "NAME=COMMAND")]
    pub remotes: Vec<RemoteSpec>,

    /// Kernel receiving code without a `#!kernel` selector (env: WEAVE_DEFAULT_KERNEL)
    #[arg(long, global = true, env = "WEAVE_DEFAULT_KERNEL")]
    pub default_kernel: Option<String>,

    /// Proxied request timeout in milliseconds, 0 for none (env: WEAVE_REQUEST_TIMEOUT_MS)
    #[arg(long, global = true, env = "WEAVE_REQUEST_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

impl WeaveOpts {
    pub fn kernel_specs(&self) -> Vec<KernelSpec> {
        if !self.kernels.is_empty() {
            return self.kernels.clone();
        }
        DEFAULT_KERNELS
            .iter()
            .filter_map(|spec| spec.parse().ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSpec {
    pub name: String,
    pub runtime: Option<String>,
}

impl FromStr for KernelSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, runtime) = match s.split_once(':') {
            Some((name, runtime)) => (name, Some(runtime.to_string())),
            None => (s, None),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(format!("invalid kernel name '{name}'"));
        }
        Ok(Self {
            name: name.to_string(),
            runtime: runtime.filter(|r| !r.is_empty()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl FromStr for RemoteSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, command) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=COMMAND, got '{s}'"))?;
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| format!("remote kernel '{name}' has no command"))?;
        Ok(Self {
            name: name.trim().to_string(),
            program,
            args: words.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_spec_with_runtime() {
        let spec: KernelSpec = "fsharp:dotnet".parse().unwrap();
        assert_eq!(spec.name, "fsharp");
        assert_eq!(spec.runtime.as_deref(), Some("dotnet"));
        assert!("".parse::<KernelSpec>().is_err());
    }

    #[test]
    fn remote_spec_splits_command() {
        let spec: RemoteSpec = "js=weave serve --kernel javascript".parse().unwrap();
        assert_eq!(spec.name, "js");
        assert_eq!(spec.program, "weave");
        assert_eq!(spec.args, ["serve", "--kernel", "javascript"]);
        assert!("js=".parse::<RemoteSpec>().is_err());
    }
}
