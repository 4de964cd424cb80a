use std::time::Duration;

pub const ENV_REQUEST_TIMEOUT_MS: &str = "WEAVE_REQUEST_TIMEOUT_MS";
pub const ENV_DEFAULT_KERNEL: &str = "WEAVE_DEFAULT_KERNEL";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Upper bound on a proxied command's round trip. None waits forever.
    pub request_timeout: Option<Duration>,
    /// Kernel that receives untargeted submissions.
    pub default_kernel: Option<String>,
    pub frontend: FrontendConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            default_kernel: None,
            frontend: FrontendConfig::default(),
        }
    }
}

impl HostConfig {
    /// Defaults overridden by `WEAVE_*` environment variables. A timeout of
    /// `0` disables it; unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = std::env::var(ENV_REQUEST_TIMEOUT_MS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Ok(name) = std::env::var(ENV_DEFAULT_KERNEL) {
            if !name.trim().is_empty() {
                config.default_kernel = Some(name.trim().to_string());
            }
        }
        config
    }
}

/// Where the hosting frontend's kernels live.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub vscode: FrontendKernelConfig,
    pub javascript: FrontendKernelConfig,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            vscode: FrontendKernelConfig {
                name: "vscode".into(),
                uri: "kernel://vscode".into(),
            },
            javascript: FrontendKernelConfig {
                name: "javascript".into(),
                uri: "kernel://webview/javascript".into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrontendKernelConfig {
    /// Local name of the proxy kernel.
    pub name: String,
    pub uri: String,
}
