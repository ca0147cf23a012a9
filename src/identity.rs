//! Host identification, sent once to each newly-admitted subscriber.

use serde::Serialize;
use sysinfo::System;

/// Platform descriptor delivered as the `host-identity` event.
#[derive(Debug, Clone, Serialize)]
pub struct HostIdentity {
    pub hostname: Option<String>,
    pub os: String,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub architecture: String,
    pub cpu_count: usize,
}

impl HostIdentity {
    pub fn discover() -> Self {
        Self {
            hostname: System::host_name(),
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version(),
            kernel_version: System::kernel_version(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_fills_platform_fields() {
        let identity = HostIdentity::discover();
        assert!(!identity.os.is_empty());
        assert!(!identity.architecture.is_empty());
        assert!(identity.cpu_count >= 1);
    }
}
