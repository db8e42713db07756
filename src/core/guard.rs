use crate::core::config::ConfigHandle;

/// Pure predicate deciding whether a command string is permitted to execute.
///
/// Membership is exact-string, arguments included. The guard takes a fresh
/// config snapshot on every call, so a whitelist edit takes effect
/// immediately and retroactively denies commands scheduled before the edit.
#[derive(Clone)]
pub struct WhitelistGuard {
    config: ConfigHandle,
}

impl WhitelistGuard {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.config.snapshot().is_whitelisted(command)
    }

    /// Current whitelist, for operator-facing help output.
    pub fn allowed_commands(&self) -> Vec<String> {
        self.config.snapshot().security.commands_whitelist.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::support;

    #[test]
    fn membership_is_exact() {
        let guard = WhitelistGuard::new(support::config(&["uptime -p", "df -h"], 30));
        assert!(guard.is_allowed("uptime -p"));
        assert!(guard.is_allowed("df -h"));
        assert!(!guard.is_allowed("uptime"));
        assert!(!guard.is_allowed("uptime -p && reboot"));
        assert!(!guard.is_allowed("df"));
    }

    #[test]
    fn whitelist_edits_apply_to_existing_guard() {
        let handle = support::config(&["uptime"], 30);
        let guard = WhitelistGuard::new(handle.clone());
        assert!(guard.is_allowed("uptime"));

        support::swap_whitelist(&handle, &["free -h"]);
        assert!(!guard.is_allowed("uptime"));
        assert!(guard.is_allowed("free -h"));
    }
}
