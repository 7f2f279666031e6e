//! VIP ownership types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of resolution attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// VRRP-style role of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeRole {
    /// Node currently owns the VIP
    Master,
    /// Node does not own the VIP
    Backup,
}

impl NodeRole {
    /// Role implied by VIP ownership
    pub fn from_has_vip(has_vip: bool) -> Self {
        if has_vip { NodeRole::Master } else { NodeRole::Backup }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "MASTER",
            NodeRole::Backup => "BACKUP",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MASTER" => Ok(NodeRole::Master),
            "BACKUP" => Ok(NodeRole::Backup),
            other => Err(format!("unknown node role: {other}")),
        }
    }
}

/// Which node the pair as a whole treats as master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveRole {
    Primary,
    Secondary,
    None,
}

impl fmt::Display for ActiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveRole::Primary => write!(f, "primary"),
            ActiveRole::Secondary => write!(f, "secondary"),
            ActiveRole::None => write!(f, "none"),
        }
    }
}

/// Observed VIP ownership.
///
/// At most one flag is true under correct operation. Both false means no node
/// advertises the VIP; both true is split-brain and must be reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipOwnership {
    pub primary_has_vip: bool,
    pub secondary_has_vip: bool,
}

impl VipOwnership {
    pub fn primary() -> Self {
        Self {
            primary_has_vip: true,
            secondary_has_vip: false,
        }
    }

    pub fn secondary() -> Self {
        Self {
            primary_has_vip: false,
            secondary_has_vip: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Both nodes claim the VIP
    pub fn is_split_brain(&self) -> bool {
        self.primary_has_vip && self.secondary_has_vip
    }

    /// Active role, primary first when both flags are set
    pub fn active_role(&self) -> ActiveRole {
        if self.primary_has_vip {
            ActiveRole::Primary
        } else if self.secondary_has_vip {
            ActiveRole::Secondary
        } else {
            ActiveRole::None
        }
    }
}

/// Result of one `resolve` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VipResolution {
    pub ownership: VipOwnership,

    /// Attempts spent, including the successful one
    pub attempts: u32,

    /// Both nodes reported the VIP's link-layer address
    pub shared_lladdr: bool,
}

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Attempts before concluding nobody owns the VIP
    pub max_retries: u32,

    /// Pause between attempts when the VIP has no neighbor entry
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Pause after priming so the neighbor table can populate
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Port used for the priming connect
    pub prime_port: u16,

    /// Timeout of the priming connect
    #[serde(with = "humantime_serde")]
    pub prime_timeout: Duration,

    /// Timeout of one neighbor table lookup
    #[serde(with = "humantime_serde")]
    pub lookup_timeout: Duration,

    /// `ip` binary used to read the neighbor table
    pub ip_binary: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_secs(1),
            settle_delay: Duration::from_millis(200),
            prime_port: 80,
            prime_timeout: Duration::from_secs(1),
            lookup_timeout: Duration::from_secs(2),
            ip_binary: "ip".to_string(),
        }
    }
}

impl ResolverConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        if self.ip_binary.trim().is_empty() {
            return Err("ip_binary is required".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_role() {
        assert_eq!(VipOwnership::primary().active_role(), ActiveRole::Primary);
        assert_eq!(VipOwnership::secondary().active_role(), ActiveRole::Secondary);
        assert_eq!(VipOwnership::none().active_role(), ActiveRole::None);

        let both = VipOwnership {
            primary_has_vip: true,
            secondary_has_vip: true,
        };
        assert!(both.is_split_brain());
        assert_eq!(both.active_role(), ActiveRole::Primary);
    }

    #[test]
    fn test_node_role_display() {
        assert_eq!(NodeRole::from_has_vip(true).to_string(), "MASTER");
        assert_eq!(NodeRole::from_has_vip(false).to_string(), "BACKUP");
        assert_eq!("master".parse::<NodeRole>(), Ok(NodeRole::Master));
        assert!("FAULT".parse::<NodeRole>().is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ResolverConfig::default();
        assert!(config.validate().is_ok());

        config.max_retries = 0;
        assert!(config.validate().is_err());
    }
}
