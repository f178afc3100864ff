//! Pool configuration, fixed at deployment.

use crate::constants::{
    DEFAULT_ACK_GRACE_SECS, DEFAULT_TREE_DEPTH, DEFAULT_WITHDRAWAL_WINDOW_SECS, MAX_WITHDRAWAL_PERIOD_SECS,
};
use crate::error::PoolError;
use crate::deployment::Address;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What the note proof of a `collect` is checked against. Either way the collected
/// commitment is appended, so the collected amount is always backed by a spendable note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectMode {
    /// Well-formedness only. A caller-supplied root, if any, must equal the post-append root.
    #[default]
    Mint,
    /// The caller supplies the current root and the note proof is bound to it.
    Included,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Identifier of the ledger domain this pool lives on.
    pub domain: u32,
    /// The only token the pool takes custody of.
    pub token: Address,
    /// May enroll remote pools for cross-domain withdrawal.
    pub owner: Address,
    /// Deterministic-deployment factory.
    pub factory: Address,
    #[serde(with = "salt_hex")]
    pub deployment_salt: [u8; 32],
    pub tree_depth: u8,
    pub collect_mode: CollectMode,
    pub withdrawal_window_secs: u64,
    pub ack_grace_secs: u64,
    /// Domain that releases trustless withdrawals. `None` releases on this domain.
    pub withdrawal_destination: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            domain: 1,
            token: Address::ZERO,
            owner: Address::ZERO,
            factory: Address::ZERO,
            deployment_salt: [0u8; 32],
            tree_depth: DEFAULT_TREE_DEPTH,
            collect_mode: CollectMode::default(),
            withdrawal_window_secs: DEFAULT_WITHDRAWAL_WINDOW_SECS,
            ack_grace_secs: DEFAULT_ACK_GRACE_SECS,
            withdrawal_destination: None,
        }
    }
}

impl PoolConfig {
    /// Checks what the tree constructor does not: the withdrawal periods.
    pub fn validate(&self) -> Result<(), PoolError> {
        for (name, secs) in [
            ("withdrawal_window_secs", self.withdrawal_window_secs),
            ("ack_grace_secs", self.ack_grace_secs),
        ] {
            if secs > MAX_WITHDRAWAL_PERIOD_SECS {
                return Err(PoolError::Config(format!(
                    "{name} = {secs} exceeds {MAX_WITHDRAWAL_PERIOD_SECS}"
                )));
            }
        }
        Ok(())
    }

    pub fn withdrawal_window(&self) -> Duration {
        period(self.withdrawal_window_secs)
    }

    pub fn ack_grace(&self) -> Duration {
        period(self.ack_grace_secs)
    }

    pub fn destination_domain(&self) -> u32 {
        self.withdrawal_destination.unwrap_or(self.domain)
    }
}

fn period(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_WITHDRAWAL_PERIOD_SECS) as i64)
}

mod salt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(salt: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(salt)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("deployment salt must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: PoolConfig = serde_json::from_str(r#"{"tree_depth": 16, "collect_mode": "included"}"#).unwrap();
        assert_eq!(cfg.tree_depth, 16);
        assert_eq!(cfg.collect_mode, CollectMode::Included);
        assert_eq!(cfg.withdrawal_window_secs, DEFAULT_WITHDRAWAL_WINDOW_SECS);
        assert_eq!(cfg.destination_domain(), cfg.domain);
    }

    #[test]
    fn oversized_periods_are_rejected() {
        let cfg = PoolConfig { withdrawal_window_secs: u64::MAX, ..PoolConfig::default() };
        assert!(matches!(cfg.validate(), Err(PoolError::Config(_))));
        assert!(cfg.withdrawal_window() > Duration::zero());

        let cfg = PoolConfig { ack_grace_secs: 1_000_000_000_000_000, ..PoolConfig::default() };
        assert!(matches!(cfg.validate(), Err(PoolError::Config(_))));

        assert!(PoolConfig::default().validate().is_ok());
    }
}
