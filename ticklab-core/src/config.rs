//! Trading configurations and coordinator tunables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ConfigId;
use crate::execution::fills::FillPolicy;
use crate::strategy::{StrategyError, StrategyFamily, StrategyParameters};

/// One strategy running against one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfiguration {
    pub id: ConfigId,
    pub name: String,
    pub symbol: String,
    /// Strategy identifier, resolved at tick time.
    pub strategy: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub parameters: StrategyParameters,
}

fn default_active() -> bool {
    true
}

impl TradingConfiguration {
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        parameters: StrategyParameters,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: ConfigId::new(id),
            symbol: symbol.into(),
            strategy: strategy.into(),
            active: true,
            notify: false,
            parameters,
        }
    }

    pub fn family(&self) -> Result<StrategyFamily, StrategyError> {
        self.strategy.parse()
    }

    /// Deterministic hash of strategy, symbol and parameters.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.strategy.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.symbol.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.parameters.fingerprint().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Ids of every configuration in `registry` sharing `config`'s strategy
/// family. Always contains `config.id`.
pub fn family_members(config: &TradingConfiguration, registry: &[TradingConfiguration]) -> Vec<ConfigId> {
    let mut ids = vec![config.id.clone()];
    if let Ok(family) = config.family() {
        ids.extend(
            registry
                .iter()
                .filter(|c| c.id != config.id)
                .filter(|c| c.family().is_ok_and(|f| f == family))
                .map(|c| c.id.clone()),
        );
    }
    ids
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub fill_poll_attempts: u32,
    pub fill_poll_interval: Duration,
    /// How far (percent) price may run through a resting exit limit before
    /// the position is closed at market.
    pub emergency_gap_percent: f64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            fill_poll_attempts: 5,
            fill_poll_interval: Duration::from_secs(1),
            emergency_gap_percent: 0.5,
        }
    }
}

impl CoordinatorSettings {
    /// Settings that never sleep between polls.
    pub fn immediate() -> Self {
        Self {
            fill_poll_interval: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn fill_policy(&self) -> FillPolicy {
        FillPolicy {
            attempts: self.fill_poll_attempts,
            interval: self.fill_poll_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_tracks_parameters() {
        let a = TradingConfiguration::new("a", "BTC/JPY", "breakout", StrategyParameters::default());
        let mut b = a.clone();
        b.id = ConfigId::new("b");
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.parameters.lookback_period = 30;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn family_members_share_strategy_family() {
        let params = StrategyParameters::default();
        let btc = TradingConfiguration::new("rsi-btc", "BTC/JPY", "rsi_contrarian", params.clone());
        let eth = TradingConfiguration::new("rsi-eth", "ETH/JPY", "RSIContrarianStrategy", params.clone());
        let brk = TradingConfiguration::new("brk", "BTC/JPY", "breakout", params);
        let registry = vec![btc.clone(), eth, brk];

        let ids = family_members(&btc, &registry);
        assert_eq!(ids, vec![ConfigId::new("rsi-btc"), ConfigId::new("rsi-eth")]);
    }

    #[test]
    fn toml_fields_default() {
        let config: TradingConfiguration = serde_json::from_str(
            r#"{"id":"x","name":"X","symbol":"BTC/JPY","strategy":"breakout"}"#,
        )
        .unwrap();
        assert!(config.active);
        assert!(!config.notify);
        assert_eq!(config.parameters, StrategyParameters::default());
    }
}
