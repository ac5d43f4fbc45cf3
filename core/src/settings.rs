use alloy_primitives::{Address, B256};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;

use crate::encoding::EncodingLimits;
use crate::factory::FactoryConfig;
use crate::registry::CanonicalPairRegistry;
use crate::telemetry;

/// Environment prefix, e.g. `LAUNCHPAD_REFERENCE_ASSET`.
pub const ENV_PREFIX: &str = "LAUNCHPAD";

/// Runtime settings for a factory deployment. Defaults target Ethereum
/// mainnet's Uniswap V2 factory and WETH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorySettings {
    pub pair_registry: Address,
    pub reference_asset: Address,
    pub pair_init_code_hash: B256,
    pub max_name_bytes: usize,
    pub max_symbol_bytes: usize,
    pub rust_log: String,
}

impl FactorySettings {
    pub fn limits(&self) -> EncodingLimits {
        EncodingLimits {
            max_name_bytes: self.max_name_bytes,
            max_symbol_bytes: self.max_symbol_bytes,
        }
    }

    pub fn factory_config(&self) -> FactoryConfig {
        FactoryConfig {
            limits: self.limits(),
            ..FactoryConfig::new(self.reference_asset)
        }
    }

    /// Handle to the registry these settings point at.
    pub fn pair_registry(&self) -> CanonicalPairRegistry {
        CanonicalPairRegistry::at(self.pair_registry, self.pair_init_code_hash)
    }

    /// Install the global subscriber with `rust_log` as the fallback filter.
    pub fn init_tracing(&self) -> Result<(), TryInitError> {
        telemetry::init_tracing(&self.rust_log)
    }
}

/// Defaults plus the `LAUNCHPAD_*` environment. Callers may layer overrides
/// on top before building.
pub fn settings_builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let limits = EncodingLimits::default();
    Config::builder()
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .set_default("pair_registry", "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f")?
        .set_default("reference_asset", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")?
        .set_default(
            "pair_init_code_hash",
            "0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f",
        )?
        .set_default("max_name_bytes", limits.max_name_bytes as u64)?
        .set_default("max_symbol_bytes", limits.max_symbol_bytes as u64)?
        .set_default("rust_log", "info")
}

pub fn load_settings() -> Result<FactorySettings, ConfigError> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let settings: FactorySettings = settings_builder()?.build()?.try_deserialize()?;
    tracing::debug!(?settings, "Settings loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PairRegistry, UNISWAP_V2_PAIR_INIT_CODE_HASH};
    use alloy_primitives::address;

    fn build(overrides: &[(&str, &str)]) -> Result<FactorySettings, ConfigError> {
        let mut builder = settings_builder()?;
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        builder.build()?.try_deserialize()
    }

    #[test]
    fn test_defaults() {
        let settings = build(&[]).unwrap();
        assert_eq!(
            settings.pair_registry,
            address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f")
        );
        assert_eq!(
            settings.reference_asset,
            address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")
        );
        assert_eq!(settings.pair_init_code_hash, UNISWAP_V2_PAIR_INIT_CODE_HASH);
        assert_eq!(settings.limits(), EncodingLimits::default());
    }

    #[test]
    fn test_overrides() {
        let settings = build(&[
            ("reference_asset", "0x0000000000000000000000000000000000000001"),
            ("max_symbol_bytes", "8"),
        ])
        .unwrap();
        assert_eq!(settings.reference_asset, Address::with_last_byte(1));
        assert_eq!(settings.limits().max_symbol_bytes, 8);

        let config = settings.factory_config();
        assert_eq!(config.reference_asset, Address::with_last_byte(1));
        assert_eq!(config.limits.max_symbol_bytes, 8);
        assert_eq!(settings.pair_registry().address(), settings.pair_registry);
    }

    #[test]
    fn test_rust_log_drives_tracing() {
        let settings = build(&[("rust_log", "launchpad_core=debug")]).unwrap();
        assert_eq!(settings.rust_log, "launchpad_core=debug");
        let _ = settings.init_tracing();
        assert!(settings.init_tracing().is_err());
    }

    #[test]
    fn test_bad_address_is_rejected() {
        assert!(build(&[("pair_registry", "not-an-address")]).is_err());
    }
}
