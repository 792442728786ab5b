//! Configuration structures for the relay core's tunable parameters.
//! Persistent config-file *parsing infrastructure* is a host concern
//! (spec section 1), but the value objects the core's constructors take
//! still deserialize from TOML in the teacher's style, keeping `serde`
//! and `toml` in the ambient stack.

use serde::Deserialize;
use std::net::Ipv4Addr;

use crate::error::ConfigError;
use crate::shaper::Profile;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PacerConfig {
    pub initial_bps: u64,
    pub min_bps: Option<u64>,
    pub max_bps: Option<u64>,
    pub jitter_range_ns: Option<u64>,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            initial_bps: 10_000_000,
            min_bps: None,
            max_bps: None,
            jitter_range_ns: None,
        }
    }
}

impl PacerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_bps == 0 {
            return Err(ConfigError::MustBePositive { field: "initial_bps" });
        }
        if let (Some(min), Some(max)) = (self.min_bps, self.max_bps) {
            if min > max {
                return Err(ConfigError::BpsRangeInverted { min, max });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    None,
    Https,
    Video,
    Voip,
    Gaming,
}

impl From<ProfileName> for Profile {
    fn from(name: ProfileName) -> Self {
        match name {
            ProfileName::None => Profile::None,
            ProfileName::Https => Profile::Https,
            ProfileName::Video => Profile::Video,
            ProfileName::Voip => Profile::Voip,
            ProfileName::Gaming => Profile::Gaming,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ShaperConfig {
    pub profile: ProfileName,
    pub mtu: u32,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            profile: ProfileName::None,
            mtu: 1500,
        }
    }
}

impl ShaperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu < 200 {
            return Err(ConfigError::MustBePositive { field: "mtu" });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    pub dst_port: u16,
    #[serde(default)]
    pub static_magics: Vec<u32>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            dst_port: 4433,
            static_magics: Vec::new(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dst_port == 0 {
            return Err(ConfigError::MustBePositive { field: "dst_port" });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FecConfig {
    pub k: u8,
    pub initial_m: u8,
    pub xor_mode: bool,
}

impl Default for FecConfig {
    fn default() -> Self {
        Self {
            k: 8,
            initial_m: 2,
            xor_mode: false,
        }
    }
}

impl FecConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k == 0 {
            return Err(ConfigError::InvalidK(self.k as u32));
        }
        if self.xor_mode && self.k > crate::fec::XOR_MAX_K {
            return Err(ConfigError::InvalidXorShape {
                k: self.k as u32,
                m: 1,
            });
        }
        Ok(())
    }
}

/// Unified configuration parsed from a single TOML document, mirroring
/// the one-struct-per-subsystem-then-validate-all pattern used elsewhere
/// in this codebase.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub pacer: PacerConfig,
    pub shaper: ShaperConfig,
    pub filter: FilterConfig,
    pub fec: FecConfig,
}

impl RelayConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize, Default)]
        struct Root {
            pacer: Option<PacerConfig>,
            shaper: Option<ShaperConfig>,
            filter: Option<FilterConfig>,
            fec: Option<FecConfig>,
        }

        let root: Root = toml::from_str(s).map_err(|e| ConfigError::Toml(e.to_string()))?;
        Ok(Self {
            pacer: root.pacer.unwrap_or_default(),
            shaper: root.shaper.unwrap_or_default(),
            filter: root.filter.unwrap_or_default(),
            fec: root.fec.unwrap_or_default(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pacer.validate()?;
        self.shaper.validate()?;
        self.filter.validate()?;
        self.fec.validate()?;
        Ok(())
    }
}

/// Parses a dotted-quad string into the `u32` form the Edge Filter keys
/// its maps with. Not part of the hot path; intended for config loading
/// and tests.
pub fn parse_ipv4(s: &str) -> Result<u32, ConfigError> {
    s.parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| ConfigError::Toml(format!("invalid IPv4 address: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg = RelayConfig::from_toml(
            r#"
            [pacer]
            initial_bps = 5000000

            [fec]
            k = 6
            initial_m = 3
            xor_mode = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pacer.initial_bps, 5_000_000);
        assert_eq!(cfg.fec.k, 6);
        assert_eq!(cfg.filter.dst_port, 4433);
    }

    #[test]
    fn rejects_inverted_bps_range() {
        let cfg = RelayConfig {
            pacer: PacerConfig {
                initial_bps: 100,
                min_bps: Some(200),
                max_bps: Some(100),
                jitter_range_ns: None,
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_ipv4_round_trips() {
        assert_eq!(parse_ipv4("10.0.0.1").unwrap(), 0x0A000001);
        assert!(parse_ipv4("not-an-ip").is_err());
    }
}
