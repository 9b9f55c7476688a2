use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::AccessCategory;

const DEFAULT_CONFIG_PATH: &str = "/etc/edca-upper-mac/config.toml";

const DEFAULT_SHORT_RETRY_LIMIT: u32 = 7;
const DEFAULT_LONG_RETRY_LIMIT: u32 = 4;
const DEFAULT_RTS_THRESHOLD: usize = 2346;
const DEFAULT_SIFS_US: u64 = 16;
const DEFAULT_SLOT_TIME_US: u64 = 9;
const DEFAULT_PHY_RX_START_DELAY_US: u64 = 20;
// ACK and CTS are 14 bytes, sent at 6 Mbps
const DEFAULT_ACK_DURATION_US: u64 = 44;
const DEFAULT_CTS_DURATION_US: u64 = 44;
const DEFAULT_DATA_BITRATE_MBPS: u32 = 54;
const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

// OFDM PHY: 16 us preamble + 4 us SIGNAL, 4 us symbols, 16 service + 6 tail bits
const OFDM_PREAMBLE_AND_SIGNAL_US: u64 = 20;
const OFDM_SYMBOL_US: u64 = 4;
const OFDM_SERVICE_AND_TAIL_BITS: u64 = 22;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid parameter: {0}")]
    Invalid(String),
}

/// Contention window bounds of one access category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcParameters {
    pub cw_min: u32,
    pub cw_max: u32,
}

impl AcParameters {
    const fn new(cw_min: u32, cw_max: u32) -> Self {
        Self { cw_min, cw_max }
    }
}

/// Per access category EDCA parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdcaTable {
    pub background: AcParameters,
    pub best_effort: AcParameters,
    pub video: AcParameters,
    pub voice: AcParameters,
}

impl Default for EdcaTable {
    /// 802.11-2012 Table 8-105 with aCWmin = 15, aCWmax = 1023.
    fn default() -> Self {
        Self {
            background: AcParameters::new(15, 1023),
            best_effort: AcParameters::new(15, 1023),
            video: AcParameters::new(7, 15),
            voice: AcParameters::new(3, 7),
        }
    }
}

impl EdcaTable {
    fn get(&self, ac: AccessCategory) -> AcParameters {
        match ac {
            AccessCategory::Background => self.background,
            AccessCategory::BestEffort => self.best_effort,
            AccessCategory::Video => self.video,
            AccessCategory::Voice => self.voice,
        }
    }
}

/// Parameters consulted by the retry controller, the frame exchanges and the
/// coordinator. Timing values are in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacParameters {
    pub edca: EdcaTable,
    pub short_retry_limit: u32,
    pub long_retry_limit: u32,
    /// Frames of at least this many bytes are protected by RTS/CTS
    pub rts_threshold: usize,
    pub sifs_us: u64,
    pub slot_time_us: u64,
    pub phy_rx_start_delay_us: u64,
    pub ack_duration_us: u64,
    pub cts_duration_us: u64,
    pub data_bitrate_mbps: u32,
    /// Per access category
    pub max_queue_size: usize,
    /// Reorder buffer size offered to ADDBA requesters
    pub block_ack_buffer_size: u16,
    pub a_msdu_supported: bool,
    /// Zero disables inactivity teardown of receive sessions
    pub block_ack_inactivity_timeout_ms: u64,
}

impl Default for MacParameters {
    fn default() -> Self {
        Self {
            edca: EdcaTable::default(),
            short_retry_limit: DEFAULT_SHORT_RETRY_LIMIT,
            long_retry_limit: DEFAULT_LONG_RETRY_LIMIT,
            rts_threshold: DEFAULT_RTS_THRESHOLD,
            sifs_us: DEFAULT_SIFS_US,
            slot_time_us: DEFAULT_SLOT_TIME_US,
            phy_rx_start_delay_us: DEFAULT_PHY_RX_START_DELAY_US,
            ack_duration_us: DEFAULT_ACK_DURATION_US,
            cts_duration_us: DEFAULT_CTS_DURATION_US,
            data_bitrate_mbps: DEFAULT_DATA_BITRATE_MBPS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            block_ack_buffer_size: crate::constants::MAX_BLOCK_ACK_WINDOW,
            a_msdu_supported: false,
            block_ack_inactivity_timeout_ms: 0,
        }
    }
}

impl MacParameters {
    pub fn cw_min(&self, ac: AccessCategory) -> u32 {
        self.edca.get(ac).cw_min
    }

    pub fn cw_max(&self, ac: AccessCategory) -> u32 {
        self.edca.get(ac).cw_max
    }

    pub fn sifs(&self) -> Duration {
        Duration::from_micros(self.sifs_us)
    }

    pub fn slot_time(&self) -> Duration {
        Duration::from_micros(self.slot_time_us)
    }

    pub fn ack_duration(&self) -> Duration {
        Duration::from_micros(self.ack_duration_us)
    }

    pub fn cts_duration(&self) -> Duration {
        Duration::from_micros(self.cts_duration_us)
    }

    /// Time within which the reception of an ACK must have started.
    pub fn ack_early_timeout(&self) -> Duration {
        Duration::from_micros(self.sifs_us + self.slot_time_us + self.phy_rx_start_delay_us)
    }

    /// Time within which the reception of an ACK must have completed.
    pub fn ack_full_timeout(&self) -> Duration {
        Duration::from_micros(self.sifs_us + self.slot_time_us + self.ack_duration_us)
    }

    /// Time within which the reception of a CTS must have started.
    pub fn cts_early_timeout(&self) -> Duration {
        Duration::from_micros(self.sifs_us + self.slot_time_us + self.phy_rx_start_delay_us)
    }

    /// Air time of a data frame of `byte_len` bytes at the configured rate.
    #[allow(clippy::as_conversions)] // usize to u64
    pub fn data_duration(&self, byte_len: usize) -> Duration {
        let bits_per_symbol = u64::from(self.data_bitrate_mbps) * OFDM_SYMBOL_US;
        let bits = OFDM_SERVICE_AND_TAIL_BITS + 8 * byte_len as u64;
        let symbols = bits.div_ceil(bits_per_symbol.max(1));
        Duration::from_micros(OFDM_PREAMBLE_AND_SIGNAL_US + symbols * OFDM_SYMBOL_US)
    }

    pub fn block_ack_inactivity_timeout(&self) -> Option<Duration> {
        (self.block_ack_inactivity_timeout_ms != 0)
            .then(|| Duration::from_millis(self.block_ack_inactivity_timeout_ms))
    }

    /// Checks the invariants the retry controller relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for ac in AccessCategory::ALL {
            let AcParameters { cw_min, cw_max } = self.edca.get(ac);
            if cw_min > cw_max {
                return Err(ConfigError::Invalid(format!(
                    "{ac}: cw_min {cw_min} exceeds cw_max {cw_max}"
                )));
            }
            for cw in [cw_min, cw_max] {
                if !(cw.wrapping_add(1)).is_power_of_two() {
                    return Err(ConfigError::Invalid(format!(
                        "{ac}: contention window {cw} is not of the form 2^k-1"
                    )));
                }
            }
        }
        if self.short_retry_limit == 0 || self.long_retry_limit == 0 {
            return Err(ConfigError::Invalid("retry limits must be positive".into()));
        }
        if self.data_bitrate_mbps == 0 {
            return Err(ConfigError::Invalid("data bitrate must be positive".into()));
        }
        if self.block_ack_buffer_size == 0
            || self.block_ack_buffer_size > crate::constants::MAX_BLOCK_ACK_WINDOW
        {
            return Err(ConfigError::Invalid(format!(
                "block ack buffer size {} out of range",
                self.block_ack_buffer_size
            )));
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the configuration from the default path.
    pub fn load_default() -> Result<MacParameters, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads the configuration from the specified path.
    pub fn load_from_path(path: &str) -> Result<MacParameters, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    /// Parses and validates a TOML document.
    pub fn load_from_str(content: &str) -> Result<MacParameters, ConfigError> {
        let params: MacParameters = toml::from_str(content)?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = MacParameters::default();
        params.validate().unwrap();
        assert_eq!(params.cw_min(AccessCategory::BestEffort), 15);
        assert_eq!(params.cw_max(AccessCategory::Voice), 7);
        assert_eq!(params.ack_early_timeout(), Duration::from_micros(45));
        assert_eq!(params.ack_full_timeout(), Duration::from_micros(69));
    }

    #[test]
    fn partial_toml_overrides() {
        let params = ConfigLoader::load_from_str(
            r#"
            short_retry_limit = 3
            rts_threshold = 500

            [edca.video]
            cw_min = 3
            cw_max = 31
            "#,
        )
        .unwrap();
        assert_eq!(params.short_retry_limit, 3);
        assert_eq!(params.long_retry_limit, DEFAULT_LONG_RETRY_LIMIT);
        assert_eq!(params.rts_threshold, 500);
        assert_eq!(params.cw_min(AccessCategory::Video), 3);
        assert_eq!(params.cw_max(AccessCategory::Video), 31);
        assert_eq!(params.cw_min(AccessCategory::Voice), 3);
    }

    #[test]
    fn invalid_contention_window_rejected() {
        let err = ConfigLoader::load_from_str(
            r#"
            [edca.best_effort]
            cw_min = 16
            cw_max = 1023
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ConfigLoader::load_from_str(
            r#"
            [edca.voice]
            cw_min = 15
            cw_max = 7
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_retry_limit_rejected() {
        let err = ConfigLoader::load_from_str("long_retry_limit = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn data_duration_rounds_to_symbols() {
        let params = MacParameters {
            data_bitrate_mbps: 6,
            ..MacParameters::default()
        };
        // 14 bytes at 6 Mbps: 134 bits over 24 bits per symbol = 6 symbols
        assert_eq!(params.data_duration(14), Duration::from_micros(44));
    }

    #[test]
    fn inactivity_timeout_disabled_by_default() {
        assert!(MacParameters::default().block_ack_inactivity_timeout().is_none());
        let params = MacParameters {
            block_ack_inactivity_timeout_ms: 50,
            ..MacParameters::default()
        };
        assert_eq!(
            params.block_ack_inactivity_timeout(),
            Some(Duration::from_millis(50))
        );
    }
}
