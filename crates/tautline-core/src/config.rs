//! Link configuration.

use tautline_proto::{MAX_DATA_FRAME_LEN, MAX_WINDOW};

use crate::error::ConfigError;

/// Default number of in-flight transmit frames.
pub const DEFAULT_TX_WINDOW: u16 = 64;

/// Default number of stored future receive frames.
pub const DEFAULT_RX_WINDOW: u16 = 64;

/// Default backing store for serialized in-flight frames, in bytes.
pub const DEFAULT_TX_BUFFER_BYTES: usize = 4096;

/// Default retransmit timeout in milliseconds.
pub const DEFAULT_TX_TIMEOUT_MS: u32 = 250;

/// Default number of emissions of one frame before the link gives up.
pub const DEFAULT_MAX_SEND_COUNT: u32 = 25;

/// Largest record-array size. The protocol window is capped one lower
/// (half the frame-id space minus one), but record arrays stay a power of
/// two for index masking.
pub const WINDOW_CEILING: u16 = 1024;

/// Tuning knobs for a [`DataLink`](crate::DataLink) instance.
///
/// Window sizes are rounded up to powers of two by [`LinkConfig::normalized`]
/// so records can be addressed by masking; the usable in-flight span is
/// additionally capped at [`MAX_WINDOW`] frames regardless of the record
/// array size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Maximum outstanding transmit frames.
    pub tx_window: u16,

    /// Bytes of backing store for serialized in-flight frames. Must hold at
    /// least one maximum-size frame.
    pub tx_buffer_bytes: usize,

    /// Capacity of the outbound ACK/NACK/RESET queue, in frames.
    /// Zero means "same as `rx_window`".
    pub link_queue_depth: usize,

    /// Maximum stored future receive frames.
    pub rx_window: u16,

    /// Retransmit timeout in milliseconds. Reset requests are retried every
    /// sixteen times this interval.
    pub tx_timeout_ms: u32,

    /// Emissions of a single frame before the link declares the peer dead.
    pub max_send_count: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tx_window: DEFAULT_TX_WINDOW,
            tx_buffer_bytes: DEFAULT_TX_BUFFER_BYTES,
            link_queue_depth: 0,
            rx_window: DEFAULT_RX_WINDOW,
            tx_timeout_ms: DEFAULT_TX_TIMEOUT_MS,
            max_send_count: DEFAULT_MAX_SEND_COUNT,
        }
    }
}

impl LinkConfig {
    /// Validates and canonicalizes the configuration.
    ///
    /// Rounds both windows up to powers of two, substitutes the defaulted
    /// link-queue depth, and rejects values the protocol cannot honor.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        if self.tx_window == 0 || self.rx_window == 0 {
            return Err(ConfigError::WindowZero);
        }
        self.tx_window = round_window(self.tx_window)?;
        self.rx_window = round_window(self.rx_window)?;
        if self.link_queue_depth == 0 {
            self.link_queue_depth = self.rx_window as usize;
        }
        if self.tx_buffer_bytes < MAX_DATA_FRAME_LEN {
            return Err(ConfigError::BufferTooSmall {
                got: self.tx_buffer_bytes,
                need: MAX_DATA_FRAME_LEN,
            });
        }
        if self.tx_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(self)
    }

    /// The usable in-flight span for a window of `records` slots.
    pub(crate) fn effective_window(records: u16) -> u16 {
        records.min(MAX_WINDOW)
    }
}

fn round_window(window: u16) -> Result<u16, ConfigError> {
    let rounded = window.next_power_of_two();
    if rounded > WINDOW_CEILING {
        return Err(ConfigError::WindowTooLarge(window));
    }
    Ok(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_normalizes() {
        let cfg = LinkConfig::default().normalized().unwrap();
        assert_eq!(cfg.tx_window, DEFAULT_TX_WINDOW);
        assert_eq!(cfg.link_queue_depth, DEFAULT_RX_WINDOW as usize);
    }

    #[test]
    fn windows_round_up_to_powers_of_two() {
        let cfg = LinkConfig { tx_window: 17, rx_window: 3, ..LinkConfig::default() };
        let cfg = cfg.normalized().unwrap();
        assert_eq!(cfg.tx_window, 32);
        assert_eq!(cfg.rx_window, 4);
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero = LinkConfig { tx_window: 0, ..LinkConfig::default() };
        assert_eq!(zero.normalized(), Err(ConfigError::WindowZero));

        let huge = LinkConfig { tx_window: 1025, ..LinkConfig::default() };
        assert_eq!(huge.normalized(), Err(ConfigError::WindowTooLarge(1025)));

        let tiny = LinkConfig { tx_buffer_bytes: 64, ..LinkConfig::default() };
        assert!(matches!(tiny.normalized(), Err(ConfigError::BufferTooSmall { .. })));

        let frozen = LinkConfig { tx_timeout_ms: 0, ..LinkConfig::default() };
        assert_eq!(frozen.normalized(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn effective_window_caps_at_protocol_limit() {
        assert_eq!(LinkConfig::effective_window(64), 64);
        assert_eq!(LinkConfig::effective_window(1024), MAX_WINDOW);
    }

    proptest::proptest! {
        #[test]
        fn normalization_is_canonical(tx in 1u16..=1024, rx in 1u16..=1024) {
            let cfg = LinkConfig { tx_window: tx, rx_window: rx, ..LinkConfig::default() };
            let cfg = cfg.normalized().unwrap();

            proptest::prop_assert!(cfg.tx_window.is_power_of_two() && cfg.tx_window >= tx);
            proptest::prop_assert!(cfg.rx_window.is_power_of_two() && cfg.rx_window <= 1024);
            proptest::prop_assert!(cfg.link_queue_depth > 0);
            // Normalization is idempotent.
            proptest::prop_assert_eq!(cfg.clone().normalized().unwrap(), cfg);
        }
    }
}
