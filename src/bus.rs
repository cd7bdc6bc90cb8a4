//! # Bus Primitive and Serial Arbiter
//!
//! The RTU line driver (framing, CRC, UART and RS-485 direction
//! control) lives outside this crate; the core consumes it through the
//! [`ModbusBus`] trait's single `execute` primitive. [`SerialArbiter`]
//! wraps that primitive in the mutual-exclusion and pacing contract
//! every bus access must honor:
//!
//! - exactly one holder at a time, acquisitions totally ordered;
//! - after every command, successful or not, the arbiter sleeps the
//!   inter-command delay *before* releasing, so at least that much
//!   wire-silent time separates any two frames;
//! - a failed command invokes the optional request-failed callback
//!   while the arbiter is still held;
//! - `stop()` acquires the arbiter permanently, guaranteeing no
//!   further bus access for the life of the process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::link::{DataBits, Parity, StopBits};

/// Failure reported by the line driver for one Modbus command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The slave did not answer within the transport's timeout.
    #[error("no response from slave")]
    Timeout,

    /// The response failed the CRC or framing check.
    #[error("response failed integrity check")]
    Corrupt,

    /// The slave answered with a Modbus exception.
    #[error("slave returned exception code {0}")]
    Exception(u8),

    /// The serial line itself failed.
    #[error("serial line error: {0}")]
    Line(String),
}

/// Physical wiring of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartPins {
    /// UART peripheral index.
    pub port: u32,
    pub tx_pin: u8,
    pub rx_pin: u8,
    /// Direction-control pin when driving an RS-485 transceiver.
    pub rs485_dir_pin: Option<u8>,
}

/// Everything the line driver needs to open the port.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSettings {
    pub pins: UartPins,
    pub baudrate: i32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

/// Single-command primitive exposed by the external RTU line driver.
///
/// Function codes: read 1 (coils), 2 (discrete inputs), 3 (holding),
/// 4 (input); write 5 (single coil), 6 (single holding), 15 (multiple
/// coils), 16 (multiple holding). For reads `words` receives the
/// response; for writes it supplies the payload.
#[async_trait]
pub trait ModbusBus: Send + Sync {
    /// Open the serial line. Called once at gateway bring-up.
    async fn open(&self, settings: &LineSettings) -> Result<(), BusError>;

    /// Execute one Modbus command against one slave.
    async fn execute(
        &self,
        function: u8,
        slave_addr: u8,
        reg_id: u16,
        word_count: u16,
        words: &mut [u16],
    ) -> Result<(), BusError>;
}

/// Callback invoked whenever a bus command fails.
pub type RequestFailedCallback = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Serial Arbiter
// ============================================================================

/// One-token mutex plus inter-command pacing around every bus command.
pub struct SerialArbiter {
    bus: Arc<dyn ModbusBus>,
    token: Arc<Mutex<()>>,
    pacing: Duration,
    request_failed: Option<RequestFailedCallback>,
    stop_guard: std::sync::Mutex<Option<OwnedMutexGuard<()>>>,
}

impl SerialArbiter {
    /// Wrap a bus with the given pacing delay.
    pub fn new(
        bus: Arc<dyn ModbusBus>,
        inter_cmd_delay_ms: u16,
        request_failed: Option<RequestFailedCallback>,
    ) -> Self {
        Self {
            bus,
            token: Arc::new(Mutex::new(())),
            pacing: Duration::from_millis(u64::from(inter_cmd_delay_ms)),
            request_failed,
            stop_guard: std::sync::Mutex::new(None),
        }
    }

    /// Execute one command under the arbiter.
    ///
    /// Acquisition blocks without bound. The pacing delay runs before
    /// the token is released, on success and on failure alike.
    pub async fn execute(
        &self,
        function: u8,
        slave_addr: u8,
        reg_id: u16,
        word_count: u16,
        words: &mut [u16],
    ) -> Result<(), BusError> {
        let _token = self.token.clone().lock_owned().await;

        let result = self
            .bus
            .execute(function, slave_addr, reg_id, word_count, words)
            .await;

        if let Err(err) = &result {
            debug!(function, slave_addr, reg_id, %err, "bus command failed");
            if let Some(callback) = &self.request_failed {
                callback();
            }
        } else {
            debug!(function, slave_addr, reg_id, ?words, "bus command done");
        }

        tokio::time::sleep(self.pacing).await;
        result
        // _token drops here, after the pacing delay.
    }

    /// Permanently acquire the arbiter. Every subsequent `execute`
    /// awaits forever; there is no way back.
    pub async fn stop(&self) {
        let token = self.token.clone().lock_owned().await;
        *self
            .stop_guard
            .lock()
            .expect("arbiter stop slot poisoned") = Some(token);
    }
}

// ============================================================================
// Tests
// ============================================================================
