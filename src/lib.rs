//! # Gateway Modbus - RTU Master Gateway Core
//!
//! The core of a Modbus RTU master gateway: it owns the serial line,
//! maintains a user-editable catalog of named typed registers, polls
//! the monitored subset on a fixed period, and emits change/heartbeat
//! batches upstream. Typed reads, typed writes, and raw pass-through
//! share the same serial arbiter as the polling loop.
//!
//! The three collaborators at the edges stay external and are consumed
//! through traits:
//!
//! - [`ModbusBus`]: the RTU line driver (framing, CRC, UART/RS-485)
//! - [`Transport`]: the cloud control plane (commands, getters, publish)
//! - [`BlobStore`]: non-volatile key/value blob storage
//!
//! ## Register Types
//!
//! | Type | Words | Value |
//! |------|-------|-------|
//! | number | 1..=4 | scaled signed/unsigned integer |
//! | float | 2 or 4 | scaled IEEE-754 single/double |
//! | raw | 1 | unsigned 16-bit pass-through |
//! | string | 1..=10 | NUL-padded ASCII text |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gateway_modbus::{Gateway, GatewayDeps, UartPins};
//! # async fn bring_up(
//! #     bus: Arc<dyn gateway_modbus::ModbusBus>,
//! #     transport: Arc<dyn gateway_modbus::Transport>,
//! #     store: Box<dyn gateway_modbus::BlobStore>,
//! # ) {
//! let gateway = Gateway::init(
//!     GatewayDeps { bus, transport, store, request_failed: None },
//!     UartPins { port: 1, tx_pin: 17, rx_pin: 16, rs485_dir_pin: Some(4) },
//! )
//! .await;
//! assert!(gateway.was_started_successfully());
//! # }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Gateway limits and protocol constants
pub mod constants;

/// Word-order handling for multi-word register values
pub mod words;

/// Command argument parsing helpers
pub mod parse;

/// Register descriptors and per-type admissibility rules
pub mod descriptor;

/// Typed codec between raw words and value strings
pub mod codec;

/// Bounded register catalog with runtime state
pub mod catalog;

/// Serial link configuration (actual/next pair)
pub mod link;

/// Persistent configuration on blob storage
pub mod store;

/// Bus primitive trait and the serial arbiter
pub mod bus;

/// Bounded JSON batch builder for publish payloads
pub mod batch;

/// Fixed-period polling engine
pub mod poller;

/// Cloud command surface
pub mod commands;

/// The gateway instance
pub mod gateway;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use bus::{BusError, LineSettings, ModbusBus, RequestFailedCallback, SerialArbiter, UartPins};
pub use catalog::{RegisterCatalog, RuntimeState};
pub use codec::{decode_value, encode_value, round_to_decimals};
pub use commands::{CommandHandler, GetterHandler, Transport};
pub use descriptor::{is_valid_register_name, RegisterDescriptor, RegisterType};
pub use error::{CatalogInsertError, RegisterError, RegisterResult, StoreError, Width};
pub use gateway::{Gateway, GatewayDeps};
pub use link::{DataBits, LinkConfig, Parity, StopBits, FIRMWARE_VERSION};
pub use poller::should_publish;
pub use store::{BlobStore, ConfigStore, MemoryBlobStore};
pub use words::WordOrder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
