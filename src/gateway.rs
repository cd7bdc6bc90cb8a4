//! # Gateway Instance
//!
//! One [`Gateway`] owns everything the firmware used to keep in
//! globals: the register catalog, the actual/next configuration pair,
//! the serial arbiter, and the polling task. The embedder hands in the
//! three external collaborators (line driver, cloud transport, blob
//! store) and the wiring of the serial port; the gateway loads its
//! configuration, opens the line, spawns the polling task, and
//! registers the command surface.
//!
//! A failed line open leaves the gateway constructed but not running:
//! commands and getters still work against the catalog, while every
//! bus operation answers "not initialized".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, warn};

use crate::batch::PublishBatch;
use crate::bus::{BusError, LineSettings, ModbusBus, RequestFailedCallback, SerialArbiter, UartPins};
use crate::catalog::RegisterCatalog;
use crate::codec::{decode_value, encode_value};
use crate::commands::{self, Transport};
use crate::constants::{GETTER_JSON_MAX, MAX_REG_WORDS};
use crate::descriptor::RegisterDescriptor;
use crate::error::{RegisterError, RegisterResult};
use crate::poller;
use crate::store::{BlobStore, ConfigStore};
use crate::words::WordOrder;

/// External collaborators handed in by the embedder.
pub struct GatewayDeps {
    /// RTU line driver.
    pub bus: Arc<dyn ModbusBus>,
    /// Cloud control-plane transport.
    pub transport: Arc<dyn Transport>,
    /// Blob store opened on the gateway's NVS namespace.
    pub store: Box<dyn BlobStore>,
    /// Invoked on every failed bus command.
    pub request_failed: Option<RequestFailedCallback>,
}

/// Shared state behind the gateway: catalog, configuration, arbiter.
pub struct GatewayCore {
    catalog: Mutex<RegisterCatalog>,
    config: ConfigStore,
    arbiter: SerialArbiter,
    transport: Arc<dyn Transport>,
    word_order: WordOrder,
    read_period_s: u8,
    started: AtomicBool,
}

impl GatewayCore {
    /// Lock the catalog. Poisoning means a writer panicked mid-update
    /// and the uniqueness invariants can no longer be trusted.
    pub(crate) fn catalog(&self) -> MutexGuard<'_, RegisterCatalog> {
        self.catalog.lock().expect("register catalog lock poisoned")
    }

    pub(crate) fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn read_period_s(&self) -> u8 {
        self.read_period_s
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Read and decode one register under the arbiter.
    pub(crate) async fn read_typed_register(
        &self,
        desc: &RegisterDescriptor,
    ) -> RegisterResult<String> {
        if !self.is_started() {
            return Err(RegisterError::NotInitialized);
        }
        let span = usize::from(desc.word_count);
        let mut words = [0u16; MAX_REG_WORDS];
        self.arbiter
            .execute(
                desc.read_function,
                desc.slave_addr,
                desc.reg_id,
                span as u16,
                &mut words[..span],
            )
            .await
            .map_err(|_| RegisterError::BusRead)?;
        decode_value(&words[..span], desc, self.word_order)
    }

    /// Look a register up by name and read it.
    pub(crate) async fn read_typed_register_by_name(&self, name: &str) -> RegisterResult<String> {
        let desc = self.catalog().find(name).ok_or(RegisterError::NotFound)?;
        self.read_typed_register(&desc).await
    }

    /// Encode a value string and write it to a named register.
    pub(crate) async fn write_typed_register_by_name(
        &self,
        name: &str,
        value: &str,
    ) -> RegisterResult<()> {
        let desc = self.catalog().find(name).ok_or(RegisterError::NotFound)?;
        if !self.is_started() {
            return Err(RegisterError::NotInitialized);
        }
        let mut words = encode_value(value, &desc, self.word_order)?;
        if !desc.writable {
            return Err(RegisterError::NotWritable);
        }
        self.arbiter
            .execute(
                desc.write_function,
                desc.slave_addr,
                desc.reg_id,
                words.len() as u16,
                &mut words,
            )
            .await
            .map_err(|_| RegisterError::BusWrite)
    }

    /// Read one raw word from an arbitrary bus address.
    pub(crate) async fn read_raw_register(
        &self,
        read_function: u8,
        slave_addr: u8,
        reg_id: u16,
    ) -> RegisterResult<u16> {
        if !self.is_started() {
            return Err(RegisterError::NotInitialized);
        }
        let mut words = [0u16; 1];
        self.arbiter
            .execute(read_function, slave_addr, reg_id, 1, &mut words)
            .await
            .map_err(|_| RegisterError::BusRead)?;
        Ok(words[0])
    }

    /// Write one raw word to an arbitrary bus address.
    pub(crate) async fn write_raw_register(
        &self,
        write_function: u8,
        slave_addr: u8,
        reg_id: u16,
        value: u16,
    ) -> RegisterResult<()> {
        if !self.is_started() {
            return Err(RegisterError::NotInitialized);
        }
        let mut words = [value];
        self.arbiter
            .execute(write_function, slave_addr, reg_id, 1, &mut words)
            .await
            .map_err(|_| RegisterError::BusWrite)
    }

    /// Read every cataloged register into one JSON object, `null` for
    /// registers whose read failed. `None` when the object would not
    /// fit its budget.
    pub(crate) async fn read_all_registers_json(&self) -> Option<String> {
        let count = self.catalog().count();
        let mut batch = PublishBatch::new(GETTER_JSON_MAX);

        for index in 0..count {
            let desc = self.catalog().at(index)?;
            let value = match self.read_typed_register(&desc).await {
                Ok(value) => value,
                Err(_) => String::from("null"),
            };
            if !batch.append(&desc.name, &value) {
                return None;
            }
        }

        batch.finish()
    }

    /// Snapshot the catalog and persist it with the next configuration.
    pub(crate) fn save_config_to_flash(&self) -> bool {
        let snapshot: Vec<RegisterDescriptor> = {
            let catalog = self.catalog();
            (0..catalog.count()).filter_map(|index| catalog.at(index)).collect()
        };
        match self.config.save(&snapshot) {
            Ok(()) => true,
            Err(err) => {
                error!(%err, "saving configuration to flash failed");
                false
            }
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// The Modbus RTU master gateway.
pub struct Gateway {
    core: Arc<GatewayCore>,
    poll_task: Option<tokio::task::JoinHandle<()>>,
}

impl Gateway {
    /// Bring the gateway up: load the persisted configuration, open
    /// the serial line, spawn the polling task, and register the
    /// command surface on the transport.
    pub async fn init(deps: GatewayDeps, pins: UartPins) -> Self {
        let mut catalog = RegisterCatalog::new();
        let mut config = ConfigStore::new(deps.store);
        match config.load(&mut catalog) {
            Ok(()) => info!("configuration loaded from NVS"),
            Err(err) => warn!(%err, "configuration not found in NVS, using defaults"),
        }

        let actual = config.actual();
        let settings = LineSettings {
            pins,
            baudrate: actual.baudrate,
            data_bits: actual.data_bits,
            parity: actual.parity,
            stop_bits: actual.stop_bits,
        };
        let started = match deps.bus.open(&settings).await {
            Ok(()) => true,
            Err(err) => {
                error!(%err, "invalid modbus parameters, modbus not started");
                false
            }
        };

        let core = Arc::new(GatewayCore {
            catalog: Mutex::new(catalog),
            arbiter: SerialArbiter::new(
                Arc::clone(&deps.bus),
                actual.inter_cmd_delay_ms,
                deps.request_failed,
            ),
            transport: Arc::clone(&deps.transport),
            word_order: actual.word_order,
            read_period_s: actual.read_period_s,
            started: AtomicBool::new(started),
            config,
        });

        let poll_task = started.then(|| poller::spawn(Arc::clone(&core)));
        commands::register_callbacks(&core);

        Gateway { core, poll_task }
    }

    /// Whether the serial line was opened and polling is running.
    pub fn was_started_successfully(&self) -> bool {
        self.core.is_started()
    }

    /// Permanently park the serial arbiter. No further bus access will
    /// ever happen; there is no restart short of a reboot.
    pub async fn stop(&self) {
        self.core.arbiter.stop().await;
    }

    /// Persist the catalog and the next link configuration.
    pub fn save_config_to_flash(&self) -> bool {
        self.core.save_config_to_flash()
    }

    /// Arbitrated raw pass-through for an embedder acting as a relay.
    pub async fn forward_request_to_slaves(
        &self,
        function: u8,
        slave_addr: u8,
        reg_id: u16,
        word_count: u16,
        words: &mut [u16],
    ) -> Result<(), BusError> {
        self.core
            .arbiter
            .execute(function, slave_addr, reg_id, word_count, words)
            .await
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Test Doubles
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::commands::{CommandHandler, GetterHandler};
    use crate::constants::is_write_function;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Scripted line driver: reads answer from a response table,
    /// writes are recorded.
    #[derive(Default)]
    pub struct FakeBus {
        pub reads: StdMutex<HashMap<(u8, u8, u16), Vec<u16>>>,
        pub writes: StdMutex<Vec<(u8, u8, u16, Vec<u16>)>>,
        pub fail_reads: AtomicBool,
        pub refuse_open: bool,
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script_read(&self, function: u8, slave: u8, reg: u16, words: &[u16]) {
            self.reads
                .lock()
                .unwrap()
                .insert((function, slave, reg), words.to_vec());
        }
    }

    #[async_trait]
    impl ModbusBus for FakeBus {
        async fn open(&self, _settings: &LineSettings) -> Result<(), BusError> {
            if self.refuse_open {
                Err(BusError::Line("no such port".to_string()))
            } else {
                Ok(())
            }
        }

        async fn execute(
            &self,
            function: u8,
            slave_addr: u8,
            reg_id: u16,
            _word_count: u16,
            words: &mut [u16],
        ) -> Result<(), BusError> {
            if is_write_function(function) {
                self.writes
                    .lock()
                    .unwrap()
                    .push((function, slave_addr, reg_id, words.to_vec()));
                return Ok(());
            }
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(BusError::Timeout);
            }
            if let Some(scripted) = self.reads.lock().unwrap().get(&(function, slave_addr, reg_id))
            {
                for (slot, value) in words.iter_mut().zip(scripted) {
                    *slot = *value;
                }
            } else {
                words.fill(0);
            }
            Ok(())
        }
    }

    /// Transport double: keeps the handler registry and every publish.
    #[derive(Default)]
    pub struct FakeTransport {
        commands: StdMutex<HashMap<&'static str, CommandHandler>>,
        getters: StdMutex<HashMap<&'static str, GetterHandler>>,
        pub published: StdMutex<Vec<(String, String)>>,
        pub refuse_publish: AtomicBool,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Invoke a registered command the way the cloud would.
        pub async fn call(&self, name: &str, args: &str) -> i32 {
            let future = {
                let commands = self.commands.lock().unwrap();
                let handler = commands.get(name).unwrap_or_else(|| {
                    panic!("command {} not registered", name);
                });
                handler(args.to_string())
            };
            future.await
        }

        /// Invoke a registered getter the way the cloud would.
        pub async fn get(&self, name: &str, args: &str) -> String {
            let future = {
                let getters = self.getters.lock().unwrap();
                let handler = getters.get(name).unwrap_or_else(|| {
                    panic!("getter {} not registered", name);
                });
                handler(args.to_string())
            };
            future.await
        }

        pub fn published_on(&self, topic: &str) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, payload)| payload.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn register_command(&self, name: &'static str, handler: CommandHandler) {
            self.commands.lock().unwrap().insert(name, handler);
        }

        fn register_getter(&self, name: &'static str, handler: GetterHandler) {
            self.getters.lock().unwrap().insert(name, handler);
        }

        async fn publish(&self, topic: &str, payload: &str) -> bool {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            !self.refuse_publish.load(Ordering::SeqCst)
        }
    }

    pub fn pins() -> UartPins {
        UartPins {
            port: 1,
            tx_pin: 17,
            rx_pin: 16,
            rs485_dir_pin: Some(4),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
