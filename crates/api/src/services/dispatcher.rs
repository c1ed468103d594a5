//! Device command dispatcher.
//!
//! A dispatch writes the command string into the device inbox and arms a
//! watchdog. The device normally clears its inbox after executing; when it
//! has not done so once `clear_delay` elapsed, the watchdog clears the cell
//! as long as it still holds the same command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::models::{DeviceCommand, DispatchReceipt};
use persistence::{paths, RealtimeStore, StoreError, StorePath};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::middleware::metrics::{record_command_dispatched, record_stale_command_cleared};

/// Which dispatch owns each device inbox.
///
/// Generations come from one counter shared by all devices, so a removed
/// entry never lets an older watchdog match a later dispatch.
#[derive(Debug, Default)]
struct InboxOwners {
    next_generation: u64,
    latest: HashMap<String, u64>,
}

impl InboxOwners {
    fn claim(&mut self, device_id: &str) -> u64 {
        self.next_generation += 1;
        self.latest.insert(device_id.to_string(), self.next_generation);
        self.next_generation
    }

    /// Releases the inbox if `generation` still owns it.
    fn release(&mut self, device_id: &str, generation: u64) -> bool {
        if self.latest.get(device_id) == Some(&generation) {
            self.latest.remove(device_id);
            true
        } else {
            false
        }
    }
}

pub struct CommandDispatcher {
    store: Arc<dyn RealtimeStore>,
    clear_delay: Duration,
    shutdown: CancellationToken,
    /// Held across the inbox write and the ownership update, and by a
    /// watchdog across its compare-and-set.
    owners: Arc<Mutex<InboxOwners>>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn RealtimeStore>, clear_delay: Duration) -> Self {
        Self {
            store,
            clear_delay,
            shutdown: CancellationToken::new(),
            owners: Arc::new(Mutex::new(InboxOwners::default())),
        }
    }

    pub fn clear_delay(&self) -> Duration {
        self.clear_delay
    }

    /// Writes `command` to the device inbox and returns once the store
    /// acknowledged the write.
    pub async fn dispatch(
        &self,
        device_id: &str,
        command: DeviceCommand,
    ) -> Result<DispatchReceipt, StoreError> {
        self.dispatch_tracked(device_id, command)
            .await
            .map(|(receipt, _)| receipt)
    }

    pub(crate) async fn dispatch_tracked(
        &self,
        device_id: &str,
        command: DeviceCommand,
    ) -> Result<(DispatchReceipt, JoinHandle<()>), StoreError> {
        let path = paths::device_commands(device_id)?;
        let value = Value::String(command.to_string());

        let generation = {
            let mut owners = self.owners.lock().await;
            self.store.set(&path, value.clone()).await?;
            owners.claim(device_id)
        };

        record_command_dispatched(device_id);
        info!(device_id = %device_id, command = %command, "Command dispatched");

        let watchdog = self.spawn_watchdog(device_id.to_string(), path, value, generation);
        let receipt = DispatchReceipt {
            device_id: device_id.to_string(),
            command: command.to_string(),
            clear_after_ms: self.clear_delay.as_millis() as u64,
        };
        Ok((receipt, watchdog))
    }

    /// Cancels every pending watchdog. Commands still in an inbox stay there.
    pub fn shutdown(&self) {
        info!("Command dispatcher shutting down");
        self.shutdown.cancel();
    }

    fn spawn_watchdog(
        &self,
        device_id: String,
        path: StorePath,
        command: Value,
        generation: u64,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let owners = Arc::clone(&self.owners);
        let shutdown = self.shutdown.clone();
        let delay = self.clear_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(device_id = %device_id, "Watchdog cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let mut owners = owners.lock().await;
            if !owners.release(&device_id, generation) {
                debug!(device_id = %device_id, "Newer dispatch owns the inbox");
                return;
            }

            match store.compare_and_set(&path, Some(&command), None).await {
                Ok(true) => {
                    warn!(
                        device_id = %device_id,
                        command = %command,
                        "Device did not clear command, cleared by watchdog"
                    );
                    record_stale_command_cleared(&device_id);
                }
                Ok(false) => debug!(device_id = %device_id, "Command already consumed"),
                Err(e) => error!(device_id = %device_id, error = %e, "Failed to clear stale command"),
            }
        })
    }
}
