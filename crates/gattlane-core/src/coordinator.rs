//! Public entry point: every request becomes one task on the command lane

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::central::{CentralEvent, ChannelScanListener};
use crate::config::LaneConfig;
use crate::connection::ConnectionState;
use crate::error::Result;
use crate::keepalive::{Keepalive, NoopKeepalive};
use crate::lane::Lane;
use crate::queue::{CommandQueue, TaskHandle};
use crate::radio::RadioAdapter;
use crate::scan::ScanListener;
use crate::service::LocalService;

/// Serialized front door to one radio
///
/// There is one physical radio, so a process should construct exactly one
/// coordinator per adapter and share it by reference. Nothing enforces this;
/// two coordinators on the same adapter would interleave radio requests.
///
/// Every method queues its task immediately and returns a [`TaskHandle`].
/// Requests run in the order the methods were called, whether or not the
/// handles are awaited in that order.
pub struct BleCoordinator {
    queue: CommandQueue<Lane>,
}

impl BleCoordinator {
    /// Spawn the lane on the current tokio runtime
    pub fn new(adapter: Arc<dyn RadioAdapter>, config: LaneConfig) -> Result<Self> {
        Self::with_keepalive(adapter, config, Arc::new(NoopKeepalive))
    }

    pub fn with_keepalive(
        adapter: Arc<dyn RadioAdapter>,
        config: LaneConfig,
        keepalive: Arc<dyn Keepalive>,
    ) -> Result<Self> {
        config.validate()?;
        let name = config.lane_name.clone();
        let lane = Lane::new(adapter, config, keepalive);
        Ok(Self {
            queue: CommandQueue::spawn(name, lane),
        })
    }

    /// Number of requests submitted so far
    pub fn submitted(&self) -> u64 {
        self.queue.submitted()
    }

    // ------------------------------------------------------------------------
    // Peripheral
    // ------------------------------------------------------------------------

    pub fn create_service(&self, service: LocalService) -> TaskHandle<()> {
        self.queue
            .submit(move |lane: &mut Lane| Box::pin(async move { lane.create_service(service).await }))
    }

    pub fn remove_service(&self, uuid: Uuid) -> TaskHandle<()> {
        self.queue
            .submit(move |lane: &mut Lane| Box::pin(async move { lane.remove_service(uuid).await }))
    }

    /// Registered service uuids in advertisement order
    pub fn registered_services(&self) -> TaskHandle<Vec<Uuid>> {
        self.queue
            .submit(|lane: &mut Lane| Box::pin(async move { Ok(lane.registry().uuids()) }))
    }

    pub fn is_advertising(&self) -> TaskHandle<bool> {
        self.queue
            .submit(|lane: &mut Lane| Box::pin(async move { Ok(lane.is_advertising()) }))
    }

    // ------------------------------------------------------------------------
    // Central
    // ------------------------------------------------------------------------

    /// Scan for peers. An empty `filter` scans without filtering.
    pub fn scan(&self, filter: Vec<Uuid>, listener: Arc<dyn ScanListener>) -> TaskHandle<()> {
        self.queue
            .submit(move |lane: &mut Lane| Box::pin(async move { lane.scan(filter, listener) }))
    }

    /// Scan and receive the results as [`CentralEvent`]s
    pub fn scan_events(
        &self,
        filter: Vec<Uuid>,
    ) -> (TaskHandle<()>, mpsc::UnboundedReceiver<CentralEvent>) {
        let (listener, rx) = ChannelScanListener::channel();
        (self.scan(filter, listener), rx)
    }

    pub fn is_scanning(&self) -> TaskHandle<bool> {
        self.queue
            .submit(|lane: &mut Lane| Box::pin(async move { Ok(lane.is_scanning()) }))
    }

    /// Stop the running scan. Resolves to `false` if none was running.
    pub fn stop_scan(&self) -> TaskHandle<bool> {
        self.queue
            .submit(|lane: &mut Lane| Box::pin(async move { Ok(lane.stop_scan()) }))
    }

    /// Read one characteristic from `address`, connecting and discovering
    /// services first when needed
    pub fn read_characteristic(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> TaskHandle<Vec<u8>> {
        let address = address.to_string();
        self.queue.submit(move |lane: &mut Lane| {
            Box::pin(async move {
                lane.read_characteristic(&address, service, characteristic)
                    .await
            })
        })
    }

    pub fn disconnect(&self, address: &str) -> TaskHandle<bool> {
        let address = address.to_string();
        self.queue
            .submit(move |lane: &mut Lane| Box::pin(async move { Ok(lane.disconnect(&address)) }))
    }

    pub fn connection_state(&self, address: &str) -> TaskHandle<Option<ConnectionState>> {
        let address = address.to_string();
        self.queue.submit(move |lane: &mut Lane| {
            Box::pin(async move { Ok(lane.connection_state(&address)) })
        })
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Finish queued requests, release the radio and stop the lane
    pub async fn shutdown(self) -> Result<()> {
        let released = self.queue.submit(|lane: &mut Lane| {
            Box::pin(async move {
                lane.shutdown();
                Ok(())
            })
        });
        let outcome = released.await;
        self.queue.shutdown().await;
        outcome
    }
}
