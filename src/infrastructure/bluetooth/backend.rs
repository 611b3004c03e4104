//! btleplug-backed transport.
//!
//! One peripheral per derived service UUID: the scan is filtered on that
//! UUID, so discovery is "first peripheral advertising it wins". A pump task
//! per link forwards characteristic notifications and the platform disconnect
//! event onto the registry's channel; after the disconnect is forwarded the
//! pump exits, which guarantees at most one `Disconnected` per connection.

use crate::domain::models::{LinkEvent, SlotEvent};
use crate::infrastructure::bluetooth::transport::{BleLink, BleTransport, TransportError};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the discovery loop re-checks the adapter's peripheral list.
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct BtleplugTransport {
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Grab the first Bluetooth adapter on the system.
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;
        Ok(Self { adapter })
    }

    /// Scan until a peripheral advertising `service_uuid` shows up. Unbounded
    /// on purpose; the caller races this against its connect timeout.
    async fn discover(&self, service_uuid: Uuid) -> Result<Peripheral, TransportError> {
        loop {
            for peripheral in self
                .adapter
                .peripherals()
                .await
                .map_err(|e| TransportError::Connection(e.to_string()))?
            {
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                if props.services.contains(&service_uuid) {
                    debug!(
                        "Found peripheral {:?} advertising {}",
                        props.local_name, service_uuid
                    );
                    return Ok(peripheral);
                }
            }
            tokio::time::sleep(DISCOVERY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    type Link = BtleplugLink;

    async fn connect(
        &self,
        slot: usize,
        generation: u64,
        service_uuid: Uuid,
        events: mpsc::UnboundedSender<SlotEvent>,
    ) -> Result<Self::Link, TransportError> {
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service_uuid],
            })
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let peripheral = self.discover(service_uuid).await?;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let device_name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);
        info!(
            "Slot {}: connected to {}",
            slot,
            device_name.as_deref().unwrap_or("unnamed peripheral")
        );

        // Pump task: forward notifications and the platform disconnect, then
        // exit on the first disconnect seen from either side.
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Subscription(e.to_string()))?;
        let mut central_events = self
            .adapter
            .events()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(n) => {
                            let _ = events.send(SlotEvent {
                                slot,
                                generation,
                                kind: LinkEvent::Notification(n.value),
                            });
                        }
                        None => {
                            let _ = events.send(SlotEvent {
                                slot,
                                generation,
                                kind: LinkEvent::Disconnected,
                            });
                            break;
                        }
                    },
                    event = central_events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            let _ = events.send(SlotEvent {
                                slot,
                                generation,
                                kind: LinkEvent::Disconnected,
                            });
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!("Slot {}: event pump stopped", slot);
        });

        Ok(BtleplugLink {
            peripheral,
            device_name,
        })
    }
}

pub struct BtleplugLink {
    peripheral: Peripheral,
    device_name: Option<String>,
}

impl BtleplugLink {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    fn characteristics(&self) -> Vec<Uuid> {
        self.peripheral
            .characteristics()
            .into_iter()
            .map(|c| c.uuid)
            .collect()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral
            .subscribe(&c)
            .await
            .map_err(|e| TransportError::Subscription(e.to_string()))
    }

    async fn write_value(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let c = self.characteristic(characteristic)?;
        self.peripheral
            .write(&c, payload, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn disconnect(&self) {
        if let Err(e) = self.peripheral.disconnect().await {
            // Already gone is the common case here.
            debug!("Disconnect returned: {}", e);
        }
    }

    fn device_name(&self) -> Option<String> {
        self.device_name.clone()
    }
}
