//! Scripted in-memory transport for driving the state machine in tests.
//!
//! The mock mirrors the real backend's surface: `connect` hands out a link
//! whose notifications and disconnects are pushed onto the registry's event
//! channel. Tests hold a clone of the transport as a control handle to inject
//! faults, send notification bytes, and inspect what the machine wrote.

use crate::domain::models::{LinkEvent, SlotEvent};
use crate::infrastructure::bluetooth::transport::{BleLink, BleTransport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

struct MockShared {
    connect_calls: AtomicUsize,
    connect_delay: Mutex<Duration>,
    subscribe_delay: Mutex<Duration>,
    fail_connect: AtomicBool,
    omit_characteristic: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_writes: AtomicBool,
    device_name: Mutex<Option<String>>,
    links: Mutex<HashMap<usize, Arc<LinkInner>>>,
}

struct LinkInner {
    slot: usize,
    generation: u64,
    characteristics: Vec<Uuid>,
    events: mpsc::UnboundedSender<SlotEvent>,
    subscriptions: Mutex<Vec<Uuid>>,
    writes: Mutex<Vec<Vec<u8>>>,
    disconnected: AtomicBool,
    name: Option<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockShared {
                connect_calls: AtomicUsize::new(0),
                connect_delay: Mutex::new(Duration::ZERO),
                subscribe_delay: Mutex::new(Duration::ZERO),
                fail_connect: AtomicBool::new(false),
                omit_characteristic: AtomicBool::new(false),
                fail_subscribe: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                device_name: Mutex::new(None),
                links: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.shared.connect_delay.lock().expect("mock mutex poisoned") = delay;
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.shared.subscribe_delay.lock().expect("mock mutex poisoned") = delay;
    }

    /// Connect succeeds but the expected characteristic is missing from the
    /// discovered service.
    pub fn set_omit_characteristic(&self, omit: bool) {
        self.shared.omit_characteristic.store(omit, Ordering::SeqCst);
    }

    pub fn set_subscribe_failure(&self, fail: bool) {
        self.shared.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_failure(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_device_name(&self, name: Option<&str>) {
        *self.shared.device_name.lock().expect("mock mutex poisoned") =
            name.map(str::to_string);
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.connect_calls.load(Ordering::SeqCst)
    }

    fn link(&self, slot: usize) -> Arc<LinkInner> {
        self.shared
            .links
            .lock()
            .expect("mock mutex poisoned")
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| panic!("no mock link for slot {}", slot))
    }

    /// Deliver one notification byte from the peripheral on `slot`.
    pub fn notify(&self, slot: usize, byte: u8) {
        let link = self.link(slot);
        let _ = link.events.send(SlotEvent {
            slot,
            generation: link.generation,
            kind: LinkEvent::Notification(vec![byte]),
        });
    }

    /// Simulate unsolicited link loss (out of range, battery died).
    pub fn drop_link(&self, slot: usize) {
        let link = self.link(slot);
        link.disconnected.store(true, Ordering::SeqCst);
        let _ = link.events.send(SlotEvent {
            slot,
            generation: link.generation,
            kind: LinkEvent::Disconnected,
        });
    }

    /// Payloads the machine wrote to `slot`'s characteristic, in order.
    pub fn writes(&self, slot: usize) -> Vec<Vec<u8>> {
        self.link(slot).writes.lock().expect("mock mutex poisoned").clone()
    }

    pub fn subscriptions(&self, slot: usize) -> Vec<Uuid> {
        self.link(slot)
            .subscriptions
            .lock()
            .expect("mock mutex poisoned")
            .clone()
    }

    /// Whether the machine closed the link on `slot`.
    pub fn link_closed(&self, slot: usize) -> bool {
        self.link(slot).disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    type Link = MockLink;

    async fn connect(
        &self,
        slot: usize,
        generation: u64,
        service_uuid: Uuid,
        events: mpsc::UnboundedSender<SlotEvent>,
    ) -> Result<Self::Link, TransportError> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shared.connect_delay.lock().expect("mock mutex poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("mock refused".into()));
        }

        // The movement characteristic base differs from the service base only
        // in the top 32 bits (0x19b10010 vs 0x19b10011).
        let characteristics = if self.shared.omit_characteristic.load(Ordering::SeqCst) {
            Vec::new()
        } else {
            vec![Uuid::from_u128(service_uuid.as_u128() + (1 << 96))]
        };

        let inner = Arc::new(LinkInner {
            slot,
            generation,
            characteristics,
            events,
            subscriptions: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
            name: self
                .shared
                .device_name
                .lock()
                .expect("mock mutex poisoned")
                .clone(),
        });
        self.shared
            .links
            .lock()
            .expect("mock mutex poisoned")
            .insert(slot, Arc::clone(&inner));

        Ok(MockLink {
            inner,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MockLink {
    inner: Arc<LinkInner>,
    shared: Arc<MockShared>,
}

impl MockLink {
    /// A link with no backing transport, for state-machine unit tests that
    /// never touch the wire.
    pub fn detached() -> Self {
        let (events, _rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(LinkInner {
                slot: 0,
                generation: 0,
                characteristics: Vec::new(),
                events,
                subscriptions: Mutex::new(Vec::new()),
                writes: Mutex::new(Vec::new()),
                disconnected: AtomicBool::new(false),
                name: None,
            }),
            shared: MockTransport::new().shared,
        }
    }
}

#[async_trait]
impl BleLink for MockLink {
    fn characteristics(&self) -> Vec<Uuid> {
        self.inner.characteristics.clone()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        let delay = *self
            .shared
            .subscribe_delay
            .lock()
            .expect("mock mutex poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.shared.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Subscription("mock refused".into()));
        }
        self.inner
            .subscriptions
            .lock()
            .expect("mock mutex poisoned")
            .push(characteristic);
        Ok(())
    }

    async fn write_value(
        &self,
        _characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Write("mock refused".into()));
        }
        if self.inner.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::Write("link closed".into()));
        }
        self.inner
            .writes
            .lock()
            .expect("mock mutex poisoned")
            .push(payload.to_vec());
        Ok(())
    }

    async fn disconnect(&self) {
        // Real stacks fire the platform disconnect callback here; mirror
        // that by emitting the event exactly once.
        if !self.inner.disconnected.swap(true, Ordering::SeqCst) {
            let _ = self.inner.events.send(SlotEvent {
                slot: self.inner.slot,
                generation: self.inner.generation,
                kind: LinkEvent::Disconnected,
            });
        }
    }

    fn device_name(&self) -> Option<String> {
        self.inner.name.clone()
    }
}
