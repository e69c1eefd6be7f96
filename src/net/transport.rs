//! Message-passing transport.
//!
//! The scheduler only needs non-blocking posting of sends and receives plus
//! a completion handle per operation. [`LoopbackTransport`] is an in-process
//! implementation for a single rank whose neighbors are itself (periodic
//! boundaries): a message sent towards `d` arrives as a message from
//! `d.mirror()`. Deliveries run on a private tokio runtime, optionally
//! delayed per direction to model link latency.

use crate::error::Result;
use crate::net::direction::ExchangeDirection;
use crate::{elog_debug, elog_trace};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Message body. The transport never looks inside.
pub type Payload = Box<dyn Any + Send>;

/// Resolves once a posted send has been delivered. Closed if the transport
/// shut down first.
pub type Delivery = oneshot::Receiver<()>;

/// Resolves with the payload of a posted receive.
pub type Incoming = oneshot::Receiver<Payload>;

pub trait Transport: Send + Sync {
    /// Post a send towards `towards`. Never blocks.
    fn send(&self, towards: ExchangeDirection, tag: u32, payload: Payload) -> Delivery;

    /// Post a receive for a message arriving from `from`. Never blocks.
    fn recv(&self, from: ExchangeDirection, tag: u32) -> Incoming;

    /// Abort pending deliveries and receives.
    fn shutdown(&self);

    /// Number of sends posted so far.
    fn messages_sent(&self) -> u64;
}

type Key = (ExchangeDirection, u32);

#[derive(Default)]
struct Mailboxes {
    arrived: HashMap<Key, VecDeque<Payload>>,
    waiting: HashMap<Key, VecDeque<oneshot::Sender<Payload>>>,
}

impl Mailboxes {
    fn deliver(&mut self, key: Key, mut payload: Payload) {
        while let Some(tx) = self.waiting.get_mut(&key).and_then(|q| q.pop_front()) {
            match tx.send(payload) {
                Ok(()) => return,
                // Receiver gave up; hand the message to the next one.
                Err(returned) => payload = returned,
            }
        }
        self.arrived.entry(key).or_default().push_back(payload);
    }
}

pub struct LoopbackTransport {
    runtime: Option<Runtime>,
    mailboxes: Arc<Mutex<Mailboxes>>,
    latency: Duration,
    overrides: Mutex<HashMap<ExchangeDirection, Duration>>,
    cancel: CancellationToken,
    sent: AtomicU64,
    delivered: Arc<AtomicU64>,
}

impl LoopbackTransport {
    pub fn new(latency: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("eventsys-transport")
            .enable_time()
            .build()?;
        elog_debug!("LoopbackTransport started, latency={:?}", latency);
        Ok(Self {
            runtime: Some(runtime),
            mailboxes: Arc::new(Mutex::new(Mailboxes::default())),
            latency,
            overrides: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            sent: AtomicU64::new(0),
            delivered: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Delay deliveries of sends towards `towards` by `latency` instead of
    /// the default.
    pub fn set_latency(&self, towards: ExchangeDirection, latency: Duration) {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(towards, latency);
    }

    fn latency_for(&self, towards: ExchangeDirection) -> Duration {
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&towards)
            .copied()
            .unwrap_or(self.latency)
    }

    pub fn messages_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mailboxes> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, towards: ExchangeDirection, tag: u32, payload: Payload) -> Delivery {
        let (done_tx, done_rx) = oneshot::channel();
        let Some(runtime) = self.runtime.as_ref() else {
            return done_rx;
        };
        if self.cancel.is_cancelled() {
            return done_rx;
        }
        self.sent.fetch_add(1, Ordering::Relaxed);

        let key = (towards.mirror(), tag);
        let delay = self.latency_for(towards);
        let mailboxes = Arc::clone(&self.mailboxes);
        let delivered = Arc::clone(&self.delivered);
        let cancel = self.cancel.clone();
        elog_trace!("send towards {} tag {} delay {:?}", towards, tag, delay);

        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            mailboxes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .deliver(key, payload);
            delivered.fetch_add(1, Ordering::Release);
            let _ = done_tx.send(());
        });
        done_rx
    }

    fn recv(&self, from: ExchangeDirection, tag: u32) -> Incoming {
        let (tx, rx) = oneshot::channel();
        let key = (from, tag);
        let mut mailboxes = self.lock();
        if let Some(payload) = mailboxes.arrived.get_mut(&key).and_then(|q| q.pop_front()) {
            let _ = tx.send(payload);
        } else if !self.cancel.is_cancelled() {
            mailboxes.waiting.entry(key).or_default().push_back(tx);
        }
        rx
    }

    fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        let mut mailboxes = self.lock();
        let abandoned: usize = mailboxes.waiting.values().map(|q| q.len()).sum();
        mailboxes.waiting.clear();
        elog_debug!(
            "LoopbackTransport shut down: sent={}, abandoned receives={}",
            self.sent.load(Ordering::Relaxed),
            abandoned
        );
    }

    fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("latency", &self.latency)
            .field("sent", &self.messages_sent())
            .field("delivered", &self.messages_delivered())
            .finish()
    }
}
