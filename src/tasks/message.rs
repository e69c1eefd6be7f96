//! Point-to-point send and receive over the transport.
//!
//! Both run on the per-direction channel lanes. A send produces its payload
//! on the lane once its dependencies are done, posts it, then waits in
//! `WaitingForCompletion` until the transport reports delivery. A receive
//! posts its request at init and hands the payload to its consumer on the
//! receive lane, after its dependencies are done. A receive still pending
//! when the transport shuts down is abandoned with a warning and its consumer
//! never runs.

use crate::core::task::{Progress, Task, TaskId, TaskKind};
use crate::error::fatal;
use crate::memory::HostBuffer;
use crate::net::{Delivery, ExchangeDirection, Payload};
use crate::orchestration::{ChannelRole, Context, LaneEvent};
use crate::elog_warn;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot::error::TryRecvError;

type Producer = Box<dyn FnOnce() -> Payload + Send + 'static>;
type Consumer = Box<dyn FnOnce(Payload) + Send + 'static>;

pub struct SendTask {
    towards: ExchangeDirection,
    tag: u32,
    producer: Option<Producer>,
    id: Option<TaskId>,
    posted: Option<LaneEvent>,
    slot: Arc<Mutex<Option<Delivery>>>,
    delivery: Option<Delivery>,
}

impl SendTask {
    pub fn new<F>(towards: ExchangeDirection, tag: u32, producer: F) -> Self
    where
        F: FnOnce() -> Payload + Send + 'static,
    {
        Self {
            towards,
            tag,
            producer: Some(Box::new(producer)),
            id: None,
            posted: None,
            slot: Arc::new(Mutex::new(None)),
            delivery: None,
        }
    }

    /// Send the current contents of `buffer` as a `Vec<T>`.
    pub fn from_buffer<T>(towards: ExchangeDirection, tag: u32, buffer: HostBuffer<T, 1>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(towards, tag, move || Box::new(buffer.to_vec()) as Payload)
    }

    pub fn towards(&self) -> ExchangeDirection {
        self.towards
    }

    fn fail(&self, msg: &str) -> ! {
        fatal(
            TaskKind::Communication,
            self.id.unwrap_or_else(|| TaskId::from_raw(0)),
            msg,
        )
    }
}

impl Task for SendTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Communication
    }

    fn name(&self) -> &'static str {
        "send"
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        self.id = Some(cx.task_id());
        let lane = cx.channel_lane(self.towards, ChannelRole::Send);
        let transport = cx.transport();
        let slot = Arc::clone(&self.slot);
        let (towards, tag) = (self.towards, self.tag);
        if let Some(producer) = self.producer.take() {
            self.posted = Some(cx.enqueue(lane, move || {
                let delivery = transport.send(towards, tag, producer());
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(delivery);
            }));
        }
    }

    fn poll(&mut self) -> Progress {
        match &self.posted {
            Some(ev) if !ev.is_complete() => return Progress::Pending,
            Some(_) => {}
            None => return Progress::Done,
        }
        if self.delivery.is_none() {
            self.delivery = self
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
        let Some(delivery) = self.delivery.as_mut() else {
            self.fail("send completed on its lane without posting");
        };
        match delivery.try_recv() {
            Ok(()) => Progress::Done,
            Err(TryRecvError::Empty) => Progress::WaitingForCompletion,
            Err(TryRecvError::Closed) => {
                self.fail(&format!("transport shut down under a pending send towards {}", self.towards))
            }
        }
    }
}

pub struct RecvTask {
    from: ExchangeDirection,
    tag: u32,
    consumer: Option<Consumer>,
    received: Option<LaneEvent>,
}

impl RecvTask {
    pub fn new<F>(from: ExchangeDirection, tag: u32, consumer: F) -> Self
    where
        F: FnOnce(Payload) + Send + 'static,
    {
        Self {
            from,
            tag,
            consumer: Some(Box::new(consumer)),
            received: None,
        }
    }

    /// Receive a `Vec<T>` into `buffer`, updating its current size.
    pub fn into_buffer<T>(from: ExchangeDirection, tag: u32, buffer: HostBuffer<T, 1>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(from, tag, move |payload| {
            let data = match payload.downcast::<Vec<T>>() {
                Ok(data) => data,
                Err(_) => panic!("payload from {} is not a Vec of the buffer's element type", from),
            };
            if data.len() > buffer.capacity() {
                panic!(
                    "payload of {} elements overflows buffer of {}",
                    data.len(),
                    buffer.capacity()
                );
            }
            buffer.write(|mut b| b.as_mut_slice()[..data.len()].clone_from_slice(&data));
            if let Err(e) = buffer.set_current_size(data.len()) {
                panic!("received payload from {} rejected: {}", from, e);
            }
        })
    }

    pub fn from(&self) -> ExchangeDirection {
        self.from
    }
}

impl Task for RecvTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Communication
    }

    fn name(&self) -> &'static str {
        "recv"
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        let lane = cx.channel_lane(self.from, ChannelRole::Receive);
        let incoming = cx.transport().recv(self.from, self.tag);
        let from = self.from;
        if let Some(consumer) = self.consumer.take() {
            self.received = Some(cx.enqueue(lane, move || match incoming.blocking_recv() {
                Ok(payload) => consumer(payload),
                Err(_) => elog_warn!("receive from {} abandoned: transport shut down", from),
            }));
        }
    }

    fn poll(&mut self) -> Progress {
        Progress::from_done(self.received.as_ref().map_or(true, |ev| ev.is_complete()))
    }

    fn awaits_peer(&self) -> bool {
        true
    }
}
