//! Exchange send tasks over the loopback transport.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use eventsys::config::ExchangeOrdering;
use eventsys::memory::{DataSpace, HostBuffer};
use eventsys::net::{BufferExchange, ExchangeDirection, ExchangeSendTask, Neighborhood, Transport};
use eventsys::tasks::RecvTask;
use eventsys::{EventTask, TaskState};

use crate::fixtures::{manager, manager_with_loopback, test_config, GateTask};

const TAG: u32 = 7;

fn outgoing(direction: ExchangeDirection, len: usize) -> HostBuffer<u32, 1> {
    HostBuffer::new_filled(DataSpace::new([len]), direction.code())
}

#[test]
fn test_exchange_finishes_regardless_of_delivery_order() {
    let (mut m, transport) = manager_with_loopback(test_config(1));
    transport.set_latency(ExchangeDirection::LEFT, Duration::from_millis(40));
    transport.set_latency(ExchangeDirection::RIGHT, Duration::from_millis(1));
    transport.set_latency(ExchangeDirection::TOP, Duration::from_millis(20));

    let active = [
        ExchangeDirection::LEFT,
        ExchangeDirection::RIGHT,
        ExchangeDirection::TOP,
    ];
    let mut handler = BufferExchange::<u32>::new(TAG);
    let mut inboxes = Vec::new();
    let mut received = EventTask::ready();
    for direction in active {
        handler = handler.with_send(direction, outgoing(direction, 16));
        let inbox = HostBuffer::<u32, 1>::new(DataSpace::new([16]));
        received += m.submit(RecvTask::into_buffer(direction.mirror(), TAG, inbox.clone()));
        inboxes.push((direction, inbox));
    }

    let sent = m.submit(
        ExchangeSendTask::new(handler, Neighborhood::new(2))
            .with_ordering(ExchangeOrdering::Concurrent),
    );
    let id = sent.task_id().unwrap();
    m.wait(&(sent.clone() + received));

    assert!(sent.is_ready());
    assert!(!m.is_unfinished(id));
    assert_eq!(transport.messages_sent(), 3);
    assert_eq!(transport.messages_delivered(), 3);
    for (direction, inbox) in inboxes {
        assert_eq!(inbox.to_vec(), vec![direction.code(); 16]);
    }
}

#[test]
fn test_exchange_waits_for_slowest_direction() {
    let (mut m, transport) = manager_with_loopback(test_config(1));
    transport.set_latency(ExchangeDirection::RIGHT, Duration::from_millis(60));

    let handler = BufferExchange::<u32>::new(TAG)
        .with_send(ExchangeDirection::LEFT, outgoing(ExchangeDirection::LEFT, 4))
        .with_send(ExchangeDirection::RIGHT, outgoing(ExchangeDirection::RIGHT, 4));
    let start = Instant::now();
    let sent = m.submit(ExchangeSendTask::new(handler, Neighborhood::new(1)));
    let id = sent.task_id().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen_waiting = false;
    while !sent.is_ready() {
        assert!(Instant::now() < deadline, "exchange did not finish");
        m.tick();
        seen_waiting |= m.task_state(id) == Some(TaskState::WaitingForCompletion);
    }
    assert!(seen_waiting);
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_exchange_without_active_directions_submits_no_operations() {
    let mut m = manager(2);
    let handler = BufferExchange::<u32>::new(TAG);
    let sent = m.submit(ExchangeSendTask::new(handler, Neighborhood::new(3)));
    m.wait(&sent);

    assert_eq!(m.lanes().submitted_total(), 0);
    assert_eq!(m.transport().messages_sent(), 0);
    // One marker per direction plus the exchange itself.
    assert_eq!(m.stats().registry.submitted_total, 27);
}

#[test]
fn test_zero_dimensional_exchange_finishes() {
    let mut m = manager(1);
    let sent = m.submit(ExchangeSendTask::new(
        BufferExchange::<u8>::new(TAG),
        Neighborhood::new(0),
    ));
    m.wait(&sent);
    assert_eq!(m.stats().registry.submitted_total, 1);
}

#[test]
fn test_serialized_exchange_delivers_everything() {
    let (mut m, transport) = manager_with_loopback(test_config(1));
    assert_eq!(m.config().exchange_ordering, ExchangeOrdering::Serialized);
    transport.set_latency(ExchangeDirection::LEFT, Duration::from_millis(15));

    let handler = BufferExchange::<u32>::new(TAG)
        .with_send(ExchangeDirection::LEFT, outgoing(ExchangeDirection::LEFT, 2))
        .with_send(ExchangeDirection::BOTTOM, outgoing(ExchangeDirection::BOTTOM, 2));
    let from_left = HostBuffer::<u32, 1>::new(DataSpace::new([2]));
    let from_bottom = HostBuffer::<u32, 1>::new(DataSpace::new([2]));
    let r1 = m.submit(RecvTask::into_buffer(ExchangeDirection::RIGHT, TAG, from_left.clone()));
    let r2 = m.submit(RecvTask::into_buffer(ExchangeDirection::TOP, TAG, from_bottom.clone()));

    let sent = m.submit(ExchangeSendTask::new(handler, Neighborhood::new(2)));
    m.wait(&(sent + r1 + r2));
    assert_eq!(from_left.to_vec(), vec![1, 1]);
    assert_eq!(from_bottom.to_vec(), vec![3, 3]);
}

#[test]
fn test_exchange_inside_transaction_depends_on_seed() {
    let mut m = manager(1);
    let data = HostBuffer::<u32, 1>::new_filled(DataSpace::new([3]), 0);
    let writer = data.clone();
    let prepare = m.submit(eventsys::tasks::ComputeTask::new(move || {
        std::thread::sleep(Duration::from_millis(10));
        writer.write(|mut b| b.as_mut_slice().fill(42));
    }));

    let handler = BufferExchange::<u32>::new(TAG).with_send(ExchangeDirection::LEFT, data);
    let sent = m.transaction(prepare, |m| {
        m.submit(ExchangeSendTask::new(handler, Neighborhood::new(1)));
    });

    let inbox = HostBuffer::<u32, 1>::new(DataSpace::new([3]));
    let recv = m.submit(RecvTask::into_buffer(ExchangeDirection::RIGHT, TAG, inbox.clone()));
    m.wait(&(sent + recv));
    assert_eq!(inbox.to_vec(), vec![42, 42, 42]);
}

#[test]
fn test_exchange_after_dependency_sends_nothing_early() {
    let (mut m, transport) = manager_with_loopback(test_config(2));
    let (gate, open) = GateTask::new();
    let gate = m.submit(gate);

    let handler = BufferExchange::<u32>::new(TAG)
        .with_send(ExchangeDirection::LEFT, outgoing(ExchangeDirection::LEFT, 4))
        .with_send(ExchangeDirection::TOP, outgoing(ExchangeDirection::TOP, 4));
    let sent = m.submit_after(ExchangeSendTask::new(handler, Neighborhood::new(2)), gate);

    for _ in 0..50 {
        m.tick();
    }
    assert!(!sent.is_ready());
    assert_eq!(transport.messages_sent(), 0);

    let from_left = HostBuffer::<u32, 1>::new(DataSpace::new([4]));
    let from_top = HostBuffer::<u32, 1>::new(DataSpace::new([4]));
    let r1 = m.submit(RecvTask::into_buffer(ExchangeDirection::RIGHT, TAG, from_left.clone()));
    let r2 = m.submit(RecvTask::into_buffer(ExchangeDirection::BOTTOM, TAG, from_top.clone()));
    open.store(true, Ordering::Release);
    m.wait(&(sent + r1 + r2));

    assert_eq!(transport.messages_sent(), 2);
    assert_eq!(from_left.to_vec(), vec![ExchangeDirection::LEFT.code(); 4]);
    assert_eq!(from_top.to_vec(), vec![ExchangeDirection::TOP.code(); 4]);
}
