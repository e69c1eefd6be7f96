//! Transaction bracket tests.

use std::sync::atomic::Ordering;

use eventsys::tasks::ComputeTask;
use eventsys::EventTask;

use crate::fixtures::{manager, GateTask};

#[test]
fn test_transaction_event_covers_every_task() {
    let mut m = manager(2);
    m.start_transaction(EventTask::ready());
    let mut gates = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..5 {
        let (gate, open) = GateTask::new();
        ids.push(m.submit(gate).task_id().unwrap());
        gates.push(open);
    }
    let event = m.end_transaction();

    assert_eq!(event.len(), 5);
    for id in &ids {
        assert!(event.contains(*id));
    }
    assert!(!event.is_ready());

    for (i, open) in gates.iter().enumerate() {
        open.store(true, Ordering::Release);
        m.tick();
        assert_eq!(event.is_ready(), i == gates.len() - 1);
    }
}

#[test]
fn test_empty_transaction_returns_seed() {
    let mut m = manager(1);
    let (gate, open) = GateTask::new();
    let seed = m.submit(gate);

    m.start_transaction(seed.clone());
    let event = m.end_transaction();
    assert_eq!(event, seed);

    open.store(true, Ordering::Release);
    m.wait(&event);
}

#[test]
fn test_tasks_inside_depend_on_seed() {
    let mut m = manager(2);
    let (gate, open) = GateTask::new();
    let seed = m.submit(gate);

    let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = ran.clone();
    let event = m.transaction(seed, |m| {
        m.submit(ComputeTask::new(move || flag.store(true, Ordering::Release)));
    });

    for _ in 0..20 {
        m.tick();
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(!ran.load(Ordering::Acquire));

    open.store(true, Ordering::Release);
    m.wait(&event);
    assert!(ran.load(Ordering::Acquire));
}

#[test]
fn test_nested_transaction_flows_into_parent() {
    let mut m = manager(1);
    m.start_transaction(EventTask::ready());
    let outer = m.submit(ComputeTask::new(|| {}));

    m.start_transaction(EventTask::ready());
    let inner = m.submit(ComputeTask::new(|| {}));
    let inner_event = m.end_transaction();
    assert_eq!(m.transaction_depth(), 2);

    let event = m.end_transaction();
    assert_eq!(m.transaction_depth(), 1);
    assert!(inner_event.contains(inner.task_id().unwrap()));
    assert!(!inner_event.contains(outer.task_id().unwrap()));
    assert!(event.contains(inner.task_id().unwrap()));
    assert!(event.contains(outer.task_id().unwrap()));
    m.wait(&event);
}

#[test]
fn test_merge_of_disjoint_events() {
    let mut m = manager(2);
    let (a, open_a) = GateTask::new();
    let (b, open_b) = GateTask::new();
    let a = m.submit(a);
    let b = m.submit(b);

    let both = a.clone() + b.clone();
    assert_eq!(both.len(), 2);
    assert_eq!(&both + &a, both);

    open_a.store(true, Ordering::Release);
    m.tick();
    assert!(a.is_ready());
    assert!(!both.is_ready());

    open_b.store(true, Ordering::Release);
    m.wait(&both);
    assert!(both.is_ready());
}

#[test]
fn test_merge_with_ready_is_identity() {
    let mut m = manager(1);
    let (gate, open) = GateTask::new();
    let event = m.submit(gate);

    assert_eq!(EventTask::ready() + event.clone(), event);
    assert!((EventTask::ready() + EventTask::ready()).is_ready());

    open.store(true, Ordering::Release);
    m.wait(&event);
}
