//! Completion notification and waiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eventsys::net::{BufferExchange, ExchangeSendTask, Neighborhood};
use eventsys::tasks::{ComputeTask, MarkerTask};
use eventsys::{Error, EventTask, TaskState};

use crate::fixtures::{manager, GateTask, ListenerTask};

#[test]
fn test_observer_fires_exactly_once() {
    let mut m = manager(1);
    let (gate, open) = GateTask::new();
    let event = m.submit(gate);
    let id = event.task_id().unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    m.observe(id, move |finished| {
        assert_eq!(finished, id);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    m.tick();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    open.store(true, Ordering::Release);
    m.wait(&event);
    for _ in 0..10 {
        m.tick();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_notification_fires_once_with_many_dependents() {
    let mut m = manager(2);
    let (gate, open) = GateTask::new();
    let source = m.submit(gate);
    let id = source.task_id().unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    m.observe(id, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut listeners = Vec::new();
    let mut dependents = EventTask::ready();
    for _ in 0..3 {
        let (listener, heard) = ListenerTask::new();
        dependents += m.submit_after(listener, source.clone());
        listeners.push(heard);
    }
    dependents += m.submit_after(MarkerTask::new(), source.clone());
    dependents += m.submit_after(
        ExchangeSendTask::new(BufferExchange::<u8>::new(1), Neighborhood::new(1)),
        source.clone(),
    );
    dependents += m.transaction(source.clone(), |m| {
        m.submit(MarkerTask::new());
        m.transaction(EventTask::ready(), |m| {
            m.submit_after(MarkerTask::new(), source.clone());
        });
    });

    for _ in 0..10 {
        m.tick();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(!dependents.is_ready());

    open.store(true, Ordering::Release);
    m.wait(&dependents);
    for _ in 0..10 {
        m.tick();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    for heard in listeners {
        assert_eq!(*heard.lock().unwrap(), vec![id]);
    }
}

#[test]
fn test_notify_when_ready_after_chain() {
    let mut m = manager(2);
    let a = m.submit(ComputeTask::new(|| std::thread::sleep(Duration::from_millis(5))));
    let b = m.submit_after(ComputeTask::new(|| {}), a.clone());

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let marker = m.notify_when_ready(&(a + b), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    m.wait(&marker);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_states_progress_to_finished() {
    let mut m = manager(1);
    let (gate, open) = GateTask::new();
    let event = m.submit(gate);
    let id = event.task_id().unwrap();

    assert_eq!(m.task_state(id), Some(TaskState::Queued));
    assert!(m.is_unfinished(id));

    open.store(true, Ordering::Release);
    m.wait(&event);
    assert!(!m.is_unfinished(id));
    assert!(event.is_ready());
}

#[test]
fn test_finished_tasks_are_collected_once_unreferenced() {
    let mut m = manager(2);
    let events: Vec<EventTask> = (0..50).map(|_| m.submit(ComputeTask::new(|| {}))).collect();
    let all = events.iter().fold(EventTask::ready(), |acc, e| acc + e.clone());
    m.wait(&all);

    drop(events);
    drop(all);
    m.tick();
    let stats = m.stats();
    assert_eq!(stats.registry.submitted_total, 50);
    assert_eq!(stats.registry.finished_total, 50);
    assert_eq!(stats.registry.collected_total, 50);
    assert_eq!(stats.registry.live, 0);
}

#[test]
fn test_wait_timeout_on_stuck_task() {
    let mut m = manager(1);
    let (gate, open) = GateTask::new();
    let event = m.submit(gate);

    let result = m.wait_timeout(&event, Duration::from_millis(20));
    assert!(matches!(result, Err(Error::Timeout(_))));

    open.store(true, Ordering::Release);
    assert!(m.wait_timeout(&event, Duration::from_secs(5)).is_ok());
}

#[test]
fn test_wait_all_drains_everything() {
    let mut m = manager(3);
    let counter = Arc::new(AtomicUsize::new(0));
    let mut previous = EventTask::ready();
    for _ in 0..20 {
        let c = counter.clone();
        previous = m.submit_after(
            ComputeTask::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            previous,
        );
    }
    m.wait_all();
    assert_eq!(counter.load(Ordering::SeqCst), 20);
    assert!(previous.is_ready());
}

#[test]
fn test_dependency_chain_runs_in_order_across_lanes() {
    let mut m = manager(4);
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut previous = EventTask::ready();
    for i in 0..12 {
        let log = log.clone();
        previous = m.submit_after(
            ComputeTask::new(move || {
                std::thread::sleep(Duration::from_micros(((12 - i) * 100) as u64));
                log.lock().unwrap().push(i);
            }),
            previous,
        );
    }
    m.wait(&previous);
    assert_eq!(*log.lock().unwrap(), (0..12).collect::<Vec<_>>());
}
