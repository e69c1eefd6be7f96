//! Fill and copy tasks on device lanes.

use eventsys::memory::{DataSpace, DeviceBuffer, HostBuffer};
use eventsys::orchestration::LaneId;
use eventsys::tasks::{CopyTask, FillPolicy, FillTask};
use eventsys::{EventTask, SchedulerConfig};

use crate::fixtures::{manager, test_config, Blob};

/// Two fills then a copy-back pinned to one lane of a four-lane manager;
/// the copy must see the second fill.
fn fill_twice_then_copy(extent: usize, chunk: usize) -> (Vec<u32>, u64) {
    let mut m = eventsys::Manager::new(SchedulerConfig {
        fill_chunk_size: chunk,
        ..test_config(4)
    })
    .unwrap();
    let lane = LaneId(2);
    let device = DeviceBuffer::<u32, 1>::new(DataSpace::new([extent]));
    let host = HostBuffer::<u32, 1>::new(DataSpace::new([extent]));

    let a = m.submit(FillTask::new(device.clone(), 1).on_lane(lane));
    let b = m.submit(FillTask::new(device.clone(), 2).on_lane(lane));
    let c = m.submit(CopyTask::device_to_host(&device, &host).on_lane(lane));
    m.wait(&(a + b + c));

    let pinned = m.lanes().get(lane).unwrap().submitted();
    assert_eq!(m.lanes().submitted_total(), pinned);
    (host.to_vec(), pinned)
}

#[test]
fn test_lane_fifo_with_empty_extent() {
    let (data, ops) = fill_twice_then_copy(0, 64);
    assert!(data.is_empty());
    assert_eq!(ops, 0);
}

#[test]
fn test_lane_fifo_with_single_element() {
    let (data, ops) = fill_twice_then_copy(1, 64);
    assert_eq!(data, vec![2]);
    assert_eq!(ops, 3);
}

#[test]
fn test_lane_fifo_across_many_chunks() {
    let (data, _) = fill_twice_then_copy(10_000, 64);
    assert_eq!(data.len(), 10_000);
    assert!(data.iter().all(|v| *v == 2));
}

#[test]
fn test_fill_policy_boundary_values() {
    let mut m = manager(2);
    let threshold = m.config().small_value_threshold;
    assert_eq!(threshold, 256);
    assert_eq!(FillPolicy::for_value::<Blob<255>>(threshold), FillPolicy::Small);
    assert_eq!(FillPolicy::for_value::<Blob<256>>(threshold), FillPolicy::Large);

    let narrow = DeviceBuffer::<Blob<255>, 1>::new(DataSpace::new([1000]));
    let wide = DeviceBuffer::<Blob<256>, 1>::new(DataSpace::new([1000]));
    let narrow_value = Blob::<255>::pattern(3);
    let wide_value = Blob::<256>::pattern(9);

    let before = m.lanes().submitted_total();
    let a = m.submit(FillTask::new(narrow.clone(), narrow_value));
    let small_ops = m.lanes().submitted_total() - before;
    let b = m.submit(FillTask::new(wide.clone(), wide_value));
    let large_ops = m.lanes().submitted_total() - before - small_ops;
    m.wait(&(a + b));

    assert_eq!(small_ops, 1);
    assert_eq!(large_ops, 2);
    assert!(narrow.to_vec().iter().all(|v| *v == narrow_value));
    assert!(wide.to_vec().iter().all(|v| *v == wide_value));
}

#[test]
fn test_copy_chain_through_transactions() {
    let mut m = manager(3);
    let source = HostBuffer::<u64, 1>::from_vec(DataSpace::new([6]), (0..6).collect()).unwrap();
    let first = DeviceBuffer::<u64, 1>::new(DataSpace::new([6]));
    let second = DeviceBuffer::<u64, 1>::new(DataSpace::new([6]));
    let back = HostBuffer::<u64, 1>::new(DataSpace::new([6]));

    let up = m.transaction(EventTask::ready(), |m| {
        m.submit(CopyTask::host_to_device(&source, &first));
    });
    let across = m.transaction(up, |m| {
        m.submit(CopyTask::device_to_device(&first, &second));
    });
    let down = m.transaction(across, |m| {
        m.submit(CopyTask::device_to_host(&second, &back));
    });
    m.wait(&down);
    assert_eq!(back.to_vec(), (0..6).collect::<Vec<_>>());
}

#[test]
fn test_fill_then_copy_of_2d_region() {
    let mut m = manager(2);
    let device = DeviceBuffer::<u8, 2>::new(DataSpace::new([5, 4]));
    device.set_current_size(10).unwrap();
    let host = HostBuffer::<u8, 2>::new(DataSpace::new([5, 4]));

    let filled = m.submit(FillTask::new(device.clone(), 4));
    let copied = m.submit_after(CopyTask::device_to_host(&device, &host), filled);
    m.wait(&copied);

    assert_eq!(host.current_size(), 10);
    host.set_current_size(20).unwrap();
    let data = host.to_vec();
    assert!(data[..10].iter().all(|v| *v == 4));
    assert!(data[10..].iter().all(|v| *v == 0));
}
