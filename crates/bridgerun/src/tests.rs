use std::collections::HashSet;
use std::io::Read;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bridgewire::Handle;
use bridgewire::Side;
use bridgewire::Sink;
use bridgewire::Source;
use bridgewire::TaskId;
use bridgewire::ThreadIdentity;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::channel::Baton;
use crate::channel::ReadHalf;
use crate::channel::WriteHalf;
use crate::dispatch::Task;
use crate::dispatch::Worker;
use crate::error::Error;
use crate::fdpass;
use crate::handles::HandleTable;
use crate::slots::WaitSlots;

fn identity(serial: u64) -> ThreadIdentity {
    ThreadIdentity::new(Side::Primary, serial)
}

// ============================================================================
//  WAIT SLOTS
// ============================================================================

#[test]
fn slots_grow_then_reuse_lifo() {
    let slots = WaitSlots::new();
    let a = slots.allocate(identity(0));
    let b = slots.allocate(identity(1));
    let c = slots.allocate(identity(2));
    assert_eq!((a, b, c), (TaskId(0), TaskId(1), TaskId(2)));
    assert_eq!(slots.outstanding(), 3);

    slots.trigger(a).unwrap();
    slots.trigger(c).unwrap();
    slots.release(a).unwrap();
    slots.release(c).unwrap();
    assert_eq!(slots.outstanding(), 1);

    // Most recently freed first.
    assert_eq!(slots.allocate(identity(3)), c);
    assert_eq!(slots.allocate(identity(4)), a);
    assert_eq!(slots.capacity(), 3);
}

#[test]
fn slot_trigger_reports_owner() {
    let slots = WaitSlots::new();
    let owner = ThreadIdentity::new(Side::Secondary, 9);
    let task = slots.allocate(owner);
    assert_eq!(slots.trigger(task).unwrap(), owner);
}

#[test]
fn slot_rejects_second_trigger() {
    let slots = WaitSlots::new();
    let task = slots.allocate(identity(0));
    slots.trigger(task).unwrap();
    assert!(matches!(slots.trigger(task), Err(Error::UnknownTask(t)) if t == task));
}

#[test]
fn slot_rejects_unknown_and_freed_tasks() {
    let slots = WaitSlots::new();
    assert!(matches!(slots.trigger(TaskId(0)), Err(Error::UnknownTask(_))));

    let task = slots.allocate(identity(0));
    slots.trigger(task).unwrap();
    slots.release(task).unwrap();
    assert!(matches!(slots.trigger(task), Err(Error::UnknownTask(_))));
    assert!(matches!(slots.release(task), Err(Error::UnknownTask(_))));
    assert!(matches!(slots.trigger(TaskId(99)), Err(Error::UnknownTask(_))));
}

#[test]
fn slots_never_share_an_index_between_live_calls() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let slots = WaitSlots::new();
    let mut live: Vec<TaskId> = Vec::new();
    let mut peak = 0;

    for _ in 0..10_000 {
        if live.is_empty() || rng.gen_bool(0.55) {
            let task = slots.allocate(identity(live.len() as u64));
            assert!(!live.contains(&task), "{} handed out twice", task);
            live.push(task);
            peak = peak.max(live.len());
        } else {
            let task = live.swap_remove(rng.gen_range(0..live.len()));
            slots.trigger(task).unwrap();
            slots.release(task).unwrap();
        }
        assert_eq!(slots.outstanding(), live.len());
    }

    assert_eq!(slots.capacity(), peak);
    let unique: HashSet<_> = live.iter().collect();
    assert_eq!(unique.len(), live.len());
}

// ============================================================================
//  HANDLE TABLE
// ============================================================================

struct Device(&'static str);

#[test]
fn handles_are_one_based_and_monotonic() {
    let table = HandleTable::new();
    let first = table.register(Arc::new(Device("a")));
    let second = table.register(Arc::new(Device("b")));
    assert_eq!(first, Handle(1));
    assert_eq!(second, Handle(2));
    assert_eq!(table.len(), 2);

    assert_eq!(table.lookup::<Device>(first).unwrap().0, "a");
    assert_eq!(table.lookup::<Device>(second).unwrap().0, "b");
}

#[test]
fn handles_do_not_deduplicate() {
    let table = HandleTable::new();
    let device = Arc::new(Device("same"));
    let first = table.register(Arc::clone(&device));
    let second = table.register(Arc::clone(&device));
    assert_ne!(first, second);

    let a = table.lookup::<Device>(first).unwrap();
    let b = table.lookup::<Device>(second).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn null_handle_maps_to_none_both_ways() {
    let table = HandleTable::new();
    assert_eq!(table.register_nullable::<Device>(None), Handle::NULL);
    assert!(table.is_empty());
    assert!(table.lookup::<Device>(Handle::NULL).is_none());
}

#[test]
fn bad_handles_are_reported() {
    let table = HandleTable::new();
    table.register(Arc::new(Device("x")));

    match table.try_lookup::<Device>(Handle(2)) {
        Err(Error::HandleOutOfRange { handle, len }) => {
            assert_eq!(handle, Handle(2));
            assert_eq!(len, 1);
        }
        other => panic!("expected out of range, got {:?}", other.map(|d| d.is_some())),
    }
    assert!(matches!(table.try_lookup::<String>(Handle(1)), Err(Error::HandleType { .. })));
}

// ============================================================================
//  BATON AND MAILBOX
// ============================================================================

#[test]
fn baton_hands_value_across_threads() {
    let baton = Arc::new(Baton::new(1u32));
    let value = baton.take();
    assert!(baton.is_held());

    let waiter = {
        let baton = Arc::clone(&baton);
        thread::spawn(move || baton.take())
    };
    thread::sleep(Duration::from_millis(20));
    baton.put(value + 1).unwrap();
    assert_eq!(waiter.join().unwrap(), 2);
}

#[test]
fn baton_refuses_double_put() {
    let baton = Baton::new(1u32);
    assert_eq!(baton.put(2), Err(2));
}

#[test]
fn worker_mailbox_holds_one_task() {
    let (a, _b) = UnixStream::pair().unwrap();
    let worker: Worker<u8> = Worker::new(identity(0), true);
    let reader = ReadHalf::new(a.try_clone().unwrap());
    worker.deliver(Task::Return { task: TaskId(0), reader }).unwrap();

    let second = ReadHalf::new(a);
    assert!(matches!(
        worker.deliver(Task::Return { task: TaskId(1), reader: second }),
        Err(Error::WorkerBusy(_))
    ));
    assert!(matches!(worker.park(), Task::Return { task: TaskId(0), .. }));
}

// ============================================================================
//  SOCKET HALVES
// ============================================================================

#[test]
fn header_read_distinguishes_eof_from_truncation() {
    let (a, b) = UnixStream::pair().unwrap();
    let mut writer = WriteHalf::new(a);
    let mut reader = ReadHalf::new(b);

    writer.send_u8(7);
    writer.send_u16(0x0102);
    writer.flush().unwrap();
    assert_eq!(reader.recv_header().unwrap(), Some(7));
    assert_eq!(reader.recv_u16(), 0x0102);

    writer.send_u8(1);
    writer.flush().unwrap();
    drop(writer);
    assert_eq!(reader.recv_header().unwrap(), Some(1));
    let mut rest = [0u8; 8];
    assert!(matches!(reader.read(&mut rest), Err(Error::Truncated)));
    assert_eq!(reader.recv_header().unwrap(), None);
}

#[test]
fn descriptor_travels_in_band() {
    let (a, b) = UnixStream::pair().unwrap();
    let (mut near, far) = UnixStream::pair().unwrap();

    let mut writer = WriteHalf::new(a);
    let mut reader = ReadHalf::new(b);
    writer.send_u64(41);
    writer.send_fd(std::os::fd::AsFd::as_fd(&far)).unwrap();
    writer.send_u64(42);
    writer.flush().unwrap();
    drop(far);

    assert_eq!(reader.recv_u64(), 41);
    let received = reader.recv_fd().unwrap();
    assert_eq!(reader.recv_u64(), 42);

    let mut received = UnixStream::from(received);
    received.write_all(b"through the copy").unwrap();
    drop(received);
    let mut text = String::new();
    near.read_to_string(&mut text).unwrap();
    assert_eq!(text, "through the copy");
}

#[test]
fn descriptor_without_rights_is_rejected() {
    let (a, b) = UnixStream::pair().unwrap();
    (&a).write_all(b"x").unwrap();
    assert!(matches!(fdpass::recv_fd(std::os::fd::AsFd::as_fd(&b)), Err(Error::Descriptor(_))));
}
