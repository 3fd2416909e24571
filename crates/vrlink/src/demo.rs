//! # Demo Catalogue
//!
//! A small driver-style surface that exercises every transport feature: plain scalars,
//! byte blobs, reentrant call chains, object handles, and descriptor transfer. Both ends
//! run the same [`DemoHandler`], so either side can serve any method.

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use anyhow::Context;
use anyhow::ensure;
use bridgerun::CallContext;
use bridgerun::Connection;
use bridgerun::Handler;
use bridgerun::Incoming;
use bridgerun::Replied;
use bridgewire::Handle;
use bridgewire::Sink;
use bridgewire::Source;

bridgewire::define_methods! {
    pub enum Demo {
        /// No args. Returns how many pings this side has served.
        Ping = 0,
        /// `[Blob]`. Returns the same blob.
        Echo = 1,
        /// `[Level: u64]`. Calls the peer with `Level - 1` until zero; returns the depth.
        Countdown = 2,
        /// `[Serial: Str]`. Returns a handle to a new device object on the serving side.
        OpenDevice = 3,
        /// `[Device: Handle]`. Returns `[Known: bool][Serial: Str]`.
        DeviceSerial = 4,
        /// `[Fd][Blob]`. Writes the blob through the descriptor; returns whether it worked.
        FillDescriptor = 5,
    }
}

/// A device object exposed to the peer by handle.
pub struct Device {
    pub serial: String,
}

#[derive(Default)]
pub struct DemoHandler {
    pings: AtomicU64,
}

impl DemoHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Handler<Demo> for DemoHandler {
    fn handle(&self, mut call: Incoming<'_, Demo>) -> Replied {
        match call.method() {
            Demo::Ping => {
                let mut reply = call.complete_reading_args().return_from_call();
                reply.send_u64(self.pings.fetch_add(1, Ordering::Relaxed) + 1);
                reply.finish()
            }
            Demo::Echo => {
                let data = call.recv_blob();
                let mut reply = call.complete_reading_args().return_from_call();
                reply.send_blob(&data);
                reply.finish()
            }
            Demo::Countdown => {
                let level = call.recv_u64();
                let pending = call.complete_reading_args();
                let depth = match level {
                    0 => 0,
                    n => countdown(pending.context(), n - 1) + 1,
                };
                let mut reply = pending.return_from_call();
                reply.send_u64(depth);
                reply.finish()
            }
            Demo::OpenDevice => {
                let serial = call.recv_string();
                let mut reply = call.complete_reading_args().return_from_call();
                let handle = reply.send_object(Some(Arc::new(Device { serial: serial.clone() })));
                tracing::info!(%serial, %handle, "opened device");
                reply.finish()
            }
            Demo::DeviceSerial => {
                let device = call.recv_object::<Device>();
                let mut reply = call.complete_reading_args().return_from_call();
                reply.send_bool(device.is_some());
                reply.send_str(device.as_ref().map(|d| d.serial.as_str()).unwrap_or(""));
                reply.finish()
            }
            Demo::FillDescriptor => {
                let fd = call.recv_fd();
                let data = call.recv_blob();
                let pending = call.complete_reading_args();
                let written = File::from(fd).write_all(&data);
                if let Err(e) = &written {
                    tracing::warn!(error = %e, "writing through received descriptor failed");
                }
                let mut reply = pending.return_from_call();
                reply.send_bool(written.is_ok());
                reply.finish()
            }
        }
    }
}

// ============================================================================
//  CLIENT STUBS
// ============================================================================

pub fn ping(cx: &CallContext<Demo>) -> u64 {
    let mut ret = cx.begin_call(Demo::Ping).wait_for_return();
    ret.recv_u64()
}

pub fn echo(cx: &CallContext<Demo>, data: &[u8]) -> Vec<u8> {
    let mut call = cx.begin_call(Demo::Echo);
    call.send_blob(data);
    let mut ret = call.wait_for_return();
    ret.recv_blob()
}

pub fn countdown(cx: &CallContext<Demo>, level: u64) -> u64 {
    let mut call = cx.begin_call(Demo::Countdown);
    call.send_u64(level);
    let mut ret = call.wait_for_return();
    ret.recv_u64()
}

/// Returns a handle into the peer's table.
pub fn open_device(cx: &CallContext<Demo>, serial: &str) -> Handle {
    let mut call = cx.begin_call(Demo::OpenDevice);
    call.send_str(serial);
    let mut ret = call.wait_for_return();
    ret.recv_handle()
}

pub fn device_serial(cx: &CallContext<Demo>, device: Handle) -> Option<String> {
    let mut call = cx.begin_call(Demo::DeviceSerial);
    call.send_handle(device);
    let mut ret = call.wait_for_return();
    let known = ret.recv_bool();
    let serial = ret.recv_string();
    known.then_some(serial)
}

pub fn fill_descriptor(cx: &CallContext<Demo>, target: &UnixStream, data: &[u8]) -> bool {
    let mut call = cx.begin_call(Demo::FillDescriptor);
    call.send_fd(target);
    call.send_blob(data);
    let mut ret = call.wait_for_return();
    ret.recv_bool()
}

// ============================================================================
//  SESSION
// ============================================================================

/// Summary of one caller's run.
#[derive(Debug, PartialEq, Eq)]
pub struct Report {
    pub pings: u64,
    pub depth: u64,
    pub devices: Vec<(Handle, String)>,
    pub shared_bytes: usize,
}

/// Walks one caller through every method in the catalogue.
pub fn run_session(conn: &Connection<Demo>, caller: usize, depth: u64) -> anyhow::Result<Report> {
    let cx = conn.attach();
    tracing::info!(identity = %cx.identity(), caller, "session started");

    let pings = ping(&cx);

    let payload = format!("frame from caller {}", caller).into_bytes();
    ensure!(echo(&cx, &payload) == payload, "echo mismatch");

    let reached = countdown(&cx, depth);
    ensure!(reached == depth, "countdown reached {} of {}", reached, depth);

    let mut devices = Vec::new();
    for serial in [format!("hmd-{}", caller), format!("gpu-{}", caller)] {
        let handle = open_device(&cx, &serial);
        let echoed = device_serial(&cx, handle).context("peer lost a device it just opened")?;
        ensure!(echoed == serial, "device {} came back as {}", serial, echoed);
        devices.push((handle, serial));
    }
    ensure!(device_serial(&cx, Handle::NULL).is_none(), "null handle resolved to a device");

    let (mut mine, theirs) = UnixStream::pair().context("creating descriptor pair")?;
    let message = format!("written across the bridge for caller {}", caller);
    ensure!(fill_descriptor(&cx, &theirs, message.as_bytes()), "peer could not write");
    drop(theirs);
    let mut shared = String::new();
    mine.read_to_string(&mut shared).context("reading shared descriptor")?;
    ensure!(shared == message, "descriptor carried {:?}", shared);

    tracing::info!(identity = %cx.identity(), caller, pings, depth, "session finished");
    Ok(Report { pings, depth: reached, devices, shared_bytes: shared.len() })
}
