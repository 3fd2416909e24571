use std::sync::Arc;

use bridgerun::Connection;
use bridgerun::Handler;
use bridgerun::Incoming;
use bridgerun::Replied;
use bridgewire::Handle;
use bridgewire::Sink;
use bridgewire::Source;

bridgewire::define_methods! {
    enum Devices {
        Open = 0,
        Name = 1,
        Bounce = 2,
    }
}

struct Device {
    name: String,
}

struct Registry;

impl Handler<Devices> for Registry {
    fn handle(&self, mut call: Incoming<'_, Devices>) -> Replied {
        match call.method() {
            Devices::Open => {
                let name = call.recv_string();
                let mut reply = call.complete_reading_args().return_from_call();
                reply.send_object(Some(Arc::new(Device { name })));
                reply.finish()
            }
            Devices::Name => {
                let device = call.recv_object::<Device>();
                let mut reply = call.complete_reading_args().return_from_call();
                match device {
                    Some(device) => {
                        reply.send_bool(true);
                        reply.send_str(&device.name);
                    }
                    None => reply.send_bool(false),
                }
                reply.finish()
            }
            // Hands a peer-issued handle straight back without interpreting it.
            Devices::Bounce => {
                let handle = call.recv_handle();
                let mut reply = call.complete_reading_args().return_from_call();
                reply.send_handle(handle);
                reply.finish()
            }
        }
    }
}

fn open(cx: &bridgerun::CallContext<Devices>, name: &str) -> Handle {
    let mut call = cx.begin_call(Devices::Open);
    call.send_str(name);
    let mut ret = call.wait_for_return();
    ret.recv_handle()
}

fn name(cx: &bridgerun::CallContext<Devices>, handle: Handle) -> Option<String> {
    let mut call = cx.begin_call(Devices::Name);
    call.send_handle(handle);
    let mut ret = call.wait_for_return();
    ret.recv_bool().then(|| ret.recv_string())
}

#[test]
fn peer_objects_are_named_by_monotonic_handles() {
    let (a, b) = Connection::pair(Registry, Registry).unwrap();
    let cx = a.attach();

    let gpu = open(&cx, "gpu0");
    let hmd = open(&cx, "hmd0");
    let again = open(&cx, "gpu0");
    assert_eq!((gpu, hmd, again), (Handle(1), Handle(2), Handle(3)));
    assert_eq!(b.handles().len(), 3);
    assert!(a.handles().is_empty());

    assert_eq!(name(&cx, hmd).as_deref(), Some("hmd0"));
    assert_eq!(name(&cx, gpu).as_deref(), Some("gpu0"));
    assert_eq!(name(&cx, Handle::NULL), None);
}

#[test]
fn own_objects_resolve_when_handed_back() {
    let (a, _b) = Connection::pair(Registry, Registry).unwrap();
    let cx = a.attach();
    let local = Arc::new(Device { name: "compositor".into() });

    let mut call = cx.begin_call(Devices::Bounce);
    let sent = call.send_object(Some(Arc::clone(&local)));
    let mut ret = call.wait_for_return();
    let back = ret.recv_object::<Device>().unwrap();
    ret.return_read_channel();

    assert_eq!(sent, Handle(1));
    assert!(Arc::ptr_eq(&local, &back));

    let mut call = cx.begin_call(Devices::Bounce);
    assert_eq!(call.send_object::<Device>(None), Handle::NULL);
    let mut ret = call.wait_for_return();
    assert!(ret.recv_object::<Device>().is_none());
}
