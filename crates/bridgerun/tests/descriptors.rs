use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::os::unix::net::UnixStream;

use bridgerun::Connection;
use bridgerun::Handler;
use bridgerun::Incoming;
use bridgerun::Replied;
use bridgewire::Sink;
use bridgewire::Source;

bridgewire::define_methods! {
    enum Share {
        Fill = 0,
        Hand = 1,
    }
}

struct Sharer;

impl Handler<Share> for Sharer {
    fn handle(&self, mut call: Incoming<'_, Share>) -> Replied {
        match call.method() {
            Share::Fill => {
                let fd = call.recv_fd();
                let data = call.recv_blob();
                let pending = call.complete_reading_args();
                let written = File::from(fd).write_all(&data).is_ok();
                let mut reply = pending.return_from_call();
                reply.send_bool(written);
                reply.finish()
            }
            Share::Hand => {
                let greeting = call.recv_string();
                let pending = call.complete_reading_args();
                let (mut near, far) = UnixStream::pair().unwrap();
                near.write_all(greeting.as_bytes()).unwrap();
                drop(near);

                let mut reply = pending.return_from_call();
                reply.send_u32(7);
                reply.send_fd(&far);
                reply.send_u32(8);
                reply.finish()
            }
        }
    }
}

#[test]
fn descriptor_in_call_args() {
    let (a, _b) = Connection::pair(Sharer, Sharer).unwrap();
    let cx = a.attach();
    let (mut mine, theirs) = UnixStream::pair().unwrap();

    let mut call = cx.begin_call(Share::Fill);
    call.send_fd(&theirs);
    call.send_blob(b"written by the peer");
    let mut ret = call.wait_for_return();
    assert!(ret.recv_bool());
    ret.return_read_channel();
    drop(theirs);

    let mut text = String::new();
    mine.read_to_string(&mut text).unwrap();
    assert_eq!(text, "written by the peer");
}

#[test]
fn descriptor_in_return_values() {
    let (a, _b) = Connection::pair(Sharer, Sharer).unwrap();
    let cx = a.attach();

    let mut call = cx.begin_call(Share::Hand);
    call.send_str("made over there");
    let mut ret = call.wait_for_return();
    assert_eq!(ret.recv_u32(), 7);
    let fd = ret.recv_fd();
    assert_eq!(ret.recv_u32(), 8);
    ret.return_read_channel();

    let mut text = String::new();
    UnixStream::from(fd).read_to_string(&mut text).unwrap();
    assert_eq!(text, "made over there");
}
