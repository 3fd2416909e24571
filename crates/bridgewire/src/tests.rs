use std::collections::VecDeque;

use crate::*;

crate::define_methods! {
    enum Catalogue {
        Factory = 0,
        Init = 1,
        RunFrame = 2,
        Present = 0x41,
    }
}

/// In-memory source. Running dry is a test bug, so it panics.
struct Bytes(VecDeque<u8>);

impl Bytes {
    fn new(data: Vec<u8>) -> Self {
        Self(data.into())
    }

    fn remaining(&self) -> usize {
        self.0.len()
    }
}

impl Source for Bytes {
    fn recv(&mut self, buf: &mut [u8]) {
        assert!(buf.len() <= self.0.len(), "source ran dry");
        for b in buf.iter_mut() {
            *b = self.0.pop_front().unwrap();
        }
    }
}

// ============================================================================
//  OPCODES
// ============================================================================

#[test]
fn test_opcode_decodes_catalogue_and_return() {
    assert_eq!(Opcode::<Catalogue>::decode(0), Ok(Opcode::Call(Catalogue::Factory)));
    assert_eq!(Opcode::<Catalogue>::decode(0x41), Ok(Opcode::Call(Catalogue::Present)));
    assert_eq!(Opcode::<Catalogue>::decode(RETURN_OPCODE), Ok(Opcode::Return));
}

#[test]
fn test_opcode_rejects_unknown_byte() {
    assert_eq!(Opcode::<Catalogue>::decode(3), Err(Error::UnknownOpcode(3)));
    assert_eq!(Opcode::<Catalogue>::decode(0xFE), Err(Error::UnknownOpcode(0xFE)));
}

#[test]
fn test_opcode_encode_matches_decode() {
    for m in [Catalogue::Factory, Catalogue::Init, Catalogue::RunFrame, Catalogue::Present] {
        let byte = Opcode::Call(m).encode();
        assert_ne!(byte, RETURN_OPCODE);
        assert_eq!(Opcode::<Catalogue>::decode(byte), Ok(Opcode::Call(m)));
    }
    assert_eq!(Opcode::<Catalogue>::Return.encode(), RETURN_OPCODE);
}

// ============================================================================
//  IDENTITIES AND HANDLES
// ============================================================================

#[test]
fn test_identity_sides_never_collide() {
    let a = ThreadIdentity::new(Side::Primary, 7);
    let b = ThreadIdentity::new(Side::Secondary, 7);
    assert_ne!(a, b);
    assert_eq!(a.side(), Side::Primary);
    assert_eq!(b.side(), Side::Secondary);
    assert_eq!(a.serial(), b.serial());
    assert_eq!(b.to_string(), "s7");
}

#[test]
fn test_handle_null_has_no_index() {
    assert!(Handle::NULL.is_null());
    assert_eq!(Handle::NULL.index(), None);
    assert_eq!(Handle(1).index(), Some(0));
    assert_eq!(Handle::from_index(4), Handle(5));
}

// ============================================================================
//  PRIMITIVES
// ============================================================================

#[test]
fn test_scalars_are_little_endian() {
    let mut buf = Vec::new();
    buf.send_u32(0x0102_0304);
    buf.send_u64(1);
    buf.send_bool(true);
    assert_eq!(&buf[..4], &[0x04, 0x03, 0x02, 0x01]);
    assert_eq!(&buf[4..12], &[1, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(buf[12], 1);
}

#[test]
fn test_call_frame_layout() {
    // Header, a handle, a string, then the trailing task id.
    let mut frame = Vec::new();
    frame.send_u8(Opcode::Call(Catalogue::Init).encode());
    frame.send_identity(ThreadIdentity::new(Side::Secondary, 2));
    frame.send_handle(Handle(3));
    frame.send_str("driver_vrlink");
    frame.send_task(TaskId(9));
    assert_eq!(frame.len(), 1 + 8 + 8 + 8 + 13 + 8);

    let mut src = Bytes::new(frame);
    assert_eq!(Opcode::<Catalogue>::decode(src.recv_u8()), Ok(Opcode::Call(Catalogue::Init)));
    assert_eq!(src.recv_identity(), ThreadIdentity::new(Side::Secondary, 2));
    assert_eq!(src.recv_handle(), Handle(3));
    assert_eq!(src.recv_string(), "driver_vrlink");
    assert_eq!(src.recv_task(), TaskId(9));
    assert_eq!(src.remaining(), 0);
}

#[test]
fn test_mixed_scalars_consume_exactly() {
    let mut buf = Vec::new();
    buf.send_i32(-5);
    buf.send_f64(0.25);
    buf.send_f32(-1.5);
    buf.send_i64(i64::MIN);
    buf.send_u16(65535);

    let mut src = Bytes::new(buf);
    assert_eq!(src.recv_i32(), -5);
    assert_eq!(src.recv_f64(), 0.25);
    assert_eq!(src.recv_f32(), -1.5);
    assert_eq!(src.recv_i64(), i64::MIN);
    assert_eq!(src.recv_u16(), 65535);
    assert_eq!(src.remaining(), 0);
}

#[test]
fn test_blob_lossy_string() {
    let mut buf = Vec::new();
    buf.send_blob(&[0x66, 0xFF, 0x6F]);
    let mut src = Bytes::new(buf);
    assert_eq!(src.recv_string(), "f\u{FFFD}o");
}

#[test]
fn test_empty_blob() {
    let mut buf = Vec::new();
    buf.send_blob(&[]);
    assert_eq!(buf.len(), 8);
    let mut src = Bytes::new(buf);
    assert!(src.recv_blob().is_empty());
}
