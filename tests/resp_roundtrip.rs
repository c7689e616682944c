//! Encode/decode properties over generated frames, delivered in arbitrary
//! chunk sizes.

use proptest::prelude::*;
use respio::buffer::Slice;
use respio::bufio::Reader;
use respio::protocols::resp::{decode_all, encode_to_bytes, Decoder, Encoder, Frame};
use std::io::{self, Read};

/// Hands out at most `chunk` bytes per read.
struct Chunked<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl Read for Chunked<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.data.len().min(self.chunk).min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

fn line() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _:-]{0,24}"
}

fn frame() -> impl Strategy<Value = Frame> {
    let leaf = prop_oneof![
        line().prop_map(Frame::simple),
        line().prop_map(Frame::error),
        any::<i64>().prop_map(Frame::integer),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(Frame::bulk),
        Just(Frame::null()),
        Just(Frame::null_array()),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        proptest::collection::vec(inner, 0..8).prop_map(Frame::array)
    })
}

proptest! {
    #[test]
    fn prop_round_trip(frame in frame()) {
        let bytes = encode_to_bytes(&frame).unwrap();
        prop_assert_eq!(respio::protocols::resp::decode_from(&bytes).unwrap(), frame);
    }

    #[test]
    fn prop_chunking_does_not_matter(
        frames in proptest::collection::vec(frame(), 1..6),
        chunk in 1usize..32,
        bufsize in 4usize..64,
    ) {
        let mut encoder = Encoder::new(Vec::new());
        for frame in &frames {
            encoder.encode(frame, false).unwrap();
        }
        encoder.flush().unwrap();
        let wire = encoder.writer().get_ref().clone();

        let source = Chunked { data: &wire, chunk };
        let mut decoder = Decoder::with_reader(Reader::with_buffer(Slice::managed(bufsize), source));
        for frame in &frames {
            prop_assert_eq!(&decoder.decode().unwrap(), frame);
        }
        prop_assert_eq!(decode_all(&wire).unwrap(), frames);
    }
}

#[test]
fn set_command_scenario() {
    let frame = Frame::command(["SET", "k", "v"]);
    let bytes = encode_to_bytes(&frame).unwrap();
    assert_eq!(&bytes[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    assert_eq!(respio::protocols::resp::decode_from(&bytes).unwrap(), frame);
}

#[test]
fn long_line_is_reassembled() {
    let text = "y".repeat(5000);
    let wire = format!("+{text}\r\n");
    for chunk in [1, 7, wire.len()] {
        let source = Chunked {
            data: wire.as_bytes(),
            chunk,
        };
        let mut decoder = Decoder::with_reader(Reader::with_buffer(Slice::managed(16), source));
        assert_eq!(decoder.decode().unwrap(), Frame::simple(text.clone()));
    }
}

#[test]
fn decoded_values_outlive_reader() {
    let frames = {
        let mut decoder = Decoder::new(&b"$3\r\nabc\r\n+OK\r\n"[..]);
        vec![decoder.decode().unwrap(), decoder.decode().unwrap()]
    };
    assert_eq!(frames, vec![Frame::bulk("abc"), Frame::simple("OK")]);
    assert_eq!(frames[0].detach(), frames[0]);
}
