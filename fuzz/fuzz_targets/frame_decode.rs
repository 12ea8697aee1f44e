//! Fuzz target for gRPC-web body framing
//!
//! Feeds arbitrary bytes to the incremental frame decoder in arbitrary chunk
//! sizes, and compares the result with one-shot decoding.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - Chunking does not change the frames produced
//! - Trailer parsing accepts any payload

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomsync_proto::{FrameDecoder, FrameKind, Trailers};

#[derive(Debug, Arbitrary)]
struct Input {
    body: Vec<u8>,
    chunk_sizes: Vec<u8>,
}

fn frames_one_shot(body: &[u8]) -> Vec<(FrameKind, Vec<u8>)> {
    let mut decoder = FrameDecoder::new();
    decoder.push(body);
    drain(&mut decoder)
}

fn drain(decoder: &mut FrameDecoder) -> Vec<(FrameKind, Vec<u8>)> {
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = decoder.next_frame() {
        if frame.kind == FrameKind::Trailer {
            let _ = Trailers::parse(&frame.payload);
        }
        frames.push((frame.kind, frame.payload.to_vec()));
    }
    frames
}

fuzz_target!(|input: Input| {
    let expected = frames_one_shot(&input.body);

    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut rest = &input.body[..];
    let mut sizes = input.chunk_sizes.iter().map(|s| usize::from(*s).max(1)).cycle();

    while !rest.is_empty() {
        let size = sizes.next().unwrap_or(rest.len()).min(rest.len());
        let (chunk, tail) = rest.split_at(size);
        decoder.push(chunk);
        frames.extend(drain(&mut decoder));
        rest = tail;
    }

    // An oversized frame poisons the decoder at different points depending on
    // chunking, so only compare the frames produced before it
    let n = frames.len().min(expected.len());
    assert_eq!(frames[..n], expected[..n]);
});
