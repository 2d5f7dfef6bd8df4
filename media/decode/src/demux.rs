/*!
    Packet reading shared by the decoders.
*/

use ffmpeg_next::{Packet, format::context::Input};

use revid_types::{Error, Result};

/**
    Read the next packet belonging to `stream_index`, skipping all others.

    Returns `Ok(None)` once the container is exhausted.
*/
pub(crate) fn next_packet(input: &mut Input, stream_index: usize) -> Result<Option<Packet>> {
    loop {
        let mut packet = Packet::empty();
        match packet.read(input) {
            Ok(()) if packet.stream() == stream_index => return Ok(Some(packet)),
            Ok(()) => continue,
            Err(ffmpeg_next::Error::Eof) => return Ok(None),
            Err(e) => return Err(Error::codec(format!("demux failed: {e}"))),
        }
    }
}

/**
    Where a decoder is in its read / drain cycle.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DecodeState {
    Reading,
    Draining,
    Done,
}
