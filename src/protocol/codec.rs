use std::collections::VecDeque;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::core::{Error, FramingConfig, Result};
use super::checksum::{Fletcher16, CHECKSUM_SIZE};
use super::label::Label;
use super::message::Message;
use super::MAX_PAYLOAD_SIZE;

/// A structurally valid frame whose checksum has been verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Unpacked label
    pub label: Label,
    /// Payload bytes, exactly `label.length` of them
    pub payload: Vec<u8>,
    /// Checksum trailer as received
    pub checksum: u16,
}

impl Frame {
    /// Interprets the frame through the message catalog
    pub fn message(&self) -> Result<Message> {
        Message::from_label(self.label, self.payload.clone())
    }
}

/// Decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Frames that passed footer and checksum validation
    pub frames_decoded: u64,
    /// Candidates discarded because the footer did not match
    pub framing_errors: u64,
    /// Candidates discarded because the checksum did not match
    pub checksum_errors: u64,
}

/// Position of the receiver within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Matching the header; holds the number of header bytes matched so far
    AwaitHeader(usize),
    ReadLabel,
    ReadPayload,
    ReadChecksum,
    /// Matching the footer; holds the number of footer bytes matched so far
    AwaitFooter(usize),
}

/// Frame codec for the serial link
///
/// Decoding is a byte-at-a-time state machine, so it can be fed from a
/// non-blocking transport one poll at a time. When a candidate frame is
/// discarded, the bytes that followed the false header start are replayed,
/// so a genuine frame that was swallowed by a spurious header match is still
/// recovered.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    header: Vec<u8>,
    footer: Vec<u8>,
    state: DecodeState,
    label: Label,
    payload: Vec<u8>,
    checksum: [u8; CHECKSUM_SIZE],
    checksum_len: usize,
    /// Every byte consumed since the current header started
    raw: Vec<u8>,
    /// Bytes waiting to be (re)processed
    backlog: VecDeque<u8>,
    stats: CodecStats,
}

impl FrameCodec {
    /// Creates a codec for the given frame delimiters
    pub fn new(framing: &FramingConfig) -> Result<Self> {
        if framing.header.is_empty() || framing.footer.is_empty() {
            return Err(Error::config("Frame header and footer must not be empty"));
        }
        let frame_capacity = framing.header.len() + 1 + MAX_PAYLOAD_SIZE + CHECKSUM_SIZE + framing.footer.len();
        Ok(FrameCodec {
            header: framing.header.clone(),
            footer: framing.footer.clone(),
            state: DecodeState::AwaitHeader(0),
            label: Label::unpack(0),
            payload: Vec::with_capacity(MAX_PAYLOAD_SIZE),
            checksum: [0; CHECKSUM_SIZE],
            checksum_len: 0,
            raw: Vec::with_capacity(frame_capacity),
            backlog: VecDeque::with_capacity(frame_capacity),
            stats: CodecStats::default(),
        })
    }

    /// Decoder counters
    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Returns true if no partial frame or replay bytes are held
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::AwaitHeader(0) && self.backlog.is_empty()
    }

    /// Drops any partially received frame
    pub fn reset(&mut self) {
        self.state = DecodeState::AwaitHeader(0);
        self.payload.clear();
        self.raw.clear();
        self.backlog.clear();
        self.checksum_len = 0;
    }

    /// Feeds one byte; returns a frame if this byte completed one
    ///
    /// After a frame is returned, replayed bytes may still be pending; call
    /// [`FrameCodec::drain`] until it returns `None` to process them.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.backlog.push_back(byte);
        self.drain()
    }

    /// Processes pending replay bytes
    pub fn drain(&mut self) -> Option<Frame> {
        while let Some(byte) = self.backlog.pop_front() {
            if let Some(frame) = self.step(byte) {
                return Some(frame);
            }
        }
        None
    }

    /// Feeds a buffer and collects every frame it completes, in order
    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if let Some(frame) = self.push(byte) {
                frames.push(frame);
                while let Some(frame) = self.drain() {
                    frames.push(frame);
                }
            }
        }
        frames
    }

    /// Writes a complete frame for `message` into `dst`
    pub fn encode_message(&self, message: &Message, dst: &mut BytesMut) {
        let label = message.label().pack();
        let mut checksum = Fletcher16::new();
        checksum.push(label);
        checksum.update(message.payload());

        dst.reserve(self.frame_len(message.payload().len()));
        dst.put_slice(&self.header);
        dst.put_u8(label);
        dst.put_slice(message.payload());
        dst.put_slice(&checksum.to_bytes());
        dst.put_slice(&self.footer);
    }

    /// Encodes `message` into a standalone buffer
    pub fn frame(&self, message: &Message) -> BytesMut {
        let mut dst = BytesMut::new();
        self.encode_message(message, &mut dst);
        dst
    }

    /// On-wire size of a frame carrying `payload_len` bytes
    pub fn frame_len(&self, payload_len: usize) -> usize {
        self.header.len() + 1 + payload_len + CHECKSUM_SIZE + self.footer.len()
    }

    fn step(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecodeState::AwaitHeader(matched) => {
                if byte == self.header[matched] {
                    let matched = matched + 1;
                    if matched == self.header.len() {
                        self.raw.clear();
                        self.raw.extend_from_slice(&self.header);
                        self.payload.clear();
                        self.checksum_len = 0;
                        self.state = DecodeState::ReadLabel;
                    } else {
                        self.state = DecodeState::AwaitHeader(matched);
                    }
                } else {
                    self.state = DecodeState::AwaitHeader(self.header_fallback(matched, byte));
                }
                None
            }
            DecodeState::ReadLabel => {
                self.raw.push(byte);
                self.label = Label::unpack(byte);
                self.state = if self.label.length == 0 {
                    DecodeState::ReadChecksum
                } else {
                    DecodeState::ReadPayload
                };
                None
            }
            DecodeState::ReadPayload => {
                self.raw.push(byte);
                self.payload.push(byte);
                if self.payload.len() == self.label.length as usize {
                    self.state = DecodeState::ReadChecksum;
                }
                None
            }
            DecodeState::ReadChecksum => {
                self.raw.push(byte);
                self.checksum[self.checksum_len] = byte;
                self.checksum_len += 1;
                if self.checksum_len == CHECKSUM_SIZE {
                    self.state = DecodeState::AwaitFooter(0);
                }
                None
            }
            DecodeState::AwaitFooter(matched) => {
                self.raw.push(byte);
                if byte != self.footer[matched] {
                    self.stats.framing_errors += 1;
                    debug!(label = self.label.pack(), "Footer mismatch, discarding frame");
                    self.discard();
                    return None;
                }
                if matched + 1 < self.footer.len() {
                    self.state = DecodeState::AwaitFooter(matched + 1);
                    return None;
                }
                self.finish()
            }
        }
    }

    /// Longest header prefix ending at `byte` after `matched` header bytes
    fn header_fallback(&self, matched: usize, byte: u8) -> usize {
        (1..=matched)
            .rev()
            .find(|&k| {
                self.header[k - 1] == byte
                    && self.header[..k - 1] == self.header[matched + 1 - k..matched]
            })
            .unwrap_or(0)
    }

    fn finish(&mut self) -> Option<Frame> {
        let mut computed = Fletcher16::new();
        computed.push(self.label.pack());
        computed.update(&self.payload);
        let received = u16::from_be_bytes(self.checksum);

        if computed.value() != received {
            self.stats.checksum_errors += 1;
            debug!(
                expected = computed.value(),
                received,
                "Checksum mismatch, dropping frame"
            );
            self.discard();
            return None;
        }

        self.stats.frames_decoded += 1;
        trace!(label = self.label.pack(), len = self.payload.len(), "Frame decoded");
        self.state = DecodeState::AwaitHeader(0);
        self.raw.clear();
        Some(Frame {
            label: self.label,
            payload: std::mem::take(&mut self.payload),
            checksum: received,
        })
    }

    /// Abandons the current candidate and replays everything after its first byte
    fn discard(&mut self) {
        for &byte in self.raw[1..].iter().rev() {
            self.backlog.push_front(byte);
        }
        self.raw.clear();
        self.payload.clear();
        self.checksum_len = 0;
        self.state = DecodeState::AwaitHeader(0);
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.drain() {
            return Ok(Some(frame));
        }
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(frame) = self.push(byte) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        self.encode_message(&item, dst);
        Ok(())
    }
}
