//! WebSocket frame codec (RFC 6455).
//!
//! Pure translation between byte buffers and [`Frame`] values. No socket
//! access happens here; [`super::socket::WireConnection`] owns the I/O and
//! feeds its read buffer through [`decode`] and [`FrameAssembler`].

use crate::error::TransportError;

/// Close code used when the socket ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code reported for a close frame with no status payload.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Default cap on a single frame payload (16 MiB, as in tungstenite).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;
/// Default cap on a reassembled message (64 MiB, as in tungstenite).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Frame opcodes understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Close, ping and pong. These may interleave with a fragmented message.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// A single WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode,
            payload: payload.into(),
        }
    }

    /// A frame that does not end its message (FIN=0).
    pub fn fragment(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: false,
            opcode,
            payload: payload.into(),
        }
    }
}

/// Encode a client frame: FIN set, masked with a fresh random key.
pub fn encode(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    encode_with_mask(opcode, payload, rand::random::<[u8; 4]>())
}

/// Encode a client frame with a caller-chosen mask key.
pub fn encode_with_mask(opcode: Opcode, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    encode_frame(
        &Frame {
            fin: true,
            opcode,
            payload: payload.to_vec(),
        },
        Some(mask),
    )
}

/// Encode an arbitrary frame. `mask` of `None` produces an unmasked
/// (server-style) frame.
pub fn encode_frame(frame: &Frame, mask: Option<[u8; 4]>) -> Vec<u8> {
    let len = frame.payload.len();
    let mut out = Vec::with_capacity(len + 14);

    let fin_bit = if frame.fin { 0x80 } else { 0x00 };
    out.push(fin_bit | frame.opcode as u8);

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    if len < 126 {
        out.push(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            let start = out.len();
            out.extend_from_slice(&frame.payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.extend_from_slice(&frame.payload),
    }
    out
}

/// XOR `data` in place with the mask key, byte `i` using `key[i % 4]`.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Decode one frame from the front of `buf` with the default size cap.
pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, TransportError> {
    decode_limited(buf, DEFAULT_MAX_FRAME_SIZE)
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame; the
/// caller must read more bytes and retry. On success the frame is returned
/// with the number of bytes it occupied. A header declaring more than
/// `max_frame_size` payload bytes fails before any payload is buffered.
pub fn decode_limited(
    buf: &[u8],
    max_frame_size: usize,
) -> Result<Option<(Frame, usize)>, TransportError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    // No extensions are negotiated.
    let rsv = buf[0] & 0x70;
    if rsv != 0 {
        return Err(TransportError::MalformedFrame(format!(
            "reserved bits {rsv:#x} set"
        )));
    }
    let fin = buf[0] & 0x80 != 0;
    let raw_opcode = buf[0] & 0x0F;
    let opcode = Opcode::from_u8(raw_opcode).ok_or_else(|| {
        TransportError::MalformedFrame(format!("unknown opcode {raw_opcode:#x}"))
    })?;
    let masked = buf[1] & 0x80 != 0;

    let mut offset = 2usize;
    let declared: u64 = match buf[1] & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            offset = 4;
            u64::from(u16::from_be_bytes([buf[2], buf[3]]))
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            offset = 10;
            u64::from_be_bytes(raw)
        }
        short => u64::from(short),
    };

    if opcode.is_control() {
        if !fin {
            return Err(TransportError::MalformedFrame(
                "fragmented control frame".into(),
            ));
        }
        if declared > MAX_CONTROL_PAYLOAD {
            return Err(TransportError::MalformedFrame(format!(
                "control frame payload of {declared} bytes"
            )));
        }
    }

    if declared > max_frame_size as u64 || declared > isize::MAX as u64 {
        return Err(TransportError::UnsupportedFrameLength(declared));
    }
    let len = usize::try_from(declared)
        .map_err(|_| TransportError::UnsupportedFrameLength(declared))?;

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let key = [
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ];
        offset += 4;
        Some(key)
    } else {
        None
    };

    let end = offset
        .checked_add(len)
        .ok_or(TransportError::UnsupportedFrameLength(declared))?;
    if buf.len() < end {
        return Ok(None);
    }

    let mut payload = buf[offset..end].to_vec();
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            payload,
        },
        end,
    )))
}

/// Output of [`FrameAssembler::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// A complete data message (text or binary), possibly from several frames.
    Message { opcode: Opcode, payload: Vec<u8> },
    /// A control frame, passed through immediately.
    Control(Frame),
}

/// Reassembles fragmented data messages.
#[derive(Debug)]
pub struct FrameAssembler {
    partial: Option<(Opcode, Vec<u8>)>,
    max_message_size: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            partial: None,
            max_message_size,
        }
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            return Err(TransportError::UnsupportedFrameLength(len as u64));
        }
        Ok(())
    }

    /// Feed one decoded frame. Returns a complete message or control frame,
    /// or `None` while a fragmented message is still open.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Assembled>, TransportError> {
        if frame.opcode.is_control() {
            return Ok(Some(Assembled::Control(frame)));
        }

        match frame.opcode {
            Opcode::Continuation => {
                let Some((opcode, mut payload)) = self.partial.take() else {
                    return Err(TransportError::MalformedFrame(
                        "continuation frame without an open message".into(),
                    ));
                };
                self.check_size(payload.len().saturating_add(frame.payload.len()))?;
                payload.extend_from_slice(&frame.payload);
                if frame.fin {
                    Ok(Some(Assembled::Message { opcode, payload }))
                } else {
                    self.partial = Some((opcode, payload));
                    Ok(None)
                }
            }
            opcode => {
                if self.partial.is_some() {
                    return Err(TransportError::MalformedFrame(
                        "data frame while a fragmented message is open".into(),
                    ));
                }
                self.check_size(frame.payload.len())?;
                if frame.fin {
                    Ok(Some(Assembled::Message {
                        opcode,
                        payload: frame.payload,
                    }))
                } else {
                    self.partial = Some((opcode, frame.payload));
                    Ok(None)
                }
            }
        }
    }

    pub fn is_fragmenting(&self) -> bool {
        self.partial.is_some()
    }

    pub fn reset(&mut self) {
        self.partial = None;
    }
}

/// Split a close payload into its status code and reason.
pub fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.len() < 2 {
        return (CLOSE_NO_STATUS, String::new());
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
    (code, reason)
}

/// Build a close payload: big-endian code followed by the UTF-8 reason.
pub fn close_payload(code: u16, reason: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + reason.len());
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(reason.as_bytes());
    out
}
