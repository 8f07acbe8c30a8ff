use std::fmt;

use thiserror::Error;

pub const ID_BYTES: usize = 8;
pub const HEADER_BYTES: usize = 1 + 2 * ID_BYTES;
pub const END_OF_SETTING_BYTES: usize = HEADER_BYTES + 15;
pub const TEST_FILLER: u8 = 0x33;

const KIND_JOIN: u8 = 0;
const KIND_TEST: u8 = 1;
const KIND_END_OF_SETTING: u8 = 2;
const KIND_ALL_TESTS_DONE: u8 = 3;

/// Router and device identifiers every frame must carry to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkIdentity {
    pub router: [u8; ID_BYTES],
    pub device: [u8; ID_BYTES],
}

impl LinkIdentity {
    pub fn new(router: [u8; ID_BYTES], device: [u8; ID_BYTES]) -> Self {
        Self { router, device }
    }

    pub fn from_hex(router: &str, device: &str) -> Option<Self> {
        Some(Self {
            router: id_from_hex(router)?,
            device: id_from_hex(device)?,
        })
    }
}

impl fmt::Display for LinkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.router {
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "/")?;
        for byte in self.device {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

fn id_from_hex(hex: &str) -> Option<[u8; ID_BYTES]> {
    if hex.len() != 2 * ID_BYTES || !hex.is_ascii() {
        return None;
    }

    let mut id = [0u8; ID_BYTES];
    for (slot, pair) in id.iter_mut().zip(hex.as_bytes().chunks(2)) {
        let high = (pair[0] as char).to_digit(16)?;
        let low = (pair[1] as char).to_digit(16)?;
        *slot = (high << 4 | low) as u8;
    }
    Some(id)
}

/// Body of an end-of-setting frame. Values are kept as raw wire bytes so
/// out-of-range codes survive decode and only surface at the CSV layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingReport {
    pub coding_rate: u8,
    pub data_rate: u8,
    pub bandwidth: u8,
    pub power_dbm: i8,
    pub avg_tx_time_us: u32,
    pub packet_size: u8,
    pub messages_per_setting: u8,
    pub test_type: u8,
    pub std_dev_tx_time_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Join,
    Test { counter: u8, packet_size: u8 },
    EndOfSetting(SettingReport),
    AllTestsDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame of {0} bytes is shorter than the header")]
    TooShort(usize),
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("router or device identifier mismatch")]
    UnrecognizedIdentity,
    #[error("invalid length {len} for frame kind {kind}")]
    BadLength { kind: u8, len: usize },
}

impl Frame {
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Join => KIND_JOIN,
            Frame::Test { .. } => KIND_TEST,
            Frame::EndOfSetting(_) => KIND_END_OF_SETTING,
            Frame::AllTestsDone => KIND_ALL_TESTS_DONE,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match *self {
            Frame::Join | Frame::AllTestsDone => HEADER_BYTES,
            // the body always carries at least the counter byte
            Frame::Test { packet_size, .. } => HEADER_BYTES + packet_size.max(1) as usize,
            Frame::EndOfSetting(_) => END_OF_SETTING_BYTES,
        }
    }

    pub fn encode(&self, identity: &LinkIdentity) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.push(self.kind());
        bytes.extend_from_slice(&identity.router);
        bytes.extend_from_slice(&identity.device);

        match *self {
            Frame::Join | Frame::AllTestsDone => {}
            Frame::Test { counter, .. } => {
                bytes.push(counter);
                bytes.resize(self.encoded_len(), TEST_FILLER);
            }
            Frame::EndOfSetting(report) => {
                bytes.push(report.coding_rate);
                bytes.push(report.data_rate);
                bytes.push(report.bandwidth);
                bytes.push(report.power_dbm as u8);
                bytes.extend_from_slice(&report.avg_tx_time_us.to_le_bytes());
                bytes.push(report.packet_size);
                bytes.push(report.messages_per_setting);
                bytes.push(report.test_type);
                bytes.extend_from_slice(&report.std_dev_tx_time_us.to_le_bytes());
            }
        }

        bytes
    }

    pub fn decode(bytes: &[u8], identity: &LinkIdentity) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_BYTES {
            return Err(DecodeError::TooShort(bytes.len()));
        }

        let (header, body) = bytes.split_at(HEADER_BYTES);
        let kind = header[0];
        let (router, device) = header[1..].split_at(ID_BYTES);
        if router != identity.router || device != identity.device {
            return Err(DecodeError::UnrecognizedIdentity);
        }

        match kind {
            KIND_JOIN | KIND_ALL_TESTS_DONE => {
                if !body.is_empty() {
                    return Err(DecodeError::BadLength {
                        kind,
                        len: bytes.len(),
                    });
                }
                Ok(match kind {
                    KIND_JOIN => Frame::Join,
                    _ => Frame::AllTestsDone,
                })
            }
            KIND_TEST => {
                if body.is_empty() || body.len() > u8::MAX as usize {
                    return Err(DecodeError::BadLength {
                        kind,
                        len: bytes.len(),
                    });
                }
                Ok(Frame::Test {
                    counter: body[0],
                    packet_size: body.len() as u8,
                })
            }
            KIND_END_OF_SETTING => {
                if bytes.len() != END_OF_SETTING_BYTES {
                    return Err(DecodeError::BadLength {
                        kind,
                        len: bytes.len(),
                    });
                }

                let (codes, body) = body.split_at(4);
                let (avg_time, body) = body.split_at(4);
                let (counts, std_dev_time) = body.split_at(3);

                Ok(Frame::EndOfSetting(SettingReport {
                    coding_rate: codes[0],
                    data_rate: codes[1],
                    bandwidth: codes[2],
                    power_dbm: codes[3] as i8,
                    avg_tx_time_us: u32::from_le_bytes(avg_time.try_into().unwrap()),
                    packet_size: counts[0],
                    messages_per_setting: counts[1],
                    test_type: counts[2],
                    std_dev_tx_time_us: u32::from_le_bytes(std_dev_time.try_into().unwrap()),
                }))
            }
            _ => Err(DecodeError::UnknownKind(kind)),
        }
    }
}
