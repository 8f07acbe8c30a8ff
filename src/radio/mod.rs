use std::time::Duration;

use thiserror::Error;

use crate::params::{Bandwidth, TxParameters};

mod loopback;
pub use loopback::LoopbackRadio;

pub const MAX_PAYLOAD_BYTES: usize = 255;

/// Most packets one fetch may return.
pub const RECEIVE_BATCH_PACKETS: usize = 16;

/// Pause between fetches when a batch comes back empty.
pub const IDLE_POLL: Duration = Duration::from_millis(3);

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("transport not started")]
    NotStarted,
    #[error("link peer disconnected")]
    Disconnected,
    #[error("payload of {0} bytes exceeds the radio limit")]
    PayloadTooLong(usize),
}

/// Completed transmission: when it went on air and how long it held the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReport {
    pub count_us: u32,
    pub air_time_us: u32,
}

/// One received frame with its signal metadata.
#[derive(Debug, Clone)]
pub struct RxPacket {
    pub payload: Vec<u8>,
    pub snr: f32,
    pub count_us: u32,
    pub crc_ok: bool,
}

/// Narrow boundary to the transport: program parameters, send one frame at a
/// time, fetch received frames in batches.
pub trait Radio {
    fn start(&mut self) -> Result<(), RadioError>;
    fn stop(&mut self) -> Result<(), RadioError>;
    fn apply_parameters(&mut self, parameters: &TxParameters) -> Result<(), RadioError>;
    fn transmit(&mut self, payload: &[u8]) -> Result<TxReport, RadioError>;
    fn transmit_at(&mut self, payload: &[u8], count_us: u32) -> Result<TxReport, RadioError>;
    fn receive_batch(&mut self, max_packets: usize) -> Result<Vec<RxPacket>, RadioError>;
}

/// LoRa time on air for an explicit-header, CRC-on transmission with the
/// standard 8-symbol preamble.
pub fn time_on_air_us(payload_len: usize, parameters: &TxParameters) -> u32 {
    let sf = parameters.spreading_factor.factor();
    let symbol_us = (1u64 << sf) as f64 / parameters.bandwidth.khz() as f64 * 1000.0;

    // low data rate optimization is mandatory at SF11/SF12 on 125 kHz
    let low_rate = parameters.bandwidth == Bandwidth::Bw125 && sf >= 11;
    let de = if low_rate { 1.0 } else { 0.0 };
    let sf = sf as f64;

    let coding = (parameters.coding_rate.denominator() - 4) as f64;
    let numerator = 8.0 * payload_len as f64 - 4.0 * sf + 28.0 + 16.0;
    let payload_symbols = 8.0 + (numerator / (4.0 * (sf - 2.0 * de))).ceil().max(0.0) * (coding + 4.0);

    let preamble_us = (8.0 + 4.25) * symbol_us;
    (preamble_us + payload_symbols * symbol_us).round() as u32
}
