use crc::{Crc, CRC_16_USB};
use crossbeam_channel::{unbounded, Receiver as ChannelReceiver, Sender as ChannelSender};
use crossbeam_channel::TryRecvError;
use rand::Rng;

use super::{time_on_air_us, Radio, RadioError, RxPacket, TxReport, MAX_PAYLOAD_BYTES};
use crate::params::TxParameters;
use crate::sweep::BASELINE;

const CRC_BYTES: usize = 2;
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_USB);

/// Inter-frame silence inserted after every transmission.
const TX_GAP_US: u32 = 1_000;

const DEFAULT_BASE_SNR_DB: f32 = -7.5;
const DEFAULT_SNR_JITTER_DB: f32 = 2.0;

struct AirFrame {
    bytes: Vec<u8>,
    snr: f32,
    count_us: u32,
}

/// In-process radio: two of these wired back to back model the point-to-point
/// link, with air time derived from the current transmit parameters.
pub struct LoopbackRadio {
    started: bool,
    parameters: TxParameters,
    clock_us: u32,
    base_snr_db: f32,
    snr_jitter_db: f32,
    corruption_probability: f64,
    to_peer: ChannelSender<AirFrame>,
    from_peer: ChannelReceiver<AirFrame>,
}

impl LoopbackRadio {
    pub fn pair() -> (Self, Self) {
        let (near_sender, far_receiver) = unbounded();
        let (far_sender, near_receiver) = unbounded();

        (
            Self::new(near_sender, near_receiver),
            Self::new(far_sender, far_receiver),
        )
    }

    fn new(to_peer: ChannelSender<AirFrame>, from_peer: ChannelReceiver<AirFrame>) -> Self {
        Self {
            started: false,
            parameters: BASELINE,
            clock_us: 0,
            base_snr_db: DEFAULT_BASE_SNR_DB,
            snr_jitter_db: DEFAULT_SNR_JITTER_DB,
            corruption_probability: 0.0,
            to_peer,
            from_peer,
        }
    }

    pub fn with_base_snr(mut self, snr_db: f32, jitter_db: f32) -> Self {
        self.base_snr_db = snr_db;
        self.snr_jitter_db = jitter_db.abs();
        self
    }

    /// Probability that a transmitted frame arrives with a failing checksum.
    pub fn with_corruption(mut self, probability: f64) -> Self {
        self.corruption_probability = probability.clamp(0.0, 1.0);
        self
    }

    fn send_at(&mut self, payload: &[u8], count_us: u32) -> Result<TxReport, RadioError> {
        if !self.started {
            return Err(RadioError::NotStarted);
        }
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(RadioError::PayloadTooLong(payload.len()));
        }

        let air_time_us = time_on_air_us(payload.len(), &self.parameters);

        let mut bytes = Vec::with_capacity(payload.len() + CRC_BYTES);
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&CRC16.checksum(payload).to_be_bytes());

        let mut rng = rand::thread_rng();
        if self.corruption_probability > 0.0 && rng.gen_bool(self.corruption_probability) {
            let index = rng.gen_range(0..bytes.len());
            bytes[index] = bytes[index].wrapping_add(1);
        }

        let snr = self.base_snr_db + rng.gen_range(-self.snr_jitter_db..=self.snr_jitter_db);

        self.to_peer
            .send(AirFrame {
                bytes,
                snr,
                count_us,
            })
            .map_err(|_| RadioError::Disconnected)?;

        self.clock_us = count_us + air_time_us + TX_GAP_US;
        Ok(TxReport {
            count_us,
            air_time_us,
        })
    }

    fn unwrap_frame(frame: AirFrame) -> RxPacket {
        let (payload, trailer) = frame.bytes.split_at(frame.bytes.len() - CRC_BYTES);
        let crc_ok = CRC16.checksum(payload) == u16::from_be_bytes([trailer[0], trailer[1]]);

        RxPacket {
            payload: payload.to_vec(),
            snr: frame.snr,
            count_us: frame.count_us,
            crc_ok,
        }
    }
}

impl Radio for LoopbackRadio {
    fn start(&mut self) -> Result<(), RadioError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.started = false;
        Ok(())
    }

    fn apply_parameters(&mut self, parameters: &TxParameters) -> Result<(), RadioError> {
        self.parameters = *parameters;
        Ok(())
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<TxReport, RadioError> {
        let count_us = self.clock_us;
        self.send_at(payload, count_us)
    }

    fn transmit_at(&mut self, payload: &[u8], count_us: u32) -> Result<TxReport, RadioError> {
        // never schedule into the past of the local clock
        let count_us = count_us.max(self.clock_us);
        self.send_at(payload, count_us)
    }

    fn receive_batch(&mut self, max_packets: usize) -> Result<Vec<RxPacket>, RadioError> {
        if !self.started {
            return Err(RadioError::NotStarted);
        }

        let mut batch = Vec::new();
        while batch.len() < max_packets {
            match self.from_peer.try_recv() {
                Ok(frame) => batch.push(Self::unwrap_frame(frame)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if batch.is_empty() {
                        return Err(RadioError::Disconnected);
                    }
                    break;
                }
            }
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PAYLOAD: &[u8] = b"counter and filler";

    fn started_pair() -> (LoopbackRadio, LoopbackRadio) {
        let (mut near, mut far) = LoopbackRadio::pair();
        near.start().unwrap();
        far.start().unwrap();
        (near, far)
    }

    #[test]
    fn test_delivery_with_signal_metadata() {
        let (mut near, mut far) = started_pair();

        let report = near.transmit(TEST_PAYLOAD).unwrap();
        let batch = far.receive_batch(16).unwrap();

        assert_eq!(batch.len(), 1);
        let packet = &batch[0];
        assert!(packet.crc_ok);
        assert_eq!(packet.payload, TEST_PAYLOAD);
        assert_eq!(packet.count_us, report.count_us);
        assert!((packet.snr - DEFAULT_BASE_SNR_DB).abs() <= DEFAULT_SNR_JITTER_DB);
    }

    #[test]
    fn test_clock_advances_by_air_time() {
        let (mut near, mut far) = started_pair();

        let first = near.transmit(TEST_PAYLOAD).unwrap();
        let second = near.transmit(TEST_PAYLOAD).unwrap();

        assert_eq!(first.count_us, 0);
        assert_eq!(second.count_us, first.air_time_us + TX_GAP_US);

        let batch = far.receive_batch(16).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_scheduled_transmission() {
        let (mut near, mut far) = started_pair();

        let report = near.transmit_at(TEST_PAYLOAD, 2_000_000).unwrap();
        assert_eq!(report.count_us, 2_000_000);

        let batch = far.receive_batch(16).unwrap();
        assert_eq!(batch[0].count_us, 2_000_000);
    }

    #[test]
    fn test_corruption_fails_the_checksum() {
        let (near, mut far) = LoopbackRadio::pair();
        let mut near = near.with_corruption(1.0);
        near.start().unwrap();
        far.start().unwrap();

        near.transmit(TEST_PAYLOAD).unwrap();
        let batch = far.receive_batch(16).unwrap();

        assert_eq!(batch.len(), 1);
        assert!(!batch[0].crc_ok);
    }

    #[test]
    fn test_transport_must_be_started() {
        let (mut near, _far) = LoopbackRadio::pair();

        assert!(matches!(
            near.transmit(TEST_PAYLOAD),
            Err(RadioError::NotStarted)
        ));
        assert!(matches!(
            near.receive_batch(16),
            Err(RadioError::NotStarted)
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let (mut near, _far) = started_pair();
        let oversized = vec![0u8; MAX_PAYLOAD_BYTES + 1];

        assert!(matches!(
            near.transmit(&oversized),
            Err(RadioError::PayloadTooLong(_))
        ));
    }
}
