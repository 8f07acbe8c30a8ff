use std::thread;

use crate::frame::{Frame, LinkIdentity, SettingReport};
use crate::params::TxParameters;
use crate::radio::{Radio, RadioError, IDLE_POLL, RECEIVE_BATCH_PACKETS};
use crate::stats::SampleSeries;
use crate::sweep::SweepPlan;

/// Polls of silence before the join request is re-sent.
const JOIN_RETRY_POLLS: usize = 500;

/// Air-time statistics of the setting in progress, measured by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AirTimeStats {
    pub avg_us: u32,
    pub std_dev_us: u32,
}

/// Work for the next transmission slot. Parameters are present only on the
/// first message of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStep {
    pub new_parameters: Option<TxParameters>,
    pub frame: Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerPhase {
    Idle,
    Joining,
    SendingMessage,
    EndingSetting,
    Finished,
}

/// Externally visible position of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerState {
    pub setting_index: usize,
    pub message_index: u8,
    pub phase: SequencerPhase,
}

/// Steps through the sweep plan one transmission at a time. Every event
/// produces at most one frame; the driver owns the radio and feeds completion
/// events back in.
pub struct TestSequencer {
    plan: SweepPlan,
    parameters: TxParameters,
    setting_index: usize,
    message_index: u8,
    phase: SequencerPhase,
}

impl TestSequencer {
    pub fn new(plan: SweepPlan) -> Self {
        let parameters = crate::sweep::BASELINE;
        Self {
            plan,
            parameters,
            setting_index: 0,
            message_index: 0,
            phase: SequencerPhase::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        SequencerState {
            setting_index: self.setting_index,
            message_index: self.message_index,
            phase: self.phase,
        }
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Start joining. The join handshake itself is the driver's job.
    pub fn begin(&mut self) {
        if self.phase == SequencerPhase::Idle {
            self.phase = SequencerPhase::Joining;
        }
    }

    /// Network joined: enter the first setting and send its first message.
    pub fn on_joined(&mut self) -> Option<TxStep> {
        if self.phase != SequencerPhase::Joining {
            return None;
        }
        self.setting_index = 0;
        self.message_index = 0;
        Some(self.enter_setting())
    }

    /// The previous transmission and its receive window completed.
    /// `air_time` carries the statistics of the setting measured so far.
    pub fn on_ready(&mut self, air_time: AirTimeStats) -> Option<TxStep> {
        match self.phase {
            SequencerPhase::Idle | SequencerPhase::Joining | SequencerPhase::Finished => None,
            SequencerPhase::SendingMessage => Some(self.next_message()),
            SequencerPhase::EndingSetting if self.message_index != 0 => {
                Some(self.end_setting(air_time))
            }
            SequencerPhase::EndingSetting => {
                self.setting_index += 1;
                Some(self.enter_setting())
            }
        }
    }

    fn enter_setting(&mut self) -> TxStep {
        match self.plan.parameters_at(self.setting_index) {
            Some(parameters) => {
                self.parameters = parameters;
                self.message_index = 1;
                self.phase = if self.plan.messages_per_setting() <= 1 {
                    SequencerPhase::EndingSetting
                } else {
                    SequencerPhase::SendingMessage
                };

                TxStep {
                    new_parameters: Some(parameters),
                    frame: Frame::Test {
                        counter: 0,
                        packet_size: parameters.packet_size,
                    },
                }
            }
            None => {
                self.phase = SequencerPhase::Finished;
                TxStep {
                    new_parameters: None,
                    frame: Frame::AllTestsDone,
                }
            }
        }
    }

    fn next_message(&mut self) -> TxStep {
        let counter = self.message_index;
        self.message_index += 1;
        if self.message_index == self.plan.messages_per_setting() {
            self.phase = SequencerPhase::EndingSetting;
        }

        TxStep {
            new_parameters: None,
            frame: Frame::Test {
                counter,
                packet_size: self.parameters.packet_size,
            },
        }
    }

    fn end_setting(&mut self, air_time: AirTimeStats) -> TxStep {
        self.message_index = 0;

        TxStep {
            new_parameters: None,
            frame: Frame::EndOfSetting(SettingReport {
                coding_rate: self.parameters.coding_rate.wire(),
                data_rate: self.parameters.spreading_factor.wire(),
                bandwidth: self.parameters.bandwidth.wire(),
                power_dbm: self.parameters.power_dbm,
                avg_tx_time_us: air_time.avg_us,
                packet_size: self.parameters.packet_size,
                messages_per_setting: self.plan.messages_per_setting(),
                test_type: self.plan.dimension().test_type(),
                std_dev_tx_time_us: air_time.std_dev_us,
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub frames_sent: usize,
    pub settings_completed: usize,
}

/// Device main loop: join handshake, then pump the sequencer until the plan
/// is exhausted. Transmit failures are logged and skipped, never retried.
pub fn run_sweep<R: Radio>(
    radio: &mut R,
    plan: SweepPlan,
    identity: &LinkIdentity,
) -> Result<SweepSummary, RadioError> {
    let mut sequencer = TestSequencer::new(plan);
    let mut air_time = SampleSeries::new();
    let mut summary = SweepSummary::default();

    radio.start()?;
    sequencer.begin();

    info!("Joining as {}...", identity);
    radio.transmit(&Frame::Join.encode(identity))?;
    wait_for_join_response(radio, identity)?;
    info!("Joined, starting the {} sweep.", sequencer.plan().dimension());

    let mut step = sequencer.on_joined();
    while let Some(TxStep {
        new_parameters,
        frame,
    }) = step
    {
        if let Some(parameters) = new_parameters {
            radio.apply_parameters(&parameters)?;
            debug!("Setting {}: {:?}", sequencer.state().setting_index, parameters);
        }

        match radio.transmit(&frame.encode(identity)) {
            Ok(report) => {
                summary.frames_sent += 1;
                if matches!(frame, Frame::Test { .. }) {
                    air_time.push(f64::from(report.air_time_us));
                }
            }
            Err(error) => warn!("Transmit failed, advancing anyway: {}", error),
        }

        if matches!(frame, Frame::EndOfSetting(_)) {
            summary.settings_completed += 1;
            air_time.clear();
        }

        step = sequencer.on_ready(air_time_stats(&air_time));
    }

    radio.stop()?;
    Ok(summary)
}

fn wait_for_join_response<R: Radio>(
    radio: &mut R,
    identity: &LinkIdentity,
) -> Result<(), RadioError> {
    let mut polls = 0;
    loop {
        let batch = radio.receive_batch(RECEIVE_BATCH_PACKETS)?;
        if batch.iter().any(|packet| packet.crc_ok) {
            return Ok(());
        }

        polls += 1;
        if polls % JOIN_RETRY_POLLS == 0 {
            warn!("No join response yet, re-sending the join request.");
            radio.transmit(&Frame::Join.encode(identity))?;
        }
        thread::sleep(IDLE_POLL);
    }
}

fn air_time_stats(series: &SampleSeries) -> AirTimeStats {
    match series.stats() {
        Some(stats) => AirTimeStats {
            avg_us: stats.mean.round() as u32,
            std_dev_us: stats.std_dev.round() as u32,
        },
        None => AirTimeStats::default(),
    }
}
