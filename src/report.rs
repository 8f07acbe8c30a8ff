use std::fs::File;
use std::path::Path;

use thiserror::Error;

use crate::frame::SettingReport;
use crate::stats::SeriesStats;

/// Column order the plotting scripts index by. Fixed.
pub const CSV_HEADER: [&str; 12] = [
    "snr",
    "pkt_count",
    "crc",
    "dr",
    "bw",
    "pow",
    "avg_time",
    "size",
    "msgs_per_setting",
    "test_type",
    "std_dev_time",
    "std_dev_snr",
];

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("result file write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("result file flush failed: {0}")]
    Flush(#[from] std::io::Error),
}

/// One completed setting: SNR statistics measured by the gateway combined
/// with the fields the end-of-setting frame carried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultRow {
    pub mean_snr: f64,
    pub sample_count: usize,
    pub std_dev_snr: f64,
    pub report: SettingReport,
}

impl ResultRow {
    pub fn new(snr: SeriesStats, report: SettingReport) -> Self {
        Self {
            mean_snr: snr.mean,
            sample_count: snr.count,
            std_dev_snr: snr.std_dev,
            report,
        }
    }

    fn cells(&self) -> [String; 12] {
        let report = &self.report;
        [
            format!("{:+.1}", self.mean_snr),
            self.sample_count.to_string(),
            coding_rate_label(report.coding_rate).to_string(),
            data_rate_label(report.data_rate).to_string(),
            bandwidth_label(report.bandwidth).to_string(),
            report.power_dbm.to_string(),
            report.avg_tx_time_us.to_string(),
            report.packet_size.to_string(),
            report.messages_per_setting.to_string(),
            report.test_type.to_string(),
            report.std_dev_tx_time_us.to_string(),
            format!("{:+.1}", self.std_dev_snr),
        ]
    }
}

fn coding_rate_label(code: u8) -> &'static str {
    match code {
        0 => "4/5",
        1 => "2/3",
        2 => "4/7",
        3 => "1/2",
        _ => "ERR",
    }
}

fn data_rate_label(code: u8) -> &'static str {
    match code {
        5 => "SF7",
        4 => "SF8",
        3 => "SF9",
        2 => "SF10",
        1 => "SF11",
        0 => "SF12",
        6 => "undefined",
        _ => "ERR",
    }
}

fn bandwidth_label(code: u8) -> &'static str {
    match code {
        0 => "125",
        1 => "250",
        2 => "500",
        3 => "0",
        _ => "-1",
    }
}

/// Appends one CSV line per result row, header written once at creation.
/// Every row is flushed so a crash loses at most the in-flight row.
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn write_row(&mut self, row: &ResultRow) -> Result<(), SinkError> {
        self.writer.write_record(row.cells())?;
        self.writer.flush()?;
        Ok(())
    }
}
