use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::drivers::DaqError;
use crate::types::{ChannelReading, MeasurementSample, CHANNEL_COUNT};

const FORMAT_LINE: &str = "### Skip the first 3 rows. Format: Timestamp, Ch1 Volt, Ch1 Current, Ch2 ... separated by tabs and samples by newlines";
/// Lines before the column row.
pub const HEADER_LINES: usize = 3;

pub fn column_names() -> Vec<String> {
    let mut names = vec!["Timestamp".to_string()];
    for ch in 1..=CHANNEL_COUNT {
        names.push(format!("Ch{ch}_Voltage"));
        names.push(format!("Ch{ch}_Current"));
    }
    names
}

/// Append-only tab-separated measurement log.
pub struct MeasurementLog {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl MeasurementLog {
    /// Opens `path` for appending; an empty file first gets the header block
    /// and the column row.
    pub fn open(path: &Path, expected_note: &str) -> Result<Self, DaqError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if empty {
            writeln!(writer, "{FORMAT_LINE}")?;
            writeln!(writer, "{expected_note}")?;
            writeln!(writer)?;
            writeln!(writer, "{}", column_names().join("\t"))?;
            writer.flush()?;
        }
        info!("logging measurements to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Rows appended through this handle.
    pub fn rows_written(&self) -> usize {
        self.rows
    }
    /// Writes one row and flushes so the file is current if the process dies.
    pub fn append(&mut self, sample: &MeasurementSample) -> Result<(), DaqError> {
        write!(self.writer, "{}", sample.timestamp)?;
        for c in &sample.channels {
            write!(self.writer, "\t{:.3}\t{:.3}", c.voltage_v, c.current_ma)?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

/// Reads a log written by [`MeasurementLog`] back into samples.
pub fn read_log(path: &Path) -> Result<Vec<MeasurementSample>, DaqError> {
    let reader = BufReader::new(File::open(path)?);
    let mut samples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if idx < HEADER_LINES {
            continue;
        }
        if idx == HEADER_LINES {
            let expected = column_names().join("\t");
            if line.trim_end() != expected {
                return Err(DaqError::MalformedLog {
                    line: line_no,
                    reason: "unexpected column row".into(),
                });
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        samples.push(parse_row(&line, line_no)?);
    }
    Ok(samples)
}

fn parse_row(line: &str, line_no: usize) -> Result<MeasurementSample, DaqError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 1 + 2 * CHANNEL_COUNT {
        return Err(DaqError::MalformedLog {
            line: line_no,
            reason: format!("expected {} fields, found {}", 1 + 2 * CHANNEL_COUNT, fields.len()),
        });
    }
    let number = |s: &str| {
        s.trim().parse::<f64>().map_err(|_| DaqError::MalformedLog {
            line: line_no,
            reason: format!("'{s}' is not a number"),
        })
    };
    let mut channels = [ChannelReading::default(); CHANNEL_COUNT];
    for (ch, reading) in channels.iter_mut().enumerate() {
        reading.voltage_v = number(fields[1 + 2 * ch])?;
        reading.current_ma = number(fields[2 + 2 * ch])?;
    }
    Ok(MeasurementSample {
        timestamp: fields[0].to_string(),
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample(ts: &str, base: f64) -> MeasurementSample {
        let mut channels = [ChannelReading::default(); CHANNEL_COUNT];
        for (i, c) in channels.iter_mut().enumerate() {
            c.voltage_v = base + i as f64 * 0.5;
            c.current_ma = base * 100.0 + i as f64;
        }
        MeasurementSample {
            timestamp: ts.to_string(),
            channels,
        }
    }

    #[test]
    fn header_then_rows_read_back() {
        let path = std::env::temp_dir().join(format!("labdaq_log_{}.txt", std::process::id()));
        fs::remove_file(&path).ok();
        let written = vec![
            sample("2024-03-01 10:00:00", 1.25),
            sample("2024-03-01 10:00:01", 1.5),
        ];
        {
            let mut log = MeasurementLog::open(&path, "expected nothing").unwrap();
            for s in &written {
                log.append(s).unwrap();
            }
            assert_eq!(log.rows_written(), 2);
        }
        // Reopening an existing log must not repeat the header.
        {
            let mut log = MeasurementLog::open(&path, "ignored").unwrap();
            log.append(&sample("2024-03-01 10:00:02", 3.33)).unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("###"));
        assert_eq!(lines[1], "expected nothing");
        assert_eq!(lines[2], "");
        assert!(lines[3].starts_with("Timestamp\tCh1_Voltage\tCh1_Current\tCh2_Voltage"));
        assert_eq!(lines.len(), 7);
        assert!(lines[4].starts_with("2024-03-01 10:00:00\t1.250\t125.000"));
        let read = read_log(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(read.len(), 3);
        assert_eq!(read[..2], written[..]);
        assert_eq!(read[2].channels[0].voltage_v, 3.33);
    }
    #[test]
    fn malformed_rows_are_reported_with_line_number() {
        let path = std::env::temp_dir().join(format!("labdaq_badlog_{}.txt", std::process::id()));
        let mut text = String::from("#\n\n\n");
        text.push_str(&column_names().join("\t"));
        text.push_str("\n2024-03-01 10:00:00\t1.0\tx\t1\t1\t1\t1\t1\t1\n");
        fs::write(&path, text).unwrap();
        let err = read_log(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, DaqError::MalformedLog { line: 5, .. }));
    }
}
