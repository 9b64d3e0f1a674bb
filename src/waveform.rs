// src/waveform.rs
//! Captured waveform set and its HDF5 file.
//!
//! The sample matrix is the `f32` dataset `waveform_data` (waveforms by
//! samples); the capture metadata are attributes of the root group.
use std::path::Path;

use hdf5::types::VarLenUnicode;
use ndarray::Array2;

use crate::drivers::DaqError;

/// Dataset holding the waveform matrix.
pub const DATASET: &str = "waveform_data";

#[derive(Clone, Debug, PartialEq)]
pub struct WaveformMetadata {
    pub date: String,
    pub user: String,
    pub waveform_type: String,
    /// Timebase code the capture ran with (units of 10 ns at the default).
    pub timebase: u32,
    pub num_waveforms: usize,
    pub time_interval_ns: f64,
    pub voltage_range: String,
    pub trigger_mv: f64,
    pub pre_trigger_samples: usize,
}

fn unicode(value: &str) -> Result<VarLenUnicode, DaqError> {
    value
        .parse::<VarLenUnicode>()
        .map_err(|e| DaqError::Container(format!("cannot store '{value}': {e}")))
}

fn write_text_attr(file: &hdf5::File, name: &str, value: &str) -> Result<(), DaqError> {
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&unicode(value)?)?;
    Ok(())
}

fn read_text_attr(file: &hdf5::File, name: &str) -> Result<String, DaqError> {
    let value: VarLenUnicode = file.attr(name)?.read_scalar()?;
    Ok(value.as_str().to_string())
}

impl WaveformMetadata {
    fn write_attrs(&self, file: &hdf5::File) -> Result<(), DaqError> {
        write_text_attr(file, "date", &self.date)?;
        write_text_attr(file, "user", &self.user)?;
        write_text_attr(file, "waveform_type", &self.waveform_type)?;
        write_text_attr(file, "voltage_range", &self.voltage_range)?;
        file.new_attr::<u32>().create("timebase")?.write_scalar(&self.timebase)?;
        file.new_attr::<u64>()
            .create("num_waveforms")?
            .write_scalar(&(self.num_waveforms as u64))?;
        file.new_attr::<f64>()
            .create("time_interval_ns")?
            .write_scalar(&self.time_interval_ns)?;
        file.new_attr::<f64>().create("trigger_mv")?.write_scalar(&self.trigger_mv)?;
        file.new_attr::<u64>()
            .create("pre_trigger_samples")?
            .write_scalar(&(self.pre_trigger_samples as u64))?;
        Ok(())
    }
    fn read_attrs(file: &hdf5::File) -> Result<Self, DaqError> {
        Ok(Self {
            date: read_text_attr(file, "date")?,
            user: read_text_attr(file, "user")?,
            waveform_type: read_text_attr(file, "waveform_type")?,
            timebase: file.attr("timebase")?.read_scalar::<u32>()?,
            num_waveforms: file.attr("num_waveforms")?.read_scalar::<u64>()? as usize,
            time_interval_ns: file.attr("time_interval_ns")?.read_scalar::<f64>()?,
            voltage_range: read_text_attr(file, "voltage_range")?,
            trigger_mv: file.attr("trigger_mv")?.read_scalar::<f64>()?,
            pre_trigger_samples: file.attr("pre_trigger_samples")?.read_scalar::<u64>()? as usize,
        })
    }
}

/// Waveforms (rows) by samples (columns), in millivolts.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformSet {
    data: Array2<f32>,
    metadata: WaveformMetadata,
}

impl WaveformSet {
    pub fn new(data: Array2<f32>, metadata: WaveformMetadata) -> Result<Self, DaqError> {
        if data.nrows() != metadata.num_waveforms {
            return Err(DaqError::Container(format!(
                "metadata says {} waveforms, data has {}",
                metadata.num_waveforms,
                data.nrows()
            )));
        }
        Ok(Self { data, metadata })
    }
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }
    pub fn metadata(&self) -> &WaveformMetadata {
        &self.metadata
    }
    pub fn num_waveforms(&self) -> usize {
        self.data.nrows()
    }
    pub fn samples_per_waveform(&self) -> usize {
        self.data.ncols()
    }
    /// Sample times in microseconds, starting at 0.
    pub fn time_axis_us(&self) -> Vec<f64> {
        let dt_us = self.metadata.time_interval_ns / 1000.0;
        (0..self.samples_per_waveform())
            .map(|i| i as f64 * dt_us)
            .collect()
    }
    /// Smallest and largest value across every waveform.
    pub fn value_bounds(&self) -> Option<(f32, f32)> {
        self.data.iter().copied().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
    /// Writes the set to a new HDF5 file, replacing any existing one.
    pub fn save(&self, path: &Path) -> Result<(), DaqError> {
        let file = hdf5::File::create(path)?;
        let dataset = file
            .new_dataset::<f32>()
            .shape([self.data.nrows(), self.data.ncols()])
            .create(DATASET)?;
        dataset.write(&self.data)?;
        self.metadata.write_attrs(&file)?;
        file.flush()?;
        Ok(())
    }
    pub fn load(path: &Path) -> Result<Self, DaqError> {
        let file = hdf5::File::open(path)?;
        let data = file.dataset(DATASET)?.read_2d::<f32>()?;
        let metadata = WaveformMetadata::read_attrs(&file)?;
        Self::new(data, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn metadata(n: usize) -> WaveformMetadata {
        WaveformMetadata {
            date: "2024-05-25".into(),
            user: "expert_user".into(),
            waveform_type: "generated".into(),
            timebase: 8,
            num_waveforms: n,
            time_interval_ns: 80.0,
            voltage_range: "PS5000_200MV".into(),
            trigger_mv: 50.0,
            pre_trigger_samples: 2,
        }
    }

    #[test]
    fn saved_set_loads_back_unchanged() {
        let data = Array2::from_shape_fn((3, 5), |(w, s)| w as f32 * 10.0 - s as f32 * 0.25);
        let set = WaveformSet::new(data, metadata(3)).unwrap();
        let path = std::env::temp_dir().join(format!("labdaq_wf_{}.h5", std::process::id()));
        set.save(&path).unwrap();
        let loaded = WaveformSet::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, set);
        assert_eq!(loaded.metadata().user, "expert_user");
    }
    #[test]
    fn file_layout_is_readable_by_generic_hdf5_tools() {
        let data = Array2::from_shape_fn((2, 6), |(w, s)| (w * 6 + s) as f32);
        let set = WaveformSet::new(data.clone(), metadata(2)).unwrap();
        let path = std::env::temp_dir().join(format!("labdaq_wf_layout_{}.h5", std::process::id()));
        set.save(&path).unwrap();
        let file = hdf5::File::open(&path).unwrap();
        let ds = file.dataset("waveform_data").unwrap();
        assert_eq!(ds.shape(), vec![2, 6]);
        assert_eq!(ds.read_2d::<f32>().unwrap(), data);
        let timebase: u32 = file.attr("timebase").unwrap().read_scalar().unwrap();
        assert_eq!(timebase, 8);
        let user: VarLenUnicode = file.attr("user").unwrap().read_scalar().unwrap();
        assert_eq!(user.as_str(), "expert_user");
        drop(file);
        fs::remove_file(&path).ok();
    }
    #[test]
    fn row_count_must_match_metadata() {
        let data = Array2::<f32>::zeros((2, 4));
        assert!(WaveformSet::new(data, metadata(3)).is_err());
    }
    #[test]
    fn time_axis_and_bounds() {
        let data = Array2::from_shape_vec((1, 4), vec![-3.0, 1.0, 7.5, 0.0]).unwrap();
        let mut meta = metadata(1);
        meta.time_interval_ns = 250.0;
        let set = WaveformSet::new(data, meta).unwrap();
        assert_eq!(set.time_axis_us(), vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(set.value_bounds(), Some((-3.0, 7.5)));
    }
    #[test]
    fn rejects_non_hdf5_files() {
        let path = std::env::temp_dir().join(format!("labdaq_wf_bad_{}.h5", std::process::id()));
        fs::write(&path, b"not an hdf5 file").unwrap();
        let err = WaveformSet::load(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, DaqError::Container(_)));
    }
}
