use std::ffi::c_void;
use std::os::raw::c_short;
use std::ptr;

use libloading::Library;
use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::drivers::scope::{
    BlockData, Channel, Coupling, Oscilloscope, SimpleTrigger, TimebaseInfo, VoltageRange,
};
use crate::drivers::DaqError;

const PICO_OK: u32 = 0;

type BlockReady = Option<unsafe extern "C" fn(c_short, u32, *mut c_void)>;

struct Ps5000Api {
    #[allow(dead_code)]
    lib: Library,
    open_unit: unsafe extern "C" fn(*mut c_short) -> u32,
    close_unit: unsafe extern "C" fn(c_short) -> u32,
    set_channel: unsafe extern "C" fn(c_short, i32, c_short, c_short, i32) -> u32,
    set_simple_trigger: unsafe extern "C" fn(c_short, c_short, i32, c_short, i32, u32, c_short) -> u32,
    get_timebase: unsafe extern "C" fn(c_short, u32, i32, *mut i32, c_short, *mut i32, u16) -> u32,
    run_block: unsafe extern "C" fn(
        c_short,
        i32,
        i32,
        u32,
        c_short,
        *mut i32,
        u16,
        BlockReady,
        *mut c_void,
    ) -> u32,
    is_ready: unsafe extern "C" fn(c_short, *mut c_short) -> u32,
    set_data_buffers: unsafe extern "C" fn(c_short, i32, *mut c_short, *mut c_short, i32) -> u32,
    get_values: unsafe extern "C" fn(c_short, u32, *mut u32, u32, c_short, u16, *mut c_short) -> u32,
    stop: unsafe extern "C" fn(c_short) -> u32,
}

impl Ps5000Api {
    fn load() -> Result<Self, DaqError> {
        // ps5000.dll / libps5000.so / libps5000.dylib from the PicoSDK install.
        let name = libloading::library_filename("ps5000");
        let lib = unsafe { Library::new(&name) }
            .map_err(|e| DaqError::SdkLoad(format!("{}: {e}", name.to_string_lossy())))?;
        let missing = |e: libloading::Error| DaqError::SdkLoad(e.to_string());
        // Safety: signatures follow ps5000Api.h from the PicoSDK.
        unsafe {
            Ok(Self {
                open_unit: *lib.get(b"ps5000OpenUnit\0").map_err(missing)?,
                close_unit: *lib.get(b"ps5000CloseUnit\0").map_err(missing)?,
                set_channel: *lib.get(b"ps5000SetChannel\0").map_err(missing)?,
                set_simple_trigger: *lib.get(b"ps5000SetSimpleTrigger\0").map_err(missing)?,
                get_timebase: *lib.get(b"ps5000GetTimebase\0").map_err(missing)?,
                run_block: *lib.get(b"ps5000RunBlock\0").map_err(missing)?,
                is_ready: *lib.get(b"ps5000IsReady\0").map_err(missing)?,
                set_data_buffers: *lib.get(b"ps5000SetDataBuffers\0").map_err(missing)?,
                get_values: *lib.get(b"ps5000GetValues\0").map_err(missing)?,
                stop: *lib.get(b"ps5000Stop\0").map_err(missing)?,
                lib,
            })
        }
    }
    fn instance() -> Result<&'static Ps5000Api, DaqError> {
        static API: OnceCell<Ps5000Api> = OnceCell::new();
        API.get_or_try_init(Self::load)
    }
}

fn check(call: &'static str, status: u32) -> Result<(), DaqError> {
    if status == PICO_OK {
        Ok(())
    } else {
        Err(DaqError::Sdk { call, status })
    }
}

fn sdk_len(value: usize, what: &str) -> Result<i32, DaqError> {
    i32::try_from(value).map_err(|_| DaqError::InvalidArgument(format!("{what} too large: {value}")))
}

/// Open handle to a PicoScope 5000-series unit. The unit is closed on drop.
pub struct PicoScope5000 {
    api: &'static Ps5000Api,
    handle: c_short,
    closed: bool,
}

impl PicoScope5000 {
    /// Opens the first unit the driver finds.
    pub fn open() -> Result<Self, DaqError> {
        let api = Ps5000Api::instance()?;
        let mut handle: c_short = 0;
        check("ps5000OpenUnit", unsafe { (api.open_unit)(&mut handle) })?;
        if handle <= 0 {
            return Err(DaqError::NoDevice("PicoScope 5000".into()));
        }
        info!("opened PicoScope 5000 (handle {handle})");
        Ok(Self {
            api,
            handle,
            closed: false,
        })
    }
    pub fn close(&mut self) -> Result<(), DaqError> {
        if !self.closed {
            self.closed = true;
            check("ps5000CloseUnit", unsafe { (self.api.close_unit)(self.handle) })?;
            info!("closed PicoScope 5000 (handle {})", self.handle);
        }
        Ok(())
    }
}

impl Oscilloscope for PicoScope5000 {
    fn set_channel(
        &mut self,
        channel: Channel,
        enabled: bool,
        coupling: Coupling,
        range: VoltageRange,
    ) -> Result<(), DaqError> {
        let dc = matches!(coupling, Coupling::Dc) as c_short;
        check("ps5000SetChannel", unsafe {
            (self.api.set_channel)(
                self.handle,
                channel.sdk_code(),
                enabled as c_short,
                dc,
                range.sdk_code(),
            )
        })
    }
    fn set_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<(), DaqError> {
        check("ps5000SetSimpleTrigger", unsafe {
            (self.api.set_simple_trigger)(
                self.handle,
                1,
                trigger.source.sdk_code(),
                trigger.threshold_adc,
                trigger.direction.sdk_code(),
                trigger.delay_samples,
                trigger.auto_trigger_ms,
            )
        })
    }
    fn timebase_info(&mut self, timebase: u32, samples: usize) -> Result<TimebaseInfo, DaqError> {
        let mut interval_ns: i32 = 0;
        let mut max_samples: i32 = 0;
        let samples = sdk_len(samples, "sample count")?;
        check("ps5000GetTimebase", unsafe {
            (self.api.get_timebase)(
                self.handle,
                timebase,
                samples,
                &mut interval_ns,
                1,
                &mut max_samples,
                0,
            )
        })?;
        debug!("timebase {timebase}: {interval_ns} ns, max {max_samples} samples");
        Ok(TimebaseInfo {
            time_interval_ns: interval_ns as f64,
            max_samples: max_samples.max(0) as usize,
        })
    }
    fn run_block(&mut self, pre_trigger: usize, post_trigger: usize, timebase: u32) -> Result<(), DaqError> {
        let pre = sdk_len(pre_trigger, "pre-trigger samples")?;
        let post = sdk_len(post_trigger, "post-trigger samples")?;
        check("ps5000RunBlock", unsafe {
            (self.api.run_block)(
                self.handle,
                pre,
                post,
                timebase,
                1,
                ptr::null_mut(),
                0,
                None,
                ptr::null_mut(),
            )
        })
    }
    fn is_ready(&mut self) -> Result<bool, DaqError> {
        let mut ready: c_short = 0;
        check("ps5000IsReady", unsafe {
            (self.api.is_ready)(self.handle, &mut ready)
        })?;
        Ok(ready != 0)
    }
    fn get_values(&mut self, channel: Channel, samples: usize) -> Result<BlockData, DaqError> {
        let len = sdk_len(samples, "buffer length")?;
        let mut buffer: Vec<c_short> = vec![0; samples];
        // The driver keeps the buffer pointer until the next GetValues, so the
        // buffer has to outlive both calls; it lives for this whole function.
        check("ps5000SetDataBuffers", unsafe {
            (self.api.set_data_buffers)(
                self.handle,
                channel.sdk_code(),
                buffer.as_mut_ptr(),
                ptr::null_mut(),
                len,
            )
        })?;
        let mut returned = samples as u32;
        let mut overflow: c_short = 0;
        check("ps5000GetValues", unsafe {
            (self.api.get_values)(self.handle, 0, &mut returned, 1, 0, 0, &mut overflow)
        })?;
        buffer.truncate(returned as usize);
        Ok(BlockData {
            adc: buffer,
            overflow: overflow & (1 << channel.sdk_code()) != 0,
        })
    }
    fn stop(&mut self) -> Result<(), DaqError> {
        check("ps5000Stop", unsafe { (self.api.stop)(self.handle) })
    }
}

impl Drop for PicoScope5000 {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
