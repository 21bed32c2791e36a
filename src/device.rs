// BRIGHTNESSD BACKLIGHT DEVICE ACCESS
// THE ONLY HARDWARE TOUCHPOINT: A POWER REGISTER IN [0, 255].
// SYSFS FOR REAL PANELS, AN IN-MEMORY REGISTER FOR TESTS AND THE
// `test` HARNESS (WITH A SHARED WRITE HISTORY FOR ASSERTIONS).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::writelog::now_ns;

pub trait BacklightDevice: Send {
    fn read_power(&mut self) -> Result<i32>;
    fn write_power(&mut self, power: i32) -> Result<()>;
}

// --- SYSFS BACKLIGHT ---

pub struct SysfsBacklight {
    brightness_path: PathBuf,
}

impl SysfsBacklight {
    /// `dir` is one entry under /sys/class/backlight.
    pub fn open(dir: &Path) -> Result<SysfsBacklight> {
        let brightness_path = dir.join("brightness");
        if !brightness_path.exists() {
            return Err(Error::IoFailure(format!(
                "{} has no brightness attribute",
                dir.display()
            )));
        }
        Ok(SysfsBacklight { brightness_path })
    }
}

impl BacklightDevice for SysfsBacklight {
    fn read_power(&mut self) -> Result<i32> {
        let raw = fs::read_to_string(&self.brightness_path)?;
        raw.trim()
            .parse::<i32>()
            .map_err(|e| Error::IoFailure(format!("bad brightness value: {}", e)))
    }

    fn write_power(&mut self, power: i32) -> Result<()> {
        fs::write(&self.brightness_path, power.to_string())?;
        Ok(())
    }
}

// --- SIMULATED BACKLIGHT ---

struct SimState {
    power: i32,
    writes: Vec<(u64, i32)>,
    fail_writes: bool,
}

pub struct SimBacklight {
    state: Arc<Mutex<SimState>>,
}

/// Test-side view of the simulated register: current power and the full
/// write history, observable while the service owns the device.
#[derive(Clone)]
pub struct SimBacklightHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimBacklight {
    pub fn new(initial_power: i32) -> (SimBacklight, SimBacklightHandle) {
        let state = Arc::new(Mutex::new(SimState {
            power: initial_power,
            writes: Vec::new(),
            fail_writes: false,
        }));
        (
            SimBacklight {
                state: state.clone(),
            },
            SimBacklightHandle { state },
        )
    }
}

impl BacklightDevice for SimBacklight {
    fn read_power(&mut self) -> Result<i32> {
        Ok(self.state.lock().unwrap().power)
    }

    fn write_power(&mut self, power: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(Error::IoFailure("simulated write failure".to_string()));
        }
        state.power = power;
        state.writes.push((now_ns(), power));
        Ok(())
    }
}

impl SimBacklightHandle {
    pub fn power(&self) -> i32 {
        self.state.lock().unwrap().power
    }

    /// Levels written so far, in write order.
    pub fn writes(&self) -> Vec<i32> {
        self.state.lock().unwrap().writes.iter().map(|w| w.1).collect()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }
}
