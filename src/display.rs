// BRIGHTNESSD RAMP DRIVER
// OWNS THE BACKLIGHT REGISTER. SNAPS WHEN RAMP IS OFF, OTHERWISE STEPS
// FROM CURRENT TO TARGET ON A FIXED TICK. BETWEEN TICKS `current`
// EQUALS THE LAST VALUE WRITTEN TO THE DEVICE.
//
// WRITES ARE REPORTED BACK TO THE CALLER (THE CONTROLLER FANS THEM OUT
// TO OBSERVERS). THE TICK CADENCE ITSELF IS DRIVEN BY THE SERVICE LOOP.

use crate::device::BacklightDevice;
use crate::error::Result;
use crate::levels::{resolve_level, resolve_ramp, Config};
use crate::log_info;

pub struct DisplayRamp {
    device: Box<dyn BacklightDevice>,
    cfg: Config,
    current: i32,
    target: i32,
    step_per_tick: f32,
    steps: i32,
    start_level: i32,
    ticking: bool,
    // BUMPED WHENEVER A NEW TICK SEQUENCE STARTS, SO THE LOOP CAN
    // RE-PHASE ITS TIMER ON A MID-FLIGHT RETARGET
    seq: u64,
}

impl DisplayRamp {
    /// Binds the device and seeds `current` from the register.
    pub fn open(mut device: Box<dyn BacklightDevice>, cfg: Config) -> Result<DisplayRamp> {
        let current = device.read_power()?;
        Ok(DisplayRamp {
            device,
            cfg,
            current,
            target: current,
            step_per_tick: 0.0,
            steps: 0,
            start_level: current,
            ticking: false,
            seq: 0,
        })
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn ticking(&self) -> bool {
        self.ticking
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Cancels any in-flight ramp, resolves sentinels, and either snaps
    /// or arms a new tick sequence. Returns the level written, if any.
    pub fn set(&mut self, level: i32, ramp: i32) -> Result<Option<i32>> {
        self.ticking = false;

        let ramp = resolve_ramp(ramp, self.cfg.default_ramp);
        let resolved = resolve_level(level, self.cfg.level_min, self.cfg.level_max);
        self.target = resolved;

        log_info!(
            "set brightness to {} (clamp: {}), ramp {}",
            level,
            resolved,
            ramp
        );

        if ramp == 0 {
            self.step_per_tick = 0.0;
            return self.write(resolved);
        }

        let mut step = ramp as f32 * self.cfg.tick.as_millis() as f32 / 1000.0;
        if resolved < self.current {
            step = -step;
        }
        self.step_per_tick = step;
        self.steps = 0;
        self.start_level = self.current;
        self.ticking = true;
        self.seq = self.seq.wrapping_add(1);
        Ok(None)
    }

    /// Advances one ramp step. On reach or overshoot the write lands
    /// exactly on the target and the sequence stops. A device failure
    /// halts the ramp.
    pub fn tick(&mut self) -> Result<Option<i32>> {
        if !self.ticking {
            return Ok(None);
        }

        self.steps += 1;
        let mut candidate =
            self.start_level + (self.steps as f32 * self.step_per_tick).round() as i32;

        if (self.step_per_tick > 0.0 && candidate >= self.target)
            || (self.step_per_tick < 0.0 && candidate <= self.target)
        {
            candidate = self.target;
            self.ticking = false;
        }

        match self.write(candidate) {
            Ok(written) => Ok(written),
            Err(e) => {
                self.ticking = false;
                Err(e)
            }
        }
    }

    // WRITE THE REGISTER; NO-OP WHEN THE VALUE IS ALREADY CURRENT
    fn write(&mut self, level: i32) -> Result<Option<i32>> {
        if self.current == level {
            return Ok(None);
        }
        self.device.write_power(level)?;
        self.current = level;
        Ok(Some(level))
    }
}
