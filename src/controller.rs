// BRIGHTNESSD CONTROLLER
// OWNS THE SINGLE PHYSICAL DISPLAY STATE. REDUCES SUBMITTED SESSION
// SNAPSHOTS AGAINST CURRENT STATE, SWITCHES THE AUTO CONTROLLER IN AND
// OUT, AND FANS EVERY PHYSICAL WRITE OUT TO OBSERVERS.
//
// RUNS ONLY ON THE SERVICE LOOP THREAD. NOTHING HERE LOCKS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::abc::Abc;
use crate::display::DisplayRamp;
use crate::error::{Error, Result};
use crate::levels::{Config, Mode, RAMP_OFF};
use crate::lightsensor::LightSample;
use crate::persist::Persist;
use crate::writelog::WriteLog;
use crate::{log_err, log_info, log_warn};

/// Session update callback, installed last-writer-wins: every applied
/// snapshot replaces the previous installation, including with nothing.
pub type UpdateCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Monitor observer. Registered by identity; the first registration
/// receives an immediate synthetic notification of the current level.
pub trait LevelObserver: Send {
    fn on_changed(&mut self, level: i32);
}

impl<F: FnMut(i32) + Send> LevelObserver for F {
    fn on_changed(&mut self, level: i32) {
        self(level)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObserverId(pub u64);

impl ObserverId {
    pub fn next() -> ObserverId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ObserverId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The value a session submits: its whole configuration, copied.
pub struct SessionSnapshot {
    pub mode: Mode,
    pub target: i32,
    pub ramp: i32,
    pub cb: Option<UpdateCallback>,
}

// SERVER-SIDE STATE OF THE DISTINGUISHED SYSTEM SESSION
struct SystemSession {
    mode: Mode,
    target: i32,
    ramp: i32,
}

pub struct Controller {
    cfg: Config,
    display: Option<DisplayRamp>,
    abc: Option<Abc>,

    current_mode: Option<Mode>,
    current_target: i32,
    current_ramp: i32,

    system: SystemSession,

    cb: Option<UpdateCallback>,
    observers: Vec<(ObserverId, Box<dyn LevelObserver>)>,

    persist: Persist,
    write_log: WriteLog,
}

impl Controller {
    pub fn new(cfg: Config, display: Option<DisplayRamp>, persist: Persist) -> Controller {
        let current_level = display.as_ref().map_or(0, |d| d.current());
        Controller {
            cfg,
            display,
            abc: None,
            current_mode: None,
            current_target: current_level,
            current_ramp: RAMP_OFF,
            // SEEDED FROM THE CURRENT LEVEL SO THE FIRST APPLY IS A NO-OP
            // ON THE TARGET AND ONLY ESTABLISHES THE MODE
            system: SystemSession {
                mode: Mode::DEFAULT,
                target: current_level,
                ramp: RAMP_OFF,
            },
            cb: None,
            observers: Vec::new(),
            persist,
            write_log: WriteLog::new(),
        }
    }

    /// Applies the saved settings, or the seeded system session when no
    /// store is bound. Restore order matters: auto mode is disabled
    /// before the saved level lands, then the saved mode may bring the
    /// auto controller back, then the anchor is installed.
    pub fn startup(&mut self, now: Instant) -> Result<()> {
        if let Some(saved) = self.persist.restore_all(&self.cfg) {
            self.system_set_mode(Mode::Manual, now)?;
            self.system_set_target(saved.target, RAMP_OFF, now)?;
            self.system_set_mode(saved.mode, now)?;
            if let Err(e) =
                self.set_user_point(Some(self.system.mode), saved.user_lux, saved.user_target)
            {
                log_warn!("saved user point not restored: {}", e);
            }
            Ok(())
        } else {
            self.apply_system(now)
        }
    }

    /// Reduces one submitted session snapshot against current state.
    pub fn apply(&mut self, snap: SessionSnapshot, now: Instant) -> Result<()> {
        let mut result = Ok(());

        if self.current_mode != Some(snap.mode) {
            log_info!("change mode to {}", snap.mode.label());
            self.current_mode = Some(snap.mode);
            match snap.mode {
                Mode::Manual => {
                    // TEARS DOWN THE AUTO CONTROLLER AND ANY PENDING
                    // SHORT-TERM MODEL, SYNCHRONOUSLY
                    self.abc = None;
                }
                Mode::Auto => {
                    if self.abc.is_none() && self.display.is_some() {
                        match Abc::new(&self.cfg) {
                            Ok(abc) => self.abc = Some(abc),
                            Err(e) => log_err!("failed to start auto controller: {}", e),
                        }
                    }
                }
            }
            self.persist.save_mode(snap.mode as i32);
        }

        if self.current_target != snap.target || self.current_ramp != snap.ramp {
            log_info!("change brightness to {}, ramp {}", snap.target, snap.ramp);
            result = self.set_target_inner(snap.target, snap.ramp, now);
            self.persist.save_level(snap.target);
        }

        self.cb = snap.cb;
        result
    }

    fn set_target_inner(&mut self, target: i32, ramp: i32, now: Instant) -> Result<()> {
        self.current_target = target;
        self.current_ramp = ramp;

        // NO CHANGE IF THE PHYSICAL DISPLAY DOES NOT EXIST
        let write = match (self.abc.as_mut(), self.display.as_mut()) {
            (_, None) => return Ok(()),
            (Some(abc), Some(display)) => abc.set_target(display, target, ramp, now)?,
            (None, Some(display)) => display.set(target, ramp)?,
        };
        if let Some(level) = write {
            self.fan_out(level);
        }
        Ok(())
    }

    // --- SYSTEM SESSION OPERATIONS (THE REMOTE SURFACE) ---

    pub fn system_set_target(&mut self, level: i32, ramp: i32, now: Instant) -> Result<()> {
        if level == self.system.target && ramp == self.system.ramp {
            return Ok(());
        }
        self.system.target = level;
        self.system.ramp = ramp;
        self.apply_system(now)
    }

    pub fn system_get_target(&self) -> i32 {
        self.system.target
    }

    pub fn system_set_mode(&mut self, mode: Mode, now: Instant) -> Result<()> {
        self.system.mode = mode;
        self.apply_system(now)
    }

    pub fn system_get_mode(&self) -> Mode {
        self.system.mode
    }

    fn apply_system(&mut self, now: Instant) -> Result<()> {
        let snap = SessionSnapshot {
            mode: self.system.mode,
            target: self.system.target,
            ramp: self.system.ramp,
            cb: None,
        };
        self.apply(snap, now)
    }

    // --- USER ANCHOR ---

    /// `session_mode` is the submitting session's own mode; None means
    /// the system session. The anchor only exists under auto control.
    pub fn set_user_point(
        &mut self,
        session_mode: Option<Mode>,
        lux: i32,
        target: i32,
    ) -> Result<()> {
        if session_mode.unwrap_or(self.system.mode) != Mode::Auto {
            return Err(Error::NotSupported);
        }
        let abc = self.abc.as_mut().ok_or(Error::NotSupported)?;
        abc.set_user_point(lux, target);
        self.persist.save_user_point(lux, target);
        Ok(())
    }

    pub fn get_user_point(&self, session_mode: Option<Mode>) -> Result<(i32, i32)> {
        if session_mode.unwrap_or(self.system.mode) != Mode::Auto {
            return Err(Error::NotSupported);
        }
        let abc = self.abc.as_ref().ok_or(Error::NotSupported)?;
        Ok(abc.get_user_point())
    }

    // --- OBSERVERS ---

    pub fn monitor(&mut self, id: ObserverId, mut observer: Box<dyn LevelObserver>) {
        // IDEMPOTENT BY IDENTITY
        if self.observers.iter().any(|(oid, _)| *oid == id) {
            return;
        }
        observer.on_changed(self.get_current_level());
        self.observers.push((id, observer));
    }

    pub fn unmonitor(&mut self, id: ObserverId) {
        self.observers.retain(|(oid, _)| *oid != id);
    }

    // --- LEVEL QUERIES ---

    /// Last level written to the device, not the pending target.
    pub fn get_current_level(&self) -> i32 {
        self.display.as_ref().map_or(0, |d| d.current())
    }

    // --- SENSOR PATH ---

    /// One batch from the sensor topic. Only the first element is used.
    /// Errors never propagate to clients; a failed auto write is logged
    /// and dropped.
    pub fn handle_sensor_batch(&mut self, samples: &[LightSample]) {
        let Some(sample) = samples.first() else {
            log_err!("no valid sensor data");
            return;
        };

        let write = match (self.abc.as_mut(), self.display.as_mut()) {
            (Some(abc), Some(display)) => abc.handle_sample(display, sample.light),
            _ => return,
        };
        match write {
            Ok(Some(level)) => self.fan_out(level),
            Ok(None) => {}
            Err(e) => log_err!("auto brightness write failed: {}", e),
        }
    }

    pub fn abc_present(&self) -> bool {
        self.abc.is_some()
    }

    // --- TIMERS (DRIVEN BY THE SERVICE LOOP) ---

    pub fn tick_period(&self) -> Duration {
        self.cfg.tick
    }

    pub fn ramp_ticking(&self) -> bool {
        self.display.as_ref().map_or(false, |d| d.ticking())
    }

    pub fn ramp_seq(&self) -> u64 {
        self.display.as_ref().map_or(0, |d| d.seq())
    }

    /// One ramp step. A device failure has already halted the ramp; it
    /// is logged here and the controller carries on.
    pub fn tick_ramp(&mut self) {
        let write = match self.display.as_mut() {
            Some(display) => display.tick(),
            None => return,
        };
        match write {
            Ok(Some(level)) => self.fan_out(level),
            Ok(None) => {}
            Err(e) => log_err!("ramp write failed: {}", e),
        }
    }

    pub fn interactive_deadline(&self) -> Option<Instant> {
        self.abc.as_ref().and_then(|abc| abc.interactive_deadline())
    }

    pub fn fire_interactive(&mut self, now: Instant) {
        let fired = match self.abc.as_mut() {
            Some(abc) => match abc.interactive_deadline() {
                Some(deadline) if deadline <= now => abc.fire_interactive_timeout(),
                _ => None,
            },
            None => None,
        };
        if let Some((lux, target)) = fired {
            log_info!("interactive model adopted as user point ({}, {})", lux, target);
            self.persist.save_user_point(lux, target);
        }
    }

    // --- FAN-OUT ---

    fn fan_out(&mut self, level: i32) {
        self.write_log.record(level);
        if let Some(cb) = &self.cb {
            cb(level);
        }
        for (_, observer) in self.observers.iter_mut() {
            observer.on_changed(level);
        }
    }

    pub fn write_log(&self) -> &WriteLog {
        &self.write_log
    }

    /// Saves the complete settings snapshot, anchor included when the
    /// auto controller is up.
    pub fn save_all(&mut self) {
        let (user_lux, user_target) = self
            .abc
            .as_ref()
            .map(|abc| abc.get_user_point())
            .unwrap_or((1, 1));
        self.persist.save_all(
            self.system.mode as i32,
            self.system.target,
            user_lux,
            user_target,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimBacklight, SimBacklightHandle};
    use crate::levels::LEVEL_OFF;
    use std::sync::Mutex;

    fn controller_with_sim(initial: i32) -> (Controller, SimBacklightHandle) {
        let cfg = Config::default();
        let (dev, handle) = SimBacklight::new(initial);
        let display = DisplayRamp::open(Box::new(dev), cfg.clone()).unwrap();
        let controller = Controller::new(cfg, Some(display), Persist::new(None));
        (controller, handle)
    }

    #[test]
    fn first_apply_establishes_default_mode_and_abc() {
        let (mut controller, _handle) = controller_with_sim(135);
        controller.startup(Instant::now()).unwrap();
        assert!(controller.abc_present());
        assert_eq!(controller.system_get_mode(), Mode::Auto);
        assert_eq!(controller.get_current_level(), 135);
    }

    #[test]
    fn manual_mode_tears_down_abc() {
        let (mut controller, _handle) = controller_with_sim(135);
        let now = Instant::now();
        controller.startup(now).unwrap();
        assert!(controller.abc_present());

        controller.system_set_mode(Mode::Manual, now).unwrap();
        assert!(!controller.abc_present());

        controller.system_set_mode(Mode::Auto, now).unwrap();
        assert!(controller.abc_present());
    }

    #[test]
    fn sensor_batch_never_writes_in_manual_mode() {
        let (mut controller, handle) = controller_with_sim(135);
        let now = Instant::now();
        controller.startup(now).unwrap();
        controller.system_set_mode(Mode::Manual, now).unwrap();
        handle.clear_writes();

        for _ in 0..30 {
            controller.handle_sensor_batch(&[LightSample {
                timestamp_ns: 0,
                light: 457.8,
            }]);
        }
        assert_eq!(handle.write_count(), 0);
    }

    #[test]
    fn observer_gets_immediate_synthetic_notify_once() {
        let (mut controller, _handle) = controller_with_sim(123);
        controller.startup(Instant::now()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let id = ObserverId::next();
        controller.monitor(
            id,
            Box::new(move |level: i32| seen2.lock().unwrap().push(level)),
        );
        assert_eq!(*seen.lock().unwrap(), vec![123]);

        // RE-REGISTRATION OF THE SAME IDENTITY IS A NO-OP
        let seen3 = seen.clone();
        controller.monitor(
            id,
            Box::new(move |level: i32| seen3.lock().unwrap().push(level)),
        );
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn off_sentinel_bypasses_clamp_plain_zero_does_not() {
        let (mut controller, _handle) = controller_with_sim(135);
        let now = Instant::now();
        controller.startup(now).unwrap();
        controller.system_set_mode(Mode::Manual, now).unwrap();

        controller.system_set_target(LEVEL_OFF, 0, now).unwrap();
        assert_eq!(controller.get_current_level(), 0);

        controller.system_set_target(0, 0, now).unwrap();
        assert_eq!(controller.get_current_level(), 20);
    }

    #[test]
    fn unchanged_target_tuple_returns_early() {
        let (mut controller, handle) = controller_with_sim(135);
        let now = Instant::now();
        controller.startup(now).unwrap();
        controller.system_set_mode(Mode::Manual, now).unwrap();

        controller.system_set_target(100, 0, now).unwrap();
        let writes = handle.write_count();
        // SAME TUPLE: NO APPLY, NO ADDITIONAL WRITE
        controller.system_set_target(100, 0, now).unwrap();
        assert_eq!(handle.write_count(), writes);
    }

    #[test]
    fn user_point_requires_auto_mode() {
        let (mut controller, _handle) = controller_with_sim(135);
        let now = Instant::now();
        controller.startup(now).unwrap();
        controller.system_set_mode(Mode::Manual, now).unwrap();

        assert!(matches!(
            controller.set_user_point(None, 50, 200),
            Err(Error::NotSupported)
        ));
        assert!(matches!(
            controller.get_user_point(None),
            Err(Error::NotSupported)
        ));

        controller.system_set_mode(Mode::Auto, now).unwrap();
        controller.set_user_point(None, 50, 200).unwrap();
        assert_eq!(controller.get_user_point(None).unwrap(), (50, 200));
    }
}
