// BRIGHTNESSD SERVICE LOOP
// ONE LOOP THREAD OWNS THE CONTROLLER. EVERYTHING ELSE TALKS TO IT
// THROUGH A BOUNDED COMMAND QUEUE:
//   CLIENT HANDLES    -> TYPED COMMANDS, BLOCKING ON A REPLY CHANNEL
//                        (ONE IN-FLIGHT SNAPSHOT PER CLIENT)
//   SENSOR PRODUCERS  -> SAMPLE BATCHES, LOSSY ON A FULL QUEUE
// THE LOOP BLOCKS IN recv_timeout UNTIL THE NEAREST DEADLINE AMONG THE
// RAMP TICK AND THE INTERACTIVE TIMEOUT, THEN FIRES WHATEVER IS DUE.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::controller::{
    Controller, LevelObserver, ObserverId, SessionSnapshot, UpdateCallback,
};
use crate::device::BacklightDevice;
use crate::display::DisplayRamp;
use crate::error::{Error, Result};
use crate::levels::{Config, Mode, LEVEL_FULL, LEVEL_OFF, RAMP_OFF};
use crate::lightsensor::{LightSample, LightSensor, SensorBus};
use crate::logger;
use crate::persist::{Persist, PropertyStore};
use crate::{log_err, log_info};

const COMMAND_QUEUE_DEPTH: usize = 32;

pub(crate) enum Command {
    Apply {
        snap: SessionSnapshot,
        reply: SyncSender<Result<()>>,
    },
    SetTarget {
        level: i32,
        ramp: i32,
        reply: SyncSender<Result<()>>,
    },
    GetTarget {
        reply: SyncSender<i32>,
    },
    SetMode {
        mode: Mode,
        reply: SyncSender<Result<()>>,
    },
    GetMode {
        reply: SyncSender<Mode>,
    },
    GetCurrentLevel {
        reply: SyncSender<i32>,
    },
    SetUserPoint {
        session_mode: Option<Mode>,
        lux: i32,
        target: i32,
        reply: SyncSender<Result<()>>,
    },
    GetUserPoint {
        session_mode: Option<Mode>,
        reply: SyncSender<Result<(i32, i32)>>,
    },
    Monitor {
        id: ObserverId,
        observer: Box<dyn LevelObserver>,
        reply: SyncSender<Result<()>>,
    },
    Unmonitor {
        id: ObserverId,
        reply: SyncSender<Result<()>>,
    },
    SensorBatch(Vec<LightSample>),
    Shutdown,
}

/// Everything the service needs at start. A missing device is tolerated
/// (the controller runs headless and level operations become no-ops); a
/// missing store disables persistence.
pub struct ServiceConfig {
    pub config: Config,
    pub device: Option<Box<dyn BacklightDevice>>,
    pub store: Option<Box<dyn PropertyStore>>,
    pub bus: SensorBus,
}

pub struct Service {
    handle: ServiceHandle,
    join: Option<JoinHandle<()>>,
}

/// Clonable client handle. Its level and mode operations act on the
/// distinguished system session owned by the controller -- this handle
/// is the system session's surface, and the one a remote transport
/// would wrap one operation per message.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: SyncSender<Command>,
}

impl Service {
    pub fn start(sc: ServiceConfig) -> Result<Service> {
        logger::set_verbose(sc.config.verbose);

        let (tx, rx) = mpsc::sync_channel(COMMAND_QUEUE_DEPTH);

        let display = match sc.device {
            Some(device) => match DisplayRamp::open(device, sc.config.clone()) {
                Ok(display) => Some(display),
                Err(e) => {
                    // RUN WITHOUT A DISPLAY RATHER THAN NOT AT ALL
                    log_err!("failed to open backlight device: {}", e);
                    None
                }
            },
            None => None,
        };

        let controller = Controller::new(sc.config.clone(), display, Persist::new(sc.store));
        let bus = sc.bus;
        let topic = sc.config.sensor_topic.clone();
        let loop_tx = tx.clone();

        let join = thread::Builder::new()
            .name("brightnessd-loop".to_string())
            .spawn(move || service_loop(rx, loop_tx, controller, bus, topic))
            .map_err(|e| Error::IoFailure(e.to_string()))?;

        log_info!("brightness service started");
        Ok(Service {
            handle: ServiceHandle { tx },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.handle.tx.send(Command::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn service_loop(
    rx: Receiver<Command>,
    tx: SyncSender<Command>,
    mut controller: Controller,
    bus: SensorBus,
    topic: String,
) {
    if let Err(e) = controller.startup(Instant::now()) {
        log_err!("startup apply failed: {}", e);
    }

    let mut sensor: Option<LightSensor> = None;
    let mut ramp_deadline: Option<Instant> = None;
    let mut ramp_seq: u64 = 0;

    loop {
        // THE SENSOR SUBSCRIPTION FOLLOWS THE AUTO CONTROLLER'S LIFETIME:
        // NO SUBSCRIPTION IN MANUAL MODE, SO NO SAMPLE CAN CAUSE A WRITE
        if controller.abc_present() {
            if sensor.is_none() {
                let forward = tx.clone();
                sensor = Some(bus.subscribe(
                    &topic,
                    Box::new(move |samples| {
                        // LOSSY: A FULL QUEUE DROPS THE BATCH INSTEAD OF
                        // BLOCKING THE PRODUCER AGAINST THE BUS LOCK
                        let _ = forward.try_send(Command::SensorBatch(samples.to_vec()));
                    }),
                ));
            }
        } else if sensor.is_some() {
            sensor = None;
        }

        // RAMP CADENCE: RE-PHASE WHEN A NEW TICK SEQUENCE STARTED
        let seq = controller.ramp_seq();
        if !controller.ramp_ticking() {
            ramp_deadline = None;
        } else if ramp_deadline.is_none() || seq != ramp_seq {
            ramp_deadline = Some(Instant::now() + controller.tick_period());
        }
        ramp_seq = seq;

        let deadline = match (ramp_deadline, controller.interactive_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let cmd = match deadline {
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    None
                } else {
                    match rx.recv_timeout(deadline - now) {
                        Ok(cmd) => Some(cmd),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        };

        match cmd {
            Some(Command::Shutdown) => break,
            Some(cmd) => dispatch(&mut controller, cmd),
            None => {
                // FIRE WHATEVER IS DUE
                let now = Instant::now();
                if let Some(due) = ramp_deadline {
                    if due <= now {
                        controller.tick_ramp();
                        ramp_deadline = if controller.ramp_ticking() {
                            Some(due + controller.tick_period())
                        } else {
                            None
                        };
                    }
                }
                if let Some(due) = controller.interactive_deadline() {
                    if due <= now {
                        controller.fire_interactive(now);
                    }
                }
            }
        }
    }

    // DRAIN THE QUEUE SO BLOCKED CALLERS UNWEDGE (THEIR REPLY CHANNELS
    // CLOSE), THEN RECORD THE FINAL SETTINGS
    drop(sensor);
    for _ in rx.try_iter() {}
    controller.save_all();
    if logger::verbose() {
        controller.write_log().summary();
    }
    log_info!("brightness service exit");
}

fn dispatch(controller: &mut Controller, cmd: Command) {
    let now = Instant::now();
    match cmd {
        Command::Apply { snap, reply } => {
            let _ = reply.send(controller.apply(snap, now));
        }
        Command::SetTarget { level, ramp, reply } => {
            let _ = reply.send(controller.system_set_target(level, ramp, now));
        }
        Command::GetTarget { reply } => {
            let _ = reply.send(controller.system_get_target());
        }
        Command::SetMode { mode, reply } => {
            let _ = reply.send(controller.system_set_mode(mode, now));
        }
        Command::GetMode { reply } => {
            let _ = reply.send(controller.system_get_mode());
        }
        Command::GetCurrentLevel { reply } => {
            let _ = reply.send(controller.get_current_level());
        }
        Command::SetUserPoint {
            session_mode,
            lux,
            target,
            reply,
        } => {
            let _ = reply.send(controller.set_user_point(session_mode, lux, target));
        }
        Command::GetUserPoint { session_mode, reply } => {
            let _ = reply.send(controller.get_user_point(session_mode));
        }
        Command::Monitor { id, observer, reply } => {
            controller.monitor(id, observer);
            let _ = reply.send(Ok(()));
        }
        Command::Unmonitor { id, reply } => {
            controller.unmonitor(id);
            let _ = reply.send(Ok(()));
        }
        Command::SensorBatch(samples) => controller.handle_sensor_batch(&samples),
        Command::Shutdown => {}
    }
}

impl ServiceHandle {
    // ONE ROUND TRIP: POST THE COMMAND, BLOCK FOR THE REPLY
    fn call<T>(&self, build: impl FnOnce(SyncSender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.tx
            .send(build(reply_tx))
            .map_err(|_| Error::ServiceStopped)?;
        reply_rx.recv().map_err(|_| Error::ServiceStopped)
    }

    pub fn set_target(&self, level: i32, ramp: i32) -> Result<()> {
        self.call(|reply| Command::SetTarget { level, ramp, reply })?
    }

    pub fn get_target(&self) -> Result<i32> {
        self.call(|reply| Command::GetTarget { reply })
    }

    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.call(|reply| Command::SetMode { mode, reply })?
    }

    pub fn get_mode(&self) -> Result<Mode> {
        self.call(|reply| Command::GetMode { reply })
    }

    pub fn get_current_level(&self) -> Result<i32> {
        self.call(|reply| Command::GetCurrentLevel { reply })
    }

    pub fn set_user_point(&self, lux: i32, target: i32) -> Result<()> {
        self.call(|reply| Command::SetUserPoint {
            session_mode: None,
            lux,
            target,
            reply,
        })?
    }

    pub fn get_user_point(&self) -> Result<(i32, i32)> {
        self.call(|reply| Command::GetUserPoint {
            session_mode: None,
            reply,
        })?
    }

    /// Registers a monitor observer under a fresh identity. The first
    /// notification (the current level) has already been delivered when
    /// this returns.
    pub fn monitor(&self, observer: Box<dyn LevelObserver>) -> Result<ObserverId> {
        let id = ObserverId::next();
        self.monitor_as(id, observer)?;
        Ok(id)
    }

    /// Registers under a caller-chosen identity; idempotent.
    pub fn monitor_as(&self, id: ObserverId, observer: Box<dyn LevelObserver>) -> Result<()> {
        self.call(|reply| Command::Monitor { id, observer, reply })?
    }

    pub fn unmonitor(&self, id: ObserverId) -> Result<()> {
        self.call(|reply| Command::Unmonitor { id, reply })?
    }

    pub fn display_turn_off(&self) -> Result<()> {
        self.set_mode(Mode::Manual)?;
        self.set_target(LEVEL_OFF, 0)
    }

    pub fn display_full_power(&self) -> Result<()> {
        self.set_target(LEVEL_FULL, 0)
    }

    /// Creates a client session seeded from the current level and the
    /// default mode, and applies it.
    pub fn create_session(&self) -> Result<Session> {
        let level = self.get_current_level()?;
        let mut session = Session {
            handle: self.clone(),
            mode: Mode::DEFAULT,
            target: level,
            ramp: RAMP_OFF,
            cb: None,
        };
        session.submit()?;
        Ok(session)
    }
}

/// A client-owned configuration value. Mutators update the local copy
/// and submit the whole snapshot; the controller reduces it against the
/// device state. Dropping a session does not revert anything -- the
/// next submitted session defines the state.
pub struct Session {
    handle: ServiceHandle,
    mode: Mode,
    target: i32,
    ramp: i32,
    cb: Option<UpdateCallback>,
}

impl Session {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    pub fn set_target(&mut self, level: i32, ramp: i32) -> Result<()> {
        // UNCHANGED TUPLE: DO NOT RE-APPLY (AN IN-FLIGHT RAMP KEEPS GOING)
        if level == self.target && ramp == self.ramp {
            return Ok(());
        }
        self.target = level;
        self.ramp = ramp;
        self.submit()
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.mode = mode;
        self.submit()
    }

    /// Installs (or clears) this session's update callback. The
    /// controller keeps exactly one: the one from the last applied
    /// snapshot.
    pub fn set_update_cb(&mut self, cb: Option<UpdateCallback>) -> Result<()> {
        self.cb = cb;
        self.submit()
    }

    pub fn set_user_point(&self, lux: i32, target: i32) -> Result<()> {
        self.handle.call(|reply| Command::SetUserPoint {
            session_mode: Some(self.mode),
            lux,
            target,
            reply,
        })?
    }

    pub fn get_user_point(&self) -> Result<(i32, i32)> {
        self.handle.call(|reply| Command::GetUserPoint {
            session_mode: Some(self.mode),
            reply,
        })?
    }

    pub fn display_turn_off(&mut self) -> Result<()> {
        self.set_mode(Mode::Manual)?;
        self.set_target(LEVEL_OFF, 0)
    }

    pub fn display_full_power(&mut self) -> Result<()> {
        self.set_target(LEVEL_FULL, 0)
    }

    fn submit(&mut self) -> Result<()> {
        let snap = SessionSnapshot {
            mode: self.mode,
            target: self.target,
            ramp: self.ramp,
            cb: self.cb.clone(),
        };
        self.handle
            .call(move |reply| Command::Apply { snap, reply })?
    }
}
