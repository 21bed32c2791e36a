// BRIGHTNESSD INFO / APPLY COMMAND
// PRINTS THE CURRENT LEVEL. WITH -l, APPLIES MODE/LEVEL/RAMP THROUGH
// THE SYSTEM SESSION AND WAITS FOR AN IN-FLIGHT RAMP TO SETTLE.
// WITH -u, TAILS LEVEL CHANGES VIA A MONITOR OBSERVER UNTIL CTRL+C.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use brightnessd::device::{BacklightDevice, SimBacklight, SysfsBacklight};
use brightnessd::levels::{Config, Mode};
use brightnessd::lightsensor::SensorBus;
use brightnessd::log_warn;
use brightnessd::service::{Service, ServiceConfig};

use super::fakesensor::{self, DataPattern};

const SYSFS_BACKLIGHT_ROOT: &str = "/sys/class/backlight";
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

// EXPLICIT PATH FIRST, THEN THE FIRST SYSFS ENTRY, THEN SIMULATION
fn open_device(requested: Option<&Path>) -> Box<dyn BacklightDevice> {
    if let Some(dir) = requested {
        match SysfsBacklight::open(dir) {
            Ok(dev) => return Box::new(dev),
            Err(e) => log_warn!("{}: {}", dir.display(), e),
        }
    } else if let Ok(entries) = std::fs::read_dir(SYSFS_BACKLIGHT_ROOT) {
        for entry in entries.flatten() {
            match SysfsBacklight::open(&entry.path()) {
                Ok(dev) => return Box::new(dev),
                Err(e) => log_warn!("{}: {}", entry.path().display(), e),
            }
        }
    }

    log_warn!("no sysfs backlight found, using a simulated device");
    let (dev, _) = SimBacklight::new(135);
    Box::new(dev)
}

#[allow(clippy::too_many_arguments)]
pub fn run_info(
    level: Option<i32>,
    ramp: i32,
    mode: i32,
    ui: bool,
    fake_sensor: bool,
    sample_rate: i32,
    device: Option<&Path>,
    verbose: bool,
    shutdown: &'static AtomicBool,
) -> Result<()> {
    let cfg = Config {
        verbose,
        ..Config::default()
    };
    let bus = SensorBus::new();
    let topic = cfg.sensor_topic.clone();

    let service = Service::start(ServiceConfig {
        config: cfg,
        device: Some(open_device(device)),
        store: None,
        bus: bus.clone(),
    })?;
    let handle = service.handle();

    let _fake = if fake_sensor {
        Some(fakesensor::start(
            bus,
            &topic,
            DataPattern::Low2High,
            sample_rate,
        ))
    } else {
        None
    };

    println!("brightness: {}", handle.get_current_level()?);

    if let Some(level) = level {
        let mode = Mode::from_i32(mode)?;
        handle.set_mode(mode)?;
        handle.set_target(level, ramp)?;

        if ramp != 0 {
            // LET THE RAMP FINISH BEFORE TEARING THE SERVICE DOWN
            let deadline = Instant::now() + SETTLE_TIMEOUT;
            loop {
                let before = handle.get_current_level()?;
                thread::sleep(Duration::from_millis(150));
                let after = handle.get_current_level()?;
                if before == after || Instant::now() > deadline {
                    break;
                }
            }
        }
        println!("brightness: {}", handle.get_current_level()?);
    }

    if ui {
        println!("BRIGHTNESSD IS WATCHING (CTRL+C TO EXIT)");
        handle.monitor(Box::new(|level: i32| {
            println!("LEVEL {:>3}", level);
        }))?;
        while !shutdown.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(100));
        }
    }

    service.stop();
    Ok(())
}
