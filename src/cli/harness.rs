// BRIGHTNESSD TEST SUITE
// IN-PROCESS ASSERTION RUN OVER A SIMULATED BACKLIGHT AND THE FAKE
// SENSOR. EXERCISES THE FULL SERVICE: SESSIONS, SENTINELS, CALLBACKS,
// RAMP TIMING, AUTO MODE. EXIT CODE 0 ON SUCCESS, NON-ZERO ON THE
// FIRST FAILED CHECK.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use brightnessd::device::{SimBacklight, SimBacklightHandle};
use brightnessd::levels::{Config, Mode};
use brightnessd::lightsensor::SensorBus;
use brightnessd::service::{Service, ServiceConfig, ServiceHandle};

use super::fakesensor::{self, DataPattern};

fn check(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        bail!("[FAIL] {}", msg);
    }
}

fn test_log(msg: &str) {
    println!("[TEST] {}", msg);
}

pub fn run_test(sample_rate: i32, verbose: bool) -> Result<()> {
    let cfg = Config {
        verbose,
        ..Config::default()
    };
    let (device, sim) = SimBacklight::new(135);
    let bus = SensorBus::new();
    let topic = cfg.sensor_topic.clone();

    let service = Service::start(ServiceConfig {
        config: cfg,
        device: Some(Box::new(device)),
        store: None,
        bus: bus.clone(),
    })?;
    let handle = service.handle();

    test_log("basic ops");
    test_basic_ops(&handle)?;
    test_log("update callback");
    test_update_cb(&handle)?;
    test_log("off sentinel");
    test_off(&handle)?;
    test_log("full power");
    test_full_power(&handle)?;
    test_log("ramp speed");
    test_ramp_speed(&handle, &sim)?;
    test_log("auto mode with fake sensor");
    test_auto_mode(&handle, &sim, &bus, &topic, sample_rate)?;

    service.stop();
    test_log("brightness test passed");
    Ok(())
}

fn test_basic_ops(handle: &ServiceHandle) -> Result<()> {
    let mut session = handle.create_session()?;
    session.set_mode(Mode::Manual)?;

    session.set_target(0, 0)?;
    check(
        handle.get_current_level()? == 20,
        "plain zero must clamp to the minimum level",
    )?;

    session.set_target(100, 0)?;
    check(session.target() == 100, "session target must echo the set value")?;
    check(
        handle.get_current_level()? == 100,
        "snap write must land immediately",
    )?;

    // THE SYSTEM SESSION DRIVES THE SAME DEVICE
    handle.set_mode(Mode::Manual)?;
    handle.set_target(40, 0)?;
    check(handle.get_target()? == 40, "system target must echo the set value")?;
    check(handle.get_current_level()? == 40, "system snap write must land")?;

    Ok(())
}

fn test_update_cb(handle: &ServiceHandle) -> Result<()> {
    let mut session = handle.create_session()?;
    session.set_mode(Mode::Manual)?;

    let last = Arc::new(Mutex::new(0));
    let sink = last.clone();
    session.set_update_cb(Some(Arc::new(move |level| {
        *sink.lock().unwrap() = level;
    })))?;

    session.set_target(0, 0)?;
    session.set_target(100, 0)?;
    check(
        *last.lock().unwrap() == 100,
        "update callback must see the final write",
    )?;
    Ok(())
}

fn test_off(handle: &ServiceHandle) -> Result<()> {
    handle.display_turn_off()?;
    check(
        handle.get_current_level()? == 0,
        "off sentinel must bypass the minimum clamp",
    )?;

    handle.set_target(0, 0)?;
    check(
        handle.get_current_level()? == 20,
        "plain zero must clamp to the minimum level",
    )?;
    Ok(())
}

fn test_full_power(handle: &ServiceHandle) -> Result<()> {
    handle.display_full_power()?;
    check(
        handle.get_current_level()? == 255,
        "full sentinel must bypass the maximum clamp",
    )?;

    handle.set_target(255, 0)?;
    check(
        handle.get_current_level()? == 250,
        "plain 255 must clamp to the maximum level",
    )?;
    Ok(())
}

fn test_ramp_speed(handle: &ServiceHandle, sim: &SimBacklightHandle) -> Result<()> {
    handle.set_mode(Mode::Manual)?;
    handle.set_target(20, 0)?;
    sim.clear_writes();

    // 120 LEVELS/S AT 50MS TICKS = 6 LEVELS PER STEP, ~700MS TOTAL
    handle.set_target(100, 120)?;
    thread::sleep(Duration::from_millis(100));
    check(
        handle.get_current_level()? != 100,
        "ramp must not reach the target immediately",
    )?;

    thread::sleep(Duration::from_millis(1500));
    check(
        handle.get_current_level()? == 100,
        "ramp must land exactly on the target",
    )?;

    let writes = sim.writes();
    check(
        writes.windows(2).all(|w| w[1] >= w[0]),
        "ramp writes must be monotonic",
    )?;
    check(
        writes.iter().all(|&w| w <= 100),
        "ramp writes must never overshoot the target",
    )?;
    Ok(())
}

fn test_auto_mode(
    handle: &ServiceHandle,
    sim: &SimBacklightHandle,
    bus: &SensorBus,
    topic: &str,
    sample_rate: i32,
) -> Result<()> {
    handle.set_mode(Mode::Auto)?;
    // ONE MORE ROUND TRIP SO THE LOOP HAS ARMED THE SENSOR SUBSCRIPTION
    let _ = handle.get_current_level()?;
    sim.clear_writes();

    // DARK-TO-BRIGHT SWEEP MUST PULL THE LEVEL UP
    let fake = fakesensor::start(bus.clone(), topic, DataPattern::Low2High, sample_rate);
    thread::sleep(Duration::from_secs(3));
    fake.stop();
    check(
        sim.writes().iter().any(|&w| w > 20),
        "auto brightness must raise the level for bright lux",
    )?;

    // STEADY DESK LIGHT (~458 LUX) MUST SETTLE ON THE CURVE VALUE
    let fake = fakesensor::start(bus.clone(), topic, DataPattern::Stable, sample_rate);
    thread::sleep(Duration::from_millis(2500));
    fake.stop();
    let level = handle.get_current_level()?;
    check(
        (70..=76).contains(&level),
        "steady lux must settle on the curve value",
    )?;

    // RAPID SWINGS: EVERY AUTO WRITE STAYS INSIDE THE PANEL RANGE
    sim.clear_writes();
    let fake = fakesensor::start(bus.clone(), topic, DataPattern::RapidChange, sample_rate);
    thread::sleep(Duration::from_secs(2));
    fake.stop();
    check(
        sim.writes().iter().all(|&w| (20..=250).contains(&w)),
        "auto writes must stay inside the panel range",
    )?;

    handle.set_mode(Mode::Manual)?;
    let _ = handle.get_current_level()?;
    sim.clear_writes();
    bus.publish(
        topic,
        &[brightnessd::lightsensor::LightSample {
            timestamp_ns: 0,
            light: 3000.0,
        }],
    );
    let _ = handle.get_current_level()?;
    check(
        sim.write_count() == 0,
        "manual mode must ignore sensor samples",
    )?;
    Ok(())
}
