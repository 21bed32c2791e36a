// BRIGHTNESSD SERVICE TESTS
// FULL SERVICE OVER A SIMULATED BACKLIGHT: COMMAND PLUMBING, OBSERVER
// FAN-OUT, SENSOR FORWARDING, PERSISTENCE RESTORE ORDER.
//
// SENSOR BATCHES AND QUERIES SHARE ONE FIFO QUEUE, SO A QUERY ROUND
// TRIP AFTER A PUBLISH IS A BARRIER: THE SAMPLES HAVE BEEN PROCESSED.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use brightnessd::device::{SimBacklight, SimBacklightHandle};
use brightnessd::levels::{Config, Mode};
use brightnessd::lightsensor::{LightSample, SensorBus};
use brightnessd::persist::{FileStore, KEY_MODE, KEY_TARGET_LEVEL, KEY_USER_LUX, KEY_USER_TARGET};
use brightnessd::service::{Service, ServiceConfig, ServiceHandle};

fn start_sim_service(initial: i32) -> (Service, ServiceHandle, SimBacklightHandle, SensorBus) {
    let cfg = Config::default();
    let (dev, sim) = SimBacklight::new(initial);
    let bus = SensorBus::new();
    let service = Service::start(ServiceConfig {
        config: cfg,
        device: Some(Box::new(dev)),
        store: None,
        bus: bus.clone(),
    })
    .unwrap();
    let handle = service.handle();
    (service, handle, sim, bus)
}

fn sample(light: f32) -> LightSample {
    LightSample {
        timestamp_ns: 0,
        light,
    }
}

// PUBLISH FROM THIS THREAD, THEN ROUND-TRIP A QUERY AS A BARRIER
fn publish_and_sync(handle: &ServiceHandle, bus: &SensorBus, lux: f32, count: usize) {
    for _ in 0..count {
        bus.publish("sensor_light", &[sample(lux)]);
    }
    let _ = handle.get_current_level().unwrap();
}

fn wait_for_level(handle: &ServiceHandle, level: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if handle.get_current_level().unwrap() == level {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn observer_first_notification_is_the_current_level() {
    let (service, handle, _sim, _bus) = start_sim_service(123);

    let (tx, rx) = mpsc::channel();
    let id = handle
        .monitor(Box::new(move |level: i32| {
            let _ = tx.send(level);
        }))
        .unwrap();

    // THE SYNTHETIC NOTIFY HAPPENED BEFORE monitor() RETURNED
    assert_eq!(rx.try_recv().unwrap(), 123);

    handle.set_mode(Mode::Manual).unwrap();
    handle.set_target(40, 0).unwrap();
    assert_eq!(rx.try_recv().unwrap(), 40);

    handle.unmonitor(id).unwrap();
    handle.set_target(60, 0).unwrap();
    assert!(rx.try_recv().is_err());

    service.stop();
}

#[test]
fn monitor_is_idempotent_by_identity() {
    let (service, handle, _sim, _bus) = start_sim_service(100);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = brightnessd::controller::ObserverId::next();

    let sink = seen.clone();
    handle
        .monitor_as(id, Box::new(move |level: i32| sink.lock().unwrap().push(level)))
        .unwrap();
    let sink = seen.clone();
    handle
        .monitor_as(id, Box::new(move |level: i32| sink.lock().unwrap().push(level)))
        .unwrap();

    // ONE SYNTHETIC NOTIFY, AND ONE DELIVERY PER WRITE
    handle.set_mode(Mode::Manual).unwrap();
    handle.set_target(50, 0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![100, 50]);

    service.stop();
}

#[test]
fn turn_off_and_full_power_sentinels() {
    let (service, handle, _sim, _bus) = start_sim_service(100);

    handle.display_turn_off().unwrap();
    assert_eq!(handle.get_current_level().unwrap(), 0);
    assert_eq!(handle.get_mode().unwrap(), Mode::Manual);

    handle.set_target(0, 0).unwrap();
    assert_eq!(handle.get_current_level().unwrap(), 20);

    handle.display_full_power().unwrap();
    assert_eq!(handle.get_current_level().unwrap(), 255);

    service.stop();
}

#[test]
fn sensor_samples_drive_the_level_in_auto_mode() {
    let (service, handle, _sim, bus) = start_sim_service(135);

    // DEFAULT MODE IS AUTO; ONE ROUND TRIP ENSURES THE SUBSCRIPTION IS UP
    assert_eq!(handle.get_mode().unwrap(), Mode::Auto);
    let _ = handle.get_current_level().unwrap();

    // TEN IDENTICAL BRIGHT SAMPLES COMMIT AND RAMP TOWARD THE CURVE VALUE
    publish_and_sync(&handle, &bus, 457.8, 10);
    assert!(wait_for_level(&handle, 73, Duration::from_secs(5)));

    service.stop();
}

#[test]
fn manual_mode_never_reacts_to_sensor_samples() {
    let (service, handle, sim, bus) = start_sim_service(135);

    handle.set_mode(Mode::Manual).unwrap();
    let _ = handle.get_current_level().unwrap();
    sim.clear_writes();

    publish_and_sync(&handle, &bus, 3000.0, 30);
    assert_eq!(sim.write_count(), 0);
    assert_eq!(handle.get_current_level().unwrap(), 135);

    service.stop();
}

#[test]
fn switching_to_manual_cancels_auto_control() {
    let (service, handle, sim, bus) = start_sim_service(135);

    let _ = handle.get_current_level().unwrap();
    publish_and_sync(&handle, &bus, 457.8, 10);
    assert!(wait_for_level(&handle, 73, Duration::from_secs(5)));

    handle.set_mode(Mode::Manual).unwrap();
    let _ = handle.get_current_level().unwrap();
    sim.clear_writes();

    publish_and_sync(&handle, &bus, 3000.0, 30);
    assert_eq!(sim.write_count(), 0);

    service.stop();
}

#[test]
fn user_point_round_trip_requires_auto() {
    let (service, handle, _sim, _bus) = start_sim_service(135);

    handle.set_user_point(100, 200).unwrap();
    assert_eq!(handle.get_user_point().unwrap(), (100, 200));

    handle.set_mode(Mode::Manual).unwrap();
    assert!(handle.set_user_point(50, 100).is_err());
    assert!(handle.get_user_point().is_err());

    service.stop();
}

#[test]
fn manual_override_in_auto_seeds_the_anchor_after_timeout() {
    let cfg = Config {
        // SHORT WINDOW SO THE TEST DOES NOT WAIT FIVE SECONDS
        interactive_timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let (dev, _sim) = SimBacklight::new(135);
    let bus = SensorBus::new();
    let service = Service::start(ServiceConfig {
        config: cfg,
        device: Some(Box::new(dev)),
        store: None,
        bus: bus.clone(),
    })
    .unwrap();
    let handle = service.handle();

    // ESTABLISH THE LAST SEEN LUX, THEN OVERRIDE MANUALLY
    let _ = handle.get_current_level().unwrap();
    publish_and_sync(&handle, &bus, 50.0, 1);
    handle.set_target(200, 0).unwrap();
    assert_eq!(handle.get_current_level().unwrap(), 200);

    // AFTER THE TIMEOUT THE OVERRIDE BECOMES THE USER ANCHOR
    thread::sleep(Duration::from_millis(400));
    assert_eq!(handle.get_user_point().unwrap(), (50, 200));

    service.stop();
}

#[test]
fn session_callback_sees_writes_and_is_last_writer_wins() {
    let (service, handle, _sim, _bus) = start_sim_service(135);

    let mut session = handle.create_session().unwrap();
    session.set_mode(Mode::Manual).unwrap();

    let last = Arc::new(Mutex::new(-1));
    let sink = last.clone();
    session
        .set_update_cb(Some(Arc::new(move |level| {
            *sink.lock().unwrap() = level;
        })))
        .unwrap();

    session.set_target(90, 0).unwrap();
    assert_eq!(*last.lock().unwrap(), 90);

    // ANOTHER SESSION'S APPLY REPLACES THE INSTALLED CALLBACK
    let mut other = handle.create_session().unwrap();
    other.set_mode(Mode::Manual).unwrap();
    other.set_target(110, 0).unwrap();
    assert_eq!(*last.lock().unwrap(), 90);

    service.stop();
}

#[test]
fn unchanged_session_target_does_not_reapply() {
    let (service, handle, sim, _bus) = start_sim_service(135);

    let mut session = handle.create_session().unwrap();
    session.set_mode(Mode::Manual).unwrap();
    session.set_target(100, 0).unwrap();
    let writes = sim.write_count();

    session.set_target(100, 0).unwrap();
    assert_eq!(sim.write_count(), writes);

    service.stop();
}

#[test]
fn restore_applies_saved_level_then_mode_then_anchor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings");
    std::fs::write(
        &path,
        format!(
            "{}=0\n{}=137\n{}=100\n{}=200\n",
            KEY_MODE, KEY_TARGET_LEVEL, KEY_USER_LUX, KEY_USER_TARGET
        ),
    )
    .unwrap();

    let (dev, _sim) = SimBacklight::new(42);
    let bus = SensorBus::new();
    let service = Service::start(ServiceConfig {
        config: Config::default(),
        device: Some(Box::new(dev)),
        store: Some(Box::new(FileStore::open(&path).unwrap())),
        bus: bus.clone(),
    })
    .unwrap();
    let handle = service.handle();

    assert_eq!(handle.get_current_level().unwrap(), 137);
    assert_eq!(handle.get_mode().unwrap(), Mode::Auto);
    assert_eq!(handle.get_user_point().unwrap(), (100, 200));

    // MODE CHANGES ARE PERSISTED; A RESTART COMES BACK IN MANUAL
    handle.set_mode(Mode::Manual).unwrap();
    service.stop();

    let (dev, _sim) = SimBacklight::new(42);
    let service = Service::start(ServiceConfig {
        config: Config::default(),
        device: Some(Box::new(dev)),
        store: Some(Box::new(FileStore::open(&path).unwrap())),
        bus: SensorBus::new(),
    })
    .unwrap();
    let handle = service.handle();
    assert_eq!(handle.get_mode().unwrap(), Mode::Manual);
    assert_eq!(handle.get_current_level().unwrap(), 137);

    service.stop();
}

#[test]
fn headless_service_accepts_commands_without_writing() {
    let bus = SensorBus::new();
    let service = Service::start(ServiceConfig {
        config: Config::default(),
        device: None,
        store: None,
        bus: bus.clone(),
    })
    .unwrap();
    let handle = service.handle();

    // NO DISPLAY: LEVEL OPERATIONS SUCCEED BUT NOTHING CAN BE WRITTEN
    assert_eq!(handle.get_current_level().unwrap(), 0);
    handle.set_mode(Mode::Manual).unwrap();
    handle.set_target(100, 0).unwrap();
    assert_eq!(handle.get_current_level().unwrap(), 0);
    assert_eq!(handle.get_target().unwrap(), 100);

    service.stop();
}

#[test]
fn stopped_service_rejects_handle_calls() {
    let (service, handle, _sim, _bus) = start_sim_service(100);
    service.stop();
    assert!(handle.get_current_level().is_err());
    assert!(handle.set_target(50, 0).is_err());
}
