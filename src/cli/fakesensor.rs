// BRIGHTNESSD FAKE LIGHT SENSOR
// REPLAYS CAPTURED LUX TRACES ONTO THE SENSOR BUS FROM A PRODUCER
// THREAD, CYCLING THE PATTERN AT THE CONFIGURED SAMPLE RATE.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use brightnessd::lightsensor::{LightSample, SensorBus};
use brightnessd::writelog::now_ns;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataPattern {
    Stable,
    RapidChange,
    Low2High,
}

// CAPTURED FROM A REAL PANEL: DESK LIGHT, STEADY
pub const FAKEDATA_STABLE: &[f32] = &[
    457.83, 457.83, 458.33, 457.83, 457.83, 457.83, 458.33, 457.83, 457.58, 457.58, 457.58,
    457.58, 457.58, 457.32, 457.58, 457.32, 457.58, 457.83, 457.58, 457.83, 457.83, 457.83,
    457.58, 457.83, 457.83, 457.83, 457.83, 457.83, 457.58, 457.83, 457.58, 457.58, 457.58,
    457.58, 457.58, 457.58, 457.58, 457.58, 457.83, 457.83, 457.58, 457.83, 457.83, 457.83,
    458.59, 458.33, 457.83, 457.83, 457.83, 457.83, 457.83, 458.33, 458.33, 458.33, 458.59,
    458.59, 458.33, 458.33, 458.33, 458.33, 458.59, 457.83, 458.84, 458.59, 458.84, 458.84,
    458.84, 458.33, 458.59, 458.84, 459.34, 459.09,
];

// HAND WAVED OVER THE SENSOR, THEN LIGHTS TOGGLED
pub const FAKEDATA_RAPID_CHANGE: &[f32] = &[
    457.58, 457.58, 457.58, 457.58, 436.11, 11.11, 6.82, 6.31, 6.31, 6.82, 326.52, 458.33,
    457.83, 323.23, 254.55, 453.79, 453.79, 458.59, 2651.01, 2136.62, 2816.67, 205.81, 423.99,
    423.99, 1105.81, 1730.56, 1393.69, 502.53, 458.84, 458.33, 458.33, 458.33, 220.96, 8.59,
    7.58, 52.53, 457.83, 457.83, 457.58, 457.58, 457.32, 457.58, 457.32, 457.32, 457.58,
    457.32, 457.32, 457.32,
];

// DARK ROOM TO DESK LIGHT
pub const FAKEDATA_LOW2HIGH: &[f32] = &[
    7.07, 7.83, 8.59, 9.34, 18.69, 32.58, 32.58, 38.89, 51.01, 85.10, 115.66, 191.16, 387.63,
    432.07, 432.07, 458.59, 458.33, 458.33, 458.33, 457.83, 457.83, 457.83, 457.58, 458.33,
];

fn pattern_data(pattern: DataPattern) -> &'static [f32] {
    match pattern {
        DataPattern::Stable => FAKEDATA_STABLE,
        DataPattern::RapidChange => FAKEDATA_RAPID_CHANGE,
        DataPattern::Low2High => FAKEDATA_LOW2HIGH,
    }
}

pub struct FakeSensor {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

pub fn start(bus: SensorBus, topic: &str, pattern: DataPattern, sample_rate: i32) -> FakeSensor {
    let rate = if sample_rate <= 0 { 2 } else { sample_rate };
    let period = Duration::from_micros(1_000_000 / rate as u64);
    let data = pattern_data(pattern);
    let topic = topic.to_string();

    println!(
        "start fake sensor thread: pattern={:?}, sample_rate={}",
        pattern, rate
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let join = thread::spawn(move || {
        let mut i = 0;
        while !stop_flag.load(Ordering::Relaxed) {
            let sample = LightSample {
                timestamp_ns: now_ns(),
                light: data[i],
            };
            i = (i + 1) % data.len();
            bus.publish(&topic, &[sample]);
            thread::sleep(period);
        }
    });

    FakeSensor {
        stop,
        join: Some(join),
    }
}

impl FakeSensor {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for FakeSensor {
    fn drop(&mut self) {
        self.halt();
    }
}
