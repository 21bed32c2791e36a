// BRIGHTNESSD LIGHT SENSOR TRANSPORT
// NAMED-TOPIC PUB/SUB FOR AMBIENT LIGHT SAMPLE BATCHES. PRODUCERS MAY
// PUBLISH FROM ANY THREAD; SUBSCRIBERS RUN UNDER THE BUS LOCK, SO ONCE
// unsubscribe RETURNS NO FURTHER DELIVERY CAN HAPPEN.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::log_warn;

#[derive(Clone, Copy, Debug)]
pub struct LightSample {
    pub timestamp_ns: u64,
    pub light: f32,
}

type SubscriberFn = Box<dyn Fn(&[LightSample]) + Send>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, SubscriberFn)>>,
}

#[derive(Clone)]
pub struct SensorBus {
    inner: Arc<Mutex<BusState>>,
}

impl SensorBus {
    pub fn new() -> SensorBus {
        SensorBus {
            inner: Arc::new(Mutex::new(BusState::default())),
        }
    }

    /// Delivers one batch to every subscriber of the topic, in
    /// subscription order, on the caller's thread.
    pub fn publish(&self, topic: &str, samples: &[LightSample]) {
        let state = self.inner.lock().unwrap();
        if let Some(subs) = state.topics.get(topic) {
            for (_, cb) in subs {
                cb(samples);
            }
        }
    }

    /// Subscribes to a topic. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self, topic: &str, cb: SubscriberFn) -> LightSensor {
        let mut state = self.inner.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push((id, cb));
        LightSensor {
            bus: self.clone(),
            topic: topic.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        let mut state = self.inner.lock().unwrap();
        if let Some(subs) = state.topics.get_mut(topic) {
            subs.retain(|(sid, _)| *sid != id);
        } else {
            log_warn!("unsubscribe from unknown topic {}", topic);
        }
    }
}

impl Default for SensorBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One live sensor subscription.
pub struct LightSensor {
    bus: SensorBus,
    topic: String,
    id: u64,
}

impl Drop for LightSensor {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.id);
    }
}
