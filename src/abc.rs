// BRIGHTNESSD AUTOMATIC BRIGHTNESS CONTROLLER
// FILTERS NOISY LUX SAMPLES, MAPS THEM THROUGH THE CURVE, AND DRIVES
// THE RAMP. A MANUAL TARGET WHILE AUTO IS ACTIVE SUSPENDS THE LOOP AND
// ARMS A SHORT-TERM MODEL; IF THE OVERRIDE SURVIVES THE TIMEOUT IT
// BECOMES THE USER ANCHOR AND THE CURVE IS RESHAPED AROUND IT.
//
// HYSTERESIS BANDS:
//   JITTER   (20%): SMALL WOBBLE AROUND THE FILTERED VALUE, IGNORED
//   DRAMATIC (60%): LARGE JUMP VS THE LAST COMMITTED VALUE, FAST-TRACKED
// EITHER WAY A COMMIT NEEDS STEADY_COUNT CONSECUTIVE SAMPLES.

use std::time::{Duration, Instant};

use crate::display::DisplayRamp;
use crate::error::Result;
use crate::levels::{Config, RAMP_DEFAULT};
use crate::spline::Spline;
use crate::{log_err, log_info};

pub const LIGHTSENSOR_JITTER_THRESHOLD: f32 = 0.2;
pub const LIGHTSENSOR_DRAMATIC_THRESHOLD: f32 = 0.6;
pub const LIGHTSENSOR_FILTER_FACTOR: f32 = 0.1;
pub const LIGHTSENSOR_STEADY_COUNT: i32 = 10;

pub const MAX_GAMMA: f32 = 2.0;

// FACTORY LUX -> BACKLIGHT CURVE, RESHAPED AROUND THE USER ANCHOR
pub const DEFAULT_CURVE_LUX: [f32; 20] = [
    1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0,
    800.0, 1000.0, 1200.0, 1600.0, 2200.0, 3000.0,
];

pub const DEFAULT_CURVE_POWER: [f32; 20] = [
    1.0, 5.0, 10.0, 20.0, 30.0, 46.0, 49.0, 54.0, 61.0, 65.0, 70.0, 76.0, 82.0, 87.0, 98.0,
    108.0, 131.0, 161.0, 230.0, 255.0,
];

struct ShortTermModel {
    lux: f32,
    brightness: i32,
    deadline: Instant,
}

pub struct Abc {
    spline: Spline,
    running: bool,

    /// Brightness target most recently computed by the auto loop.
    target: i32,
    lux_last: f32,     // LAST LUX VALUE RECEIVED
    lux_filtered: f32, // LATEST FILTERED LUX VALUE
    lux_set: f32,      // LUX USED TO SET BRIGHTNESS
    steady_count: i32,
    dramatic_count: i32,

    user_lux: f32,
    user_brightness: i32,

    model: Option<ShortTermModel>,

    level_min: i32,
    level_max: i32,
    interactive_timeout: Duration,
}

fn calculate_adjustment(max_gamma: f32, desired: f32, current: f32) -> f32 {
    let adjustment = if current <= 0.1 || current >= 0.9 {
        desired - current
    } else if desired == 0.0 {
        -1.0
    } else if desired == 1.0 {
        1.0
    } else {
        // max^-adjustment = gamma  -->  adjustment = -log[max](gamma)
        let gamma = desired.ln() / current.ln();
        -gamma.ln() / max_gamma.ln()
    };

    adjustment.clamp(-1.0, 1.0)
}

impl Abc {
    pub fn new(cfg: &Config) -> Result<Abc> {
        let spline = Spline::create(&DEFAULT_CURVE_LUX, &DEFAULT_CURVE_POWER)?;
        Ok(Abc {
            spline,
            running: true,
            target: -1,
            lux_last: 0.0,
            lux_filtered: 0.0,
            lux_set: 0.0,
            steady_count: 0,
            dramatic_count: 0,
            user_lux: DEFAULT_CURVE_LUX[0],
            user_brightness: DEFAULT_CURVE_POWER[0] as i32,
            model: None,
            level_min: cfg.level_min,
            level_max: cfg.level_max,
            interactive_timeout: cfg.interactive_timeout,
        })
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn spline(&self) -> &Spline {
        &self.spline
    }

    /// Feeds one lux sample through the hysteresis filter. On a commit
    /// the ramp is asked for a default-rate transition; the returned
    /// level is the immediate write, if one happened.
    pub fn handle_sample(&mut self, display: &mut DisplayRamp, lux: f32) -> Result<Option<i32>> {
        self.lux_last = lux;

        if !self.running {
            // SUSPENDED BY A MANUAL OVERRIDE. ONCE THE SHORT-TERM MODEL
            // HAS EXPIRED, ONLY A DRAMATIC CHANGE VS THE ANCHOR RESUMES.
            if self.model.is_none()
                && (lux - self.user_lux).abs() > self.user_lux * LIGHTSENSOR_DRAMATIC_THRESHOLD
            {
                self.running = true;
            }
            return Ok(None);
        }

        if (lux - self.lux_set).abs() > self.lux_set * LIGHTSENSOR_DRAMATIC_THRESHOLD {
            self.steady_count = 0;
            self.lux_filtered = lux;
            self.dramatic_count += 1;
            if self.dramatic_count < LIGHTSENSOR_STEADY_COUNT {
                // NOT DRAMATIC ENOUGH YET
                return Ok(None);
            }
        } else {
            self.dramatic_count = 0;
            self.lux_filtered = lux * LIGHTSENSOR_FILTER_FACTOR
                + self.lux_filtered * (1.0 - LIGHTSENSOR_FILTER_FACTOR);
            if (lux - self.lux_filtered).abs()
                > self.lux_filtered * LIGHTSENSOR_JITTER_THRESHOLD
            {
                // NON-STABLE RESULT, IGNORE
                self.steady_count = 0;
                return Ok(None);
            }

            self.steady_count += 1;
            if self.steady_count < LIGHTSENSOR_STEADY_COUNT {
                return Ok(None);
            }

            // CLEAR FOR THE NEXT DETECTION
            self.steady_count = 0;
        }

        let lux = self.lux_filtered;
        self.lux_set = lux;
        let power = self.spline.interpolate(lux);
        log_info!("lux: {:.2}, power: {:.2}", lux, power);

        let brightness = (power.round() as i32).clamp(self.level_min, self.level_max);
        if brightness != self.target {
            self.target = brightness;
            return display.set(brightness, RAMP_DEFAULT);
        }
        Ok(None)
    }

    /// Manual target while auto is active: suspend the loop, arm the
    /// short-term model, and pass the request straight to the ramp.
    /// If the override is not countermanded within the timeout it
    /// becomes the user anchor.
    pub fn set_target(
        &mut self,
        display: &mut DisplayRamp,
        target: i32,
        ramp: i32,
        now: Instant,
    ) -> Result<Option<i32>> {
        log_info!("set target: {}, ramp: {}", target, ramp);

        self.model = Some(ShortTermModel {
            lux: self.lux_last,
            brightness: target,
            deadline: now + self.interactive_timeout,
        });
        self.running = false;

        display.set(target, ramp)
    }

    pub fn interactive_deadline(&self) -> Option<Instant> {
        self.model.as_ref().map(|m| m.deadline)
    }

    /// Adopts the pending override as the user anchor and resumes the
    /// auto loop. Returns the new anchor for persistence.
    pub fn fire_interactive_timeout(&mut self) -> Option<(i32, i32)> {
        let model = self.model.take()?;
        self.update_user_point(model.lux, model.brightness);
        self.running = true;
        Some((self.user_lux as i32, self.user_brightness))
    }

    /// Direct anchor update. Cancels any pending short-term model (the
    /// user is adjusting the curve explicitly).
    pub fn set_user_point(&mut self, lux: i32, target: i32) {
        self.model = None;
        self.update_user_point(lux as f32, target);
    }

    pub fn get_user_point(&self) -> (i32, i32) {
        (self.user_lux as i32, self.user_brightness)
    }

    fn update_user_point(&mut self, lux: f32, brightness: i32) {
        self.compute_spline(lux, brightness);
        self.user_brightness = brightness;
        self.user_lux = lux;
    }

    // RESHAPE THE CURVE AROUND (user_lux, user_brightness):
    //   1. GAMMA-ADJUST THE FACTORY CURVE SO IT PASSES NEAR THE ANCHOR
    //   2. PIN THE ANCHOR AS A KNOT (REPLACING AN EQUAL-X KNOT)
    //   3. FLATTEN NEIGHBORS THAT WOULD BREAK MONOTONICITY
    // ON CONSTRUCTION FAILURE THE OLD SPLINE STAYS.
    fn compute_spline(&mut self, user_lux: f32, user_brightness: i32) {
        let current = self.spline.interpolate(user_lux) / 255.0;
        let desired = user_brightness as f32 / 255.0;
        let adjustment = calculate_adjustment(MAX_GAMMA, desired, current);

        let mut lux: Vec<f32> = DEFAULT_CURVE_LUX.to_vec();
        let mut brightness: Vec<f32> = DEFAULT_CURVE_POWER.to_vec();

        let gamma = MAX_GAMMA.powf(-adjustment);
        if gamma != 1.0 {
            for y in brightness.iter_mut() {
                *y = (*y / 255.0).powf(gamma) * 255.0;
            }
        }

        log_info!("adjustment: {:.3}, gamma: {:.3}", adjustment, gamma);
        log_info!("user_lux: {:.3}, user_brightness: {}", user_lux, user_brightness);

        if user_lux > 0.0 {
            // PIN THE ANCHOR, KEEPING X STRICTLY INCREASING
            let i = match lux.iter().position(|&x| x >= user_lux) {
                Some(i) if lux[i] == user_lux => {
                    brightness[i] = user_brightness as f32;
                    i
                }
                Some(i) => {
                    lux.insert(i, user_lux);
                    brightness.insert(i, user_brightness as f32);
                    i
                }
                None => {
                    lux.push(user_lux);
                    brightness.push(user_brightness as f32);
                    lux.len() - 1
                }
            };

            // SMOOTH OUT THE CURVE AROUND THE ANCHOR
            let pivot = brightness[i];
            for j in i + 1..brightness.len() {
                if brightness[j] >= pivot {
                    break;
                }
                brightness[j] = pivot;
            }
            for j in (0..i).rev() {
                if brightness[j] <= pivot {
                    break;
                }
                brightness[j] = pivot;
            }
        }

        match Spline::create(&lux, &brightness) {
            Ok(spline) => self.spline = spline,
            Err(e) => log_err!("failed to rebuild curve, keeping previous: {}", e),
        }
    }
}
