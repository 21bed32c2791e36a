// BRIGHTNESSD INTERPOLATION KERNEL
// STRICTLY-INCREASING PIECEWISE INTERPOLATOR OVER (LUX, LEVEL) KNOTS.
// MONOTONE-CUBIC (FRITSCH-CARLSON) WHEN Y IS NON-DECREASING, ELSE LINEAR.
// IMMUTABLE AFTER CONSTRUCTION -- CURVE RESHAPE BUILDS A NEW SPLINE.

use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SplineKind {
    MonotoneCubic,
    Linear,
}

pub struct Spline {
    xs: Vec<f32>,
    ys: Vec<f32>,
    // CUBIC: TANGENT PER KNOT (LEN N). LINEAR: SLOPE PER SEGMENT (LEN N-1).
    ms: Vec<f32>,
    kind: SplineKind,
}

fn strictly_increasing(x: &[f32]) -> bool {
    x.windows(2).all(|w| w[1] > w[0])
}

fn non_decreasing(y: &[f32]) -> bool {
    y.windows(2).all(|w| w[1] >= w[0])
}

// SLOPES OF SECANT LINES BETWEEN SUCCESSIVE POINTS
fn secant_slopes(xs: &[f32], ys: &[f32]) -> Vec<f32> {
    (0..xs.len() - 1)
        .map(|i| (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]))
        .collect()
}

// FRITSCH-CARLSON TANGENTS. None WHEN A TANGENT POINTS AGAINST ITS
// SECANT (NON-MONOTONE INPUT) -- THE CALLER FALLS BACK TO LINEAR.
fn monotone_tangents(xs: &[f32], ys: &[f32]) -> Option<Vec<f32>> {
    let n = xs.len();
    let d = secant_slopes(xs, ys);

    // TANGENTS START AS THE AVERAGE OF ADJACENT SECANTS
    let mut m = vec![0.0f32; n];
    m[0] = d[0];
    m[n - 1] = d[n - 2];
    for i in 1..n - 1 {
        m[i] = (d[i - 1] + d[i]) * 0.5;
    }

    // RESTRICT TANGENTS TO PRESERVE MONOTONICITY
    for i in 0..n - 1 {
        if d[i] == 0.0 {
            // SUCCESSIVE Y VALUES ARE EQUAL: FLAT SEGMENT
            m[i] = 0.0;
            m[i + 1] = 0.0;
        } else {
            let a = m[i] / d[i];
            let b = m[i + 1] / d[i];
            if a < 0.0 || b < 0.0 {
                return None;
            }
            let h = a.hypot(b);
            if h > 3.0 {
                let t = 3.0 / h;
                m[i] *= t;
                m[i + 1] *= t;
            }
        }
    }

    Some(m)
}

impl Spline {
    /// Builds an interpolator over the given control points. `xs` must be
    /// strictly increasing and at least two points long. Non-decreasing
    /// `ys` get the monotone-cubic treatment, anything else is linear.
    pub fn create(xs: &[f32], ys: &[f32]) -> Result<Spline> {
        if xs.len() < 2 || xs.len() != ys.len() {
            return Err(Error::InvalidInput("need at least two control points"));
        }
        if !strictly_increasing(xs) {
            return Err(Error::InvalidInput("x values must be strictly increasing"));
        }

        let (kind, ms) = if non_decreasing(ys) {
            match monotone_tangents(xs, ys) {
                Some(m) => (SplineKind::MonotoneCubic, m),
                // UNREACHABLE FOR NON-DECREASING Y, BUT LINEAR IS ALWAYS VALID
                None => (SplineKind::Linear, secant_slopes(xs, ys)),
            }
        } else {
            (SplineKind::Linear, secant_slopes(xs, ys))
        };

        Ok(Spline {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            ms,
            kind,
        })
    }

    pub fn kind(&self) -> SplineKind {
        self.kind
    }

    pub fn xs(&self) -> &[f32] {
        &self.xs
    }

    pub fn ys(&self) -> &[f32] {
        &self.ys
    }

    /// NaN in, NaN out. Inputs outside the knot range clamp to the edge
    /// values.
    pub fn interpolate(&self, x: f32) -> f32 {
        if x.is_nan() {
            return x;
        }

        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }

        // FIND THE LAST KNOT WITH SMALLER X. THE BOUNDARY TESTS ABOVE
        // GUARANTEE THE SEARCH STAYS IN RANGE.
        let mut i = 0;
        while x >= self.xs[i + 1] {
            i += 1;
            if x == self.xs[i] {
                return self.ys[i];
            }
        }

        match self.kind {
            SplineKind::MonotoneCubic => {
                // CUBIC HERMITE BASIS
                let h = self.xs[i + 1] - self.xs[i];
                let t = (x - self.xs[i]) / h;
                (self.ys[i] * (1.0 + 2.0 * t) + h * self.ms[i] * t)
                    * (1.0 - t)
                    * (1.0 - t)
                    + (self.ys[i + 1] * (3.0 - 2.0 * t) + h * self.ms[i + 1] * (t - 1.0))
                        * t
                        * t
            }
            SplineKind::Linear => self.ys[i] + self.ms[i] * (x - self.xs[i]),
        }
    }
}
