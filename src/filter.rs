// src/filter.rs
//
// Scalar recursive estimator for the target distance. Constant-position
// model: predict leaves the estimate alone and adds flat process noise,
// correct blends in the measurement by the Kalman gain. Irregular frame
// cadence only degrades smoothing, never breaks it.

use std::time::Instant;

use tracing::trace;

/// Nominal inter-frame interval assumed for the first update (~30 fps).
const NOMINAL_FRAME_DT: f64 = 0.033;

/// 1-D Kalman filter over distance in centimeters.
///
/// Owns its timing state; `reset` clears it so a reacquired target does not
/// drag a stale estimate. Never fails — noisy input only degrades the output.
#[derive(Debug, Clone)]
pub struct Kalman1D {
    x: f64,
    p: f64,
    q: f64,
    r: f64,
    last_update: Option<Instant>,
}

impl Kalman1D {
    pub fn new(x0: f64, p0: f64, q: f64, r: f64) -> Self {
        Self {
            x: x0,
            p: p0,
            q,
            r,
            last_update: None,
        }
    }

    /// Re-seed the estimate and clear timing, keeping the noise parameters.
    /// `None` keeps the current value for that field.
    pub fn reset(&mut self, x0: Option<f64>, p0: Option<f64>) {
        if let Some(x0) = x0 {
            self.x = x0;
        }
        if let Some(p0) = p0 {
            self.p = p0;
        }
        self.last_update = None;
    }

    /// Fold one distance measurement into the estimate.
    ///
    /// `dt`: seconds since the previous measurement. `None` infers it from
    /// wall clock; the first call (or first after `reset`) uses the nominal
    /// frame interval.
    pub fn update(&mut self, z: f64, dt: Option<f64>) -> f64 {
        let now = Instant::now();
        let dt = dt.unwrap_or_else(|| match self.last_update {
            None => NOMINAL_FRAME_DT,
            Some(prev) => now.duration_since(prev).as_secs_f64().max(1e-3),
        });
        trace!("filter step dt={:.3}s z={:.1}", dt, z);

        // Predict: estimate unchanged, variance grows by Q per step
        // regardless of the interval (constant-position model).
        let p_pred = self.p + self.q;

        // Correct
        let gain = p_pred / (p_pred + self.r);
        self.x += gain * (z - self.x);
        self.p = (1.0 - gain) * p_pred;

        self.last_update = Some(now);
        self.x
    }

    pub fn estimate(&self) -> f64 {
        self.x
    }

    pub fn variance(&self) -> f64 {
        self.p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> Kalman1D {
        Kalman1D::new(100.0, 100.0, 2.0, 50.0)
    }

    #[test]
    fn test_converges_to_repeated_measurement() {
        let mut k = Kalman1D::new(0.0, 100.0, 2.0, 50.0);
        for _ in 0..200 {
            k.update(100.0, Some(NOMINAL_FRAME_DT));
        }
        assert!((k.estimate() - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_estimate_moves_toward_measurement() {
        let mut k = filter();
        let before = k.estimate();
        let after = k.update(200.0, Some(NOMINAL_FRAME_DT));
        assert!(after > before);
        assert!(after < 200.0);
    }

    #[test]
    fn test_variance_shrinks_at_steady_state() {
        let mut k = filter();
        k.update(100.0, Some(NOMINAL_FRAME_DT));
        let v1 = k.variance();
        for _ in 0..50 {
            k.update(100.0, Some(NOMINAL_FRAME_DT));
        }
        assert!(k.variance() < v1);
    }

    #[test]
    fn test_process_noise_is_flat_per_step() {
        // The constant-position model adds Q once per update; a long gap
        // between measurements must not inflate variance any further.
        let mut a = filter();
        let mut b = filter();
        a.update(100.0, Some(NOMINAL_FRAME_DT));
        b.update(100.0, Some(10.0));
        assert!((a.variance() - b.variance()).abs() < 1e-12);
        // From seed (x=100, p=100, q=2, r=50): p'=102, k=102/152,
        // p=(1-k)*102 = 5100/152
        let expected = 102.0 * (1.0 - 102.0 / 152.0);
        assert!((b.variance() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_first_call_behavior() {
        let mut fresh = filter();
        let expected = fresh.update(130.0, None);

        let mut reused = filter();
        reused.update(40.0, Some(30.0));
        reused.update(55.0, Some(30.0));
        reused.reset(Some(100.0), Some(100.0));
        // dt=None after reset takes the nominal-interval path, not the
        // wall-clock gap since the pre-reset updates.
        let got = reused.update(130.0, None);
        assert!((got - expected).abs() < 1e-9);
        assert!((reused.variance() - fresh.variance()).abs() < 1e-9);
    }
}
