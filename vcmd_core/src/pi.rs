//! PI controllers for the (currently dormant) closed-loop thrust path.
//!
//! The bank still runs through `reset()` every arm cycle and its p/i
//! components ride along in telemetry, so the scaffold stays exercised
//! even while open-loop control is the active path.

use std::time::Instant;

/// A PI accumulator with output clamping and anti-windup: when the raw
/// output saturates, the integral sum for that step is discarded so the
/// integrator cannot wind up against the clamp.
#[derive(Debug, Clone)]
pub struct PiController {
    kp: f32,
    ki: f32,
    max_output: f32,
    err_sum: f32,
    last_compute_time: Option<Instant>,
    p_component: f32,
    i_component: f32,
}

impl PiController {
    pub fn new(kp: f32, ki: f32, max_output: f32) -> Self {
        Self {
            kp,
            ki,
            max_output,
            err_sum: 0.0,
            last_compute_time: None,
            p_component: 0.0,
            i_component: 0.0,
        }
    }

    /// One controller step at time `now`. The first call after a reset
    /// seeds the time base, so its dt (and integral contribution) is zero.
    pub fn compute(&mut self, error: f32, now: Instant) -> f32 {
        let last = self.last_compute_time.unwrap_or(now);
        let dt = now.saturating_duration_since(last).as_secs_f32();
        self.last_compute_time = Some(now);

        let candidate_sum = self.err_sum + error * dt;
        self.p_component = self.kp * error;
        self.i_component = self.ki * candidate_sum;

        let raw = self.p_component + self.i_component;
        if raw > self.max_output {
            return self.max_output;
        }
        if raw < -self.max_output {
            return -self.max_output;
        }
        self.err_sum = candidate_sum;
        raw
    }

    /// Zero the integrator and drop the time base; the next `compute`
    /// re-seeds.
    pub fn reset(&mut self) {
        self.err_sum = 0.0;
        self.last_compute_time = None;
        self.p_component = 0.0;
        self.i_component = 0.0;
    }

    pub fn p_component(&self) -> f32 {
        self.p_component
    }

    pub fn i_component(&self) -> f32 {
        self.i_component
    }
}

/// The three closed-loop controllers, with the gains from the stand's
/// closed-loop commissioning work.
#[derive(Debug, Clone)]
pub struct ClosedLoopBank {
    pub chamber_pressure: PiController,
    pub lox_angle: PiController,
    pub ipa_angle: PiController,
}

impl Default for ClosedLoopBank {
    fn default() -> Self {
        Self {
            chamber_pressure: PiController::new(0.0, 0.0, f32::INFINITY),
            lox_angle: PiController::new(0.0, 85.0, 15.0),
            ipa_angle: PiController::new(0.0, 85.0, 15.0),
        }
    }
}

impl ClosedLoopBank {
    pub fn reset(&mut self) {
        self.chamber_pressure.reset();
        self.lox_angle.reset();
        self.ipa_angle.reset();
    }
}

/// Per-controller p/i components for the telemetry record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PiTelemetry {
    pub chamber_pressure_p: f32,
    pub chamber_pressure_i: f32,
    pub lox_angle_p: f32,
    pub lox_angle_i: f32,
    pub ipa_angle_p: f32,
    pub ipa_angle_i: f32,
}

impl ClosedLoopBank {
    pub fn telemetry(&self) -> PiTelemetry {
        PiTelemetry {
            chamber_pressure_p: self.chamber_pressure.p_component(),
            chamber_pressure_i: self.chamber_pressure.i_component(),
            lox_angle_p: self.lox_angle.p_component(),
            lox_angle_i: self.lox_angle.i_component(),
            ipa_angle_p: self.ipa_angle.p_component(),
            ipa_angle_i: self.ipa_angle.i_component(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_call_has_no_integral_contribution() {
        let mut pi = PiController::new(2.0, 100.0, f32::INFINITY);
        let t0 = Instant::now();
        let out = pi.compute(3.0, t0);
        // dt == 0 on the seeding call: pure proportional.
        assert_eq!(out, 6.0);
        assert_eq!(pi.i_component(), 0.0);
    }

    #[test]
    fn integral_accumulates_with_elapsed_time() {
        let mut pi = PiController::new(0.0, 1.0, f32::INFINITY);
        let t0 = Instant::now();
        pi.compute(1.0, t0);
        let out = pi.compute(1.0, t0 + Duration::from_secs(2));
        assert!((out - 2.0).abs() < 1e-5);
    }

    #[test]
    fn clamp_blocks_windup() {
        let mut pi = PiController::new(0.0, 1.0, 1.0);
        let t0 = Instant::now();
        pi.compute(10.0, t0);
        // Saturated: err_sum must not commit.
        let out = pi.compute(10.0, t0 + Duration::from_secs(10));
        assert_eq!(out, 1.0);
        // After the error clears, the integrator was never wound up.
        let out = pi.compute(0.0, t0 + Duration::from_secs(11));
        assert_eq!(out, 0.0);
    }

    #[test]
    fn clamp_is_symmetric() {
        let mut pi = PiController::new(1.0, 0.0, 5.0);
        let t0 = Instant::now();
        assert_eq!(pi.compute(100.0, t0), 5.0);
        assert_eq!(pi.compute(-100.0, t0 + Duration::from_secs(1)), -5.0);
    }

    #[test]
    fn reset_reseeds_the_time_base() {
        let mut pi = PiController::new(0.0, 1.0, f32::INFINITY);
        let t0 = Instant::now();
        pi.compute(1.0, t0);
        pi.compute(1.0, t0 + Duration::from_secs(5));
        pi.reset();
        // Seeding call again: no stale dt from before the reset.
        let out = pi.compute(1.0, t0 + Duration::from_secs(100));
        assert_eq!(out, 0.0);
    }
}
