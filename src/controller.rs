// src/controller.rs
//
// Maps the filtered target estimate into a velocity command. Three regimes:
// STOP when the target is inside the stop threshold, SEARCH (deterministic
// sweep) when there is no target, GO (time-to-arrival proportional law)
// otherwise.

use crate::fusion::FusedTarget;
use crate::types::ControlConfig;

// ============================================================================
// SEARCH SWEEP
// ============================================================================
/// Sweep direction flips every period; creep forward while sweeping.
const SEARCH_PERIOD_S: f64 = 4.0;
const SEARCH_VX: f32 = 0.10;
const SEARCH_WZ: f32 = 0.40;

// ============================================================================
// COMPACT-FORM SPEED MAP (cm breakpoints → percent)
// ============================================================================
const SPEED_BREAKPOINTS_CM: [(f32, u8); 3] = [(100.0, 25), (200.0, 50), (400.0, 75)];
const SPEED_MAX_PCT: u8 = 100;
/// Forward creep while searching, in percent.
const SEARCH_SPEED_PCT: u8 = 10;
/// Sweep bearing reported in the compact form while searching.
const SEARCH_ANGLE_DEG: f32 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    Stop,
    Go,
    Search,
}

/// One velocity command per loop iteration. Carries the distance used and a
/// human-readable reason so logging/overlay never re-derives state.
#[derive(Debug, Clone)]
pub struct Command {
    pub mode: CommandMode,
    pub vx: f32,
    pub wz: f32,
    /// Distance the decision was based on; -1 when unknown.
    pub distance_cm: f32,
    pub angle_deg: f32,
    /// Class being tracked; 0 when there is none.
    pub target_class: u32,
    pub reason: String,
}

impl Command {
    /// Safe command for a cycle in which no valid frame was obtained.
    pub fn stop_no_data() -> Self {
        Self {
            mode: CommandMode::Stop,
            vx: 0.0,
            wz: 0.0,
            distance_cm: -1.0,
            angle_deg: 0.0,
            target_class: 0,
            reason: "STOP (no data)".to_string(),
        }
    }
}

/// Stateless policy over the control gains; time is injected so the search
/// sweep is reproducible in tests.
#[derive(Debug, Clone)]
pub struct Controller {
    cfg: ControlConfig,
}

impl Controller {
    pub fn new(cfg: ControlConfig) -> Self {
        Self { cfg }
    }

    /// Decide the command for this cycle. `t_secs` is elapsed session time,
    /// used only by the search sweep.
    pub fn command_for(&self, target: Option<&FusedTarget>, t_secs: f64) -> Command {
        match target {
            None => self.search(t_secs),
            Some(t) if t.distance_cm < self.cfg.stop_distance_cm => Command {
                mode: CommandMode::Stop,
                vx: 0.0,
                wz: 0.0,
                distance_cm: t.distance_cm,
                angle_deg: t.angle_deg,
                target_class: t.class_id,
                reason: format!("STOP (close) d={:.1}cm", t.distance_cm),
            },
            Some(t) => self.track(t),
        }
    }

    fn track(&self, target: &FusedTarget) -> Command {
        // Time-to-arrival law, saturated at the configured cap
        let vx = (target.distance_cm / 100.0 / self.cfg.desired_time_s).min(self.cfg.max_vx);

        // Proportional bearing correction, saturated to the unit range
        let err_rad = target.angle_deg.to_radians();
        let wz = (err_rad * self.cfg.wz_gain).clamp(-1.0, 1.0);

        Command {
            mode: CommandMode::Go,
            vx,
            wz,
            distance_cm: target.distance_cm,
            angle_deg: target.angle_deg,
            target_class: target.class_id,
            reason: format!(
                "GO vx={:.2} wz={:.2} d={:.1}cm",
                vx, wz, target.distance_cm
            ),
        }
    }

    /// Sweep to reacquire a target: angular direction flips every
    /// `SEARCH_PERIOD_S`, with a small forward creep. Deterministic in
    /// `t_secs` so behavior repeats within a period.
    fn search(&self, t_secs: f64) -> Command {
        let sign = if (t_secs / SEARCH_PERIOD_S) as i64 % 2 == 0 {
            1.0
        } else {
            -1.0
        };
        let wz = SEARCH_WZ * sign;
        Command {
            mode: CommandMode::Search,
            vx: SEARCH_VX,
            wz,
            distance_cm: -1.0,
            angle_deg: SEARCH_ANGLE_DEG * sign,
            target_class: 0,
            reason: format!("SEARCH vx={:.2} wz={:.2}", SEARCH_VX, wz),
        }
    }
}

/// Monotonic piecewise map from distance to a discrete speed percentage for
/// the compact wire form. Closer ⇒ slower; at or inside the stop threshold
/// the platform does not move at all.
pub fn speed_percent(distance_cm: f32, stop_distance_cm: f32) -> u8 {
    if distance_cm <= stop_distance_cm {
        return 0;
    }
    for (limit_cm, pct) in SPEED_BREAKPOINTS_CM {
        if distance_cm < limit_cm {
            return pct;
        }
    }
    SPEED_MAX_PCT
}

/// Speed percent used by the compact form while searching.
pub fn search_speed_percent() -> u8 {
    SEARCH_SPEED_PCT
}
