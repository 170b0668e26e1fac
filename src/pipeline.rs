// src/pipeline.rs
//
// Per-session glue: fuse the frame's detections into a target, smooth its
// distance, and derive the command. Owns all mutable tracking state so a
// process can run several robot sessions without shared globals.

use std::time::Instant;

use tracing::{debug, info};

use crate::controller::{Command, Controller};
use crate::filter::Kalman1D;
use crate::fusion::{select_target, FusedTarget, Homography};
use crate::types::{Config, Detection, FilterConfig, GeometryConfig};

/// Emit a stats line every this many frames.
const STATS_INTERVAL_FRAMES: u64 = 300;

pub struct FollowerPipeline {
    controller: Controller,
    filter: Kalman1D,
    filter_cfg: FilterConfig,
    geometry: GeometryConfig,
    allowed_classes: Vec<u32>,
    homography: Option<Homography>,

    frame_skip: u32,
    frame_index: u64,
    /// Last fused target, reused on detector-skipped frames.
    last_target: Option<FusedTarget>,
    tracking: bool,
    started: Instant,

    frames_total: u64,
    frames_with_target: u64,
}

impl FollowerPipeline {
    pub fn new(config: &Config, homography: Option<Homography>) -> Self {
        let f = &config.filter;
        Self {
            controller: Controller::new(config.control.clone()),
            filter: Kalman1D::new(
                f.initial_distance_cm,
                f.initial_variance,
                f.process_noise,
                f.measurement_noise,
            ),
            filter_cfg: config.filter.clone(),
            geometry: config.geometry.clone(),
            allowed_classes: config.detector.allowed_classes.clone(),
            homography,
            frame_skip: config.runtime.frame_skip.max(1),
            frame_index: 0,
            last_target: None,
            tracking: false,
            started: Instant::now(),
            frames_total: 0,
            frames_with_target: 0,
        }
    }

    /// Inference-throttling policy: run the detector on every Nth frame and
    /// reuse the previous target in between. Advances the frame counter.
    pub fn should_run_detector(&mut self) -> bool {
        let run = self.frame_index % self.frame_skip as u64 == 0;
        self.frame_index += 1;
        run
    }

    /// Process one frame's detections into exactly one command.
    /// `detections: None` means the detector was skipped this frame; the
    /// last fused target is reused.
    pub fn process(
        &mut self,
        detections: Option<&[Detection]>,
        frame_w: u32,
        frame_h: u32,
    ) -> Command {
        let t_secs = self.started.elapsed().as_secs_f64();
        self.process_at(detections, frame_w, frame_h, t_secs)
    }

    /// Same as `process` with the session clock injected, so period
    /// boundaries can be simulated deterministically.
    pub fn process_at(
        &mut self,
        detections: Option<&[Detection]>,
        frame_w: u32,
        frame_h: u32,
        t_secs: f64,
    ) -> Command {
        self.frames_total += 1;

        let target = match detections {
            Some(dets) => {
                let fused = select_target(
                    dets,
                    &self.allowed_classes,
                    frame_w,
                    frame_h,
                    self.homography.as_ref(),
                    &self.geometry,
                );
                self.last_target = fused;
                fused
            }
            None => self.last_target,
        };

        let cmd = match target {
            Some(mut t) => {
                if !self.tracking {
                    // Fresh acquisition: seed the filter at the measurement
                    // so the prior does not drag the first estimates.
                    self.filter.reset(
                        Some(t.distance_cm as f64),
                        Some(self.filter_cfg.initial_variance),
                    );
                    self.tracking = true;
                    debug!(
                        "target acquired: class={} d={:.1}cm method={:?}",
                        t.class_id, t.distance_cm, t.method
                    );
                }
                t.distance_cm = self.filter.update(t.distance_cm as f64, None) as f32;
                self.frames_with_target += 1;
                self.controller.command_for(Some(&t), t_secs)
            }
            None => {
                if self.tracking {
                    self.tracking = false;
                    debug!(
                        "target lost at estimate {:.1}cm (var {:.1}), entering search",
                        self.filter.estimate(),
                        self.filter.variance()
                    );
                    self.filter.reset(
                        Some(self.filter_cfg.initial_distance_cm),
                        Some(self.filter_cfg.initial_variance),
                    );
                }
                self.controller.command_for(None, t_secs)
            }
        };

        if self.frames_total % STATS_INTERVAL_FRAMES == 0 {
            info!(
                "processed {} frames, {} with target ({:.1}%)",
                self.frames_total,
                self.frames_with_target,
                100.0 * self.frames_with_target as f64 / self.frames_total as f64
            );
        }

        cmd
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }
}
