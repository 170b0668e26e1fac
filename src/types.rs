// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub command: CommandConfig,
    pub detector: DetectorConfig,
    pub geometry: GeometryConfig,
    pub control: ControlConfig,
    pub filter: FilterConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Inbound framed video stream (the robot's camera relay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_s")]
    pub connect_timeout_s: f64,
    #[serde(default = "default_read_timeout_s")]
    pub read_timeout_s: f64,
    #[serde(default = "default_reconnect_delay_s")]
    pub reconnect_delay_s: f64,
}

/// Outbound command connection (the robot's actuation endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub host: String,
    pub port: u16,
    /// Wire format: newline-delimited JSON twists or fixed 4-byte packets.
    #[serde(default)]
    pub format: WireFormat,
    #[serde(default = "default_connect_timeout_s")]
    pub connect_timeout_s: f64,
    #[serde(default = "default_reconnect_delay_s")]
    pub reconnect_delay_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub model: String,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    /// Class ids the follower is allowed to chase (e.g. COCO bottle = 39).
    pub allowed_classes: Vec<u32>,
}

/// Camera geometry used for both distance-estimation methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub focal_length_px: f32,
    pub real_object_width_cm: f32,
    pub h_fov_deg: f32,
    /// Rows below this fraction of the frame are assumed to touch the ground.
    #[serde(default = "default_ground_row_ratio")]
    pub ground_row_ratio: f32,
    /// Homography results beyond this are suspect (extrapolation blow-up).
    #[serde(default = "default_hard_max_m")]
    pub hard_max_m: f32,
    /// Width-based results under this are considered trustworthy.
    #[serde(default = "default_soft_max_m")]
    pub soft_max_m: f32,
    /// Optional pixel→ground calibration; absent means width-only mode.
    #[serde(default)]
    pub homography_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Time-to-arrival horizon: vx = distance / desired_time_s.
    pub desired_time_s: f32,
    pub stop_distance_cm: f32,
    pub max_vx: f32,
    pub wz_gain: f32,
}

/// Kalman seed and noise parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_initial_distance_cm")]
    pub initial_distance_cm: f64,
    #[serde(default = "default_initial_variance")]
    pub initial_variance: f64,
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Recognized for parity with the desktop build; rendering is external.
    #[serde(default)]
    pub gui: bool,
    /// Run the detector on every Nth frame, reusing the previous target
    /// in between. 1 = every frame.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    #[serde(default = "default_true")]
    pub print_cmd: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_connect_timeout_s() -> f64 {
    5.0
}
fn default_read_timeout_s() -> f64 {
    5.0
}
fn default_reconnect_delay_s() -> f64 {
    1.0
}
fn default_backend() -> String {
    "stub".to_string()
}
fn default_confidence() -> f32 {
    0.20
}
fn default_ground_row_ratio() -> f32 {
    0.90
}
fn default_hard_max_m() -> f32 {
    10.0
}
fn default_soft_max_m() -> f32 {
    2.0
}
fn default_initial_distance_cm() -> f64 {
    100.0
}
fn default_initial_variance() -> f64 {
    100.0
}
fn default_process_noise() -> f64 {
    2.0
}
fn default_measurement_noise() -> f64 {
    50.0
}
fn default_frame_skip() -> u32 {
    1
}
fn default_true() -> bool {
    true
}

/// Axis-aligned box in pixel coordinates, inclusive corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Normalize inverted corners and clip to frame bounds.
    pub fn clip(&self, frame_w: u32, frame_h: u32) -> Self {
        let max_x = frame_w.saturating_sub(1) as i32;
        let max_y = frame_h.saturating_sub(1) as i32;
        let mut x1 = self.x1.clamp(0, max_x);
        let mut x2 = self.x2.clamp(0, max_x);
        let mut y1 = self.y1.clamp(0, max_y);
        let mut y2 = self.y2.clamp(0, max_y);
        if x2 < x1 {
            std::mem::swap(&mut x1, &mut x2);
        }
        if y2 < y1 {
            std::mem::swap(&mut y1, &mut y2);
        }
        Self { x1, y1, x2, y2 }
    }

    /// Box width in pixels, clamped to at least 1 so distance math
    /// never divides by zero.
    pub fn width_px(&self) -> i32 {
        (self.x2 - self.x1).max(1)
    }

    /// Contact-point anchor: bottom-center of the box.
    pub fn bottom_center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, self.y1.max(self.y2))
    }
}

/// One raw detector output for a single frame. Discarded after fusion.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}
