// src/config.rs

use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Shape checks that must fail at startup, never mid-loop.
    fn validate(&self) -> Result<()> {
        if self.detector.allowed_classes.is_empty() {
            bail!("detector.allowed_classes must list at least one class id");
        }
        if self.geometry.focal_length_px <= 0.0 {
            bail!("geometry.focal_length_px must be positive");
        }
        if self.geometry.real_object_width_cm <= 0.0 {
            bail!("geometry.real_object_width_cm must be positive");
        }
        if self.geometry.h_fov_deg <= 0.0 || self.geometry.h_fov_deg > 180.0 {
            bail!("geometry.h_fov_deg must be in (0, 180]");
        }
        if !(0.0..=1.0).contains(&self.geometry.ground_row_ratio) {
            bail!("geometry.ground_row_ratio must be in [0, 1]");
        }
        if self.control.desired_time_s <= 0.0 {
            bail!("control.desired_time_s must be positive");
        }
        if self.control.max_vx <= 0.0 {
            bail!("control.max_vx must be positive");
        }
        if self.control.stop_distance_cm < 0.0 {
            bail!("control.stop_distance_cm must not be negative");
        }
        if self.filter.measurement_noise <= 0.0 {
            bail!("filter.measurement_noise must be positive");
        }
        if self.runtime.frame_skip == 0 {
            bail!("runtime.frame_skip must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
video:
  host: 192.168.1.103
  port: 6000
command:
  host: 192.168.1.103
  port: 6001
  format: json
detector:
  model: yolo11s.onnx
  allowed_classes: [39, 64]
geometry:
  focal_length_px: 115.0
  real_object_width_cm: 6.5
  h_fov_deg: 60.0
control:
  desired_time_s: 5.0
  stop_distance_cm: 55.0
  max_vx: 0.6
  wz_gain: 1.0
filter: {}
runtime:
  frame_skip: 2
logging:
  level: info
"#;

    #[test]
    fn test_load_sample_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = Config::load(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.detector.allowed_classes, vec![39, 64]);
        assert_eq!(cfg.runtime.frame_skip, 2);
        // Defaults fill in the unspecified blocks
        assert_eq!(cfg.filter.initial_distance_cm, 100.0);
        assert_eq!(cfg.geometry.ground_row_ratio, 0.90);
        assert!(cfg.geometry.homography_path.is_none());
    }

    #[test]
    fn test_empty_allowed_classes_is_fatal() {
        let bad = SAMPLE.replace("allowed_classes: [39, 64]", "allowed_classes: []");
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bad.as_bytes()).unwrap();
        assert!(Config::load(f.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_missing_required_field_is_fatal() {
        let bad = SAMPLE.replace("focal_length_px: 115.0\n", "");
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bad.as_bytes()).unwrap();
        assert!(Config::load(f.path().to_str().unwrap()).is_err());
    }
}
