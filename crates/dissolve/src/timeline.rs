use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Curve mapping normalised elapsed time onto transition progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    Linear,
    #[default]
    EaseOutSine,
    Smoothstep,
    EaseInOut,
}

impl Easing {
    /// Samples the curve; input is clamped to `[0, 1]` and `t >= 1` maps to exactly 1.
    pub fn sample(self, t: f32) -> f32 {
        if t.is_nan() {
            return 0.0;
        }
        let clamped = t.clamp(0.0, 1.0);
        if clamped >= 1.0 {
            return 1.0;
        }
        match self {
            Easing::Linear => clamped,
            Easing::EaseOutSine => ease_out_sine(clamped),
            Easing::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            Easing::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::EaseOutSine => "ease-out-sine",
            Easing::Smoothstep => "smoothstep",
            Easing::EaseInOut => "ease-in-out",
        }
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Easing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Easing::Linear),
            "ease-out-sine" | "easeoutsine" => Ok(Easing::EaseOutSine),
            "smoothstep" => Ok(Easing::Smoothstep),
            "ease-in-out" | "easeinout" => Ok(Easing::EaseInOut),
            other => Err(format!(
                "unknown easing '{other}' (expected linear, ease-out-sine, smoothstep or ease-in-out)"
            )),
        }
    }
}

pub fn ease_out_sine(t: f32) -> f32 {
    (t * FRAC_PI_2).sin()
}

/// Progress after `elapsed` of a run lasting `duration`.
///
/// A zero duration completes immediately.
pub fn progress_at(elapsed: Duration, duration: Duration, easing: Easing) -> f32 {
    if duration.is_zero() || elapsed >= duration {
        return 1.0;
    }
    let t = elapsed.as_secs_f64() / duration.as_secs_f64();
    easing.sample(t as f32)
}
