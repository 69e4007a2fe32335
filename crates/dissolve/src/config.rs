use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::DissolveError;
use crate::timeline::Easing;

pub const DEFAULT_DURATION: Duration = Duration::from_millis(4000);
pub const DEFAULT_DISSOLVE_LOW_EDGE: f32 = 0.0;
pub const DEFAULT_DISSOLVE_HIGH_EDGE: f32 = 0.2;

/// Tunables for a transition.
///
/// ```toml
/// duration = "2s 500ms"   # or a number of milliseconds
/// easing = "smoothstep"
/// dissolve_low_edge = 0.0
/// dissolve_high_edge = 0.2
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransitionConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub easing: Easing,
    pub dissolve_low_edge: f32,
    pub dissolve_high_edge: f32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            easing: Easing::default(),
            dissolve_low_edge: DEFAULT_DISSOLVE_LOW_EDGE,
            dissolve_high_edge: DEFAULT_DISSOLVE_HIGH_EDGE,
        }
    }
}

impl TransitionConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, DissolveError> {
        let config: TransitionConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, DissolveError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            DissolveError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), DissolveError> {
        if self.duration.is_zero() {
            return Err(DissolveError::InvalidConfig(
                "duration must be greater than zero".into(),
            ));
        }
        if !self.dissolve_low_edge.is_finite() || !self.dissolve_high_edge.is_finite() {
            return Err(DissolveError::InvalidConfig(
                "dissolve edges must be finite".into(),
            ));
        }
        if self.dissolve_low_edge >= self.dissolve_high_edge {
            return Err(DissolveError::InvalidConfig(format!(
                "dissolve_low_edge ({}) must be below dissolve_high_edge ({})",
                self.dissolve_low_edge, self.dissolve_high_edge
            )));
        }
        Ok(())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v / 1000.0)
                .map_err(|err| E::custom(format!("invalid duration {v}ms: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TransitionConfig::from_toml_str("").expect("parse");
        assert_eq!(config, TransitionConfig::default());
        assert_eq!(config.duration, Duration::from_millis(4000));
        assert_eq!(config.easing, Easing::EaseOutSine);
    }

    #[test]
    fn parses_human_readable_durations() {
        let config = TransitionConfig::from_toml_str(
            r#"
            duration = "2s 500ms"
            easing = "smoothstep"
            "#,
        )
        .expect("parse");
        assert_eq!(config.duration, Duration::from_millis(2500));
        assert_eq!(config.easing, Easing::Smoothstep);
    }

    #[test]
    fn numeric_durations_are_milliseconds() {
        let config = TransitionConfig::from_toml_str("duration = 1500").expect("parse");
        assert_eq!(config.duration, Duration::from_millis(1500));
        let config = TransitionConfig::from_toml_str("duration = 250.0").expect("parse");
        assert_eq!(config.duration, Duration::from_millis(250));
    }

    #[test]
    fn rejects_inverted_edges() {
        let err = TransitionConfig::from_toml_str(
            "dissolve_low_edge = 0.5\ndissolve_high_edge = 0.1",
        )
        .unwrap_err();
        assert!(matches!(err, DissolveError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_duration_and_bad_syntax() {
        assert!(matches!(
            TransitionConfig::from_toml_str("duration = 0"),
            Err(DissolveError::InvalidConfig(_))
        ));
        assert!(matches!(
            TransitionConfig::from_toml_str("duration = \"soon\""),
            Err(DissolveError::Config(_))
        ));
        assert!(matches!(
            TransitionConfig::from_toml_str("speed = 3"),
            Err(DissolveError::Config(_))
        ));
        assert!(matches!(
            TransitionConfig::from_toml_str("duration = 1e30"),
            Err(DissolveError::Config(_))
        ));
    }
}
