use crate::error::ValidationError;
use schematic_xpath::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};

/// The phase that runs every pattern.
pub const ALL_PHASES: &str = "#ALL";

/// Tunables for one schema execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Restricts execution to the active patterns of this phase.
    /// `None` and `"#ALL"` run everything.
    pub phase: Option<String>,
    /// Nesting limit for variable references and function calls.
    pub max_depth: usize,
    /// Stop producing results after the first failed fatal result.
    pub stop_on_first_failure: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            phase: None,
            max_depth: DEFAULT_MAX_DEPTH,
            stop_on_first_failure: false,
        }
    }
}

impl ExecutionOptions {
    /// Loads options from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let options: ExecutionOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_depth == 0 {
            return Err(ValidationError::Options(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The phase to run, if execution is restricted to one.
    pub(crate) fn selected_phase(&self) -> Option<&str> {
        self.phase.as_deref().filter(|phase| *phase != ALL_PHASES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_fills_defaults() {
        let options = ExecutionOptions::from_json(r#"{ "phase": "quick" }"#).unwrap();
        assert_eq!(options.phase.as_deref(), Some("quick"));
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
        assert!(!options.stop_on_first_failure);
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            ExecutionOptions::from_json(r#"{ "max_depth": 0 }"#),
            Err(ValidationError::Options(_))
        ));
        assert!(matches!(
            ExecutionOptions::from_json(r#"{ "max_depth": "deep" }"#),
            Err(ValidationError::Options(_))
        ));
    }

    #[test]
    fn test_all_phase_selects_everything() {
        assert_eq!(ExecutionOptions::default().with_phase("#ALL").selected_phase(), None);
        assert_eq!(
            ExecutionOptions::default().with_phase("quick").selected_phase(),
            Some("quick")
        );
    }
}
