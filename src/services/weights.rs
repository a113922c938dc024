use crate::config::ConfigError;
use crate::models::ActionKind;

/// Lookup table from action kind to interaction weight.
///
/// Built once from validated configuration; every stored weight lies in [0, 1].
/// Unrecognized kinds fall back to the lowest configured weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionWeights {
    view: f64,
    register: f64,
    like: f64,
    fallback: f64,
}

impl ActionWeights {
    pub fn new(view: f64, register: f64, like: f64) -> Result<Self, ConfigError> {
        for (kind, value) in [("VIEW", view), ("REGISTER", register), ("LIKE", like)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::WeightOutOfRange { kind, value });
            }
        }

        Ok(Self {
            view,
            register,
            like,
            fallback: view.min(register).min(like),
        })
    }

    pub fn weight(&self, kind: ActionKind) -> f64 {
        match kind {
            ActionKind::View => self.view,
            ActionKind::Register => self.register,
            ActionKind::Like => self.like,
            ActionKind::Unrecognized => self.fallback,
        }
    }
}

impl Default for ActionWeights {
    fn default() -> Self {
        Self {
            view: 0.3,
            register: 0.7,
            like: 0.9,
            fallback: 0.3,
        }
    }
}
