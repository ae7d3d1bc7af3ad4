use mindflow_core::adapter::ReasoningEffort;
use mindflow_settings::BackendSettings;

const HIGH_EFFORT_TEMPERATURE: f64 = 0.3;

/// Temperature and output budget for one request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sampling {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Sampling {
    /// High effort lowers temperature and doubles the token budget;
    /// other levels use the configured values.
    pub fn for_effort(settings: &BackendSettings, effort: ReasoningEffort) -> Self {
        match effort {
            ReasoningEffort::High => Self {
                temperature: HIGH_EFFORT_TEMPERATURE,
                max_tokens: settings.max_tokens.saturating_mul(2),
            },
            ReasoningEffort::Low | ReasoningEffort::Medium => Self {
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
            },
        }
    }
}
