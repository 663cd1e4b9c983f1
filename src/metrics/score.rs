const SUCCESS_WEIGHT: f64 = 0.4;
const FREQUENCY_WEIGHT: f64 = 0.3;
const BUILD_TIME_WEIGHT: f64 = 0.2;
const PULL_REQUEST_WEIGHT: f64 = 0.1;

/// The four sub-scores blended into the health score, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthComponents {
    pub success: f64,
    pub frequency: f64,
    pub build_time: f64,
    pub pull_requests: f64,
}

impl HealthComponents {
    pub fn new(
        success_rate: f64,
        deployment_frequency: f64,
        avg_build_time: f64,
        pr_merge_frequency: f64,
    ) -> Self {
        Self {
            success: clamp_percentage(success_rate),
            // 10 runs per week saturates
            frequency: clamp_percentage(deployment_frequency * 10.0),
            // builds of 50 minutes or more floor at zero
            build_time: clamp_percentage(100.0 - avg_build_time * 2.0),
            // 5 merged PRs per week saturates
            pull_requests: clamp_percentage(pr_merge_frequency * 20.0),
        }
    }

    pub fn weighted(&self) -> f64 {
        self.success * SUCCESS_WEIGHT
            + self.frequency * FREQUENCY_WEIGHT
            + self.build_time * BUILD_TIME_WEIGHT
            + self.pull_requests * PULL_REQUEST_WEIGHT
    }

    /// Weighted blend rounded half-up to an integer in `[0, 100]`.
    pub fn score(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let score = clamp_percentage(self.weighted().round()) as u8;
        score
    }
}

fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
