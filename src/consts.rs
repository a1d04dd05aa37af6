/// Seconds a participant has to answer at each stage before the trial is slow.
pub const RESPONSE_WINDOW_SECS: f64 = 2.0;

/// Nominal duration of one trial in the scanner, ITI excluded (seconds).
pub const TRIAL_DURATION_SECS: f64 = 12.5;

/// Rest at the end of every block (seconds).
pub const BLOCK_FINAL_INTERVAL_SECS: f64 = 10.0;

/// Money paid per rewarded trial (CHF).
pub const REWARD_PER_TRIAL: f64 = 0.60;

/// Probability of the common transition assumed by the model-based learner.
pub const COMMON_TRANSITION_WEIGHT: f64 = 0.7;

/// Probability of the rare transition assumed by the model-based learner.
pub const RARE_TRANSITION_WEIGHT: f64 = 0.3;
