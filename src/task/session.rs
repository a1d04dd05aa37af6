//! Runs a full session against a presentation collaborator.

use rand::Rng;
use tracing::{debug, info};

use super::record::{Response, TrialRecord};
use super::schedule::{money_reward, BlockSchedule};
use super::symbols::FinalState;
use super::trial::{Trial, TrialSequence};

/// The side of the task that shows trials and collects key presses.
///
/// Returning `None` means no key was pressed inside the response window.
pub trait Participant {
    fn respond_first_stage(&mut self, trial: &Trial) -> Option<Response>;

    /// Called only after a valid first-stage response; `record` already holds
    /// `choice1` and the reached `final_state`.
    fn respond_second_stage(
        &mut self,
        record: &TrialRecord,
        final_state: &FinalState,
    ) -> Option<Response>;

    /// Sees the finished row, including slow trials.
    fn observe(&mut self, _record: &TrialRecord) {}
}

/// Everything a session produced.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub records: Vec<TrialRecord>,
    pub schedules: Vec<BlockSchedule>,
    pub rewards: u32,
    pub slow_trials: u32,
}

impl SessionSummary {
    /// Payment in CHF.
    pub fn money(&self) -> f64 {
        money_reward(self.rewards)
    }
}

/// Plays one trial through the collaborator.
pub fn run_trial<P: Participant + ?Sized>(trial: &Trial, participant: &mut P) -> TrialRecord {
    let mut record = TrialRecord::start(trial);
    let first = participant.respond_first_stage(trial);
    if let Some(final_state) = record.record_first_stage(trial, first) {
        let second = participant.respond_second_stage(&record, final_state);
        record.record_second_stage(final_state, second);
    }
    participant.observe(&record);
    record
}

/// Runs `blocks × trials_per_block` trials from `sequence`.
///
/// `itis` feeds the per-block timing plan; `rng` only shuffles the ITIs so the
/// trial stream itself is unaffected by scheduling.
pub fn run_session<R, S, P>(
    sequence: &mut TrialSequence<R>,
    participant: &mut P,
    itis: &[f64],
    rng: &mut S,
) -> crate::Result<SessionSummary>
where
    R: Rng,
    S: Rng + ?Sized,
    P: Participant + ?Sized,
{
    let config = sequence.config().clone();
    config.validate()?;
    info!(model = %sequence.model(), "session started");

    let mut summary = SessionSummary {
        records: Vec::with_capacity(config.num_trials()),
        schedules: Vec::with_capacity(config.blocks),
        rewards: 0,
        slow_trials: 0,
    };

    for block in 0..config.blocks {
        let schedule = BlockSchedule::new(&config.block_itis(itis, rng)?);
        info!(
            block,
            duration_secs = schedule.block_duration,
            "block started"
        );

        for _ in 0..config.trials_per_block {
            let trial = sequence.next_trial();
            let record = run_trial(&trial, participant);
            debug!(
                trial = record.trial,
                common = record.common,
                choice1 = ?record.choice1,
                choice2 = ?record.choice2,
                reward = record.reward,
                slow = record.slow,
                "trial recorded"
            );
            summary.rewards += u32::from(record.reward);
            summary.slow_trials += u32::from(record.slow);
            summary.records.push(record);
        }

        summary.schedules.push(schedule);
        info!(block, rewards = summary.rewards, "block finished");
    }

    info!(
        trials = summary.records.len(),
        rewards = summary.rewards,
        slow_trials = summary.slow_trials,
        money = summary.money(),
        "session finished"
    );
    Ok(summary)
}
