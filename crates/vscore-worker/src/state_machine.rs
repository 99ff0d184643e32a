//! Run state machine.
//!
//! Every status change a run makes goes through [`RunStateMachine::apply`],
//! so an out-of-order write is an error rather than a silent regression.

use vscore_models::{ModelError, ModelResult, PipelineStage, PipelineStatus};

/// Something that happened to the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// The next stage began.
    Start,
    /// The running stage produced its output.
    Succeed,
    /// The running stage failed but a substitute value lets the run continue.
    FallBack,
    /// The running stage failed and the run stops.
    Fail,
}

impl StageEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageEvent::Start => "start",
            StageEvent::Succeed => "succeed",
            StageEvent::FallBack => "fall_back",
            StageEvent::Fail => "fail",
        }
    }
}

/// Transition table. `None` for every illegal pair.
pub fn next_status(current: PipelineStatus, event: StageEvent) -> Option<PipelineStatus> {
    use PipelineStatus::*;
    use StageEvent::*;

    let next = match (current, event) {
        (Uploaded, Start) => FramesExtracting,
        (FramesExtracting, Succeed) => FramesExtracted,
        (FramesExtracting, Fail) => FramesFailed,
        (FramesExtracted, Start) => Analyzing,
        (Analyzing, Succeed) => Analyzed,
        (Analyzing, FallBack) => AnalysisFailed,
        (Analyzed | AnalysisFailed, Start) => GeneratingMusic,
        (GeneratingMusic, Succeed) => MusicCompleted,
        (GeneratingMusic, Fail) => MusicFailed,
        (MusicCompleted, Start) => CombiningVideo,
        (CombiningVideo, Succeed) => Completed,
        (CombiningVideo, Fail) => CombinationFailed,
        _ => return None,
    };
    Some(next)
}

/// In-memory state of one run.
///
/// Every run starts from `uploaded` regardless of what an earlier run
/// persisted; re-entry recomputes from the stored inputs.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    current: PipelineStatus,
    used_fallback: bool,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineStatus::Uploaded,
            used_fallback: false,
        }
    }

    pub fn current(&self) -> PipelineStatus {
        self.current
    }

    /// Whether analysis fell back during this run.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Apply an event and return the new status.
    pub fn apply(&mut self, event: StageEvent) -> ModelResult<PipelineStatus> {
        let next = next_status(self.current, event).ok_or_else(|| {
            ModelError::invalid_transition(
                "pipeline",
                self.current,
                format!("<{}>", event.as_str()),
            )
        })?;
        if event == StageEvent::FallBack {
            self.used_fallback = true;
        }
        self.current = next;
        Ok(next)
    }

    /// Apply an event on behalf of `stage`, rejecting it when the run is not
    /// at that stage. Nothing changes on rejection.
    pub fn apply_in(&mut self, stage: PipelineStage, event: StageEvent) -> ModelResult<PipelineStatus> {
        let expected = match event {
            StageEvent::Start => stage.running_status(),
            StageEvent::Succeed => stage.success_status(),
            StageEvent::FallBack | StageEvent::Fail => stage.failure_status(),
        };
        match next_status(self.current, event) {
            Some(next) if next == expected => self.apply(event),
            _ => Err(ModelError::invalid_transition(stage.label(), self.current, expected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineStatus::*;
    use StageEvent::*;

    #[test]
    fn test_happy_path() {
        let mut fsm = RunStateMachine::new();
        let mut seen = vec![fsm.current()];
        for event in [Start, Succeed, Start, Succeed, Start, Succeed, Start, Succeed] {
            seen.push(fsm.apply(event).unwrap());
        }
        assert_eq!(fsm.current(), Completed);
        assert!(fsm.current().is_terminal());
        assert!(!fsm.used_fallback());
        assert_eq!(
            seen,
            [
                Uploaded,
                FramesExtracting,
                FramesExtracted,
                Analyzing,
                Analyzed,
                GeneratingMusic,
                MusicCompleted,
                CombiningVideo,
                Completed
            ]
        );
    }

    #[test]
    fn test_analysis_fallback_continues() {
        let mut fsm = RunStateMachine::new();
        for event in [Start, Succeed, Start, FallBack] {
            fsm.apply(event).unwrap();
        }
        assert_eq!(fsm.current(), AnalysisFailed);
        assert!(!fsm.current().is_terminal());
        assert_eq!(fsm.apply(Start).unwrap(), GeneratingMusic);
        assert!(fsm.used_fallback());
    }

    #[test]
    fn test_failures_are_terminal() {
        for (status, failed) in [
            (FramesExtracting, FramesFailed),
            (GeneratingMusic, MusicFailed),
            (CombiningVideo, CombinationFailed),
        ] {
            assert_eq!(next_status(status, Fail), Some(failed));
            for event in [Start, Succeed, FallBack, Fail] {
                assert_eq!(next_status(failed, event), None);
            }
        }
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut fsm = RunStateMachine::new();
        let err = tokio_test::assert_err!(fsm.apply(Succeed));
        assert!(matches!(err, ModelError::InvalidTransition { .. }));
        assert_eq!(fsm.current(), Uploaded);

        assert_eq!(next_status(Analyzing, Fail), None);
        assert_eq!(next_status(FramesExtracting, FallBack), None);
        assert_eq!(next_status(Completed, Start), None);
    }

    #[test]
    fn test_stage_checked_transitions() {
        use PipelineStage::*;

        let mut fsm = RunStateMachine::new();
        assert_eq!(fsm.apply_in(FrameSampling, Start).unwrap(), FramesExtracting);

        let err = tokio_test::assert_err!(fsm.apply_in(Analysis, Start));
        assert!(matches!(err, ModelError::InvalidTransition { entity: "analysis", .. }));
        assert_eq!(fsm.current(), FramesExtracting);

        assert_eq!(fsm.apply_in(FrameSampling, Succeed).unwrap(), FramesExtracted);
        assert_eq!(fsm.apply_in(Analysis, Start).unwrap(), Analyzing);
        tokio_test::assert_err!(fsm.apply_in(Analysis, Fail));
        assert_eq!(fsm.apply_in(Analysis, FallBack).unwrap(), AnalysisFailed);
        assert_eq!(fsm.apply_in(MusicSynthesis, Start).unwrap(), GeneratingMusic);
        tokio_test::assert_err!(fsm.apply_in(Combination, Fail));
        assert_eq!(fsm.apply_in(MusicSynthesis, Fail).unwrap(), MusicFailed);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        for status in PipelineStatus::all() {
            for event in [Start, Succeed, FallBack, Fail] {
                if let Some(next) = next_status(*status, event) {
                    assert!(next.rank() > status.rank(), "{status} -> {next}");
                }
            }
        }
    }
}
