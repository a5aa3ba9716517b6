//! Task state machine.
//!
//! Validates the allowed transition graph. The actual transitions are
//! optimistically-locked SQL statements in [`scheduler_db::queries::tasks`];
//! this module is the single place that knows which edges are legal.

pub mod dispatch;
pub mod queries;

use scheduler_db::models::TaskStatus;

/// Enforces the valid transition graph:
///
/// ```text
/// pending          -> running            (claimed by a poller)
/// pending          -> canceled           (canceled before it started)
/// running          -> cancel_requested   (cancellation requested mid-run)
/// running          -> succeed
/// running          -> failed
/// cancel_requested -> succeed            (finished before noticing the request)
/// cancel_requested -> failed
/// cancel_requested -> canceled           (cooperative stop honored)
/// ```
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge in
    /// the state graph.
    pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
        matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Canceled)
                | (TaskStatus::Running, TaskStatus::CancelRequested)
                | (TaskStatus::Running, TaskStatus::Succeed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::CancelRequested, TaskStatus::Succeed)
                | (TaskStatus::CancelRequested, TaskStatus::Failed)
                | (TaskStatus::CancelRequested, TaskStatus::Canceled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_run_or_be_canceled() {
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Pending,
            TaskStatus::Running
        ));
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Pending,
            TaskStatus::Canceled
        ));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for to in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Succeed,
            TaskStatus::Failed,
            TaskStatus::Canceled,
            TaskStatus::CancelRequested,
        ] {
            for from in [TaskStatus::Succeed, TaskStatus::Failed, TaskStatus::Canceled] {
                assert!(!TaskStateMachine::is_valid_transition(from, to));
            }
        }
    }

    #[test]
    fn pending_cannot_jump_directly_to_succeed() {
        assert!(!TaskStateMachine::is_valid_transition(
            TaskStatus::Pending,
            TaskStatus::Succeed
        ));
    }

    #[test]
    fn cancel_requested_can_still_succeed_or_fail() {
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::CancelRequested,
            TaskStatus::Succeed
        ));
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::CancelRequested,
            TaskStatus::Failed
        ));
    }
}
