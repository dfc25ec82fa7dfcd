//! Fan-out of one generation task per topic, joined by a finalize step.

use crate::error::QueueError;
use crate::queue::{Task, TaskEnvelope, TaskOutcome, TaskQueue};

/// Generation tasks for a job's topics plus the finalize continuation.
#[derive(Debug, Clone)]
pub struct FanOutPlan {
    pub job_id: String,
    pub members: Vec<TaskEnvelope>,
    pub continuation: TaskEnvelope,
}

/// Builds the plan for `topics`, given as `(name, topic id)` pairs in
/// extraction order. Every member starts at attempt 0.
pub fn plan<I>(job_id: &str, topics: I) -> FanOutPlan
where
    I: IntoIterator<Item = (String, String)>,
{
    let members = topics
        .into_iter()
        .map(|(topic, topic_id)| {
            TaskEnvelope::new(Task::GenerateQuiz {
                job_id: job_id.to_string(),
                topic,
                topic_id,
            })
        })
        .collect();

    FanOutPlan {
        job_id: job_id.to_string(),
        members,
        continuation: TaskEnvelope::new(Task::Finalize {
            job_id: job_id.to_string(),
        }),
    }
}

impl FanOutPlan {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Hands the plan to the queue's chord primitive.
    pub fn schedule(self, queue: &dyn TaskQueue) -> Result<(), QueueError> {
        queue.chord(self.members, self.continuation)
    }
}

impl From<FanOutPlan> for TaskOutcome {
    fn from(plan: FanOutPlan) -> Self {
        TaskOutcome::FanOut {
            members: plan.members,
            continuation: plan.continuation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ManualQueue;

    #[test]
    fn test_plan_one_member_per_topic() {
        let plan = plan(
            "job-1",
            vec![
                ("Cells".to_string(), "t-1".to_string()),
                ("Genes".to_string(), "t-2".to_string()),
            ],
        );
        assert_eq!(plan.len(), 2);
        assert!(plan.members.iter().all(|m| m.attempt == 0 && m.chord.is_none()));
        assert!(matches!(
            &plan.members[1].task,
            Task::GenerateQuiz { topic, topic_id, job_id }
                if topic == "Genes" && topic_id == "t-2" && job_id == "job-1"
        ));
        assert_eq!(
            plan.continuation.task,
            Task::Finalize {
                job_id: "job-1".to_string()
            }
        );
    }

    #[test]
    fn test_empty_plan_schedules_finalize_immediately() {
        let queue = ManualQueue::new();
        let plan = plan("job-0", Vec::new());
        assert!(plan.is_empty());

        plan.schedule(&queue).unwrap();
        let ready = queue.ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].task.kind(), "finalize");
    }

    #[test]
    fn test_scheduled_members_share_chord() {
        let queue = ManualQueue::new();
        plan(
            "job-1",
            vec![
                ("A".to_string(), "a".to_string()),
                ("B".to_string(), "b".to_string()),
            ],
        )
        .schedule(&queue)
        .unwrap();

        let ready = queue.ready();
        assert_eq!(ready.len(), 2);
        let chord = ready[0].chord.clone().unwrap();
        assert_eq!(ready[1].chord.as_deref(), Some(chord.as_str()));
        assert_eq!(queue.chords().pending(&chord), Some(2));
    }
}
