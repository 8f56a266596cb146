//! Grouping pending steps into batches that may run together

use crate::domain::Step;

/// Split `pending` (plan indices, ascending) into batches
///
/// With `max_parallel <= 1` every step is its own batch. Otherwise consecutive
/// steps flagged `can_run_in_parallel` share a batch, up to `max_parallel`,
/// as long as none depends on another step in the same batch. Concatenating
/// the batches always gives back `pending` in order.
pub fn plan_batches(steps: &[Step], pending: &[usize], max_parallel: usize) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for &idx in pending {
        let step = &steps[idx];
        let joins = max_parallel > 1
            && step.can_run_in_parallel
            && current.first().is_some_and(|&first| steps[first].can_run_in_parallel)
            && current.len() < max_parallel
            && !current
                .iter()
                .any(|&j| step.context_step_ids.contains(&steps[j].id));

        if joins {
            current.push(idx);
        } else {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            current.push(idx);
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentRole;

    fn steps() -> Vec<Step> {
        vec![
            Step::new("a", AgentRole::Researcher, "a").parallel(true),
            Step::new("b", AgentRole::Researcher, "b").parallel(true),
            Step::new("c", AgentRole::Researcher, "c").parallel(true).with_context(&["a"]),
            Step::new("d", AgentRole::Developer, "d").with_context(&["c"]),
            Step::new("e", AgentRole::Reviewer, "e").parallel(true),
            Step::new("f", AgentRole::Documenter, "f").parallel(true),
        ]
    }

    #[test]
    fn test_sequential_by_default() {
        let all: Vec<usize> = (0..6).collect();
        assert_eq!(plan_batches(&steps(), &all, 1), vec![vec![0], vec![1], vec![2], vec![3], vec![4], vec![5]]);
    }

    #[test]
    fn test_layers() {
        let all: Vec<usize> = (0..6).collect();
        assert_eq!(plan_batches(&steps(), &all, 4), vec![vec![0, 1], vec![2], vec![3], vec![4, 5]]);
    }

    #[test]
    fn test_cap() {
        let all: Vec<usize> = (0..6).collect();
        let mut s = steps();
        s[2].context_step_ids.clear();
        assert_eq!(plan_batches(&s, &all, 2), vec![vec![0, 1], vec![2], vec![3], vec![4, 5]]);
        assert_eq!(plan_batches(&s, &all, 3), vec![vec![0, 1, 2], vec![3], vec![4, 5]]);
    }

    #[test]
    fn test_order_preserved_with_gaps() {
        let pending = vec![1, 3, 5];
        let batches = plan_batches(&steps(), &pending, 8);
        let flat: Vec<usize> = batches.into_iter().flatten().collect();
        assert_eq!(flat, pending);
    }
}
