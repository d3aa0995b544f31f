#![allow(dead_code, unused_imports)]

pub use buildplan_test_utils::builders;
pub use buildplan_test_utils::recording;
pub use buildplan_test_utils::{definition, init_tracing, plan_for, plan_with, work};

use buildplan::graph::NodeState;
use buildplan::plan::ExecutionPlan;

/// Rendered task paths of the plan, in execution order.
pub fn plan_order(plan: &ExecutionPlan) -> Vec<String> {
    plan.plan_nodes().map(|node| node.work().to_string()).collect()
}

pub fn state(plan: &ExecutionPlan, task: &str) -> Option<NodeState> {
    plan.state_of(&work(task))
}
