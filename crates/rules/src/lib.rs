//! Reactions to bus events: declarative bindings and when/then workflows.
//!
//! Both sit on a shared [`cartograph_events::EventBus`] and hand concrete
//! work to an [`OperationExecutor`], which owns every interaction with the
//! page.

pub mod binding;
pub mod error;
pub mod operation;
pub mod workflow;

pub use {
    binding::{
        BindingAction, BindingRegistry, BindingRule, BindingTarget, DiscoveryState, TargetResolver,
    },
    error::{Result, RuleError},
    operation::{
        OperationExecutor, OperationOutcome, OperationRequest, OperationTarget, OperationType,
    },
    workflow::{
        DEFAULT_EVALUATION_LIMIT, Evaluation, EvaluationOutcome, RuleAction, RuleSummary,
        WorkflowEngine, WorkflowRule,
    },
};
