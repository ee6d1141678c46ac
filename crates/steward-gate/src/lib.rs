//! Gate engine: mandatory checks at git lifecycle stages.

pub mod commit;
pub mod engine;
pub mod git;
pub mod remediation;
pub mod settings;
pub mod stage;
pub mod tool;
pub mod toolchain;

pub use engine::{
    accept_command, override_context, override_scope, GateEngine, GateRequest, StageReport, Verdict,
    GATE_CHECK_TRANSITION, GATE_OVERRIDE_REFUSED, GATE_STAGE_VERDICT, OVERRIDE_POLICY,
    PROTECTED_BRANCH_REASON,
};
pub use remediation::{Remediation, RemediationReport, RemediationStep, StepRecord};
pub use settings::GateSettings;
pub use stage::{CheckStatus, GateCheckResult, Stage};
pub use tool::{Stack, Tool, ToolCommand};
pub use toolchain::{CheckOutcome, ProcessToolchain, Toolchain};
