//! Sinain Escalation - Scoring, cooldown/dedup orchestration, and the
//! assistant gateway client with HTTP fall-back

pub mod gateway;
pub mod message;
pub mod orchestrator;
pub mod score;

pub use gateway::{AssistantGateway, GatewayClientConfig};
pub use message::build_escalation_message;
pub use orchestrator::{GatewayEventCallback, Orchestrator, OrchestratorConfig};
pub use score::{
    calculate_escalation_score, decide_escalation, ocr_matches_error, EscalationScore, GateInput,
    ESCALATION_THRESHOLD,
};
