pub mod confirmation;
pub mod evaluation_service;

pub use evaluation_service::{
    AlertKind, AlertReport, AlertingSettings, EvaluationError, EvaluationService, StatusTransition,
};
