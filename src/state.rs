use crate::config::AppConfig;
use crate::services::ai::estimate::Estimator;
use crate::services::intake::IntakeSessions;
use crate::services::repository::InquiryRepository;
use crate::services::triage::TriageConsole;

pub struct AppState {
    pub config: AppConfig,
    pub repository: InquiryRepository,
    pub estimator: Estimator,
    pub intake: IntakeSessions,
    pub console: TriageConsole,
}
