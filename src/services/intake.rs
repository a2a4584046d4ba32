use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::models::{Estimate, FieldsUpdate, ImageAttachment, Inquiry, InquiryFields};
use crate::services::ai::estimate::{Estimator, DEFAULT_DESCRIPTION};
use crate::services::repository::{InquiryRepository, RepositoryError};

pub const ACK_TITLE: &str = "送信完了！";
pub const ACK_MESSAGE: &str = "お問い合わせありがとうございます。担当者より順次ご連絡いたします。";

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("required field is empty: {0}")]
    MissingField(&'static str),

    #[error("no image attached")]
    NoImage,

    #[error("an estimate is already in progress")]
    AlreadyEstimating,

    #[error("an estimate already exists for this image")]
    AlreadyEstimated,

    #[error("draft not found: {0}")]
    DraftNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftPhase {
    Empty,
    ImageAttached,
    Estimating,
    Estimated,
}

#[derive(Debug, Clone, PartialEq)]
enum EstimateSlot {
    Idle,
    Pending { generation: u64 },
    Ready(Estimate),
}

#[derive(Debug, Clone)]
pub struct EstimateTicket {
    pub generation: u64,
    pub image: ImageAttachment,
    pub description: String,
}

/// One customer's in-progress inquiry form.
///
/// `generation` increases on every image attachment and reset; an estimate
/// is only applied if it was issued for the current generation.
#[derive(Debug, Clone)]
pub struct IntakeDraft {
    fields: InquiryFields,
    image: Option<ImageAttachment>,
    estimate: EstimateSlot,
    generation: u64,
}

impl Default for IntakeDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeDraft {
    pub fn new() -> Self {
        Self {
            fields: InquiryFields::default(),
            image: None,
            estimate: EstimateSlot::Idle,
            generation: 0,
        }
    }

    pub fn phase(&self) -> DraftPhase {
        match (&self.image, &self.estimate) {
            (None, _) => DraftPhase::Empty,
            (Some(_), EstimateSlot::Idle) => DraftPhase::ImageAttached,
            (Some(_), EstimateSlot::Pending { .. }) => DraftPhase::Estimating,
            (Some(_), EstimateSlot::Ready(_)) => DraftPhase::Estimated,
        }
    }

    pub fn fields(&self) -> &InquiryFields {
        &self.fields
    }

    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    pub fn estimate(&self) -> Option<&Estimate> {
        match &self.estimate {
            EstimateSlot::Ready(estimate) => Some(estimate),
            _ => None,
        }
    }

    pub fn update_fields(&mut self, update: FieldsUpdate) {
        self.fields.apply(update);
    }

    pub fn attach_image(&mut self, image: ImageAttachment) {
        self.generation += 1;
        self.image = Some(image);
        self.estimate = EstimateSlot::Idle;
    }

    pub fn begin_estimate(&mut self) -> Result<EstimateTicket, IntakeError> {
        let image = match (&self.image, &self.estimate) {
            (None, _) => return Err(IntakeError::NoImage),
            (Some(_), EstimateSlot::Pending { .. }) => return Err(IntakeError::AlreadyEstimating),
            (Some(_), EstimateSlot::Ready(_)) => return Err(IntakeError::AlreadyEstimated),
            (Some(image), EstimateSlot::Idle) => image.clone(),
        };

        let description = self
            .fields
            .description()
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string();

        self.estimate = EstimateSlot::Pending {
            generation: self.generation,
        };

        Ok(EstimateTicket {
            generation: self.generation,
            image,
            description,
        })
    }

    pub fn complete_estimate(&mut self, generation: u64, estimate: Estimate) -> bool {
        match self.estimate {
            EstimateSlot::Pending { generation: pending } if pending == generation => {
                self.estimate = EstimateSlot::Ready(estimate);
                true
            }
            _ => false,
        }
    }

    // Back to ImageAttached when a call ends without a result.
    pub fn abandon_estimate(&mut self, generation: u64) -> bool {
        match self.estimate {
            EstimateSlot::Pending { generation: pending } if pending == generation => {
                self.estimate = EstimateSlot::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<(), IntakeError> {
        match self.fields.missing_required() {
            Some(field) => Err(IntakeError::MissingField(field)),
            None => Ok(()),
        }
    }

    pub fn submit(&mut self, repository: &InquiryRepository) -> Result<Inquiry, IntakeError> {
        let inquiry = submit_inquiry(
            repository,
            self.fields.clone(),
            self.image.clone(),
            self.estimate(),
        )?;
        self.reset();
        Ok(inquiry)
    }

    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new();
        self.generation = generation;
    }

    pub fn view(&self, draft_id: &str) -> DraftView {
        DraftView {
            draft_id: draft_id.to_string(),
            phase: self.phase(),
            fields: self.fields.clone(),
            preview_url: self.image.as_ref().map(|i| i.preview_url.clone()),
            estimate: self.estimate().cloned(),
        }
    }
}

pub fn submit_inquiry(
    repository: &InquiryRepository,
    fields: InquiryFields,
    image: Option<ImageAttachment>,
    estimate: Option<&Estimate>,
) -> Result<Inquiry, IntakeError> {
    if let Some(field) = fields.missing_required() {
        return Err(IntakeError::MissingField(field));
    }

    let inquiry = Inquiry::new(fields, image, estimate.map(Estimate::annotation));
    repository.append(inquiry.clone())?;
    Ok(inquiry)
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftView {
    pub draft_id: String,
    pub phase: DraftPhase,
    pub fields: InquiryFields,
    pub preview_url: Option<String>,
    pub estimate: Option<Estimate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateOutcome {
    pub estimate: Estimate,
    /// `false` when the draft changed while the call was in flight.
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionAck {
    pub inquiry_id: String,
    pub title: &'static str,
    pub message: &'static str,
    pub dismiss_after_secs: u64,
}

impl SubmissionAck {
    pub fn new(inquiry_id: String, dismiss_after_secs: u64) -> Self {
        Self {
            inquiry_id,
            title: ACK_TITLE,
            message: ACK_MESSAGE,
            dismiss_after_secs,
        }
    }
}

pub const DEFAULT_DRAFT_IDLE: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_DRAFTS: usize = 1000;

struct DraftEntry {
    draft: IntakeDraft,
    touched: Instant,
}

pub struct IntakeSessions {
    drafts: Mutex<HashMap<String, DraftEntry>>,
    idle_timeout: Duration,
    max_drafts: usize,
}

impl Default for IntakeSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakeSessions {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_DRAFT_IDLE, DEFAULT_MAX_DRAFTS)
    }

    pub fn with_limits(idle_timeout: Duration, max_drafts: usize) -> Self {
        Self {
            drafts: Mutex::new(HashMap::new()),
            idle_timeout,
            max_drafts: max_drafts.max(1),
        }
    }

    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut drafts = self.lock();
        self.evict(&mut drafts);
        drafts.insert(
            id.clone(),
            DraftEntry {
                draft: IntakeDraft::new(),
                touched: Instant::now(),
            },
        );
        tracing::debug!(draft_id = %id, open = drafts.len(), "draft created");
        id
    }

    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with_draft<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut IntakeDraft) -> T,
    ) -> Result<T, IntakeError> {
        let mut drafts = self.lock();
        let entry = drafts
            .get_mut(id)
            .filter(|e| e.touched.elapsed() < self.idle_timeout)
            .ok_or_else(|| IntakeError::DraftNotFound(id.to_string()))?;
        entry.touched = Instant::now();
        Ok(f(&mut entry.draft))
    }

    pub async fn request_estimate(
        &self,
        id: &str,
        estimator: &Estimator,
    ) -> Result<EstimateOutcome, IntakeError> {
        let ticket = self.with_draft(id, IntakeDraft::begin_estimate)??;
        let mut pending = PendingEstimate {
            sessions: self,
            id,
            generation: ticket.generation,
            armed: true,
        };

        let estimate = estimator
            .estimate(&ticket.image, &ticket.description)
            .await;
        pending.armed = false;

        let applied = self
            .with_draft(id, |draft| {
                draft.complete_estimate(ticket.generation, estimate.clone())
            })
            .unwrap_or(false);

        if !applied {
            tracing::info!(draft_id = %id, "discarding stale estimate");
        }

        Ok(EstimateOutcome { estimate, applied })
    }

    // The submitted draft is dropped; a follow-up inquiry starts a new draft.
    pub fn submit(
        &self,
        id: &str,
        repository: &InquiryRepository,
    ) -> Result<Inquiry, IntakeError> {
        let inquiry = self.with_draft(id, |draft| draft.submit(repository))??;
        self.remove(id);
        Ok(inquiry)
    }

    fn evict(&self, drafts: &mut HashMap<String, DraftEntry>) {
        let before = drafts.len();
        drafts.retain(|_, e| e.touched.elapsed() < self.idle_timeout);

        while drafts.len() >= self.max_drafts {
            let oldest = drafts
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => drafts.remove(&id),
                None => break,
            };
        }

        if drafts.len() < before {
            tracing::debug!(evicted = before - drafts.len(), "released idle drafts");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DraftEntry>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Reopens the draft if the estimating future is dropped before the call returns,
// e.g. when the client disconnects.
struct PendingEstimate<'a> {
    sessions: &'a IntakeSessions,
    id: &'a str,
    generation: u64,
    armed: bool,
}

impl Drop for PendingEstimate<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        let reopened = self
            .sessions
            .with_draft(self.id, |draft| draft.abandon_estimate(generation))
            .unwrap_or(false);
        if reopened {
            tracing::info!(draft_id = %self.id, "estimate abandoned, draft reopened");
        }
    }
}
