pub mod estimate;
pub mod inquiry;

pub use estimate::Estimate;
pub use inquiry::{FieldsUpdate, ImageAttachment, Inquiry, InquiryFields, InquiryStatus};
