pub mod config;
pub mod domain;
pub mod enrichment;
pub mod guidance;
pub mod merge;
pub mod readiness;

pub use domain::client::{
    build_verification_fields, ClientDatum, PersonalInfo, TripDetails, TripKey, TripType,
    VerificationRecord, VerificationStatus,
};
pub use domain::conversation::{ChatMessage, ChatRole};
pub use enrichment::apply_payment_context;
pub use guidance::{compose_profile_guidance, ProfileGuidance};
pub use merge::merge_client_records;
pub use readiness::{evaluate_readiness, PaymentReadiness};
