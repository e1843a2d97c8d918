pub mod claims;
pub mod documents;
pub mod insurer;
pub mod payments;

pub use claims::{ClaimRecord, ClaimsInsightTool};
pub use documents::TripDocumentScanner;
pub use insurer::{InsurerApiClient, TravelInsurancePurchaseTool};
pub use payments::{PaymentCheckoutTool, PaymentGatewayClient, PaymentStatusTool};
