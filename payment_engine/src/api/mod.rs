mod errors;
mod order_flow_api;

pub use errors::PaymentFlowError;
pub use order_flow_api::{
    AdmitOutcome,
    AttemptResponse,
    PaymentFlowApi,
    PaymentRequest,
    PaymentResult,
    DEFAULT_PROVIDER_TIMEOUT,
};
