pub mod client;
pub mod signature;

pub use client::{
    to_minor_units, ChargeAuthorization, ChargeRequest, ChargeStatus, GatewayUnavailable,
    PaymentGateway, PaystackClient,
};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
