//! Pricing aggregator contract
//!
//! Line items and pricing guarantees are sent to the hosted pricing
//! function; the margin-solving itself happens remotely.

pub mod gateway;
pub mod types;

pub use gateway::{HttpPricingGateway, PricingGateway, UnconfiguredPricingGateway};
pub use types::{
    validate_line_items, CalculationRequest, CalculationResponse, Calculations, LineItem,
    LineItemCategory, LinearMeasurements, PercentRange, PricingConfig, PropertyDetails,
    RemoteEstimate, RequestLineItem,
};
