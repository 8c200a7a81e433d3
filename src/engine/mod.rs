pub mod availability;
pub mod eligibility;
pub mod lifecycle;
pub mod manager;
pub mod pricing;
pub mod tracking;
