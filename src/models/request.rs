use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::pricing::Quote;
use crate::models::driver::VehicleType;
use crate::models::location::PositionSample;

/// Sender-supplied package facts. Immutable once the request leaves
/// `searching`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDetails {
    pub pickup_address: String,
    pub dropoff_address: String,
    pub package_name: String,
    pub weight_kg: f64,
    pub dimensions: String,
    pub shipment_type: String,
    pub sender_phone: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum PaymentMethod {
    Cash,
    Card,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideDetails {
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
    pub quoted: Quote,
    pub payment_method: PaymentMethod,
}

/// Driver identity frozen onto a request at acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedDriver {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
    pub vehicle_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclinedDriver {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub declined_at: DateTime<Utc>,
}

/// Physical-handling progress of an accepted request, distinct from the
/// coarse lifecycle phase. `Delivered` has no variant here: delivery closes
/// the active phase entirely (see [`Phase::Completed`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Accepted,
    Collecting,
    InTransit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDelivery {
    pub driver: AssignedDriver,
    pub stage: DeliveryStage,
    /// 4-digit code generated once at acceptance. Never regenerated.
    pub delivery_pin: String,
    pub pin_attempts: u32,
    pub accepted_at: DateTime<Utc>,
    pub collection_started_at: Option<DateTime<Utc>>,
    pub package_collected_at: Option<DateTime<Utc>>,
    /// Fallback slot: populated only when a live position could not be
    /// published through the tracking session.
    pub last_known_position: Option<PositionSample>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum CancelledBy {
    Customer,
    Driver,
}

/// Closed taxonomy. New reasons are added here, never as freeform text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum CancellationReason {
    CustomerNotAvailable,
    IncorrectAddress,
    PackageDamaged,
    VehicleBreakdown,
    OtherIssue,
}

impl CancellationReason {
    pub fn label(&self) -> &'static str {
        match self {
            CancellationReason::CustomerNotAvailable => "customer_not_available",
            CancellationReason::IncorrectAddress => "incorrect_address",
            CancellationReason::PackageDamaged => "package_damaged",
            CancellationReason::VehicleBreakdown => "vehicle_breakdown",
            CancellationReason::OtherIssue => "other_issue",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    /// Present when a driver was assigned at the moment of cancellation.
    pub driver: Option<AssignedDriver>,
    pub cancelled_by: CancelledBy,
    pub reason: CancellationReason,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub driver: AssignedDriver,
    pub proof_photo_url: String,
    pub accepted_at: DateTime<Utc>,
    pub package_collected_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// 1-5 stars, settable exactly once after delivery.
    pub customer_rating: Option<u8>,
}

/// Lifecycle phase as a variant family: the fields a stage requires exist
/// only in that stage, so a searching request cannot carry a driver and a
/// cancelled one cannot carry a rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Phase {
    Searching,
    #[serde(rename = "accepted")]
    Active(ActiveDelivery),
    Cancelled(Cancellation),
    Completed(Completion),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Cancelled(_) | Phase::Completed(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub package: PackageDetails,
    pub selected_courier: Uuid,
    pub ride: RideDetails,
    #[serde(flatten)]
    pub phase: Phase,
    /// Append-only; suppresses re-notification for the listed drivers.
    pub declined_drivers: Vec<DeclinedDriver>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRequest {
    pub fn assigned_driver(&self) -> Option<&AssignedDriver> {
        match &self.phase {
            Phase::Searching => None,
            Phase::Active(active) => Some(&active.driver),
            Phase::Cancelled(cancellation) => cancellation.driver.as_ref(),
            Phase::Completed(completion) => Some(&completion.driver),
        }
    }

    pub fn has_declined(&self, driver_id: Uuid) -> bool {
        self.declined_drivers
            .iter()
            .any(|d| d.driver_id == driver_id)
    }
}
