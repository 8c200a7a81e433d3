use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VehicleType {
    Bike,
    Tuk,
    Car,
    MiniLorry,
    Lorry,
    Carrier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Suspended,
}

/// Online flag and current ride held together so every update touches both
/// in one write. Availability is derived, never stored, so
/// `current_ride_id.is_some()` can never coexist with "available".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub is_online: bool,
    pub current_ride_id: Option<Uuid>,
}

impl Availability {
    pub fn offline() -> Self {
        Self {
            is_online: false,
            current_ride_id: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.is_online && self.current_ride_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub courier_id: Uuid,
    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
    pub approval: ApprovalStatus,
    pub availability: Availability,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The snapshot of driver fields the eligibility filter reads. Kept small so
/// the request manager can refresh it without cloning the whole record.
#[derive(Debug, Clone)]
pub struct DriverView {
    pub id: Uuid,
    pub courier_id: Uuid,
    pub vehicle_type: VehicleType,
    pub availability: Availability,
}

impl From<&Driver> for DriverView {
    fn from(driver: &Driver) -> Self {
        Self {
            id: driver.id,
            courier_id: driver.courier_id,
            vehicle_type: driver.vehicle_type,
            availability: driver.availability.clone(),
        }
    }
}
