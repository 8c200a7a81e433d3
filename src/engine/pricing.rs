use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::driver::VehicleType;

/// Driver share of the fare. Single definition for the whole system.
pub const DRIVER_SHARE: f64 = 0.8;

pub const DEFAULT_MINIMUM_CHARGE: f64 = 300.0;

/// Per-courier overrides. Vehicles missing from `per_km` fall back to the
/// table's bike rate, then to the default table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateTable {
    pub per_km: HashMap<VehicleType, f64>,
    pub minimum_charge: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub total: f64,
    pub driver_earnings: f64,
}

pub fn default_rate_per_km(vehicle: VehicleType) -> f64 {
    match vehicle {
        VehicleType::Bike => 50.0,
        VehicleType::Tuk => 80.0,
        VehicleType::Car => 100.0,
        VehicleType::MiniLorry => 150.0,
        VehicleType::Lorry => 200.0,
        VehicleType::Carrier => 250.0,
    }
}

pub fn quote(rates: Option<&RateTable>, vehicle: VehicleType, distance_km: f64) -> Quote {
    let (per_km, minimum) = match rates {
        Some(table) => {
            let rate = table
                .per_km
                .get(&vehicle)
                .or_else(|| table.per_km.get(&VehicleType::Bike))
                .copied()
                .unwrap_or_else(|| default_rate_per_km(VehicleType::Bike));
            (rate, table.minimum_charge.unwrap_or(DEFAULT_MINIMUM_CHARGE))
        }
        None => (default_rate_per_km(vehicle), DEFAULT_MINIMUM_CHARGE),
    };

    let total = (per_km * distance_km.max(0.0)).max(minimum);
    let driver_earnings = (total * DRIVER_SHARE).round();

    Quote {
        total,
        driver_earnings,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{quote, RateTable, DEFAULT_MINIMUM_CHARGE};
    use crate::models::driver::VehicleType;

    #[test]
    fn short_bike_ride_hits_minimum_charge() {
        let q = quote(None, VehicleType::Bike, 5.0);
        assert_eq!(q.total, 300.0);
        assert_eq!(q.driver_earnings, 240.0);
    }

    #[test]
    fn long_ride_charges_per_km() {
        let q = quote(None, VehicleType::Car, 12.0);
        assert_eq!(q.total, 1200.0);
        assert_eq!(q.driver_earnings, 960.0);
    }

    #[test]
    fn quote_is_deterministic() {
        let a = quote(None, VehicleType::Lorry, 7.3);
        let b = quote(None, VehicleType::Lorry, 7.3);
        assert_eq!(a, b);
    }

    #[test]
    fn driver_share_holds_across_vehicles() {
        for vehicle in [
            VehicleType::Bike,
            VehicleType::Tuk,
            VehicleType::Car,
            VehicleType::MiniLorry,
            VehicleType::Lorry,
            VehicleType::Carrier,
        ] {
            let q = quote(None, vehicle, 9.0);
            assert_eq!(q.driver_earnings, (q.total * 0.8).round());
        }
    }

    #[test]
    fn custom_table_missing_vehicle_falls_back_to_its_bike_rate() {
        let mut per_km = HashMap::new();
        per_km.insert(VehicleType::Bike, 60.0);
        let table = RateTable {
            per_km,
            minimum_charge: Some(100.0),
        };

        let q = quote(Some(&table), VehicleType::Lorry, 10.0);
        assert_eq!(q.total, 600.0);
        assert_eq!(q.driver_earnings, 480.0);
    }

    #[test]
    fn empty_custom_table_uses_default_bike_rate_and_minimum() {
        let table = RateTable::default();
        let q = quote(Some(&table), VehicleType::Carrier, 2.0);
        assert_eq!(q.total, DEFAULT_MINIMUM_CHARGE);
    }

    #[test]
    fn negative_distance_is_clamped() {
        let q = quote(None, VehicleType::Bike, -4.0);
        assert_eq!(q.total, DEFAULT_MINIMUM_CHARGE);
    }
}
