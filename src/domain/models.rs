use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Leeway subtracted from a token's lifetime so it is never used right as it
/// expires mid-request.
pub const TOKEN_VALIDITY_BUFFER_SECONDS: i64 = 10;

/// An access/refresh credential pair obtained from the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub auth: String,
    pub refresh: String,
    pub valid_until: DateTime<Utc>,
}

impl Token {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now + Duration::seconds(TOKEN_VALIDITY_BUFFER_SECONDS)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// The energy installation all status/history endpoints are scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub id: i64,
    pub name: String,
}

/// Which traces the energy graph renders; persisted alongside the site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphPreferences {
    pub battery: bool,
    pub solar: bool,
    pub house: bool,
    pub grid: bool,
}

impl Default for GraphPreferences {
    fn default() -> Self {
        Self {
            battery: true,
            solar: true,
            house: true,
            grid: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Day,
    Week,
    Month,
    Year,
    Lifetime,
}

impl TimePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            TimePeriod::Day => "day",
            TimePeriod::Week => "week",
            TimePeriod::Month => "month",
            TimePeriod::Year => "year",
            TimePeriod::Lifetime => "lifetime",
        }
    }
}

/// An entry from the products listing. The payload is discriminated by which
/// id field is present; anything unrecognised is a decode error upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Product {
    Vehicle(Vehicle),
    EnergySite(EnergySiteProduct),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: i64,
    pub vehicle_id: i64,
    pub display_name: String,
    pub option_codes: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EnergySiteProduct {
    pub energy_site_id: i64,
    pub resource_type: String,
    pub site_name: String,
    pub id: String,
    pub gateway_id: String,
    pub energy_left: f64,
    pub total_pack_energy: f64,
    pub percentage_charged: f64,
    pub battery_type: String,
    pub backup_capable: bool,
    pub battery_power: f64,
    pub sync_grid_alert_enabled: bool,
    pub breaker_alert_enabled: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum GridStatus {
    #[serde(rename = "Active")]
    Active,
    #[serde(rename = "Inactive")]
    Inactive,
}

/// Point-in-time power readings for a site, replaced on every poll.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LiveStatus {
    pub solar_power: f64,
    pub percentage_charged: f64,
    pub battery_power: f64,
    pub load_power: f64,
    pub grid_power: f64,
    pub generator_power: f64,
    pub grid_status: GridStatus,
    pub storm_mode_active: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SiteStatus {
    pub resource_type: String,
    pub site_name: String,
    pub gateway_id: String,
    pub percentage_charged: f64,
    pub battery_type: String,
    pub backup_capable: bool,
    pub battery_power: f64,
    pub storm_mode_enabled: bool,
    pub powerwall_onboarding_settings_set: bool,
    pub powerwall_tesla_electric_interested_in: Option<bool>,
    pub sync_grid_alert_enabled: bool,
    pub breaker_alert_enabled: bool,
}

/// One day of 5-minute power samples, ascending by timestamp.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PowerHistory {
    pub serial_number: String,
    pub installation_time_zone: String,
    pub time_series: Vec<PowerSample>,
}

impl PowerHistory {
    pub fn time_zone(&self) -> Option<Tz> {
        self.installation_time_zone.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub solar_power: f64,
    pub battery_power: f64,
    pub grid_power: f64,
    pub grid_services_power: f64,
    pub generator_power: f64,
}

/// Energy totals (Wh) per period bucket, with the named flow components.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EnergyHistory {
    pub serial_number: String,
    pub period: TimePeriod,
    pub installation_time_zone: String,
    pub time_series: Vec<EnergySample>,
}

impl EnergyHistory {
    pub fn time_zone(&self) -> Option<Tz> {
        self.installation_time_zone.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EnergySample {
    pub timestamp: DateTime<Utc>,
    pub solar_energy_exported: f64,
    pub generator_energy_exported: f64,
    pub grid_energy_imported: f64,
    pub grid_services_energy_imported: f64,
    pub grid_services_energy_exported: f64,
    pub grid_energy_exported_from_solar: f64,
    pub grid_energy_exported_from_generator: f64,
    pub grid_energy_exported_from_battery: f64,
    pub battery_energy_exported: f64,
    pub battery_energy_imported_from_grid: f64,
    pub battery_energy_imported_from_solar: f64,
    pub battery_energy_imported_from_generator: f64,
    pub consumer_energy_imported_from_grid: f64,
    pub consumer_energy_imported_from_solar: f64,
    pub consumer_energy_imported_from_battery: f64,
    pub consumer_energy_imported_from_generator: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SelfConsumptionHistory {
    pub period: TimePeriod,
    pub timezone: String,
    pub time_series: Vec<SelfConsumptionSample>,
}

impl SelfConsumptionHistory {
    pub fn time_zone(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SelfConsumptionSample {
    pub timestamp: DateTime<Utc>,
    pub solar: f64,
    pub battery: f64,
}
