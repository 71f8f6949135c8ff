//! Simulated collaborators
//!
//! Stand-ins for the weather, air-quality, hazard-model, alerting and
//! satellite catalogue services. Each source decides per poll whether
//! anything changed (`update_chance`) and synthesizes plausible records.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

use crate::producer::UpdateSource;
use crate::utils::error::SourceError;

/// Cities polled every round: name, latitude, longitude.
const MONITORED_LOCATIONS: [(&str, f64, f64); 8] = [
    ("New York", 40.7128, -74.0060),
    ("London", 51.5074, -0.1278),
    ("Tokyo", 35.6762, 139.6503),
    ("Sydney", -33.8688, 151.2093),
    ("Mumbai", 19.0760, 72.8777),
    ("São Paulo", -23.5505, -46.6333),
    ("Cairo", 30.0444, 31.2357),
    ("Mexico City", 19.4326, -99.1332),
];

const POLLUTANTS: [&str; 4] = ["pm25", "pm10", "o3", "no2"];

/// Routine weather and air-quality readings for the monitored cities.
#[derive(Debug, Clone)]
pub struct EnvironmentalReadings {
    update_chance: f64,
}

impl Default for EnvironmentalReadings {
    fn default() -> Self {
        Self { update_chance: 1.0 }
    }
}

impl EnvironmentalReadings {
    pub fn with_update_chance(update_chance: f64) -> Self {
        Self {
            update_chance: update_chance.clamp(0.0, 1.0),
        }
    }

    fn readings(&self) -> Vec<Value> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.update_chance) {
            return Vec::new();
        }

        let now = Utc::now();
        MONITORED_LOCATIONS
            .iter()
            .map(|&(name, lat, lon)| {
                let aqi: u32 = rng.gen_range(15..=180);
                json!({
                    "location": {"name": name, "lat": lat, "lon": lon},
                    "environmental_data": {
                        "temperature_c": rng.gen_range(-5.0..38.0_f64).round(),
                        "humidity_pct": rng.gen_range(20..=95),
                        "wind_speed_ms": rng.gen_range(0.0..15.0_f64).round(),
                        "aqi": aqi,
                        "aqi_category": aqi_category(aqi),
                        "dominant_pollutant": POLLUTANTS.choose(&mut rng),
                    },
                    "update_type": "routine",
                    "timestamp": now,
                })
            })
            .collect()
    }
}

fn aqi_category(aqi: u32) -> &'static str {
    match aqi {
        0..=50 => "good",
        51..=100 => "moderate",
        101..=150 => "unhealthy_for_sensitive_groups",
        151..=200 => "unhealthy",
        201..=300 => "very_unhealthy",
        _ => "hazardous",
    }
}

#[async_trait]
impl UpdateSource for EnvironmentalReadings {
    fn name(&self) -> &str {
        "environmental-readings"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.readings())
    }
}

/// Risk changes reported by the hazard models.
#[derive(Debug, Clone)]
pub struct HazardFeed {
    update_chance: f64,
}

impl Default for HazardFeed {
    fn default() -> Self {
        Self { update_chance: 0.3 }
    }
}

impl HazardFeed {
    pub fn with_update_chance(update_chance: f64) -> Self {
        Self {
            update_chance: update_chance.clamp(0.0, 1.0),
        }
    }

    fn updates(&self) -> Vec<Value> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.update_chance) {
            return Vec::new();
        }

        let now = Utc::now();
        let templates = [
            json!({
                "location": {"name": "California", "lat": 36.7783, "lon": -119.4179},
                "hazard_type": "wildfire",
                "risk_level": "high",
                "risk_score": 78,
                "trend": "increasing",
                "factors": ["High temperature", "Low humidity", "Strong winds"],
                "update_type": "risk_increase",
                "timestamp": now,
            }),
            json!({
                "location": {"name": "Bangladesh", "lat": 23.6850, "lon": 90.3563},
                "hazard_type": "flood",
                "risk_level": "moderate",
                "risk_score": 65,
                "trend": "stable",
                "factors": ["Monsoon season", "River levels"],
                "update_type": "routine_monitoring",
                "timestamp": now,
            }),
        ];
        let count = rng.gen_range(1..=templates.len());
        templates.into_iter().take(count).collect()
    }
}

#[async_trait]
impl UpdateSource for HazardFeed {
    fn name(&self) -> &str {
        "hazard-feed"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.updates())
    }
}

struct AlertTemplate {
    hazard_type: &'static str,
    risk_level: &'static str,
    title: &'static str,
    description: &'static str,
    location_name: &'static str,
    severity: &'static str,
    urgency: &'static str,
}

const ALERT_TEMPLATES: [AlertTemplate; 3] = [
    AlertTemplate {
        hazard_type: "wildfire",
        risk_level: "high",
        title: "Red Flag Warning - Extreme Fire Danger",
        description: "Critical fire weather conditions with high winds and low humidity. Avoid all outdoor burning.",
        location_name: "Southern California",
        severity: "severe",
        urgency: "immediate",
    },
    AlertTemplate {
        hazard_type: "flood",
        risk_level: "moderate",
        title: "Flood Watch - Heavy Rainfall Expected",
        description: "Heavy rainfall may cause flooding in low-lying areas. Monitor local conditions.",
        location_name: "Mississippi River Basin",
        severity: "moderate",
        urgency: "expected",
    },
    AlertTemplate {
        hazard_type: "heatwave",
        risk_level: "high",
        title: "Excessive Heat Warning",
        description: "Dangerous heat with temperatures exceeding 40°C. Take precautions to avoid heat illness.",
        location_name: "Phoenix, Arizona",
        severity: "severe",
        urgency: "immediate",
    },
];

/// Emergency alerts and warnings.
#[derive(Debug, Clone)]
pub struct AlertFeed {
    update_chance: f64,
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self { update_chance: 0.1 }
    }
}

impl AlertFeed {
    pub fn with_update_chance(update_chance: f64) -> Self {
        Self {
            update_chance: update_chance.clamp(0.0, 1.0),
        }
    }

    fn alerts(&self) -> Vec<Value> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.update_chance) {
            return Vec::new();
        }
        let Some(template) = ALERT_TEMPLATES.choose(&mut rng) else {
            return Vec::new();
        };

        let now = Utc::now();
        vec![json!({
            "id": format!("sim_{}", rng.gen_range(1000..=9999)),
            "hazard_type": template.hazard_type,
            "risk_level": template.risk_level,
            "title": template.title,
            "description": template.description,
            "location_name": template.location_name,
            "severity": template.severity,
            "urgency": template.urgency,
            "issued_at": now,
            "valid_until": now + Duration::hours(12),
            "aoi_geometry": null,
            "alert_type": "simulated",
            "timestamp": now,
        })]
    }
}

#[async_trait]
impl UpdateSource for AlertFeed {
    fn name(&self) -> &str {
        "alert-feed"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.alerts())
    }
}

const SATELLITES: [&str; 4] = ["Sentinel-2A", "Sentinel-2B", "Landsat-8", "Landsat-9"];
const DATA_QUALITY: [&str; 3] = ["excellent", "good", "fair"];

/// New scenes landing in the satellite catalogue.
#[derive(Debug, Clone)]
pub struct SatelliteFeed {
    update_chance: f64,
}

impl Default for SatelliteFeed {
    fn default() -> Self {
        Self { update_chance: 0.2 }
    }
}

impl SatelliteFeed {
    pub fn with_update_chance(update_chance: f64) -> Self {
        Self {
            update_chance: update_chance.clamp(0.0, 1.0),
        }
    }

    fn scenes(&self) -> Vec<Value> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.update_chance) {
            return Vec::new();
        }

        let now = Utc::now();
        vec![json!({
            "satellite": SATELLITES.choose(&mut rng),
            "data_type": "optical",
            "acquisition_time": now,
            "coverage_area": "Global",
            "cloud_coverage": rng.gen_range(5..=30),
            "data_quality": DATA_QUALITY.choose(&mut rng),
            "processing_level": "L2A",
            "availability": "immediate",
            "update_type": "new_data_available",
            "timestamp": now,
        })]
    }
}

#[async_trait]
impl UpdateSource for SatelliteFeed {
    fn name(&self) -> &str {
        "satellite-feed"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.scenes())
    }
}
