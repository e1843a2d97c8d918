use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uniform blank test: absent, whitespace-only strings, and empty
/// collections all count as "unset" when deciding whether a field may be
/// overwritten or is still missing.
pub fn is_blank_text(value: Option<&str>) -> bool {
    value.map_or(true, |text| text.trim().is_empty())
}

pub fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "emailAddress", skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(alias = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(alias = "dateOfBirth", skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(alias = "placeOfResidence", skip_serializing_if = "Option::is_none")]
    pub place_of_residence: Option<String>,
    #[serde(alias = "passportNumber", skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripType {
    Single,
    Round,
}

impl TripType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Round => "round",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(alias = "startDate", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(alias = "endDate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(alias = "tripType", skip_serializing_if = "Option::is_none")]
    pub trip_type: Option<TripType>,
    #[serde(alias = "tripCost", skip_serializing_if = "Option::is_none")]
    pub trip_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Deduplication identity for a trip: the explicit id when one exists,
/// otherwise the itinerary tuple. Trips without an id and without a
/// destination + start date have no identity and never match anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TripKey {
    Id(String),
    Itinerary {
        destination: String,
        start_date: String,
        end_date: String,
        trip_type: String,
    },
}

impl TripDetails {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank_text(self.destination.as_deref()) {
            missing.push("Trip destination");
        }
        if self.start_date.is_none() {
            missing.push("Trip start date");
        }
        if self.end_date.is_none() {
            missing.push("Trip end date");
        }
        if self.trip_type.is_none() {
            missing.push("Trip type");
        }
        if self.trip_cost.is_none() {
            missing.push("Trip cost");
        }
        missing
    }

    pub fn identity_key(&self) -> Option<TripKey> {
        if let Some(trip_id) = self.trip_id.as_deref() {
            if !trip_id.trim().is_empty() {
                return Some(TripKey::Id(trip_id.to_string()));
            }
        }
        match (&self.destination, &self.start_date) {
            (Some(destination), Some(start)) if !destination.trim().is_empty() => {
                Some(TripKey::Itinerary {
                    destination: destination.trim().to_lowercase(),
                    start_date: start.to_string(),
                    end_date: self.end_date.map(|d| d.to_string()).unwrap_or_default(),
                    trip_type: self.trip_type.map(TripType::as_str).unwrap_or("").to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn format_travel_dates(&self) -> Option<String> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some(format!("{start} -> {end}")),
            (Some(start), None) => Some(start.to_string()),
            (None, Some(end)) => Some(end.to_string()),
            (None, None) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Unknown,
    Pending,
    Confirmed,
}

impl VerificationStatus {
    pub fn priority(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Pending => 1,
            Self::Confirmed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationRecord {
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientDatum {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub personal_info: PersonalInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trips: Vec<TripDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    pub verification: VerificationRecord,
}

impl ClientDatum {
    /// Ordered list of mandatory fields still missing: the six personal
    /// fields, then the preferred trip's gaps. "Trip details" stands in for
    /// all trip fields when no trip is on file.
    pub fn required_missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let info = &self.personal_info;
        if is_blank_text(info.name.as_deref()) {
            missing.push("Name");
        }
        if is_blank_text(info.email_address.as_deref()) {
            missing.push("Email address");
        }
        if is_blank_text(info.phone_number.as_deref()) {
            missing.push("Phone number");
        }
        if info.date_of_birth.is_none() {
            missing.push("Date of birth");
        }
        if is_blank_text(info.place_of_residence.as_deref()) {
            missing.push("Place of residence");
        }
        if is_blank_text(info.passport_number.as_deref()) {
            missing.push("Passport number");
        }

        if self.trips.is_empty() {
            missing.push("Trip details");
            return missing;
        }

        match self.preferred_trip() {
            Some(trip) => missing.extend(trip.missing_fields()),
            None => missing.push("Trip details"),
        }
        missing
    }

    /// The first trip with every required field present, falling back to
    /// the first trip on file.
    pub fn preferred_trip(&self) -> Option<&TripDetails> {
        if self.trips.is_empty() {
            return None;
        }
        self.trips
            .iter()
            .find(|trip| trip.missing_fields().is_empty())
            .or_else(|| self.trips.first())
    }
}

/// Snapshot of the values a traveller is asked to confirm before payment.
pub fn build_verification_fields(client: &ClientDatum) -> Map<String, Value> {
    let info = &client.personal_info;
    let mut fields = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            if !is_blank_value(&value) {
                fields.insert(key.to_string(), value);
            }
        }
    };

    put("name", info.name.clone().map(Value::from));
    put("email_address", info.email_address.clone().map(Value::from));
    put("passport_number", info.passport_number.clone().map(Value::from));
    put("phone_number", info.phone_number.clone().map(Value::from));

    if let Some(trip) = client.preferred_trip() {
        put("destination", trip.destination.clone().map(Value::from));
        put("trip_type", trip.trip_type.map(|t| Value::from(t.as_str())));
        put("trip_cost", trip.trip_cost.map(Value::from));
        put("travel_dates", trip.format_travel_dates().map(Value::from));
    }

    fields
}
