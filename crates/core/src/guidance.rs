//! Profile guidance injected into the system prompt so the model knows
//! which traveller data is already on file, what is still missing, and
//! which tool inputs are ready to go.

use serde_json::{json, Map, Value};

use crate::domain::client::{is_blank_value, ClientDatum, TripDetails, TripType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileGuidance {
    pub status: &'static str,
    pub summary_text: String,
}

pub fn compose_profile_guidance(clients: &[ClientDatum]) -> Option<ProfileGuidance> {
    if clients.is_empty() {
        return None;
    }

    let mut entries = Vec::new();
    let mut complete = 0usize;
    let mut partial = 0usize;

    for (index, client) in clients.iter().enumerate() {
        let label = client
            .personal_info
            .name
            .clone()
            .or_else(|| client.client_id.clone())
            .unwrap_or_else(|| format!("Client {}", index + 1));
        let missing = client.required_missing_fields();
        if missing.is_empty() {
            complete += 1;
        } else {
            partial += 1;
        }

        let mut entry = Map::new();
        let mut put = |key: &str, value: Value| {
            if !is_blank_value(&value) {
                entry.insert(key.to_string(), value);
            }
        };

        put("label", Value::from(label));
        put("client_id", client.client_id.clone().map(Value::from).unwrap_or(Value::Null));
        put("source", client.source.clone().map(Value::from).unwrap_or(Value::Null));
        put("verification", Value::from(client.verification.status.as_str()));
        put("missing_fields", json!(missing));
        put("personal_info", Value::Object(compact_personal_info(client)));
        put("interests", json!(client.interests));

        if let Some(trip) = client.preferred_trip() {
            put("trip", Value::Object(serialize_trip(trip)));
            if missing.is_empty() {
                put("tool_inputs", Value::Object(build_tool_hints(client, trip)));
            }
        }

        entries.push(Value::Object(entry));
    }

    let status = if complete > 0 {
        "rich"
    } else if partial > 0 {
        "partial"
    } else {
        "sparse"
    };

    let payload = json!({
        "status": status,
        "clients": entries,
        "workflow": build_instructions(status),
    });

    let summary_text = format!(
        "[Integrated Traveller Data]\n{}",
        serde_json::to_string_pretty(&payload).unwrap_or_default()
    );
    Some(ProfileGuidance { status, summary_text })
}

fn compact_personal_info(client: &ClientDatum) -> Map<String, Value> {
    let info = &client.personal_info;
    let mut payload = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            if !is_blank_value(&value) {
                payload.insert(key.to_string(), value);
            }
        }
    };
    put("name", info.name.clone().map(Value::from));
    put("email", info.email_address.clone().map(Value::from));
    put("phone", info.phone_number.clone().map(Value::from));
    put("residence", info.place_of_residence.clone().map(Value::from));
    put("passport", info.passport_number.clone().map(Value::from));
    put("date_of_birth", info.date_of_birth.map(|date| Value::from(date.to_string())));
    payload
}

fn serialize_trip(trip: &TripDetails) -> Map<String, Value> {
    let mut payload = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            if !is_blank_value(&value) {
                payload.insert(key.to_string(), value);
            }
        }
    };
    put("trip_id", trip.trip_id.clone().map(Value::from));
    put("destination", trip.destination.clone().map(Value::from));
    put("start_date", trip.start_date.map(|date| Value::from(date.to_string())));
    put("end_date", trip.end_date.map(|date| Value::from(date.to_string())));
    put("trip_type", trip.trip_type.map(TripType::as_str).map(Value::from));
    put("trip_cost", trip.trip_cost.map(Value::from));
    if !trip.metadata.is_empty() {
        put("metadata", Some(Value::Object(trip.metadata.clone())));
    }
    put("notes", trip.notes.clone().map(Value::from));
    payload
}

/// Ready-to-send inputs for the advisory tools once a profile is complete.
fn build_tool_hints(client: &ClientDatum, trip: &TripDetails) -> Map<String, Value> {
    let activity = trip
        .metadata
        .get("activity")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| client.interests.first().cloned());

    let mut inputs = Map::new();
    let mut claims = Map::new();
    if let Some(destination) = &trip.destination {
        claims.insert("destination".to_string(), Value::from(destination.clone()));
    }
    if let Some(activity) = activity {
        claims.insert("activity".to_string(), Value::from(activity));
    }
    if let Some(cost) = trip.trip_cost {
        claims.insert("trip_cost".to_string(), Value::from(cost));
    }
    inputs.insert("claims_recommendation".to_string(), Value::Object(claims));
    inputs
}

fn build_instructions(status: &str) -> Vec<String> {
    let lead = if status == "rich" {
        "Profile is complete. After confirmation, immediately run `claims_recommendation` and follow up with `policy_research` to produce tailored options."
    } else {
        "Profile is incomplete. Ask targeted questions to capture the missing information before running recommendation tools."
    };

    vec![
        lead.to_string(),
        "Surface the integration data, confirm accuracy with the traveller, and note any missing items.".to_string(),
        "Always keep responses concise, empathetic, and cite policy sources in answers.".to_string(),
        "Never initiate payment until all required fields are present and the traveller has explicitly confirmed the profile.".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::domain::client::{ClientDatum, PersonalInfo, TripDetails, TripType};

    use super::compose_profile_guidance;

    #[test]
    fn empty_roster_yields_no_guidance() {
        assert!(compose_profile_guidance(&[]).is_none());
    }

    #[test]
    fn sparse_roster_is_flagged_as_incomplete() {
        let guidance = compose_profile_guidance(&[ClientDatum::default()]).expect("guidance");
        assert_eq!(guidance.status, "partial");
        assert!(guidance.summary_text.starts_with("[Integrated Traveller Data]"));
        assert!(guidance.summary_text.contains("Trip details"));
    }

    #[test]
    fn complete_profile_surfaces_tool_hints() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("valid date");
        let client = ClientDatum {
            personal_info: PersonalInfo {
                name: Some("Aisha Tan".to_string()),
                email_address: Some("aisha@example.com".to_string()),
                phone_number: Some("+6598765432".to_string()),
                date_of_birth: Some(date(1991, 6, 15)),
                place_of_residence: Some("Singapore".to_string()),
                passport_number: Some("E1234567".to_string()),
            },
            trips: vec![TripDetails {
                destination: Some("Bali".to_string()),
                start_date: Some(date(2025, 12, 1)),
                end_date: Some(date(2025, 12, 10)),
                trip_type: Some(TripType::Single),
                trip_cost: Some(1800.0),
                ..TripDetails::default()
            }],
            interests: vec!["Diving".to_string()],
            ..ClientDatum::default()
        };

        let guidance = compose_profile_guidance(&[client]).expect("guidance");
        assert_eq!(guidance.status, "rich");
        assert!(guidance.summary_text.contains("claims_recommendation"));
        assert!(guidance.summary_text.contains("Diving"));
        assert!(guidance.summary_text.contains("Profile is complete."));
    }
}
