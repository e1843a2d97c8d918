//! Payment-context backfill: structured fields riding along in a checkout
//! payload (top-level keys and the free-form `metadata` map) are folded
//! into the first incomplete traveller profile so a provider callback can
//! complete a profile without another conversational turn.
//!
//! The key alias tables are carried over from the upstream integration
//! unchanged, including its looser mappings ("city" counts as place of
//! residence). Treat them as business vocabulary, not as a parser to tune.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::domain::client::{
    build_verification_fields, is_blank_value, ClientDatum, TripDetails, TripType,
    VerificationStatus,
};

const PERSONAL_INFO_ALIASES: &[(&str, &str)] = &[
    ("customer_email", "email_address"),
    ("email", "email_address"),
    ("email_address", "email_address"),
    ("contact_email", "email_address"),
    ("name", "name"),
    ("full_name", "name"),
    ("customer_name", "name"),
    ("traveller_name", "name"),
    ("traveler_name", "name"),
    ("phone", "phone_number"),
    ("phone_number", "phone_number"),
    ("contact_number", "phone_number"),
    ("mobile", "phone_number"),
    ("customer_phone", "phone_number"),
    ("customer_phone_number", "phone_number"),
    ("date_of_birth", "date_of_birth"),
    ("dob", "date_of_birth"),
    ("birth_date", "date_of_birth"),
    ("passport", "passport_number"),
    ("passport_number", "passport_number"),
    ("place_of_residence", "place_of_residence"),
    ("residence", "place_of_residence"),
    ("home_city", "place_of_residence"),
    ("city", "place_of_residence"),
    ("address", "place_of_residence"),
];

const TRIP_ALIASES: &[(&str, &str)] = &[
    ("destination", "destination"),
    ("trip_destination", "destination"),
    ("travel_destination", "destination"),
    ("destination_city", "destination"),
    ("start_date", "start_date"),
    ("trip_start_date", "start_date"),
    ("departure_date", "start_date"),
    ("travel_start", "start_date"),
    ("end_date", "end_date"),
    ("trip_end_date", "end_date"),
    ("return_date", "end_date"),
    ("travel_end", "end_date"),
    ("trip_type", "trip_type"),
    ("trip_category", "trip_type"),
    ("trip_cost", "trip_cost"),
    ("total_cost", "trip_cost"),
    ("coverage_amount", "trip_cost"),
    ("premium_amount", "trip_cost"),
];

const RECOGNISED_TOP_LEVEL_KEYS: &[&str] = &[
    "customer_email",
    "customer_name",
    "customer_phone",
    "customer_phone_number",
    "traveller_name",
    "traveler_name",
    "phone_number",
    "passport_number",
    "date_of_birth",
    "place_of_residence",
    "destination",
    "trip_destination",
    "trip_start_date",
    "trip_end_date",
    "trip_type",
    "trip_cost",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B, %Y",
    "%d %b, %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%Y.%m.%d",
    "%d.%m.%Y",
];

/// Folds an arbitrary payload key to the canonical snake_case vocabulary:
/// camelCase boundaries become underscores, every other punctuation run
/// collapses to a single underscore.
pub fn normalize_context_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut snaked = String::with_capacity(trimmed.len() + 4);
    let mut previous: Option<char> = None;
    for ch in trimmed.chars() {
        if ch.is_ascii_uppercase() {
            if matches!(previous, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                snaked.push('_');
            }
            snaked.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_alphanumeric() {
            snaked.push(ch.to_ascii_lowercase());
        } else if !snaked.ends_with('_') {
            snaked.push('_');
        }
        previous = Some(ch);
    }

    snaked.trim_matches('_').to_string()
}

pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = trimmed.parse::<NaiveDate>() {
        return Some(date);
    }
    if let Ok(datetime) = trimmed.parse::<NaiveDateTime>() {
        return Some(datetime.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Accepts plain numbers and currency-formatted strings ("1,800.00",
/// "SGD 500"); the first numeric run wins.
pub fn parse_cost(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => extract_number(text),
        _ => None,
    }
}

fn extract_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let start = cleaned.find(|c: char| c.is_ascii_digit())?;
    let signed_start =
        if start > 0 && cleaned.as_bytes()[start - 1] == b'-' { start - 1 } else { start };

    let mut len = 0;
    let mut seen_dot = false;
    for ch in cleaned[start..].chars() {
        match ch {
            _ if ch.is_ascii_digit() => len += 1,
            '.' if !seen_dot => {
                seen_dot = true;
                len += 1;
            }
            _ => break,
        }
    }

    let number = &cleaned[signed_start..start + len];
    number.strip_suffix('.').unwrap_or(number).parse().ok()
}

pub fn parse_trip_type(value: &Value) -> Option<TripType> {
    let text = match value {
        Value::String(text) => text.trim().to_lowercase(),
        _ => return None,
    };
    match text.as_str() {
        "single" | "single_trip" | "single-trip" | "one_way" | "one-way" => Some(TripType::Single),
        "round" | "round_trip" | "round-trip" | "return" | "return_trip" | "roundtrip" => {
            Some(TripType::Round)
        }
        _ => None,
    }
}

fn as_clean_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lookup(aliases: &[(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    aliases
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, field)| *field)
}

fn collect_context(payload: &Value) -> Map<String, Value> {
    let mut aggregated = Map::new();
    let Some(object) = payload.as_object() else {
        return aggregated;
    };

    let mut collect = |key: &str, value: &Value| {
        let normalized = normalize_context_key(key);
        if normalized.is_empty() || is_blank_value(value) {
            return;
        }
        aggregated.entry(normalized).or_insert_with(|| value.clone());
    };

    for key in RECOGNISED_TOP_LEVEL_KEYS {
        if let Some(value) = object.get(*key) {
            collect(key, value);
        }
    }
    if let Some(metadata) = object.get("metadata").and_then(Value::as_object) {
        for (key, value) in metadata {
            collect(key, value);
        }
    }

    aggregated
}

/// Applies the collected context to one client in place. Returns whether
/// anything changed.
pub fn enrich_client_from_payment_payload(client: &mut ClientDatum, payload: &Value) -> bool {
    let aggregated = collect_context(payload);
    if aggregated.is_empty() {
        return false;
    }

    let mut updated = false;

    for (key, value) in &aggregated {
        let Some(field) = lookup(PERSONAL_INFO_ALIASES, key) else {
            continue;
        };
        let info = &mut client.personal_info;
        match field {
            "date_of_birth" => {
                if let Some(parsed) = as_clean_text(value).and_then(|t| parse_flexible_date(&t)) {
                    if info.date_of_birth != Some(parsed) {
                        info.date_of_birth = Some(parsed);
                        updated = true;
                    }
                }
            }
            "email_address" => {
                if let Some(text) = as_clean_text(value) {
                    let lowered = text.to_lowercase();
                    if info.email_address.as_deref().map(str::trim) != Some(lowered.as_str()) {
                        info.email_address = Some(lowered);
                        updated = true;
                    }
                }
            }
            _ => {
                if let Some(text) = as_clean_text(value) {
                    let slot = match field {
                        "name" => &mut info.name,
                        "phone_number" => &mut info.phone_number,
                        "place_of_residence" => &mut info.place_of_residence,
                        "passport_number" => &mut info.passport_number,
                        _ => continue,
                    };
                    if slot.as_deref().map(str::trim) != Some(text.as_str()) {
                        *slot = Some(text);
                        updated = true;
                    }
                }
            }
        }
    }

    let mut trip_updates = TripDetails::default();
    for (key, value) in &aggregated {
        let Some(field) = lookup(TRIP_ALIASES, key) else {
            continue;
        };
        match field {
            "destination" => trip_updates.destination = as_clean_text(value),
            "start_date" => {
                trip_updates.start_date = as_clean_text(value).and_then(|t| parse_flexible_date(&t))
            }
            "end_date" => {
                trip_updates.end_date = as_clean_text(value).and_then(|t| parse_flexible_date(&t))
            }
            "trip_type" => trip_updates.trip_type = parse_trip_type(value),
            "trip_cost" => trip_updates.trip_cost = parse_cost(value),
            _ => {}
        }
    }

    if trip_updates != TripDetails::default() {
        let trip_index = match preferred_trip_index(client) {
            Some(index) => index,
            None => {
                client.trips.push(TripDetails::default());
                client.trips.len() - 1
            }
        };
        updated |= apply_trip_updates(&mut client.trips[trip_index], &trip_updates);
    }

    if updated && client.verification.status != VerificationStatus::Confirmed {
        client.verification.fields = build_verification_fields(client);
    }

    updated
}

fn preferred_trip_index(client: &ClientDatum) -> Option<usize> {
    if client.trips.is_empty() {
        return None;
    }
    client
        .trips
        .iter()
        .position(|trip| trip.missing_fields().is_empty())
        .or(Some(0))
}

fn apply_trip_updates(trip: &mut TripDetails, updates: &TripDetails) -> bool {
    let mut changed = false;
    if let Some(destination) = &updates.destination {
        if trip.destination.as_deref().map(str::trim) != Some(destination.as_str()) {
            trip.destination = Some(destination.clone());
            changed = true;
        }
    }
    if updates.start_date.is_some() && trip.start_date != updates.start_date {
        trip.start_date = updates.start_date;
        changed = true;
    }
    if updates.end_date.is_some() && trip.end_date != updates.end_date {
        trip.end_date = updates.end_date;
        changed = true;
    }
    if updates.trip_type.is_some() && trip.trip_type != updates.trip_type {
        trip.trip_type = updates.trip_type;
        changed = true;
    }
    if updates.trip_cost.is_some() && trip.trip_cost != updates.trip_cost {
        trip.trip_cost = updates.trip_cost;
        changed = true;
    }
    changed
}

/// Roster-level entry point: the first profile that still has gaps receives
/// the backfill. Returns the replacement roster only when something changed.
pub fn apply_payment_context(
    clients: &[ClientDatum],
    payload: &Value,
) -> Option<Vec<ClientDatum>> {
    if clients.is_empty() || !payload.is_object() {
        return None;
    }

    let target = clients
        .iter()
        .position(|client| !client.required_missing_fields().is_empty())?;

    let mut updated_roster = clients.to_vec();
    if enrich_client_from_payment_payload(&mut updated_roster[target], payload) {
        Some(updated_roster)
    } else {
        None
    }
}
