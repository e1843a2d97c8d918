//! Roster reconciliation: incoming traveller records are matched against
//! the existing session roster by identity keys and merged field by field.
//! All functions build new records; inputs are never mutated.

use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::domain::client::{
    is_blank_text, ClientDatum, PersonalInfo, TripDetails, VerificationRecord, VerificationStatus,
};

pub fn merge_client_records(
    existing: &[ClientDatum],
    incoming: &[ClientDatum],
) -> Vec<ClientDatum> {
    let mut merged: Vec<ClientDatum> = existing.to_vec();
    for candidate in incoming {
        match find_matching_index(&merged, candidate) {
            Some(index) => merged[index] = merge_client(&merged[index], candidate),
            None => merged.push(candidate.clone()),
        }
    }
    merged
}

/// Normalized identity keys for a client: any of client id, passport,
/// email, or phone number that is present. Namespaced so a passport can
/// never collide with an email.
fn identity_keys(client: &ClientDatum) -> BTreeSet<(&'static str, String)> {
    let mut keys = BTreeSet::new();
    if let Some(client_id) = non_blank(client.client_id.as_deref()) {
        keys.insert(("client_id", client_id.to_lowercase()));
    }
    if let Some(passport) = non_blank(client.personal_info.passport_number.as_deref()) {
        keys.insert(("passport_number", passport.to_uppercase()));
    }
    if let Some(email) = non_blank(client.personal_info.email_address.as_deref()) {
        keys.insert(("email_address", email.to_lowercase()));
    }
    if let Some(phone) = non_blank(client.personal_info.phone_number.as_deref()) {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        keys.insert(("phone_number", digits));
    }
    keys
}

fn find_matching_index(existing: &[ClientDatum], candidate: &ClientDatum) -> Option<usize> {
    let candidate_keys = identity_keys(candidate);
    if candidate_keys.is_empty() {
        return find_relaxed_match(existing, candidate);
    }

    existing
        .iter()
        .position(|client| !identity_keys(client).is_disjoint(&candidate_keys))
}

/// Without strong identifiers a candidate only matches when the roster
/// leaves no ambiguity: a lone client, a unique channel, or a unique name.
fn find_relaxed_match(existing: &[ClientDatum], candidate: &ClientDatum) -> Option<usize> {
    if existing.len() == 1 {
        return Some(0);
    }

    if let Some(source) = candidate.source.as_deref() {
        let matches: Vec<usize> = existing
            .iter()
            .enumerate()
            .filter(|(_, client)| client.source.as_deref() == Some(source))
            .map(|(index, _)| index)
            .collect();
        if matches.len() == 1 {
            return Some(matches[0]);
        }
    }

    if let Some(name) = non_blank(candidate.personal_info.name.as_deref()) {
        let wanted = name.to_lowercase();
        let matches: Vec<usize> = existing
            .iter()
            .enumerate()
            .filter(|(_, client)| {
                client
                    .personal_info
                    .name
                    .as_deref()
                    .map(|existing_name| existing_name.trim().to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .map(|(index, _)| index)
            .collect();
        if matches.len() == 1 {
            return Some(matches[0]);
        }
    }

    None
}

fn merge_client(target: &ClientDatum, source: &ClientDatum) -> ClientDatum {
    let prefer_source = source.verification.status == VerificationStatus::Confirmed;

    let mut merged = target.clone();
    if is_blank_text(merged.client_id.as_deref()) && !is_blank_text(source.client_id.as_deref()) {
        merged.client_id = source.client_id.clone();
    }
    if is_blank_text(merged.source.as_deref()) && !is_blank_text(source.source.as_deref()) {
        merged.source = source.source.clone();
    }

    merged.personal_info =
        merge_personal_info(&target.personal_info, &source.personal_info, prefer_source);
    merged.interests = merge_interests(&target.interests, &source.interests);
    merged.trips = merge_trips(&target.trips, &source.trips, prefer_source);
    if !source.extra.is_empty() {
        merged.extra = shallow_merge(&target.extra, &source.extra);
    }
    merged.verification = merge_verification(&target.verification, &source.verification);
    merged
}

fn merge_text(current: &Option<String>, incoming: &Option<String>, prefer: bool) -> Option<String> {
    match incoming.as_deref() {
        Some(value) if !value.trim().is_empty() => {
            if is_blank_text(current.as_deref()) || prefer {
                Some(value.to_string())
            } else {
                current.clone()
            }
        }
        _ => current.clone(),
    }
}

fn merge_plain<T: Clone>(current: &Option<T>, incoming: &Option<T>, prefer: bool) -> Option<T> {
    match incoming {
        Some(value) => {
            if current.is_none() || prefer {
                Some(value.clone())
            } else {
                current.clone()
            }
        }
        None => current.clone(),
    }
}

fn merge_personal_info(target: &PersonalInfo, source: &PersonalInfo, prefer: bool) -> PersonalInfo {
    PersonalInfo {
        name: merge_text(&target.name, &source.name, prefer),
        email_address: merge_text(&target.email_address, &source.email_address, prefer),
        phone_number: merge_text(&target.phone_number, &source.phone_number, prefer),
        date_of_birth: merge_plain(&target.date_of_birth, &source.date_of_birth, prefer),
        place_of_residence: merge_text(
            &target.place_of_residence,
            &source.place_of_residence,
            prefer,
        ),
        passport_number: merge_text(&target.passport_number, &source.passport_number, prefer),
    }
}

/// Union keeps the first-seen casing and existing order; new entries are
/// appended in their incoming order.
fn merge_interests(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut combined = Vec::new();
    let mut seen = BTreeSet::new();
    for value in existing.iter().chain(incoming.iter()) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            combined.push(trimmed.to_string());
        }
    }
    combined
}

fn merge_trips(existing: &[TripDetails], incoming: &[TripDetails], prefer: bool) -> Vec<TripDetails> {
    let mut merged: Vec<TripDetails> = existing.to_vec();
    for trip in incoming {
        let candidate_key = trip.identity_key();
        let match_index = candidate_key.as_ref().and_then(|key| {
            merged.iter().position(|known| known.identity_key().as_ref() == Some(key))
        });
        match match_index {
            Some(index) => merged[index] = merge_trip(&merged[index], trip, prefer),
            None => merged.push(trip.clone()),
        }
    }
    merged
}

fn merge_trip(base: &TripDetails, incoming: &TripDetails, prefer: bool) -> TripDetails {
    let metadata = if incoming.metadata.is_empty() {
        base.metadata.clone()
    } else {
        shallow_merge(&base.metadata, &incoming.metadata)
    };

    TripDetails {
        trip_id: merge_text(&base.trip_id, &incoming.trip_id, prefer),
        destination: merge_text(&base.destination, &incoming.destination, prefer),
        start_date: merge_plain(&base.start_date, &incoming.start_date, prefer),
        end_date: merge_plain(&base.end_date, &incoming.end_date, prefer),
        trip_type: merge_plain(&base.trip_type, &incoming.trip_type, prefer),
        trip_cost: merge_plain(&base.trip_cost, &incoming.trip_cost, prefer),
        notes: merge_text(&base.notes, &incoming.notes, prefer),
        metadata,
    }
}

fn shallow_merge(base: &Map<String, Value>, incoming: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Verification only ever moves forward in priority. Transitions stamp the
/// matching timestamp when the incoming record did not carry one; equal
/// priorities merge the confirmation snapshots and keep the most recent
/// timestamps.
pub fn merge_verification(
    current: &VerificationRecord,
    incoming: &VerificationRecord,
) -> VerificationRecord {
    let current_priority = current.status.priority();
    let incoming_priority = incoming.status.priority();

    if incoming_priority > current_priority {
        let mut merged = current.clone();
        merged.status = incoming.status;
        merged.fields = if incoming.fields.is_empty() {
            current.fields.clone()
        } else {
            incoming.fields.clone()
        };
        merged.requested_at = if incoming.status == VerificationStatus::Pending
            && is_blank_text(incoming.requested_at.as_deref())
        {
            Some(iso_now())
        } else {
            pick_non_blank(&incoming.requested_at, &current.requested_at)
        };
        merged.confirmed_at = match non_blank(incoming.confirmed_at.as_deref()) {
            Some(stamp) => Some(stamp.to_string()),
            None if incoming.status == VerificationStatus::Confirmed => Some(iso_now()),
            None => current.confirmed_at.clone(),
        };
        return merged;
    }

    if incoming_priority == current_priority {
        let mut merged = current.clone();
        merged.fields = shallow_merge(&current.fields, &incoming.fields);
        if let Some(requested) = non_blank(incoming.requested_at.as_deref()) {
            if current.requested_at.as_deref().map_or(true, |existing| requested > existing) {
                merged.requested_at = Some(requested.to_string());
            }
        }
        if let Some(confirmed) = non_blank(incoming.confirmed_at.as_deref()) {
            if current.confirmed_at.as_deref().map_or(true, |existing| confirmed > existing) {
                merged.confirmed_at = Some(confirmed.to_string());
            }
        }
        return merged;
    }

    current.clone()
}

fn pick_non_blank(preferred: &Option<String>, fallback: &Option<String>) -> Option<String> {
    non_blank(preferred.as_deref()).map(str::to_string).or_else(|| fallback.clone())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

fn iso_now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::domain::client::{
        ClientDatum, PersonalInfo, TripDetails, TripType, VerificationRecord, VerificationStatus,
    };

    use super::{merge_client_records, merge_verification};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn client_with_email(email: &str) -> ClientDatum {
        ClientDatum {
            personal_info: PersonalInfo {
                email_address: Some(email.to_string()),
                ..PersonalInfo::default()
            },
            ..ClientDatum::default()
        }
    }

    #[test]
    fn candidates_match_on_any_shared_identity_key() {
        let existing = vec![ClientDatum {
            client_id: Some("WA-42".to_string()),
            personal_info: PersonalInfo {
                email_address: Some("Aisha@Example.com".to_string()),
                ..PersonalInfo::default()
            },
            ..ClientDatum::default()
        }];
        let incoming = vec![ClientDatum {
            personal_info: PersonalInfo {
                email_address: Some("aisha@example.com".to_string()),
                name: Some("Aisha Tan".to_string()),
                ..PersonalInfo::default()
            },
            ..ClientDatum::default()
        }];

        let merged = merge_client_records(&existing, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].personal_info.name.as_deref(), Some("Aisha Tan"));
        assert_eq!(merged[0].client_id.as_deref(), Some("WA-42"));
    }

    #[test]
    fn phone_numbers_match_ignoring_formatting() {
        let existing = vec![ClientDatum {
            personal_info: PersonalInfo {
                phone_number: Some("+65 9123-4567".to_string()),
                ..PersonalInfo::default()
            },
            ..ClientDatum::default()
        }];
        let incoming = vec![ClientDatum {
            personal_info: PersonalInfo {
                phone_number: Some("6591234567".to_string()),
                name: Some("Javier".to_string()),
                ..PersonalInfo::default()
            },
            ..ClientDatum::default()
        }];

        let merged = merge_client_records(&existing, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].personal_info.name.as_deref(), Some("Javier"));
    }

    #[test]
    fn disjoint_identities_append_a_new_record() {
        let merged = merge_client_records(
            &[client_with_email("a@example.com")],
            &[client_with_email("b@example.com")],
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn keyless_candidate_merges_into_lone_roster_entry() {
        let existing = vec![client_with_email("a@example.com")];
        let incoming = vec![ClientDatum {
            personal_info: PersonalInfo {
                name: Some("Sole Traveller".to_string()),
                ..PersonalInfo::default()
            },
            ..ClientDatum::default()
        }];

        let merged = merge_client_records(&existing, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].personal_info.name.as_deref(), Some("Sole Traveller"));
    }

    #[test]
    fn keyless_candidate_matches_unique_source() {
        let mut first = client_with_email("a@example.com");
        first.source = Some("whatsapp".to_string());
        let mut second = client_with_email("b@example.com");
        second.source = Some("telegram".to_string());

        let incoming = vec![ClientDatum {
            source: Some("telegram".to_string()),
            interests: vec!["Skiing".to_string()],
            ..ClientDatum::default()
        }];

        let merged = merge_client_records(&[first, second], &incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].interests, vec!["Skiing".to_string()]);
    }

    #[test]
    fn ambiguous_keyless_candidate_is_appended() {
        let mut first = client_with_email("a@example.com");
        first.source = Some("whatsapp".to_string());
        let mut second = client_with_email("b@example.com");
        second.source = Some("whatsapp".to_string());

        let incoming =
            vec![ClientDatum { source: Some("whatsapp".to_string()), ..ClientDatum::default() }];

        let merged = merge_client_records(&[first, second], &incoming);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn unconfirmed_candidate_never_overwrites_existing_values() {
        let mut existing = client_with_email("a@example.com");
        existing.personal_info.name = Some("Aisha Tan".to_string());

        let mut incoming = client_with_email("a@example.com");
        incoming.personal_info.name = Some("A. Tan".to_string());
        incoming.personal_info.place_of_residence = Some("Singapore".to_string());

        let merged = merge_client_records(&[existing], &[incoming]);
        assert_eq!(merged[0].personal_info.name.as_deref(), Some("Aisha Tan"));
        assert_eq!(merged[0].personal_info.place_of_residence.as_deref(), Some("Singapore"));
    }

    #[test]
    fn confirmed_candidate_overwrites_conflicting_values() {
        let mut existing = client_with_email("a@example.com");
        existing.personal_info.name = Some("Aisha Tan".to_string());

        let mut incoming = client_with_email("a@example.com");
        incoming.personal_info.name = Some("Aisha Binte Tan".to_string());
        incoming.verification.status = VerificationStatus::Confirmed;

        let merged = merge_client_records(&[existing], &[incoming]);
        assert_eq!(merged[0].personal_info.name.as_deref(), Some("Aisha Binte Tan"));
        assert_eq!(merged[0].verification.status, VerificationStatus::Confirmed);
        assert!(merged[0].verification.confirmed_at.is_some(), "confirmed_at is auto-stamped");
    }

    #[test]
    fn merge_is_idempotent() {
        let existing = vec![client_with_email("a@example.com")];
        let mut incoming = client_with_email("a@example.com");
        incoming.personal_info.name = Some("Aisha".to_string());
        incoming.trips.push(TripDetails {
            destination: Some("Bali".to_string()),
            start_date: Some(date(2025, 12, 1)),
            ..TripDetails::default()
        });
        incoming.interests = vec!["Diving".to_string()];

        let once = merge_client_records(&existing, std::slice::from_ref(&incoming));
        let twice = merge_client_records(&once, std::slice::from_ref(&incoming));
        assert_eq!(once, twice);
    }

    #[test]
    fn trips_with_matching_identity_never_duplicate() {
        let base_trip = TripDetails {
            destination: Some("Bali".to_string()),
            start_date: Some(date(2025, 12, 1)),
            end_date: Some(date(2025, 12, 10)),
            trip_type: Some(TripType::Single),
            ..TripDetails::default()
        };
        let mut existing = client_with_email("a@example.com");
        existing.trips.push(base_trip.clone());

        let mut incoming = client_with_email("a@example.com");
        incoming.trips.push(TripDetails { trip_cost: Some(1800.0), ..base_trip });
        incoming.trips.push(TripDetails {
            destination: Some("Osaka".to_string()),
            start_date: Some(date(2026, 1, 5)),
            ..TripDetails::default()
        });

        let merged = merge_client_records(&[existing], &[incoming]);
        assert_eq!(merged[0].trips.len(), 2, "same itinerary merges, new destination appends");
        assert_eq!(merged[0].trips[0].trip_cost, Some(1800.0));
    }

    #[test]
    fn trip_metadata_always_shallow_merges() {
        let key_trip = |metadata| TripDetails {
            trip_id: Some("T-1".to_string()),
            metadata,
            ..TripDetails::default()
        };
        let mut existing = client_with_email("a@example.com");
        existing.trips.push(key_trip(
            json!({"activity": "diving", "hotel": "Ubud Lodge"})
                .as_object()
                .expect("object")
                .clone(),
        ));

        let mut incoming = client_with_email("a@example.com");
        incoming
            .trips
            .push(key_trip(json!({"activity": "skiing"}).as_object().expect("object").clone()));

        let merged = merge_client_records(&[existing], &[incoming]);
        let metadata = &merged[0].trips[0].metadata;
        assert_eq!(metadata["activity"], "skiing", "incoming wins on conflict");
        assert_eq!(metadata["hotel"], "Ubud Lodge", "untouched keys survive");
    }

    #[test]
    fn interests_dedupe_case_insensitively_keeping_first_casing() {
        let mut existing = client_with_email("a@example.com");
        existing.interests = vec!["Diving".to_string(), "Food".to_string()];

        let mut incoming = client_with_email("a@example.com");
        incoming.interests = vec!["diving".to_string(), "Hiking".to_string(), " ".to_string()];

        let merged = merge_client_records(&[existing], &[incoming]);
        assert_eq!(
            merged[0].interests,
            vec!["Diving".to_string(), "Food".to_string(), "Hiking".to_string()]
        );
    }

    #[test]
    fn verification_status_never_regresses() {
        let confirmed = VerificationRecord {
            status: VerificationStatus::Confirmed,
            confirmed_at: Some("2026-01-01T00:00:00Z".to_string()),
            ..VerificationRecord::default()
        };
        let pending =
            VerificationRecord { status: VerificationStatus::Pending, ..VerificationRecord::default() };

        let merged = merge_verification(&confirmed, &pending);
        assert_eq!(merged.status, VerificationStatus::Confirmed);
        assert_eq!(merged.confirmed_at.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn transition_to_pending_stamps_requested_at() {
        let unknown = VerificationRecord::default();
        let pending =
            VerificationRecord { status: VerificationStatus::Pending, ..VerificationRecord::default() };

        let merged = merge_verification(&unknown, &pending);
        assert_eq!(merged.status, VerificationStatus::Pending);
        assert!(merged.requested_at.is_some());
    }

    #[test]
    fn equal_priority_merges_fields_incoming_wins() {
        let mut current =
            VerificationRecord { status: VerificationStatus::Pending, ..VerificationRecord::default() };
        current.fields.insert("name".to_string(), json!("Aisha"));
        current.fields.insert("destination".to_string(), json!("Bali"));

        let mut incoming =
            VerificationRecord { status: VerificationStatus::Pending, ..VerificationRecord::default() };
        incoming.fields.insert("name".to_string(), json!("Aisha Tan"));
        incoming.requested_at = Some("2026-02-01T00:00:00Z".to_string());

        let merged = merge_verification(&current, &incoming);
        assert_eq!(merged.fields["name"], "Aisha Tan");
        assert_eq!(merged.fields["destination"], "Bali");
        assert_eq!(merged.requested_at.as_deref(), Some("2026-02-01T00:00:00Z"));
    }
}
