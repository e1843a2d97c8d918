//! Heuristic extraction of traveller and itinerary data from staged
//! documents. The channel layer is responsible for converting uploads to
//! plain text before handing the path to this tool.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

use crate::registry::{Tool, ToolId};

const DATE_OUTPUT_FORMATS: &[&str] = &["%d %B %Y", "%d %b %Y", "%Y-%m-%d", "%d-%m-%Y"];

pub struct TripDocumentScanner {
    date_patterns: Vec<Regex>,
    passenger_pattern: Regex,
    uppercase_pattern: Regex,
    money_pattern: Regex,
}

impl Default for TripDocumentScanner {
    fn default() -> Self {
        Self {
            date_patterns: vec![
                Regex::new(r"\b(\d{1,2}\s+[A-Za-z]{3,9}\s+\d{2,4})\b").expect("date pattern"),
                Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("iso date pattern"),
            ],
            passenger_pattern: Regex::new(r"Passenger\s*[:\-]\s*(.+)").expect("passenger pattern"),
            uppercase_pattern: Regex::new(r"\b([A-Z]{3,})\b").expect("uppercase pattern"),
            money_pattern: Regex::new(
                r"(?:USD|SGD|S\$|US\$)?\s*([0-9]{2,}(?:,[0-9]{3})*(?:\.[0-9]{2})?)",
            )
            .expect("money pattern"),
        }
    }
}

impl TripDocumentScanner {
    pub fn parse_trip_document(&self, file_path: &str) -> Result<Value> {
        let path = Path::new(file_path);
        if !path.exists() {
            bail!("File not found: {file_path}");
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !matches!(extension.as_str(), "txt" | "text" | "md") {
            bail!("Only staged text documents are supported, got `.{extension}`");
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read staged document {file_path}"))?;

        let dates = self.extract_dates(&text);
        let destinations = self.extract_destinations(&text);
        let passengers = self.extract_passenger_names(&text);
        let estimated_trip_cost = self.estimate_trip_cost(&text);

        info!(
            event_name = "doc_intel.parsed",
            file = %path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            dates = dates.len(),
            destinations = destinations.len(),
            passengers = passengers.len(),
        );

        Ok(json!({
            "file": path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            "dates": dates,
            "destinations": destinations,
            "passengers": passengers,
            "estimated_trip_cost": estimated_trip_cost,
            "raw_preview": text.chars().take(1000).collect::<String>(),
        }))
    }

    fn extract_dates(&self, text: &str) -> Vec<String> {
        let mut parsed: Vec<String> = self
            .date_patterns
            .iter()
            .flat_map(|pattern| pattern.captures_iter(text))
            .filter_map(|capture| parse_document_date(&capture[1]))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .collect();
        parsed.sort();
        parsed.dedup();
        parsed
    }

    fn extract_destinations(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for line in text.lines().map(str::trim) {
            let lowered = line.to_lowercase();
            if lowered.contains("depart") || lowered.contains("arrive") {
                found.push(line.to_string());
            }
        }
        for capture in self.uppercase_pattern.captures_iter(text) {
            found.push(capture[1].to_string());
        }

        let mut unique = Vec::new();
        for entry in found {
            if !unique.contains(&entry) {
                unique.push(entry);
            }
        }
        unique.truncate(10);
        unique
    }

    fn extract_passenger_names(&self, text: &str) -> Vec<String> {
        let mut names = Vec::new();
        for capture in self.passenger_pattern.captures_iter(text) {
            for token in capture[1].split(&[',', '/', '\n'][..]) {
                let trimmed = token.trim();
                if !trimmed.is_empty() && !names.contains(&trimmed.to_string()) {
                    names.push(trimmed.to_string());
                }
            }
        }
        names.truncate(6);
        names
    }

    /// The largest money-looking amount stands in for the trip cost.
    fn estimate_trip_cost(&self, text: &str) -> Option<f64> {
        self.money_pattern
            .captures_iter(text)
            .filter_map(|capture| capture[1].replace(',', "").parse::<f64>().ok())
            .fold(None, |best, amount| match best {
                Some(current) if current >= amount => Some(current),
                _ => Some(amount),
            })
    }
}

fn parse_document_date(value: &str) -> Option<NaiveDate> {
    DATE_OUTPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

#[async_trait]
impl Tool for TripDocumentScanner {
    fn id(&self) -> ToolId {
        ToolId::DocumentIngest
    }

    fn description(&self) -> &'static str {
        "Extract traveler, destination, and date data from an uploaded itinerary or booking."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the document staged by the channel adapter",
                },
            },
            "required": ["file_path"],
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let file_path = input
            .get("file_path")
            .and_then(Value::as_str)
            .context("document_ingest requires a file_path string")?;
        self.parse_trip_document(file_path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::TripDocumentScanner;

    const ITINERARY: &str = "\
Booking reference: XK93JD
Passenger: Aisha Tan, Javier Wong
Depart SIN 03 November 2025 09:40
Arrive KIX 2025-11-03 17:05
Return flight on 10 November 2025
Total fare SGD 3,842.50 including taxes
Seat upgrade US$ 120.00
";

    fn stage(dir: &TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, contents).expect("stage document");
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn itinerary_fields_are_extracted() {
        let dir = TempDir::new().expect("temp dir");
        let path = stage(&dir, "itinerary.txt", ITINERARY);

        let parsed =
            TripDocumentScanner::default().parse_trip_document(&path).expect("parse document");

        let dates: Vec<&str> =
            parsed["dates"].as_array().expect("dates").iter().filter_map(|d| d.as_str()).collect();
        assert_eq!(dates, vec!["2025-11-03", "2025-11-10"], "dates dedupe and sort");

        let passengers: Vec<&str> = parsed["passengers"]
            .as_array()
            .expect("passengers")
            .iter()
            .filter_map(|p| p.as_str())
            .collect();
        assert_eq!(passengers, vec!["Aisha Tan", "Javier Wong"]);

        let destinations = parsed["destinations"].as_array().expect("destinations");
        assert!(destinations.iter().any(|d| d.as_str() == Some("SIN")));
        assert!(destinations.iter().any(|d| d.as_str() == Some("KIX")));
        assert!(destinations.len() <= 10);

        assert_eq!(parsed["estimated_trip_cost"], 3842.5);
        assert!(parsed["raw_preview"].as_str().expect("preview").starts_with("Booking"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let error = TripDocumentScanner::default()
            .parse_trip_document("/nowhere/itinerary.txt")
            .expect_err("missing file");
        assert!(error.to_string().contains("File not found"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = stage(&dir, "itinerary.pdf", "binary-ish");

        let error = TripDocumentScanner::default()
            .parse_trip_document(&path)
            .expect_err("unsupported extension");
        assert!(error.to_string().contains("staged text documents"));
    }
}
