//! Insurer purchase API integration. Policy issuance happens after
//! payment confirmation, so the payload is validated and normalized
//! strictly before anything leaves the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::{error, info};

use aurora_core::config::InsurerConfig;

use crate::registry::{Tool, ToolId};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const INSURED_REQUIRED_FIELDS: &[&str] = &[
    "id",
    "title",
    "firstName",
    "lastName",
    "nationality",
    "dateOfBirth",
    "passport",
    "email",
    "phoneType",
    "phoneNumber",
    "relationship",
];

const CONTACT_EXTRA_FIELDS: &[&str] = &["address", "city", "zipCode", "countryCode"];

pub struct InsurerApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    default_market: String,
    default_language: String,
    default_channel: String,
}

impl InsurerApiClient {
    pub fn new(config: &InsurerConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            bail!("insurer base url is not configured");
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building insurer http client")?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            default_market: config.default_market.clone(),
            default_language: config.default_language.clone(),
            default_channel: config.default_channel.clone(),
        })
    }

    pub async fn purchase(&self, payload: &Value) -> Result<Value> {
        let request = self.prepare_purchase_payload(payload)?;
        let data = self.post("/purchase", &request).await?;
        info!(
            event_name = "insurer.purchase.success",
            quote_id = request["quoteId"].as_str().unwrap_or_default(),
            offers = request["purchaseOffers"].as_array().map(Vec::len).unwrap_or(0),
        );
        Ok(data)
    }

    fn prepare_purchase_payload(&self, payload: &Value) -> Result<Value> {
        let payload = payload
            .as_object()
            .ok_or_else(|| anyhow!("Purchase payload must be a JSON object"))?;

        let mut request = Map::new();
        request.insert(
            "market".to_string(),
            Value::from(coerce_str(payload.get("market")).unwrap_or(self.default_market.clone())),
        );
        request.insert(
            "languageCode".to_string(),
            Value::from(
                coerce_str(payload.get("languageCode")).unwrap_or(self.default_language.clone()),
            ),
        );
        request.insert(
            "channel".to_string(),
            Value::from(
                coerce_str(payload.get("channel")).unwrap_or(self.default_channel.clone()),
            ),
        );
        request.insert("quoteId".to_string(), Value::from(require_str(payload, "quoteId")?));

        let offers = payload
            .get("purchaseOffers")
            .and_then(Value::as_array)
            .filter(|offers| !offers.is_empty())
            .ok_or_else(|| anyhow!("purchaseOffers must be a non-empty array"))?;
        let offers = offers
            .iter()
            .map(normalize_purchase_offer)
            .collect::<Result<Vec<Value>>>()?;
        request.insert("purchaseOffers".to_string(), Value::from(offers));

        let insureds = payload
            .get("insureds")
            .and_then(Value::as_array)
            .filter(|insureds| !insureds.is_empty())
            .ok_or_else(|| anyhow!("insureds must be a non-empty array"))?;
        let insureds = insureds
            .iter()
            .map(|insured| normalize_insured(insured, &[]))
            .collect::<Result<Vec<Value>>>()?;
        request.insert("insureds".to_string(), Value::from(insureds));

        let main_contact = payload
            .get("mainContact")
            .filter(|contact| contact.is_object())
            .ok_or_else(|| {
                anyhow!("mainContact must be an object containing traveller contact details")
            })?;
        request.insert(
            "mainContact".to_string(),
            normalize_insured(main_contact, CONTACT_EXTRA_FIELDS)?,
        );

        Ok(Value::Object(request))
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let api_key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().to_string())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("insurer api key is not configured"))?;

        info!(event_name = "insurer.request", endpoint);

        let response = self
            .http
            .post(format!("{}{endpoint}", self.base_url))
            .header("x-api-key", api_key)
            .json(payload)
            .send()
            .await
            .context("insurer api is unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            error!(event_name = "insurer.http_error", endpoint, status = %status, body = %preview);
            bail!("insurer api returned {status}");
        }

        response.json().await.context("decoding insurer response")
    }
}

fn coerce_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn require_str(payload: &Map<String, Value>, field: &str) -> Result<String> {
    coerce_str(payload.get(field)).ok_or_else(|| anyhow!("{field} is required"))
}

fn coerce_number(value: Option<&Value>, field: &str) -> Result<f64> {
    match value {
        Some(Value::Number(number)) => {
            number.as_f64().ok_or_else(|| anyhow!("{field} must be a finite number"))
        }
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("{field} must be a number")),
        _ => Err(anyhow!("{field} must be a number")),
    }
}

fn coerce_quantity(value: Option<&Value>, field: &str) -> Result<i64> {
    let quantity = match value {
        Some(Value::Number(number)) => {
            number.as_i64().ok_or_else(|| anyhow!("{field} must be an integer"))?
        }
        Some(Value::String(text)) => {
            text.trim().parse::<i64>().map_err(|_| anyhow!("{field} must be an integer"))?
        }
        _ => bail!("{field} must be an integer"),
    };
    if quantity < 1 {
        bail!("{field} must be at least 1");
    }
    Ok(quantity)
}

fn normalize_purchase_offer(offer: &Value) -> Result<Value> {
    let offer = offer
        .as_object()
        .ok_or_else(|| anyhow!("Each purchase offer must be an object"))?;

    Ok(json!({
        "productType": require_str(offer, "productType")?,
        "offerId": require_str(offer, "offerId")?,
        "productCode": require_str(offer, "productCode")?,
        "unitPrice": coerce_number(offer.get("unitPrice"), "unitPrice")?,
        "currency": require_str(offer, "currency")?,
        "quantity": coerce_quantity(offer.get("quantity"), "quantity")?,
        "totalPrice": coerce_number(offer.get("totalPrice"), "totalPrice")?,
        "isSendEmail": offer.get("isSendEmail").and_then(Value::as_bool).unwrap_or(true),
    }))
}

fn normalize_insured(insured: &Value, extra_fields: &[&str]) -> Result<Value> {
    let insured = insured
        .as_object()
        .ok_or_else(|| anyhow!("Each insured entry must be an object"))?;

    let mut normalized = Map::new();
    for field in INSURED_REQUIRED_FIELDS.iter().chain(extra_fields) {
        normalized.insert((*field).to_string(), Value::from(require_str(insured, field)?));
    }
    Ok(Value::Object(normalized))
}

pub struct TravelInsurancePurchaseTool {
    client: Arc<InsurerApiClient>,
}

impl TravelInsurancePurchaseTool {
    pub fn new(client: Arc<InsurerApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for TravelInsurancePurchaseTool {
    fn id(&self) -> ToolId {
        ToolId::TravelInsurancePurchase
    }

    fn description(&self) -> &'static str {
        "Complete the policy issuance with the insurer's purchase API after confirming payment. \
         Use the quoteId/offerId gathered during the conversation together with traveller identity data."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "market": {"type": "string", "description": "Market code, defaults from configuration."},
                "languageCode": {"type": "string", "description": "Language preference, defaults from configuration."},
                "channel": {"type": "string", "description": "Distribution channel, defaults from configuration."},
                "quoteId": {"type": "string", "description": "Quote UUID returned from the pricing step."},
                "purchaseOffers": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "productType": {"type": "string"},
                            "offerId": {"type": "string"},
                            "productCode": {"type": "string"},
                            "unitPrice": {"type": "number"},
                            "currency": {"type": "string"},
                            "quantity": {"type": "integer", "minimum": 1},
                            "totalPrice": {"type": "number"},
                            "isSendEmail": {"type": "boolean"},
                        },
                        "required": ["productType", "offerId", "productCode", "unitPrice", "currency", "quantity", "totalPrice"],
                    },
                },
                "insureds": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "title": {"type": "string"},
                            "firstName": {"type": "string"},
                            "lastName": {"type": "string"},
                            "nationality": {"type": "string"},
                            "dateOfBirth": {"type": "string"},
                            "passport": {"type": "string"},
                            "email": {"type": "string"},
                            "phoneType": {"type": "string"},
                            "phoneNumber": {"type": "string"},
                            "relationship": {"type": "string"},
                        },
                        "required": ["id", "title", "firstName", "lastName", "nationality", "dateOfBirth", "passport", "email", "phoneType", "phoneNumber", "relationship"],
                    },
                },
                "mainContact": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "title": {"type": "string"},
                        "firstName": {"type": "string"},
                        "lastName": {"type": "string"},
                        "nationality": {"type": "string"},
                        "dateOfBirth": {"type": "string"},
                        "passport": {"type": "string"},
                        "email": {"type": "string"},
                        "phoneType": {"type": "string"},
                        "phoneNumber": {"type": "string"},
                        "address": {"type": "string"},
                        "city": {"type": "string"},
                        "zipCode": {"type": "string"},
                        "countryCode": {"type": "string"},
                    },
                    "required": ["id", "title", "firstName", "lastName", "nationality", "dateOfBirth", "passport", "email", "phoneType", "phoneNumber", "address", "city", "zipCode", "countryCode"],
                },
            },
            "required": ["quoteId", "purchaseOffers", "insureds", "mainContact"],
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        self.client.purchase(&input).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use aurora_core::config::InsurerConfig;

    use super::InsurerApiClient;

    fn client() -> InsurerApiClient {
        InsurerApiClient::new(&InsurerConfig {
            api_key: Some("ak-test".to_string().into()),
            base_url: "https://insurer.example/v1/travel/front".to_string(),
            default_market: "SG".to_string(),
            default_language: "en".to_string(),
            default_channel: "white-label".to_string(),
        })
        .expect("client")
    }

    fn insured(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": "Ms",
            "firstName": "Aisha",
            "lastName": "Tan",
            "nationality": "SG",
            "dateOfBirth": "1991-06-15",
            "passport": "E1234567",
            "email": "aisha@example.com",
            "phoneType": "MOBILE",
            "phoneNumber": "+6598765432",
            "relationship": "MAIN",
        })
    }

    fn contact() -> serde_json::Value {
        let mut value = insured("contact-1");
        let object = value.as_object_mut().expect("object");
        object.insert("address".to_string(), json!("1 Example Way"));
        object.insert("city".to_string(), json!("Singapore"));
        object.insert("zipCode".to_string(), json!("048583"));
        object.insert("countryCode".to_string(), json!("SG"));
        value
    }

    #[test]
    fn purchase_payload_fills_configured_defaults() {
        let prepared = client()
            .prepare_purchase_payload(&json!({
                "quoteId": "q-123",
                "purchaseOffers": [{
                    "productType": "travel",
                    "offerId": "offer-1",
                    "productCode": "GOLD-SG",
                    "unitPrice": 41.0,
                    "currency": "SGD",
                    "quantity": 1,
                    "totalPrice": 41.0,
                }],
                "insureds": [insured("ins-1")],
                "mainContact": contact(),
            }))
            .expect("prepare payload");

        assert_eq!(prepared["market"], "SG");
        assert_eq!(prepared["languageCode"], "en");
        assert_eq!(prepared["channel"], "white-label");
        assert_eq!(prepared["purchaseOffers"][0]["isSendEmail"], true);
    }

    #[test]
    fn missing_quote_id_is_rejected() {
        let error = client()
            .prepare_purchase_payload(&json!({
                "purchaseOffers": [],
                "insureds": [],
                "mainContact": {},
            }))
            .expect_err("missing quoteId");
        assert!(error.to_string().contains("quoteId"));
    }

    #[test]
    fn empty_offers_are_rejected() {
        let error = client()
            .prepare_purchase_payload(&json!({
                "quoteId": "q-123",
                "purchaseOffers": [],
                "insureds": [insured("ins-1")],
                "mainContact": contact(),
            }))
            .expect_err("empty offers");
        assert!(error.to_string().contains("purchaseOffers"));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let error = client()
            .prepare_purchase_payload(&json!({
                "quoteId": "q-123",
                "purchaseOffers": [{
                    "productType": "travel",
                    "offerId": "offer-1",
                    "productCode": "GOLD-SG",
                    "unitPrice": 41.0,
                    "currency": "SGD",
                    "quantity": 0,
                    "totalPrice": 41.0,
                }],
                "insureds": [insured("ins-1")],
                "mainContact": contact(),
            }))
            .expect_err("zero quantity");
        assert!(error.to_string().contains("quantity"));
    }

    #[test]
    fn main_contact_requires_address_fields() {
        let error = client()
            .prepare_purchase_payload(&json!({
                "quoteId": "q-123",
                "purchaseOffers": [{
                    "productType": "travel",
                    "offerId": "offer-1",
                    "productCode": "GOLD-SG",
                    "unitPrice": 41.0,
                    "currency": "SGD",
                    "quantity": 1,
                    "totalPrice": 41.0,
                }],
                "insureds": [insured("ins-1")],
                "mainContact": insured("contact-1"),
            }))
            .expect_err("contact without address");
        assert!(error.to_string().contains("address"));
    }
}
