//! Backend for the TÜV Rheinland Spain ITV booking site.
//!
//! Checking a center replays the booking wizard of the public site: the
//! booking page is loaded to obtain a CSRF token, the plate is registered,
//! the service and fuel type are chosen, and finally the free dates of the
//! requested center are listed. Every step runs inside the same cookie
//! session and a failing step aborts the remaining ones.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_LANGUAGE, CONTENT_TYPE, REFERER};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use itvwatch_core::{
    model::{Availability, CenterId, DisplayWindow, Plate, Slot, SlotId},
    ports::{AvailabilityPort, CheckError},
};

const BOOKING_PAGE: &str = "cita-previa-itv";

// Passenger car, petrol, periodic inspection. These are the ids the site's
// own wizard sends for a regular car.
const VEHICLE_TYPE_ID: &str = "10";
const FUEL_ID: &str = "1";
const SERVICE_ID: &str = "1";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const UNKNOWN_LABEL: &str = "?";

static CSRF_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="csrf-token"\s+content="([^"]+)""#).expect("CSRF token pattern is valid")
});

/// Response from /citation/getAvailableDates
#[derive(Debug, Deserialize)]
struct AvailableDatesResponse {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    result: Option<AvailableDatesResult>,
}

#[derive(Debug, Deserialize)]
struct AvailableDatesResult {
    #[serde(rename = "startTime", default)]
    start_time: Option<Value>,
    #[serde(rename = "endTime", default)]
    end_time: Option<Value>,
    #[serde(rename = "availableDates", default)]
    available_dates: AvailableDates,
}

/// The site sends `{}`-style objects keyed by slot id, but an empty result
/// comes back as `[]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AvailableDates {
    ById(BTreeMap<String, String>),
    Listed(Vec<String>),
}

impl Default for AvailableDates {
    fn default() -> Self {
        Self::Listed(Vec::new())
    }
}

impl AvailableDates {
    fn into_entries(self) -> Vec<(String, String)> {
        match self {
            Self::ById(by_id) => by_id.into_iter().collect(),
            Self::Listed(listed) => listed
                .into_iter()
                .enumerate()
                .map(|(idx, raw)| (idx.to_string(), raw))
                .collect(),
        }
    }
}

/// Availability backend for the TÜV Rheinland booking site.
pub struct TuvAvailabilityPort {
    base_url: String,
    user_agent: String,
}

impl TuvAvailabilityPort {
    /// Create a backend for the site at `base_url`.
    ///
    /// A fresh cookie session is opened for every center query.
    #[must_use]
    pub fn new<B: Into<String>, U: Into<String>>(base_url: B, user_agent: U) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl AvailabilityPort for TuvAvailabilityPort {
    async fn fetch_availability(
        &self,
        plate: &Plate,
        center: CenterId,
    ) -> Result<Availability, CheckError> {
        let session = BookingSession::open(&self.base_url, &self.user_agent)?;
        let token = session.csrf_token().await?;

        session
            .post("sendPlate", &[("plate", plate.as_str())], &token)
            .await?;
        session
            .post(
                "getAllCitationServices",
                &[("vehicle_type_id", VEHICLE_TYPE_ID)],
                &token,
            )
            .await?;
        session
            .post(
                "validateFuelAndType",
                &[
                    ("typeId", VEHICLE_TYPE_ID),
                    ("fuelId", FUEL_ID),
                    ("service_id", SERVICE_ID),
                ],
                &token,
            )
            .await?;
        session
            .post(
                "getRegionsByService",
                &[("vehicle_type_id", VEHICLE_TYPE_ID), ("service_id", SERVICE_ID)],
                &token,
            )
            .await?;

        let center_id = center.to_string();
        let body = session
            .post(
                "getAvailableDates",
                &[
                    ("center_id", center_id.as_str()),
                    ("vehicle_type_id", VEHICLE_TYPE_ID),
                    ("service_id", SERVICE_ID),
                    ("is_booking_update", "0"),
                ],
                &token,
            )
            .await?
            .text()
            .await?;

        parse_available_dates(&body)
    }
}

/// One cookie-carrying conversation with the booking site.
struct BookingSession<'site> {
    client: Client,
    base_url: &'site str,
}

impl<'site> BookingSession<'site> {
    fn open(base_url: &'site str, user_agent: &str) -> Result<Self, CheckError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .build()
            .map_err(|err| CheckError::Unexpected(format!("cannot build HTTP session: {err}")))?;

        Ok(Self { client, base_url })
    }

    fn page_url(&self) -> String {
        format!("{}/{BOOKING_PAGE}", self.base_url)
    }

    async fn csrf_token(&self) -> Result<String, CheckError> {
        debug!("loading booking page");
        let page = send_checked(self.client.get(self.page_url()))
            .await?
            .text()
            .await?;

        extract_csrf_token(&page).ok_or(CheckError::TokenNotFound)
    }

    async fn post(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<Response, CheckError> {
        debug!(endpoint, "booking step");
        let req = self
            .client
            .post(format!("{}/citation/{endpoint}", self.base_url))
            .query(query)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(CONTENT_LANGUAGE, "es")
            .header(CONTENT_TYPE, "application/json")
            .header(REFERER, self.page_url())
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-CSRF-TOKEN", token);

        send_checked(req).await
    }
}

fn extract_csrf_token(page: &str) -> Option<String> {
    CSRF_TOKEN
        .captures(page)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_owned())
}

/// Decode the final wizard answer into an [`Availability`].
fn parse_available_dates(body: &str) -> Result<Availability, CheckError> {
    let response: AvailableDatesResponse = serde_json::from_str(body)?;

    if let Some(message) = response.error.and_then(error_message) {
        return Ok(Availability::Error(message));
    }

    let Some(result) = response.result else {
        return Ok(Availability::Slots {
            window: DisplayWindow {
                start: UNKNOWN_LABEL.to_owned(),
                end: UNKNOWN_LABEL.to_owned(),
            },
            slots: Vec::new(),
        });
    };

    let slots = result
        .available_dates
        .into_entries()
        .into_iter()
        .map(|(id, raw)| -> Result<Slot, CheckError> {
            Ok(Slot {
                id: SlotId(id),
                starts_at: NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Availability::Slots {
        window: DisplayWindow {
            start: window_label(result.start_time),
            end: window_label(result.end_time),
        },
        slots,
    })
}

/// Only a non-empty message counts as an error; `null`, `false` and `""` do not.
fn error_message(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) if message.is_empty() => None,
        Value::String(message) => Some(message),
        other => Some(other.to_string()),
    }
}

fn window_label(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN_LABEL.to_owned(),
        Some(Value::String(label)) => label,
        Some(other) => other.to_string(),
    }
}

// Small helper to send a request and reject non-2xx answers.
async fn send_checked(req: RequestBuilder) -> Result<Response, CheckError> {
    req.send()
        .await
        .map_err(CheckError::from)?
        .error_for_status()
        .map_err(CheckError::from)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, headers, method, path, query_param};
    use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

    use super::*;

    const TOKEN: &str = "tok-5f2a9c";
    const USER_AGENT: &str = "itvwatch-test";
    const SERVICES_QUERY: &[(&str, &str)] = &[("vehicle_type_id", "10")];
    const FUEL_QUERY: &[(&str, &str)] = &[("typeId", "10"), ("fuelId", "1"), ("service_id", "1")];
    const REGIONS_QUERY: &[(&str, &str)] = &[("vehicle_type_id", "10"), ("service_id", "1")];

    fn booking_page(token: Option<&str>) -> String {
        let meta = token.map_or_else(String::new, |value| {
            format!(r#"<meta name="csrf-token" content="{value}">"#)
        });
        format!("<html><head><title>Cita previa ITV</title>{meta}</head><body></body></html>")
    }

    fn plate() -> Plate {
        Plate::new("1234ABC").expect("plate")
    }

    fn center(id: u32) -> CenterId {
        CenterId::new(id).expect("center")
    }

    async fn mount_page(server: &MockServer, token: Option<&str>) {
        Mock::given(method("GET"))
            .and(path("/cita-previa-itv"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(booking_page(token))
                    .insert_header("set-cookie", "itv_session=abc123; Path=/"),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    /// Matches one wizard POST with every header the site expects.
    fn wizard_step(server: &MockServer, endpoint: &str, query: &[(&str, &str)]) -> MockBuilder {
        let referer = format!("{}/cita-previa-itv", server.uri());
        let builder = Mock::given(method("POST"))
            .and(path(format!("/citation/{endpoint}")))
            .and(header("x-csrf-token", TOKEN))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(headers("accept", vec!["application/json", "text/plain", "*/*"]))
            .and(header("content-type", "application/json"))
            .and(header("content-language", "es"))
            .and(header("referer", referer.as_str()))
            .and(header("user-agent", USER_AGENT))
            .and(header("cookie", "itv_session=abc123"));

        query
            .iter()
            .fold(builder, |mock, &(key, value)| mock.and(query_param(key, value)))
    }

    async fn mount_step(
        server: &MockServer,
        endpoint: &str,
        query: &[(&str, &str)],
        status: u16,
        calls: u64,
    ) {
        wizard_step(server, endpoint, query)
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
            .expect(calls)
            .mount(server)
            .await;
    }

    #[test]
    fn token_is_extracted_from_meta_tag() {
        let page = r#"<meta charset="utf-8">
            <meta name="csrf-token"   content="abc-DEF_123">"#;
        assert_eq!(extract_csrf_token(page).as_deref(), Some("abc-DEF_123"));
        assert_eq!(extract_csrf_token("<html></html>"), None);
    }

    #[test]
    fn slots_are_parsed_from_id_map() {
        let body = json!({
            "result": {
                "startTime": "08:00",
                "endTime": "14:00",
                "availableDates": {
                    "118": "2024-03-10T22:30:00.000000Z",
                    "119": "2024-03-11T07:15:00.000000Z"
                }
            }
        })
        .to_string();

        let availability = parse_available_dates(&body).expect("parse");
        let Availability::Slots { window, slots } = availability else {
            panic!("expected slots");
        };
        assert_eq!(window.start, "08:00");
        assert_eq!(window.end, "14:00");
        assert_eq!(slots.len(), 2);
        let first = slots.first().expect("slot");
        assert_eq!(first.id, SlotId("118".to_owned()));
        assert_eq!(first.starts_at.to_string(), "2024-03-10 22:30:00");
    }

    #[test]
    fn empty_list_and_missing_result_mean_no_slots() {
        let listed = parse_available_dates(r#"{"result":{"availableDates":[]}}"#).expect("parse");
        assert!(!listed.has_slots());
        assert!(matches!(listed, Availability::Slots { .. }));

        let missing = parse_available_dates("{}").expect("parse");
        let Availability::Slots { window, slots } = missing else {
            panic!("expected slots");
        };
        assert!(slots.is_empty());
        assert_eq!(window.start, "?");
        assert_eq!(window.end, "?");
    }

    #[test]
    fn error_field_wins_over_result() {
        let body = json!({
            "error": "Vehículo no encontrado",
            "result": { "availableDates": { "1": "2024-03-11T07:15:00.000000Z" } }
        })
        .to_string();
        assert_eq!(
            parse_available_dates(&body).expect("parse"),
            Availability::Error("Vehículo no encontrado".to_owned())
        );

        let blank = parse_available_dates(r#"{"error":"","result":{"availableDates":{}}}"#)
            .expect("parse");
        assert!(matches!(blank, Availability::Slots { .. }));
    }

    #[test]
    fn malformed_bodies_are_parse_errors() {
        assert!(matches!(
            parse_available_dates("<html>Service unavailable</html>"),
            Err(CheckError::ResponseParse(_))
        ));
        assert!(matches!(
            parse_available_dates(r#"{"result":{"availableDates":{"1":"11/03/2024 09:00"}}}"#),
            Err(CheckError::ResponseParse(_))
        ));
    }

    #[tokio::test]
    async fn full_wizard_runs_in_one_session() {
        let server = MockServer::start().await;
        mount_page(&server, Some(TOKEN)).await;
        mount_step(&server, "sendPlate", &[("plate", "1234ABC")], 200, 1).await;
        mount_step(&server, "getAllCitationServices", SERVICES_QUERY, 200, 1).await;
        mount_step(&server, "validateFuelAndType", FUEL_QUERY, 200, 1).await;
        mount_step(&server, "getRegionsByService", REGIONS_QUERY, 200, 1).await;

        wizard_step(
            &server,
            "getAvailableDates",
            &[
                ("center_id", "35"),
                ("vehicle_type_id", "10"),
                ("service_id", "1"),
                ("is_booking_update", "0"),
            ],
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "startTime": "07:30",
                "endTime": "15:00",
                "availableDates": {
                    "501": "2024-03-12T08:00:00.000000Z",
                    "502": "2024-03-12T08:20:00.000000Z"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

        let port = TuvAvailabilityPort::new(server.uri(), USER_AGENT);
        let availability = port
            .fetch_availability(&plate(), center(35))
            .await
            .expect("availability");

        let Availability::Slots { window, slots } = availability else {
            panic!("expected slots");
        };
        assert_eq!(window.start, "07:30");
        assert_eq!(slots.len(), 2);
    }

    #[tokio::test]
    async fn missing_token_stops_before_any_post() {
        let server = MockServer::start().await;
        mount_page(&server, None).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let port = TuvAvailabilityPort::new(server.uri(), USER_AGENT);
        let err = port
            .fetch_availability(&plate(), center(35))
            .await
            .expect_err("no token");

        assert!(matches!(err, CheckError::TokenNotFound));
    }

    #[tokio::test]
    async fn failing_step_aborts_remaining_steps() {
        let server = MockServer::start().await;
        mount_page(&server, Some(TOKEN)).await;
        mount_step(&server, "sendPlate", &[("plate", "1234ABC")], 200, 1).await;
        mount_step(&server, "getAllCitationServices", SERVICES_QUERY, 500, 1).await;
        mount_step(&server, "validateFuelAndType", FUEL_QUERY, 200, 0).await;
        mount_step(&server, "getRegionsByService", REGIONS_QUERY, 200, 0).await;
        mount_step(&server, "getAvailableDates", &[("center_id", "36")], 200, 0).await;

        let port = TuvAvailabilityPort::new(server.uri(), USER_AGENT);
        let err = port
            .fetch_availability(&plate(), center(36))
            .await
            .expect_err("step fails");

        assert!(matches!(err, CheckError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn unreachable_booking_page_is_a_request_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cita-previa-itv"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let port = TuvAvailabilityPort::new(format!("{}/", server.uri()), USER_AGENT);
        let err = port
            .fetch_availability(&plate(), center(35))
            .await
            .expect_err("page down");

        assert!(matches!(err, CheckError::RequestFailed(_)));
    }
}
