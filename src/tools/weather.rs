//! Current-conditions lookup backed by the Open-Meteo public API.
//!
//! Two requests per call: a geocoding lookup to resolve the city name, then
//! a forecast request for the current weather at those coordinates. Both
//! endpoints are free and keyless.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::Tool;

const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Deserialize)]
struct GeocodingResult {
    name: String,
    #[serde(default)]
    country: Option<String>,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: i64,
}

/// WMO weather interpretation codes used by Open-Meteo.
fn describe_code(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snowfall",
        77 => "Snow grains",
        80 | 81 | 82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown conditions",
    }
}

pub struct GetWeatherTool {
    client: reqwest::Client,
}

impl GetWeatherTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("ollamatrix")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for GetWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather conditions for a city (Open-Meteo, no API key)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name, e.g. \"Berlin\" or \"San Francisco\""
                },
                "units": {
                    "type": "string",
                    "description": "Unit system for temperature and wind speed",
                    "enum": ["metric", "imperial"]
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value> {
        let Some(city) = args.get("city").and_then(Value::as_str).filter(|c| !c.trim().is_empty())
        else {
            return Ok(json!({"error": "Invalid 'city' argument; expected a non-empty string."}));
        };
        let city = city.trim();
        let units = args.get("units").and_then(Value::as_str).unwrap_or("metric");
        let (temp_unit, wind_unit) = match units {
            "metric" => ("celsius", "kmh"),
            "imperial" => ("fahrenheit", "mph"),
            other => {
                return Ok(json!({
                    "error": format!("Unsupported units '{other}'. Use 'metric' or 'imperial'.")
                }))
            }
        };

        let place = match self.geocode(city).await {
            Ok(Some(place)) => place,
            Ok(None) => return Ok(json!({"error": format!("Unknown location: {city}")})),
            Err(e) => return Ok(json!({"error": format!("Geocoding lookup failed: {e:#}")})),
        };

        let weather = match self.forecast(&place, temp_unit, wind_unit).await {
            Ok(weather) => weather,
            Err(e) => return Ok(json!({"error": format!("Weather lookup failed: {e:#}")})),
        };

        Ok(json!({
            "location": place.name,
            "country": place.country.unwrap_or_default(),
            "latitude": place.latitude,
            "longitude": place.longitude,
            "temperature": weather.temperature,
            "temperature_unit": if units == "metric" { "°C" } else { "°F" },
            "windspeed": weather.windspeed,
            "windspeed_unit": if units == "metric" { "km/h" } else { "mph" },
            "description": describe_code(weather.weathercode),
            "code": weather.weathercode,
        }))
    }
}

impl GetWeatherTool {
    async fn geocode(&self, city: &str) -> Result<Option<GeocodingResult>> {
        let resp = self
            .client
            .get(GEOCODING_URL)
            .query(&[("name", city), ("count", "1")])
            .send()
            .await?
            .error_for_status()?;
        let geo: GeocodingResponse = resp.json().await?;
        Ok(geo.results.into_iter().next())
    }

    async fn forecast(
        &self,
        place: &GeocodingResult,
        temp_unit: &str,
        wind_unit: &str,
    ) -> Result<CurrentWeather> {
        let resp = self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("latitude", place.latitude.to_string().as_str()),
                ("longitude", place.longitude.to_string().as_str()),
                ("current_weather", "true"),
                ("temperature_unit", temp_unit),
                ("windspeed_unit", wind_unit),
            ])
            .send()
            .await?
            .error_for_status()?;
        let forecast: ForecastResponse = resp.json().await?;
        Ok(forecast.current_weather)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_code_descriptions() {
        assert_eq!(describe_code(0), "Clear sky");
        assert_eq!(describe_code(63), "Rain");
        assert_eq!(describe_code(95), "Thunderstorm");
        assert_eq!(describe_code(1234), "Unknown conditions");
    }

    #[tokio::test]
    async fn test_missing_city_is_error_payload() {
        let tool = GetWeatherTool::new();
        let out = tool.execute(&Map::new()).await.unwrap();
        assert!(out["error"].is_string());
    }

    #[tokio::test]
    async fn test_rejects_unknown_units() {
        let tool = GetWeatherTool::new();
        let mut args = Map::new();
        args.insert("city".to_string(), json!("Berlin"));
        args.insert("units".to_string(), json!("kelvin"));
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(
            out["error"],
            "Unsupported units 'kelvin'. Use 'metric' or 'imperial'."
        );
    }
}
