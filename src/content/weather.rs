//! Current weather from the Open-Meteo forecast API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use crate::content::ContentSource;
use crate::AlarmError;

const DEFAULT_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";

pub struct WeatherSource {
    http: Client,
}

impl WeatherSource {
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()?,
        })
    }
}

fn failure(message: impl Into<String>) -> AlarmError {
    AlarmError::ContentSource {
        source_name: "weather".to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl ContentSource for WeatherSource {
    async fn fetch(&self, options: &HashMap<String, String>) -> crate::Result<String> {
        let latitude = options
            .get("latitude")
            .ok_or_else(|| failure("option 'latitude' is missing"))?;
        let longitude = options
            .get("longitude")
            .ok_or_else(|| failure("option 'longitude' is missing"))?;
        let endpoint = options
            .get("endpoint")
            .map(|e| e.trim_end_matches('/'))
            .unwrap_or(DEFAULT_ENDPOINT);

        let response = self
            .http
            .get(endpoint)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", "temperature_2m,weather_code,wind_speed_10m"),
                ("daily", "temperature_2m_max,temperature_2m_min"),
                ("wind_speed_unit", "ms"),
                ("timezone", "auto"),
                ("forecast_days", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let forecast: ForecastResponse = response.json().await?;
        Ok(describe(&forecast, options.get("location").map(String::as_str)))
    }
}

fn describe(forecast: &ForecastResponse, location: Option<&str>) -> String {
    let current = &forecast.current;
    let mut text = match location {
        Some(place) => format!("The weather in {}: ", place),
        None => "The weather: ".to_string(),
    };
    text.push_str(&format!(
        "{}, {} degrees, wind {} meters per second.",
        condition(current.weather_code),
        current.temperature_2m.round(),
        current.wind_speed_10m.round()
    ));

    if let (Some(high), Some(low)) = (
        forecast.daily.temperature_2m_max.first(),
        forecast.daily.temperature_2m_min.first(),
    ) {
        text.push_str(&format!(
            " Today's high is {} and the low {} degrees.",
            high.round(),
            low.round()
        ));
    }

    text
}

/// WMO weather interpretation code
fn condition(code: u8) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorms",
        _ => "unsettled weather",
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentWeather,
    #[serde(default)]
    daily: DailyWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature_2m: f64,
    weather_code: u8,
    wind_speed_10m: f64,
}

#[derive(Debug, Default, Deserialize)]
struct DailyWeather {
    #[serde(default)]
    temperature_2m_max: Vec<f64>,
    #[serde(default)]
    temperature_2m_min: Vec<f64>,
}
