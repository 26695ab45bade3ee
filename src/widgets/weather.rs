//! Current temperature from open-meteo and the windy radar embed.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::config::WidgetsConfig;
use crate::error::PortalError;

/// Radar iframe for a location.
pub fn radar_embed_url(lat: f64, lon: f64) -> String {
    format!(
        "https://embed.windy.com/embed2.html?lat={lat}&lon={lon}&detailLat={lat}&detailLon={lon}\
         &width=400&height=300&zoom=10&level=surface&overlay=radar&product=radar&menu=&message=\
         &marker=&calendar=now&pressure=&type=map&location=coordinates&detail=&metricWind=default\
         &metricTemp=default&radarRange=-1"
    )
}

#[derive(Debug, Deserialize)]
struct Forecast {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
}

#[derive(Debug)]
pub struct WeatherService {
    http: reqwest::Client,
    api_url: String,
    default_lat: f64,
    default_lon: f64,
}

impl WeatherService {
    pub fn new(config: &WidgetsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.weather_api_url.clone(),
            default_lat: config.latitude,
            default_lon: config.longitude,
        }
    }

    pub fn default_location(&self) -> (f64, f64) {
        (self.default_lat, self.default_lon)
    }

    pub async fn current_temperature(&self, lat: f64, lon: f64) -> Result<f64, reqwest::Error> {
        let forecast: Forecast = self
            .http
            .get(&self.api_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(forecast.current_weather.temperature)
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse {
    /// Rounded to whole degrees; null when open-meteo is unreachable.
    pub temperature_c: Option<i64>,
    pub radar_url: String,
}

fn validate(lat: f64, lon: f64) -> Result<(), PortalError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(PortalError::BadRequest(format!("invalid coordinates: {lat}, {lon}")));
    }
    Ok(())
}

/// GET /api/weather?lat=&lon=
pub async fn get_weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<WeatherResponse>, PortalError> {
    let (default_lat, default_lon) = state.weather.default_location();
    let lat = query.lat.unwrap_or(default_lat);
    let lon = query.lon.unwrap_or(default_lon);
    validate(lat, lon)?;

    #[allow(clippy::cast_possible_truncation)]
    let temperature_c = match state.weather.current_temperature(lat, lon).await {
        Ok(t) => Some(t.round() as i64),
        Err(e) => {
            tracing::warn!(name: "weather.failed", error = %e, "Weather fetch failed");
            None
        }
    };

    Ok(Json(WeatherResponse {
        temperature_c,
        radar_url: radar_embed_url(lat, lon),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radar_url() {
        let url = radar_embed_url(34.397, 132.475);
        assert!(url.starts_with("https://embed.windy.com/embed2.html?lat=34.397&lon=132.475"));
        assert!(url.contains("detailLat=34.397&detailLon=132.475"));
        assert!(url.contains("overlay=radar"));
        assert!(!url.contains(' '));
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate(34.4, 132.5).is_ok());
        assert!(validate(91.0, 0.0).is_err());
        assert!(validate(0.0, -181.0).is_err());
    }

    #[test]
    fn test_forecast_shape() {
        let f: Forecast = serde_json::from_str(
            r#"{"latitude":34.4,"current_weather":{"temperature":18.6,"windspeed":3.1}}"#,
        )
        .unwrap();
        assert!((f.current_weather.temperature - 18.6).abs() < f64::EPSILON);
    }
}
