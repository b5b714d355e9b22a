//! AMap (高德) REST implementation of `GeoProvider`.
//!
//! Wire details stay inside this module; the pipeline sees `PlaceHit` and
//! `RouteLeg` only.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use sidetrip_core::{GeoPoint, TravelMode};

use crate::provider::{GeoProvider, PlaceHit, RouteLeg};

/// Results per search page, provider maximum we request.
pub const PAGE_SIZE: u32 = 15;

const SEARCH_ROUTE_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct AmapClient {
    http: reqwest::Client,
    key: String,
    base_url: String,
}

impl AmapClient {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(key, "https://restapi.amap.com")
    }

    pub fn with_base_url(key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SEARCH_ROUTE_TIMEOUT)
            .build()
            .context("build amap http client")?;
        Ok(Self {
            http,
            key: key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn fmt_location(p: GeoPoint) -> String {
    format!("{:.6},{:.6}", p.lng, p.lat)
}

fn parse_location(s: &str) -> Option<GeoPoint> {
    let (lng, lat) = s.split_once(',')?;
    Some(GeoPoint::new(lng.trim().parse().ok()?, lat.trim().parse().ok()?))
}

/// AMap returns "[]" instead of a string for missing text fields.
fn flatten_field(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

#[derive(Deserialize)]
struct SearchResp {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    pois: Vec<RawPoi>,
}

#[derive(Deserialize)]
struct RawPoi {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    category: serde_json::Value,
    #[serde(default)]
    address: serde_json::Value,
    #[serde(default)]
    location: String,
    #[serde(default)]
    distance: serde_json::Value,
}

#[derive(Deserialize)]
struct DirectionResp {
    status: String,
    #[serde(default)]
    info: String,
    route: Option<RawRoute>,
}

#[derive(Deserialize)]
struct RawRoute {
    #[serde(default)]
    paths: Vec<RawPath>,
}

#[derive(Deserialize)]
struct RawPath {
    #[serde(default)]
    duration: String,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    polyline: String,
}

#[async_trait]
impl GeoProvider for AmapClient {
    async fn search_nearby(
        &self,
        origin: GeoPoint,
        keyword: &str,
        radius_m: f64,
        page: u32,
        city: Option<&str>,
    ) -> Result<Vec<PlaceHit>> {
        let url = format!("{}/v3/place/around", self.base_url);
        let radius = format!("{}", radius_m.round() as i64);
        let offset = PAGE_SIZE.to_string();
        let page = page.to_string();
        let location = fmt_location(origin);

        let mut query: Vec<(&str, &str)> = vec![
            ("key", &self.key),
            ("location", &location),
            ("keywords", keyword),
            ("radius", &radius),
            ("offset", &offset),
            ("page", &page),
            ("sortrule", "distance"),
        ];
        if let Some(c) = city.filter(|c| !c.is_empty()) {
            query.push(("city", c));
        }

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("amap place/around request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("amap place/around error: {status}");
        }
        let out: SearchResp = resp.json().await.context("parse amap place/around response")?;
        if out.status != "1" {
            bail!("amap place/around rejected: {}", out.info);
        }

        let hits = out
            .pois
            .into_iter()
            .filter_map(|p| {
                let location = parse_location(&p.location)?;
                Some(PlaceHit {
                    name: p.name,
                    category: flatten_field(&p.category),
                    address: flatten_field(&p.address),
                    location,
                    distance_meters: flatten_field(&p.distance).parse().ok(),
                })
            })
            .collect();
        Ok(hits)
    }

    async fn route(
        &self,
        mode: TravelMode,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteLeg> {
        // Bicycling lives under the v4 API with a different envelope; walk
        // and drive share the v3 shape.
        let path = match mode {
            TravelMode::Walk => "/v3/direction/walking",
            TravelMode::Drive => "/v3/direction/driving",
            TravelMode::Bike => "/v4/direction/bicycling",
        };
        let url = format!("{}{}", self.base_url, path);
        let origin_s = fmt_location(origin);
        let dest_s = fmt_location(destination);
        let query: Vec<(&str, &str)> = vec![
            ("key", &self.key),
            ("origin", &origin_s),
            ("destination", &dest_s),
        ];

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("amap direction request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("amap direction error: {status}");
        }

        if mode == TravelMode::Bike {
            #[derive(Deserialize)]
            struct V4Resp {
                errcode: i64,
                #[serde(default)]
                errmsg: String,
                data: Option<RawRoute>,
            }
            let out: V4Resp = resp.json().await.context("parse amap bicycling response")?;
            if out.errcode != 0 {
                bail!("amap bicycling rejected: {}", out.errmsg);
            }
            return first_leg(out.data.and_then(|r| r.paths.into_iter().next()));
        }

        let out: DirectionResp = resp.json().await.context("parse amap direction response")?;
        if out.status != "1" {
            bail!("amap direction rejected: {}", out.info);
        }
        first_leg(out.route.and_then(|r| r.paths.into_iter().next()))
    }
}

fn first_leg(path: Option<RawPath>) -> Result<RouteLeg> {
    let Some(path) = path else {
        bail!("amap direction returned no path");
    };
    let duration_seconds: i64 = path
        .duration
        .parse()
        .with_context(|| format!("bad duration '{}'", path.duration))?;
    let polyline = path
        .steps
        .iter()
        .map(|s| s.polyline.as_str())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(";");
    Ok(RouteLeg { duration_seconds, polyline })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let p = parse_location("112.938814,28.228209").unwrap();
        assert!((p.lng - 112.938814).abs() < 1e-9);
        assert!((p.lat - 28.228209).abs() < 1e-9);
        assert!(parse_location("garbage").is_none());
        assert!(parse_location("1,2,3").is_none());
    }

    #[test]
    fn test_flatten_field_tolerates_array() {
        assert_eq!(flatten_field(&serde_json::json!("五一大道")), "五一大道");
        assert_eq!(flatten_field(&serde_json::json!([])), "");
    }

    #[test]
    fn test_first_leg_joins_step_polylines() {
        let path = RawPath {
            duration: "754".to_string(),
            steps: vec![
                RawStep { polyline: "112.9,28.2;112.91,28.21".to_string() },
                RawStep { polyline: String::new() },
                RawStep { polyline: "112.91,28.21;112.92,28.22".to_string() },
            ],
        };
        let leg = first_leg(Some(path)).unwrap();
        assert_eq!(leg.duration_seconds, 754);
        assert_eq!(leg.polyline, "112.9,28.2;112.91,28.21;112.91,28.21;112.92,28.22");
    }

    #[test]
    fn test_first_leg_requires_path() {
        assert!(first_leg(None).is_err());
    }
}
