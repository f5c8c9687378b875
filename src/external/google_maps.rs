use std::path::Path;

use crate::{
    config::GoogleMapsSettings,
    entities::{RouteSegment, UnifiedRoute, Waypoint},
    error::{invalid_config_error, invalid_input_error, upstream_error, Error},
    polyline,
};

const STATIC_MAP_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";

/// Longest URL the Static Maps API accepts.
pub const MAX_URL_LENGTH: usize = 8192;

const CONTINUOUS_STYLE: &str = "color:0x1a73e8ff|weight:4";
const GAP_STYLE: &str = "color:0xd93025ff|weight:3";

/// Static map of the route, one path per segment with gaps drawn in red.
///
/// Long routes are simplified by dropping interior points of continuous
/// segments until the URL fits in [`MAX_URL_LENGTH`].
pub fn static_map_url(
    route: &UnifiedRoute,
    settings: &GoogleMapsSettings,
) -> Result<String, Error> {
    let key = settings
        .api_key
        .as_deref()
        .ok_or_else(|| invalid_config_error("GOOGLE_MAPS_API_KEY is required for static maps"))?;

    if route.waypoints.is_empty() {
        return Err(invalid_input_error());
    }

    let mut stride = 1;

    loop {
        let segments: Vec<RouteSegment> = route
            .segments
            .iter()
            .map(|segment| decimate(segment, stride))
            .collect();

        let url = build_url(route, &segments, settings, key)?;

        if url.len() <= MAX_URL_LENGTH {
            if stride > 1 {
                tracing::debug!("kept every {}th point to fit the static map URL", stride);
            }
            return Ok(url);
        }

        let longest = route
            .segments
            .iter()
            .map(|s| s.waypoints.len())
            .max()
            .unwrap_or(0);

        if stride >= longest {
            tracing::warn!(
                "static map URL is {} characters even without interior points",
                url.len()
            );
            return Err(invalid_input_error());
        }

        stride *= 2;
    }
}

/// Every `stride`th waypoint of a continuous segment, endpoints always kept.
fn decimate(segment: &RouteSegment, stride: usize) -> RouteSegment {
    let waypoints = &segment.waypoints;

    if stride <= 1 || segment.is_gap() || waypoints.len() <= 2 {
        return segment.clone();
    }

    let last = waypoints.len() - 1;
    let kept: Vec<Waypoint> = waypoints
        .iter()
        .enumerate()
        .filter(|(i, _)| *i == 0 || *i == last || i % stride == 0)
        .map(|(_, w)| w.clone())
        .collect();

    RouteSegment {
        waypoints: kept,
        ..segment.clone()
    }
}

fn build_url(
    route: &UnifiedRoute,
    segments: &[RouteSegment],
    settings: &GoogleMapsSettings,
    key: &str,
) -> Result<String, Error> {
    let mut params: Vec<(&str, String)> = vec![
        ("size", settings.size.clone()),
        ("scale", settings.scale.to_string()),
    ];

    for segment in segments {
        let style = if segment.is_gap() { GAP_STYLE } else { CONTINUOUS_STYLE };
        params.push((
            "path",
            format!("{}|enc:{}", style, polyline::encode(&segment.waypoints)),
        ));
    }

    if let (Some(start), Some(end)) = (route.waypoints.first(), route.waypoints.last()) {
        params.push(("markers", format!("color:green|label:S|{}", point(start))));
        params.push(("markers", format!("color:red|label:E|{}", point(end))));
    }

    params.push(("key", key.to_string()));

    let url = reqwest::Url::parse_with_params(STATIC_MAP_URL, &params)
        .map_err(|_| invalid_input_error())?;

    Ok(url.into())
}

fn point(waypoint: &Waypoint) -> String {
    format!("{:.6},{:.6}", waypoint.latitude, waypoint.longitude)
}

#[tracing::instrument(skip(url))]
pub async fn download_static_map(url: &str, path: &Path) -> Result<(), Error> {
    let res = reqwest::Client::new().get(url).send().await?;

    let status_code = res.status().as_u16();

    if status_code >= 400 && status_code < 500 {
        return Err(invalid_input_error());
    } else if status_code != 200 {
        return Err(upstream_error());
    }

    let bytes = res.bytes().await?;
    tokio::fs::write(path, &bytes).await?;

    tracing::info!("wrote {} ({} bytes)", path.display(), bytes.len());

    Ok(())
}

#[cfg(test)]
fn settings() -> GoogleMapsSettings {
    GoogleMapsSettings {
        api_key: Some("test-key".into()),
        ..GoogleMapsSettings::default()
    }
}

#[cfg(test)]
fn route(segments: Vec<RouteSegment>) -> UnifiedRoute {
    let waypoints: Vec<Waypoint> = segments
        .iter()
        .filter(|s| !s.is_gap())
        .flat_map(|s| s.waypoints.clone())
        .collect();

    UnifiedRoute {
        trip_id: uuid::Uuid::new_v4(),
        is_complete: true,
        waypoints,
        segments,
        fragment_count: 1,
        warnings: vec![],
    }
}

#[test]
fn static_map_url_draws_each_segment() {
    let first = vec![Waypoint::new(38.5, -120.2), Waypoint::new(40.7, -120.95)];
    let second = vec![Waypoint::new(43.252, -126.453), Waypoint::new(43.3, -126.5)];

    let route = route(vec![
        RouteSegment::continuous(first.clone(), "a"),
        RouteSegment::gap(first[1].clone(), second[0].clone()),
        RouteSegment::continuous(second, "b"),
    ]);

    let url = static_map_url(&route, &settings()).unwrap();
    let parsed = reqwest::Url::parse(&url).unwrap();
    let paths: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| k == "path")
        .map(|(_, v)| v.into_owned())
        .collect();

    assert!(url.starts_with(STATIC_MAP_URL));
    assert_eq!(paths.len(), 3);
    assert_eq!(paths[0], format!("{}|enc:_p~iF~ps|U_ulLnnqC", CONTINUOUS_STYLE));
    assert!(paths[1].starts_with(GAP_STYLE));
    assert!(parsed.query_pairs().any(|(k, v)| k == "key" && v == "test-key"));
    assert_eq!(parsed.query_pairs().filter(|(k, _)| k == "markers").count(), 2);
}

#[test]
fn long_routes_are_decimated_to_fit() {
    let waypoints: Vec<Waypoint> = (0..4000)
        .map(|i| Waypoint::new(37.0 + i as f64 * 0.0013, -122.0 - i as f64 * 0.0017))
        .collect();
    let (first, last) = (waypoints[0].clone(), waypoints[3999].clone());

    let route = route(vec![RouteSegment::continuous(waypoints, "a")]);
    let url = static_map_url(&route, &settings()).unwrap();

    assert!(url.len() <= MAX_URL_LENGTH);

    let parsed = reqwest::Url::parse(&url).unwrap();
    let (_, path) = parsed.query_pairs().find(|(k, _)| k == "path").unwrap();
    let encoded = path.split("enc:").nth(1).unwrap();
    let decoded = polyline::decode(encoded);

    assert!(decoded.len() < 4000);
    assert!(decoded.first().unwrap().is_near(&first, 1e-5));
    assert!(decoded.last().unwrap().is_near(&last, 1e-5));
}

#[test]
fn static_map_requires_an_api_key() {
    let route = route(vec![RouteSegment::continuous(
        vec![Waypoint::new(1.0, 1.0), Waypoint::new(1.1, 1.1)],
        "a",
    )]);

    let err = static_map_url(&route, &GoogleMapsSettings::default()).unwrap_err();

    assert_eq!(err.code, 102);
}

#[test]
fn decimation_keeps_gaps_and_endpoints() {
    let waypoints: Vec<Waypoint> = (0..10).map(|i| Waypoint::new(i as f64, 0.0)).collect();
    let segment = RouteSegment::continuous(waypoints, "a");

    let halved = decimate(&segment, 4);
    let latitudes: Vec<f64> = halved.waypoints.iter().map(|w| w.latitude).collect();
    assert_eq!(latitudes, vec![0.0, 4.0, 8.0, 9.0]);

    let gap = RouteSegment::gap(Waypoint::new(0.0, 0.0), Waypoint::new(1.0, 1.0));
    assert_eq!(decimate(&gap, 8), gap);
}
