use serde_json::Value;

use crate::{entities::TripMap, error::Error, render::export::trip_data};

const TEMPLATE: &str = include_str!("template.html");

const INCOMPLETE_BANNER: &str =
    "<div class=\"banner\">Incomplete route: some log fragments were unusable and left out</div>";

const TRUNCATED_BANNER: &str =
    "<div class=\"banner\">Log search hit its page limit: later route fragments may be missing</div>";

/// Interactive Google Maps page for a trip.
///
/// Continuous segments are drawn solid blue, gaps dashed red. Order and
/// restaurant markers are added for every enriched location with coordinates,
/// and a banner flags routes that lost fragments.
///
/// Every string from the logs is HTML-escaped before it is embedded, since the
/// page builds its info windows and summary from them. Log links that are not
/// https URLs are left out.
pub fn render(trip_map: &TripMap, api_key: Option<&str>) -> Result<String, Error> {
    let mut data = trip_data(trip_map);

    if let Some(Value::Array(links)) = data.get_mut("logLinks") {
        links.retain(|link| link.as_str().map_or(false, |l| l.starts_with("https://")));
    }

    let data = serde_json::to_string(&escape_strings(data))?;

    let maps_query = match api_key {
        Some(key) => format!("key={}&", escape(key)),
        None => String::new(),
    };

    let mut banner = String::new();
    if !trip_map.route.is_complete {
        banner.push_str(INCOMPLETE_BANNER);
    }
    if trip_map.logs_truncated {
        banner.push_str(TRUNCATED_BANNER);
    }

    let html = TEMPLATE
        .replace("{{TITLE}}", &format!("Trip {}", trip_map.trip_id()))
        .replace("{{BANNER}}", &banner)
        .replace("{{MAPS_QUERY}}", &maps_query)
        .replace("{{TRIP_DATA}}", &data);

    Ok(html)
}

fn escape_strings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_strings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, escape_strings(value)))
                .collect(),
        ),
        other => other,
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[test]
fn incomplete_routes_get_a_banner() {
    use crate::render::export::sample_trip_map;

    let mut trip_map = sample_trip_map();

    let html = render(&trip_map, Some("abc")).unwrap();
    assert!(html.contains("class=\"banner\""));
    assert!(html.contains("js?key=abc&callback=initMap"));
    assert!(html.contains(&trip_map.trip_id().to_string()));
    assert!(!html.contains("{{"));

    trip_map.route.is_complete = true;
    let html = render(&trip_map, None).unwrap();
    assert!(!html.contains("class=\"banner\""));
    assert!(html.contains("js?callback=initMap"));

    trip_map.logs_truncated = true;
    let html = render(&trip_map, None).unwrap();
    assert!(html.contains("page limit"));
}

#[test]
fn embedded_data_cannot_inject_markup() {
    use crate::render::export::sample_trip_map;

    let mut trip_map = sample_trip_map();
    trip_map.log_links.push("https://app.datadoghq.com/logs?event=</script><script>alert(1)</script>".into());
    trip_map.log_links.push("javascript:alert(1)".into());
    trip_map.orders[0].order_id = "<img src=x onerror=alert(1)>".into();

    let html = render(&trip_map, None).unwrap();

    assert!(!html.contains("</script><script>alert(1)"));
    assert!(html.contains("&lt;/script&gt;&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(!html.contains("<img src=x"));
    assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
    assert!(!html.contains("javascript:"));
    assert!(html.contains("https://app.datadoghq.com/logs?event=f1"));
}
