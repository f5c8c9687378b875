pub mod export;
pub mod html;

use std::path::{Path, PathBuf};

use crate::{entities::TripMap, error::Error};

/// Writes `trip-<id>.html` and `trip-<id>.json` into `output_dir`, creating it if needed.
#[tracing::instrument(skip(trip_map, api_key), fields(trip_id = %trip_map.trip_id()))]
pub async fn write_trip_map(
    trip_map: &TripMap,
    output_dir: &Path,
    api_key: Option<&str>,
) -> Result<Vec<PathBuf>, Error> {
    tokio::fs::create_dir_all(output_dir).await?;

    let stem = trip_map.file_stem();
    let html_path = output_dir.join(format!("{}.html", stem));
    let json_path = output_dir.join(format!("{}.json", stem));

    tokio::fs::write(&html_path, html::render(trip_map, api_key)?).await?;
    tokio::fs::write(
        &json_path,
        serde_json::to_string_pretty(&export::trip_data(trip_map))?,
    )
    .await?;

    tracing::info!("wrote {} and {}", html_path.display(), json_path.display());

    Ok(vec![html_path, json_path])
}

#[test]
fn writes_html_and_json() {
    use tokio_test::block_on;

    let trip_map = export::sample_trip_map();
    let dir = std::env::temp_dir().join(format!("tripmap-{}", uuid::Uuid::new_v4()));

    let paths = block_on(write_trip_map(&trip_map, &dir, None)).unwrap();

    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with(format!("trip-{}.html", trip_map.trip_id())));

    let json = std::fs::read_to_string(&paths[1]).unwrap();
    let data: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(data["fragmentCount"], 2);

    std::fs::remove_dir_all(&dir).unwrap();
}
