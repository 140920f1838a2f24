//! Esri JSON polygon conversion.
//!
//! Esri encodes a polygon as a flat list of `rings`. Exterior rings run
//! clockwise and holes counter-clockwise; each hole belongs to the
//! exterior ring that precedes it.

/// Converts Esri JSON geometry (`{ "rings": [...] }`) to a `GeoJSON`
/// `Polygon` or `MultiPolygon` value.
///
/// Returns `None` if there are no usable rings.
#[must_use]
pub fn esri_to_geojson(esri_geom: &serde_json::Value) -> Option<serde_json::Value> {
    let rings = esri_geom.get("rings")?.as_array()?;

    let mut polygons: Vec<Vec<&serde_json::Value>> = Vec::new();
    for ring in rings {
        let Some(area) = signed_area(ring) else {
            continue;
        };
        // Shoelace area is negative for clockwise rings.
        if area < 0.0 || polygons.is_empty() {
            polygons.push(vec![ring]);
        } else if let Some(current) = polygons.last_mut() {
            current.push(ring);
        }
    }

    match polygons.len() {
        0 => None,
        1 => Some(serde_json::json!({
            "type": "Polygon",
            "coordinates": polygons[0],
        })),
        _ => Some(serde_json::json!({
            "type": "MultiPolygon",
            "coordinates": polygons,
        })),
    }
}

/// Shoelace signed area of a ring of `[x, y]` pairs. `None` if the ring
/// is malformed or has fewer than three distinct vertices.
fn signed_area(ring: &serde_json::Value) -> Option<f64> {
    let points: Vec<(f64, f64)> = ring
        .as_array()?
        .iter()
        .map(|p| Some((p.get(0)?.as_f64()?, p.get(1)?.as_f64()?)))
        .collect::<Option<_>>()?;

    if points.len() < 4 {
        return None;
    }

    let twice_area: f64 = points
        .windows(2)
        .map(|w| w[0].0.mul_add(w[1].1, -(w[1].0 * w[0].1)))
        .sum();
    Some(twice_area / 2.0)
}
