use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon, Polygon};

/// Union all parts into one outline. Shared edges vanish; disjoint islands stay
/// separate members of the result.
///
/// Parts must reach `union` together in one call, and must not overlap
/// (even-odd fill): overlapping parts are clipped against earlier ones first.
pub fn dissolve(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let mut parts: Vec<Polygon<f64>> = Vec::with_capacity(geometry.0.len());
    let mut clipped = 0;

    for polygon in geometry.0.iter().filter(|p| p.unsigned_area() > 0.0) {
        let mut piece = MultiPolygon::new(vec![polygon.clone()]);
        for earlier in &parts {
            if overlaps(&piece, earlier) {
                piece = piece.difference(&MultiPolygon::new(vec![earlier.clone()]));
                clipped += 1;
            }
        }
        parts.extend(piece.0.into_iter().filter(|p| p.unsigned_area() > 0.0));
    }

    let outline = MultiPolygon::new(parts).union(&MultiPolygon::new(Vec::new()));

    tracing::debug!(
        "Dissolved {} boundary parts into {} ({} overlaps clipped)",
        geometry.0.len(),
        outline.0.len(),
        clipped
    );
    outline
}

/// Interiors overlap; touching along an edge does not count.
fn overlaps(piece: &MultiPolygon<f64>, other: &Polygon<f64>) -> bool {
    let boxes_meet = match (piece.bounding_rect(), other.bounding_rect()) {
        (Some(a), Some(b)) => a.intersects(&b),
        _ => false,
    };
    boxes_meet && piece.intersection(&MultiPolygon::new(vec![other.clone()])).unsigned_area() > 0.0
}
