//! Planar polygon geometry in lon/lat degrees.

use hydro_common::BoundingBox;

/// Closed ring of `(lon, lat)` vertices. The closing vertex may be repeated.
pub type Ring = Vec<(f64, f64)>;

/// A polygon with an exterior ring and zero or more holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    /// True when the point is inside the exterior ring and outside every hole.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|h| ring_contains(h, lon, lat))
    }

    /// Area of the exterior minus its holes.
    pub fn area(&self) -> f64 {
        ring_area(&self.exterior).abs() - self.holes.iter().map(|h| ring_area(h).abs()).sum::<f64>()
    }
}

/// One or more polygons treated as a single catchment footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPolygon {
    pub polygons: Vec<Polygon>,
}

impl MultiPolygon {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.contains_point(lon, lat))
    }

    /// Extent of all exterior rings.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(
            self.polygons
                .iter()
                .flat_map(|p| p.exterior.iter().copied()),
        )
    }

    /// A point that lies on the footprint.
    ///
    /// The centroid of the largest polygon when it falls inside that polygon,
    /// otherwise the midpoint of the widest horizontal chord through the
    /// polygon's vertical centre.
    pub fn representative_point(&self) -> Option<(f64, f64)> {
        let largest = self
            .polygons
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))?;

        if let Some((cx, cy)) = ring_centroid(&largest.exterior) {
            if largest.contains_point(cx, cy) {
                return Some((cx, cy));
            }
        }

        let bbox = BoundingBox::from_points(largest.exterior.iter().copied())?;
        let y = (bbox.min_y + bbox.max_y) / 2.0;
        let mut crossings = ring_crossings(&largest.exterior, y);
        for hole in &largest.holes {
            crossings.extend(ring_crossings(hole, y));
        }
        crossings.sort_by(f64::total_cmp);

        crossings
            .chunks_exact(2)
            .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])))
            .map(|pair| ((pair[0] + pair[1]) / 2.0, y))
            .or(Some((bbox.min_x + bbox.width() / 2.0, y)))
    }
}

/// Ray casting point-in-ring test.
pub fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Signed shoelace area.
fn ring_area(ring: &[(f64, f64)]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    // Shift to the first vertex to limit cancellation on small catchments
    let (ox, oy) = ring[0];
    let mut sum = 0.0;
    for i in 0..n {
        let (x0, y0) = (ring[i].0 - ox, ring[i].1 - oy);
        let (x1, y1) = (ring[(i + 1) % n].0 - ox, ring[(i + 1) % n].1 - oy);
        sum += x0 * y1 - x1 * y0;
    }
    sum / 2.0
}

fn ring_centroid(ring: &[(f64, f64)]) -> Option<(f64, f64)> {
    let a = ring_area(ring);
    if a == 0.0 {
        return None;
    }
    let n = ring.len();
    let (ox, oy) = ring[0];
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let (x0, y0) = (ring[i].0 - ox, ring[i].1 - oy);
        let (x1, y1) = (ring[(i + 1) % n].0 - ox, ring[(i + 1) % n].1 - oy);
        let cross = x0 * y1 - x1 * y0;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }
    Some((ox + cx / (6.0 * a), oy + cy / (6.0 * a)))
}

/// X coordinates where the horizontal line `y` crosses the ring's edges.
fn ring_crossings(ring: &[(f64, f64)], y: f64) -> Vec<f64> {
    let n = ring.len();
    let mut xs = Vec::new();
    if n < 3 {
        return xs;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) {
            xs.push((xj - xi) * (y - yi) / (yj - yi) + xi);
        }
        j = i;
    }
    xs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Ring {
        vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ]
    }

    #[test]
    fn test_ring_contains() {
        let ring = square(0.0, 0.0, 2.0);
        assert!(ring_contains(&ring, 1.0, 1.0));
        assert!(!ring_contains(&ring, 3.0, 1.0));
        assert!(!ring_contains(&ring[..2], 1.0, 1.0));
    }

    #[test]
    fn test_holes_are_excluded() {
        let poly = Polygon::new(square(0.0, 0.0, 4.0), vec![square(1.0, 1.0, 2.0)]);
        assert!(poly.contains_point(0.5, 0.5));
        assert!(!poly.contains_point(2.0, 2.0));
        assert_eq!(poly.area(), 12.0);
    }

    #[test]
    fn test_multipolygon_contains_either_part() {
        let mp = MultiPolygon::new(vec![
            Polygon::new(square(0.0, 0.0, 1.0), vec![]),
            Polygon::new(square(5.0, 5.0, 1.0), vec![]),
        ]);
        assert!(mp.contains_point(0.5, 0.5));
        assert!(mp.contains_point(5.5, 5.5));
        assert!(!mp.contains_point(3.0, 3.0));
        assert_eq!(mp.bbox(), Some(BoundingBox::new(0.0, 0.0, 6.0, 6.0)));
    }

    #[test]
    fn test_representative_point_of_square_is_centre() {
        let mp = MultiPolygon::new(vec![Polygon::new(square(-71.0, -33.0, 0.01), vec![])]);
        let (x, y) = mp.representative_point().unwrap();
        assert!((x - -70.995).abs() < 1e-9, "x = {}", x);
        assert!((y - -32.995).abs() < 1e-9);
    }

    #[test]
    fn test_representative_point_avoids_hole() {
        let poly = Polygon::new(square(0.0, 0.0, 4.0), vec![square(1.0, 1.0, 2.0)]);
        let mp = MultiPolygon::new(vec![poly.clone()]);
        let (x, y) = mp.representative_point().unwrap();
        assert!(poly.contains_point(x, y));
    }
}
