/// KML placemark extraction
///
/// Scans a KML document for `<Placemark>` elements and turns each one into
/// a typed feature. This is a linear tag scan, not an XML parser: it only
/// looks at `<name>`, `<description>` and the first `<coordinates>` of each
/// placemark.
///
/// Geometry type is inferred from the number of coordinate pairs, not read
/// from the `<Point>`/`<LineString>`/`<Polygon>` tag: one pair is a point,
/// two a line, three or more a polygon. A two-vertex ring therefore comes
/// out as a line.
use serde::Serialize;

/// A WGS84 position. KML writes these as `lon,lat[,alt]`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "coordinates", rename_all = "lowercase")]
pub enum Geometry {
    Point(LatLng),
    Line(Vec<LatLng>),
    Polygon(Vec<LatLng>),
}

impl Geometry {
    /// Classify a non-empty coordinate list by its length
    fn from_points(mut points: Vec<LatLng>) -> Option<Self> {
        match points.len() {
            0 => None,
            1 => points.pop().map(Geometry::Point),
            2 => Some(Geometry::Line(points)),
            _ => Some(Geometry::Polygon(points)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "point",
            Geometry::Line(_) => "line",
            Geometry::Polygon(_) => "polygon",
        }
    }

    pub fn points(&self) -> &[LatLng] {
        match self {
            Geometry::Point(point) => std::slice::from_ref(point),
            Geometry::Line(points) | Geometry::Polygon(points) => points,
        }
    }
}

/// One placemark with at least one valid coordinate
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Feature {
    pub name: String,
    pub description: String,
    pub geometry: Geometry,
}

/// Bounding box over every point of every feature
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Features of one document together with their bounds
///
/// An empty set is a valid result (a document with nothing to draw),
/// distinct from failing to read the document at all.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
    pub bounds: Option<Bounds>,
}

impl FeatureSet {
    pub fn from_kml(text: &str) -> Self {
        let features = extract(text);
        let bounds = compute_bounds(&features);
        FeatureSet { features, bounds }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Extract placemark features in document order
///
/// Placemarks without a name are called `Feature <n>` where `n` is the
/// placemark's 1-based position in the document. Placemarks with no valid
/// coordinate pair are left out.
pub fn extract(text: &str) -> Vec<Feature> {
    placemarks(text)
        .enumerate()
        .filter_map(|(index, block)| {
            let points = element_text(block, "coordinates")
                .map(parse_coordinates)
                .unwrap_or_default();
            let geometry = Geometry::from_points(points)?;

            let name = element_text(block, "name")
                .map(|raw| decode_text(raw).trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("Feature {}", index + 1));
            let description = element_text(block, "description")
                .map(|raw| decode_text(raw).trim().to_string())
                .unwrap_or_default();

            Some(Feature {
                name,
                description,
                geometry,
            })
        })
        .collect()
}

/// Min/max latitude and longitude across all features, `None` when empty
pub fn compute_bounds(features: &[Feature]) -> Option<Bounds> {
    features
        .iter()
        .flat_map(|feature| feature.geometry.points())
        .fold(None, |bounds: Option<Bounds>, p| {
            Some(match bounds {
                None => Bounds {
                    north: p.lat,
                    south: p.lat,
                    east: p.lng,
                    west: p.lng,
                },
                Some(b) => Bounds {
                    north: b.north.max(p.lat),
                    south: b.south.min(p.lat),
                    east: b.east.max(p.lng),
                    west: b.west.min(p.lng),
                },
            })
        })
}

/// Parse a `<coordinates>` body: whitespace-separated `lon,lat[,alt]` tuples
fn parse_coordinates(text: &str) -> Vec<LatLng> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',');
            let lng = parts.next()?.trim().parse::<f64>().ok()?;
            let lat = parts.next()?.trim().parse::<f64>().ok()?;
            (lng.is_finite() && lat.is_finite()).then_some(LatLng { lat, lng })
        })
        .collect()
}

/// Iterate over the inner text of every `<Placemark>` element
fn placemarks(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let (_, body_start, self_closing) = find_open_tag(text, "Placemark", cursor)?;
        if self_closing {
            cursor = body_start;
            return Some("");
        }
        let body_end = text[body_start..]
            .find("</Placemark")
            .map(|offset| body_start + offset)
            .unwrap_or(text.len());
        cursor = body_end;
        Some(&text[body_start..body_end])
    })
}

/// Raw inner text of the first `<tag>` element in `block`
fn element_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let (_, body_start, self_closing) = find_open_tag(block, tag, 0)?;
    if self_closing {
        return Some("");
    }
    let close = format!("</{}", tag);
    let body_end = block[body_start..]
        .find(&close)
        .map(|offset| body_start + offset)?;
    Some(&block[body_start..body_end])
}

/// Locate `<tag>` or `<tag attr=...>` at or after `from`
///
/// Returns (tag start, body start, self-closing).
fn find_open_tag(text: &str, tag: &str, from: usize) -> Option<(usize, usize, bool)> {
    let needle = format!("<{}", tag);
    let mut search = from;
    while let Some(offset) = text.get(search..)?.find(&needle) {
        let start = search + offset;
        let after = start + needle.len();
        match text[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {
                let close = text[after..].find('>')? + after;
                let self_closing = text[..close].ends_with('/');
                return Some((start, close + 1, self_closing));
            }
            // `<nameX>` is a different element
            _ => search = after,
        }
    }
    None
}

/// Unwrap CDATA and decode the predefined XML entities
fn decode_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|rest| rest.strip_suffix("]]>"))
    {
        return inner.to_string();
    }
    trimmed
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(placemarks: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>{}</Document></kml>"#,
            placemarks
        )
    }

    #[test]
    fn test_point_keeps_lon_lat_order() {
        let features = extract(&doc(
            "<Placemark><name>Stall</name><Point><coordinates>10,20</coordinates></Point></Placemark>",
        ));
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name, "Stall");
        assert_eq!(features[0].geometry, Geometry::Point(LatLng { lat: 20.0, lng: 10.0 }));
        assert_eq!(features[0].geometry.kind(), "point");
    }

    #[test]
    fn test_empty_and_invalid_coordinates_excluded() {
        let features = extract(&doc(
            "<Placemark><name>A</name><coordinates></coordinates></Placemark>\
             <Placemark><name>B</name><coordinates>abc,def 1</coordinates></Placemark>\
             <Placemark><name>C</name></Placemark>\
             <Placemark><name>D</name><coordinates>1,2</coordinates></Placemark>",
        ));
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name, "D");
    }

    #[test]
    fn test_default_name_uses_document_position() {
        let features = extract(&doc(
            "<Placemark><coordinates></coordinates></Placemark>\
             <Placemark><coordinates>1,2</coordinates></Placemark>",
        ));
        assert_eq!(features[0].name, "Feature 2");
        assert_eq!(features[0].description, "");
    }

    #[test]
    fn test_classification_by_count() {
        let features = extract(&doc(
            "<Placemark><LineString><coordinates>1,1 2,2</coordinates></LineString></Placemark>\
             <Placemark id=\"ward\"><Polygon><outerBoundaryIs><LinearRing><coordinates>\n\
               72.8,19.0,0 72.9,19.0,0 72.9,19.1,0 72.8,19.0,0\n\
             </coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>\
             <Placemark><Polygon><coordinates>5,5 6,6</coordinates></Polygon></Placemark>",
        ));
        let kinds: Vec<_> = features.iter().map(|f| f.geometry.kind()).collect();
        assert_eq!(kinds, vec!["line", "polygon", "line"]);
        assert_eq!(features[1].geometry.points().len(), 4);
    }

    #[test]
    fn test_cdata_and_entities() {
        let features = extract(&doc(
            "<Placemark><name>Dadar &amp; Parel</name>\
             <description><![CDATA[<b>busy</b>]]></description>\
             <coordinates>1,2</coordinates></Placemark>",
        ));
        assert_eq!(features[0].name, "Dadar & Parel");
        assert_eq!(features[0].description, "<b>busy</b>");
    }

    #[test]
    fn test_similar_tag_names_not_confused() {
        let features = extract(&doc(
            "<Placemark><namespace>x</namespace><name>Real</name><coordinates>1,2</coordinates></Placemark>",
        ));
        assert_eq!(features[0].name, "Real");
    }

    #[test]
    fn test_bounds() {
        assert!(compute_bounds(&[]).is_none());

        let single = extract(&doc("<Placemark><coordinates>72.8,19.1</coordinates></Placemark>"));
        let b = compute_bounds(&single).unwrap();
        assert_eq!((b.north, b.south), (19.1, 19.1));
        assert_eq!((b.east, b.west), (72.8, 72.8));

        let many = extract(&doc(
            "<Placemark><coordinates>72.8,19.1</coordinates></Placemark>\
             <Placemark><coordinates>72.9,18.9 73.0,19.3 72.7,19.0</coordinates></Placemark>",
        ));
        let b = compute_bounds(&many).unwrap();
        assert_eq!(b, Bounds { north: 19.3, south: 18.9, east: 73.0, west: 72.7 });
    }

    #[test]
    fn test_feature_set_empty_state() {
        let set = FeatureSet::from_kml(&doc(""));
        assert!(set.is_empty());
        assert!(set.bounds.is_none());
    }
}
