//! Trail centerline assembly
//!
//! A named trail usually has several centerline providers: an official agency
//! line, a community-maintained line, sometimes a personally recorded track.
//! None of them are coordinate-identical, they disagree on direction, and
//! each covers a different subset of the trail. This module merges them into
//! one ordered multi-part line: where providers overlap spatially the more
//! authoritative one wins, everything is oriented along the trail, and spans
//! no provider covers stay as explicit gaps.
//!
//! Overlap is tested with a buffered corridor rather than exact coincidence,
//! since provider coordinates differ by tens of meters for the same tread.

use crate::crs::{Crs, reproject};
use crate::geom::{DENSIFY_STEP_DEG, buffer_projected, densify};
use crate::{Error, Result};
use geo::{
    BooleanOps, Distance, Euclidean, Geometry, Length, LineLocatePoint, LineString,
    MultiLineString, MultiPolygon, Point,
};
use std::collections::BTreeMap;

/// One provider's centerline for a section of trail, in WGS84
#[derive(Clone, Debug)]
pub struct Centerline {
    /// Provider identifier, e.g. `"official"` or `"community"`
    pub source: String,
    /// Source-priority rank; lower is more authoritative
    pub priority: u32,
    pub line: LineString<f64>,
}

impl Centerline {
    pub fn new(source: impl Into<String>, priority: u32, line: LineString<f64>) -> Self {
        Self {
            source: source.into(),
            priority,
            line,
        }
    }
}

/// Tunables for overlap resolution and span ordering
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssemblerConfig {
    /// Corridor half-width in meters used to decide that two sources cover
    /// the same span of trail
    pub overlap_tolerance_m: f64,
    /// Spans shorter than this are clipping slivers and are dropped
    pub min_span_m: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            overlap_tolerance_m: 200.0,
            min_span_m: 50.0,
        }
    }
}

/// The merged centerline for one trail, back in WGS84
///
/// Parts are ordered in trail direction. Adjacent parts with coincident
/// endpoints have been stitched; a boundary between parts is a real coverage
/// gap, and consumers must not assume continuity across it.
#[derive(Clone, Debug)]
pub struct AssembledTrail {
    pub code: String,
    pub spans: MultiLineString<f64>,
    /// Total covered length in meters (gaps excluded)
    pub length_m: f64,
}

impl AssembledTrail {
    /// Number of coverage gaps between consecutive spans
    pub fn gap_count(&self) -> usize {
        self.spans.0.len().saturating_sub(1)
    }

    pub fn geometry(&self) -> Geometry<f64> {
        Geometry::MultiLineString(self.spans.clone())
    }
}

/// Registry of centerline sections keyed by trail code
#[derive(Debug, Default)]
pub struct CenterlineSet {
    sections: BTreeMap<String, Vec<Centerline>>,
}

/// A resolved span in projected meters, ordered by its position along the
/// reference line (fractions outside [0, 1] sort extensions past the ends)
struct Span {
    start_frac: f64,
    line: LineString<f64>,
}

impl CenterlineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, trail_code: &str, section: Centerline) {
        self.sections
            .entry(trail_code.to_string())
            .or_default()
            .push(section);
    }

    pub fn trail_codes(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Merge all registered sections for `trail_code` into one centerline
    ///
    /// Sources are walked in priority order; each section is clipped against
    /// the buffered corridor of everything already kept, so only the
    /// non-overlapping remainder of less authoritative sources survives.
    /// Fails with [`Error::UnknownTrail`] for unregistered codes and
    /// [`Error::AmbiguousOrdering`] when a span's direction cannot be
    /// resolved against the reference line.
    pub fn assemble(&self, trail_code: &str, config: &AssemblerConfig) -> Result<AssembledTrail> {
        let sections = self
            .sections
            .get(trail_code)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::UnknownTrail(trail_code.to_string()))?;

        // Stable sort keeps registration order within one priority rank
        let mut ordered: Vec<&Centerline> = sections.iter().collect();
        ordered.sort_by_key(|s| s.priority);

        // Sections are densified before projection so that a long straight
        // chord in degrees follows the projected curve instead of cutting
        // across it; the deviation over a degree-long chord is larger than
        // the overlap corridor.
        let reference = reference_line(&ordered);
        let reference_m = reproject(
            &densify(&reference, DENSIFY_STEP_DEG),
            Crs::Wgs84,
            Crs::CaAlbers,
        );
        let reference_len = Euclidean.length(&reference_m);
        if reference_len <= 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "trail {trail_code}: most authoritative source has no length"
            )));
        }

        let mut kept: Vec<Span> = Vec::new();
        let mut corridor: Option<MultiPolygon<f64>> = None;

        for section in &ordered {
            if section.line.0.len() < 2 {
                tracing::warn!(
                    source = %section.source,
                    "skipping degenerate centerline section with fewer than 2 points"
                );
                continue;
            }
            let line_m = reproject(
                &densify(&section.line, DENSIFY_STEP_DEG),
                Crs::Wgs84,
                Crs::CaAlbers,
            );

            let remaining = match &corridor {
                None => MultiLineString::new(vec![line_m.clone()]),
                Some(covered) => covered.clip(&MultiLineString::new(vec![line_m.clone()]), true),
            };

            for part in remaining.0 {
                let length = Euclidean.length(&part);
                if length < config.min_span_m {
                    // Clipping sliver, not real coverage
                    continue;
                }
                tracing::debug!(
                    source = %section.source,
                    length_m = length,
                    "keeping span"
                );
                kept.push(orient_span(
                    part,
                    &reference_m,
                    reference_len,
                    config,
                    &section.source,
                )?);
            }

            // The corridor grows by the section's full extent, not just the
            // kept remainder, so equal-priority duplicates also resolve.
            let covered = buffer_projected(
                &Geometry::LineString(line_m),
                config.overlap_tolerance_m,
            );
            corridor = Some(match corridor {
                Some(existing) => existing.union(&covered),
                None => covered,
            });
        }

        kept.sort_by(|a, b| a.start_frac.total_cmp(&b.start_frac));

        // Concatenate in trail order, stitching spans whose endpoints meet
        // within tolerance. Anything farther apart is a genuine gap and stays
        // a separate part; gaps are never interpolated.
        let stitch_tolerance = config.overlap_tolerance_m * 2.0;
        let mut parts: Vec<LineString<f64>> = Vec::new();
        for span in kept {
            if let Some(last) = parts.last_mut() {
                let tail = Point::from(*last.0.last().expect("non-empty span"));
                let head = Point::from(span.line.0[0]);
                if Euclidean.distance(tail, head) <= stitch_tolerance {
                    last.0.extend_from_slice(&span.line.0);
                    continue;
                }
            }
            parts.push(span.line);
        }

        let length_m = parts.iter().map(|p| Euclidean.length(p)).sum();
        let spans = MultiLineString::new(
            parts
                .iter()
                .map(|p| strip_interpolated(&reproject(p, Crs::CaAlbers, Crs::Wgs84)))
                .collect(),
        );

        Ok(AssembledTrail {
            code: trail_code.to_string(),
            spans,
            length_m,
        })
    }
}

/// Concatenated coordinates of the most authoritative source's sections, in
/// registration order; used as the coarse ordering for every kept span
fn reference_line(ordered: &[&Centerline]) -> LineString<f64> {
    let best_priority = ordered[0].priority;
    let coords = ordered
        .iter()
        .filter(|s| s.priority == best_priority)
        .flat_map(|s| s.line.0.iter().copied())
        .collect();
    LineString::new(coords)
}

/// Orient a span along the reference line and assign its sort position
///
/// Endpoints are projected onto the reference; a reversed span gets flipped.
/// A span hanging off an end of the reference is ordered by endpoint
/// proximity to that end. A span that runs across the reference instead of
/// along it projects both endpoints to nearly the same spot, which is
/// unresolvable.
fn orient_span(
    line: LineString<f64>,
    reference: &LineString<f64>,
    reference_len: f64,
    config: &AssemblerConfig,
    source: &str,
) -> Result<Span> {
    let head = Point::from(line.0[0]);
    let tail = Point::from(*line.0.last().expect("span has at least 2 points"));

    let ambiguous = |point: Point<f64>| {
        let wgs = reproject(&point, Crs::CaAlbers, Crs::Wgs84);
        Error::AmbiguousOrdering {
            origin: source.to_string(),
            x: wgs.x(),
            y: wgs.y(),
        }
    };

    let (f_head, f_tail) = match (
        reference.line_locate_point(&head),
        reference.line_locate_point(&tail),
    ) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(ambiguous(head)),
    };

    let frac_eps = config.min_span_m / reference_len;

    // Extension past the reference end: nearer endpoint comes first
    if f_head >= 1.0 - frac_eps && f_tail >= 1.0 - frac_eps {
        let end = Point::from(*reference.0.last().expect("non-empty reference"));
        let d_head = Euclidean.distance(head, end);
        let d_tail = Euclidean.distance(tail, end);
        let (line, near) = if d_head <= d_tail {
            (line, d_head)
        } else {
            (reversed(line), d_tail)
        };
        return Ok(Span {
            start_frac: 1.0 + near / reference_len,
            line,
        });
    }

    // Extension before the reference start: farther endpoint comes first
    if f_head <= frac_eps && f_tail <= frac_eps {
        let start = Point::from(reference.0[0]);
        let d_head = Euclidean.distance(head, start);
        let d_tail = Euclidean.distance(tail, start);
        let (line, far) = if d_head >= d_tail {
            (line, d_head)
        } else {
            (reversed(line), d_tail)
        };
        return Ok(Span {
            start_frac: -far / reference_len,
            line,
        });
    }

    // A span much longer than its extent along the reference crosses the
    // trail rather than following it; neither orientation is right.
    let span_len = Euclidean.length(&line);
    let along = (f_head - f_tail).abs() * reference_len;
    if 2.0 * along + config.min_span_m < span_len {
        return Err(ambiguous(head));
    }

    Ok(if f_head <= f_tail {
        Span {
            start_frac: f_head,
            line,
        }
    } else {
        Span {
            start_frac: f_tail,
            line: reversed(line),
        }
    })
}

fn reversed(line: LineString<f64>) -> LineString<f64> {
    let mut coords = line.0;
    coords.reverse();
    LineString::new(coords)
}

/// Drop the vertices densification inserted: any interior vertex collinear
/// with its neighbors carries no shape and only bloats the output
fn strip_interpolated(line: &LineString<f64>) -> LineString<f64> {
    const TOL_DEG: f64 = 1e-8;
    let coords = &line.0;
    if coords.len() <= 2 {
        return line.clone();
    }
    let mut kept = vec![coords[0]];
    for i in 1..coords.len() - 1 {
        let a = *kept.last().expect("non-empty");
        let b = coords[i];
        let c = coords[i + 1];
        let (ux, uy) = (c.x - a.x, c.y - a.y);
        let cross = (b.x - a.x) * uy - (b.y - a.y) * ux;
        let chord = ux.hypot(uy);
        if chord == 0.0 || cross.abs() / chord > TOL_DEG {
            kept.push(b);
        }
    }
    kept.push(coords[coords.len() - 1]);
    LineString::new(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    fn set_with(sections: Vec<(&str, u32, LineString<f64>)>) -> CenterlineSet {
        let mut set = CenterlineSet::new();
        for (source, priority, line) in sections {
            set.register("pct", Centerline::new(source, priority, line));
        }
        set
    }

    fn approx_coord(a: geo::Coord<f64>, b: (f64, f64), tol: f64) {
        assert!(
            (a.x - b.0).abs() < tol && (a.y - b.1).abs() < tol,
            "expected ~({}, {}), got ({}, {})",
            b.0,
            b.1,
            a.x,
            a.y
        );
    }

    #[test]
    fn test_unknown_trail_code() {
        let set = set_with(vec![(
            "official",
            1,
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)],
        )]);
        let err = set.assemble("at", &AssemblerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownTrail(code) if code == "at"));
    }

    #[test]
    fn test_single_source_passthrough() {
        // A bent line: every original vertex carries shape and must survive
        let line = line_string![(x: 0.0, y: 0.0), (x: 0.4, y: 0.5), (x: 1.0, y: 1.0)];
        let set = set_with(vec![("official", 1, line.clone())]);
        let trail = set.assemble("pct", &AssemblerConfig::default()).unwrap();

        assert_eq!(trail.spans.0.len(), 1);
        assert_eq!(trail.gap_count(), 0);
        for (got, want) in trail.spans.0[0].coords().zip(line.coords()) {
            assert!((got.x - want.x).abs() < 1e-7);
            assert!((got.y - want.y).abs() < 1e-7);
        }
    }

    #[test]
    fn test_higher_priority_fully_covers_lower() {
        // Community line runs the same tread with a small lateral offset;
        // the merged trail must be exactly the official geometry.
        let official = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        let community = line_string![(x: 0.0005, y: 0.0), (x: 1.0005, y: 1.0)];
        let set = set_with(vec![("official", 1, official.clone()), ("community", 2, community)]);

        let trail = set.assemble("pct", &AssemblerConfig::default()).unwrap();
        assert_eq!(trail.spans.0.len(), 1);
        assert_eq!(trail.spans.0[0].0.len(), official.0.len());
        for (got, want) in trail.spans.0[0].coords().zip(official.coords()) {
            assert!((got.x - want.x).abs() < 1e-7);
            assert!((got.y - want.y).abs() < 1e-7);
        }
    }

    #[test]
    fn test_overlap_resolved_and_tail_appended() {
        // official: (0,0)-(1,1); community: (0.5,0.5)-(2,2). The overlapping
        // (0.5,0.5)-(1,1) span belongs to official; community contributes
        // only its tail past (1,1), with no duplicate coverage.
        let official = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        let community = line_string![(x: 0.5, y: 0.5), (x: 2.0, y: 2.0)];
        let set = set_with(vec![("official", 1, official), ("community", 2, community)]);

        let trail = set.assemble("pct", &AssemblerConfig::default()).unwrap();

        // Tail meets the official end within tolerance, so one stitched span
        assert_eq!(trail.spans.0.len(), 1);
        let merged = &trail.spans.0[0];
        approx_coord(merged.0[0], (0.0, 0.0), 1e-7);
        approx_coord(*merged.0.last().unwrap(), (2.0, 2.0), 1e-7);

        // Length of the diagonal (0,0)-(2,2), within corridor-width slack
        let expected = Euclidean.length(&reproject(
            &line_string![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0)],
            Crs::Wgs84,
            Crs::CaAlbers,
        ));
        assert!(
            (trail.length_m - expected).abs() < 1_000.0,
            "expected ~{expected}m, got {}m",
            trail.length_m
        );
    }

    #[test]
    fn test_reversed_source_is_flipped() {
        let official = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        // Same tail as above but recorded north-to-south
        let community = line_string![(x: 2.0, y: 2.0), (x: 0.5, y: 0.5)];
        let set = set_with(vec![("official", 1, official), ("community", 2, community)]);

        let trail = set.assemble("pct", &AssemblerConfig::default()).unwrap();
        let merged = &trail.spans.0[0];
        approx_coord(merged.0[0], (0.0, 0.0), 1e-7);
        approx_coord(*merged.0.last().unwrap(), (2.0, 2.0), 1e-7);
    }

    #[test]
    fn test_gap_preserved_between_disjoint_sections() {
        // Two official sections with a real coverage hole between them
        let south = line_string![(x: 0.0, y: 0.0), (x: 0.4, y: 0.4)];
        let north = line_string![(x: 0.6, y: 0.6), (x: 1.0, y: 1.0)];
        let set = set_with(vec![("official", 1, south), ("official", 1, north)]);

        let trail = set.assemble("pct", &AssemblerConfig::default()).unwrap();
        assert_eq!(trail.spans.0.len(), 2);
        assert_eq!(trail.gap_count(), 1);
        // Ordered in trail direction
        assert!(trail.spans.0[0].0[0].x < trail.spans.0[1].0[0].x);
    }

    #[test]
    fn test_perpendicular_spur_is_ambiguous() {
        let official = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        // Perpendicular to the trail: both endpoints project to the same
        // reference position, and it touches neither end.
        let spur = line_string![(x: 0.6, y: 0.4), (x: 1.0, y: 0.0)];
        let set = set_with(vec![("official", 1, official), ("gps", 2, spur)]);

        let err = set.assemble("pct", &AssemblerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousOrdering { origin, .. } if origin == "gps"));
    }

    #[test]
    fn test_sliver_sections_dropped() {
        let official = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        // ~15m stub near the trail: below min_span_m once clipped
        let stub = line_string![(x: 0.5000, y: 0.5002), (x: 0.5001, y: 0.5002)];
        let set = set_with(vec![("official", 1, official), ("gps", 2, stub)]);

        let trail = set.assemble("pct", &AssemblerConfig::default()).unwrap();
        assert_eq!(trail.spans.0.len(), 1);
    }
}
