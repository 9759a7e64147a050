//! Path geometry.
//!
//! Coordinates here are always device space; path-construction operators
//! transform through the CTM before appending (PLRM 4.4: the CTM in effect
//! at the time of the call applies).

use crate::matrix::Matrix;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathSeg {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    ClosePath,
}

pub type SubPath = Vec<PathSeg>;

/// The current path: a list of subpaths, each opened by a MoveTo.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    pub subpaths: Vec<SubPath>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn clear(&mut self) {
        self.subpaths.clear();
    }

    /// Begin a new subpath at `p`. A MoveTo directly after another MoveTo
    /// replaces it (PLRM: moveto discards an immediately preceding moveto).
    pub fn move_to(&mut self, p: Point) {
        if let Some(sub) = self.subpaths.last_mut() {
            if sub.len() == 1 {
                if let Some(PathSeg::MoveTo(_)) = sub.last() {
                    sub[0] = PathSeg::MoveTo(p);
                    return;
                }
            }
        }
        self.subpaths.push(vec![PathSeg::MoveTo(p)]);
    }

    pub fn line_to(&mut self, p: Point) {
        if let Some(sub) = self.subpaths.last_mut() {
            sub.push(PathSeg::LineTo(p));
        }
    }

    pub fn curve_to(&mut self, c1: Point, c2: Point, p: Point) {
        if let Some(sub) = self.subpaths.last_mut() {
            sub.push(PathSeg::CurveTo(c1, c2, p));
        }
    }

    /// Close the current subpath. The starting point of the subpath becomes
    /// available to the caller as the new current point.
    pub fn close(&mut self) -> Option<Point> {
        let sub = self.subpaths.last_mut()?;
        match sub.last() {
            Some(PathSeg::ClosePath) | None => None,
            _ => {
                sub.push(PathSeg::ClosePath);
                match sub.first() {
                    Some(PathSeg::MoveTo(p)) => Some(*p),
                    _ => None,
                }
            }
        }
    }

    /// Iterate every segment in order.
    pub fn segments(&self) -> impl Iterator<Item = &PathSeg> {
        self.subpaths.iter().flatten()
    }

    /// Device-space bounding box `(llx, lly, urx, ury)`, or `None` for an
    /// empty path. Curve control points are included (the PLRM permits the
    /// curve-enclosing box).
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        let mut grow = |p: &Point| {
            bounds = Some(match bounds {
                None => (p.x, p.y, p.x, p.y),
                Some((llx, lly, urx, ury)) => {
                    (llx.min(p.x), lly.min(p.y), urx.max(p.x), ury.max(p.y))
                }
            });
        };
        for seg in self.segments() {
            match seg {
                PathSeg::MoveTo(p) | PathSeg::LineTo(p) => grow(p),
                PathSeg::CurveTo(c1, c2, p) => {
                    grow(c1);
                    grow(c2);
                    grow(p);
                }
                PathSeg::ClosePath => {}
            }
        }
        bounds
    }

    /// Replace curves with line segments. `flatness` is the maximum error
    /// in device pixels; the subdivision count is derived from it.
    pub fn flatten(&self, flatness: f64) -> Path {
        let mut out = Path::new();
        for sub in &self.subpaths {
            let mut current = Point::new(0.0, 0.0);
            let mut flat: SubPath = Vec::with_capacity(sub.len());
            for seg in sub {
                match *seg {
                    PathSeg::MoveTo(p) => {
                        flat.push(PathSeg::MoveTo(p));
                        current = p;
                    }
                    PathSeg::LineTo(p) => {
                        flat.push(PathSeg::LineTo(p));
                        current = p;
                    }
                    PathSeg::CurveTo(c1, c2, p) => {
                        let steps = curve_steps(current, c1, c2, p, flatness);
                        for i in 1..=steps {
                            let t = i as f64 / steps as f64;
                            flat.push(PathSeg::LineTo(bezier_point(current, c1, c2, p, t)));
                        }
                        current = p;
                    }
                    PathSeg::ClosePath => flat.push(PathSeg::ClosePath),
                }
            }
            out.subpaths.push(flat);
        }
        out
    }

    /// Reverse the direction of every subpath (`reversepath`).
    pub fn reversed(&self) -> Path {
        let mut out = Path::new();
        for sub in &self.subpaths {
            let closed = matches!(sub.last(), Some(PathSeg::ClosePath));
            // Collect the on-path points in order, then walk them backwards
            // rebuilding segments with swapped control points.
            let mut points: Vec<(Point, Option<(Point, Point)>)> = Vec::new();
            for seg in sub {
                match *seg {
                    PathSeg::MoveTo(p) | PathSeg::LineTo(p) => points.push((p, None)),
                    PathSeg::CurveTo(c1, c2, p) => points.push((p, Some((c1, c2)))),
                    PathSeg::ClosePath => {}
                }
            }
            if points.is_empty() {
                continue;
            }
            let mut rev: SubPath = vec![PathSeg::MoveTo(points[points.len() - 1].0)];
            for i in (1..points.len()).rev() {
                let dest = points[i - 1].0;
                match points[i].1 {
                    // The curve's control handles swap when traversed
                    // backwards.
                    Some((c1, c2)) => rev.push(PathSeg::CurveTo(c2, c1, dest)),
                    None => rev.push(PathSeg::LineTo(dest)),
                }
            }
            if closed {
                rev.push(PathSeg::ClosePath);
            }
            out.subpaths.push(rev);
        }
        out
    }

    /// Transform every coordinate through `m`.
    pub fn transformed(&self, m: &Matrix) -> Path {
        let tp = |p: &Point| {
            let (x, y) = m.apply(p.x, p.y);
            Point::new(x, y)
        };
        Path {
            subpaths: self
                .subpaths
                .iter()
                .map(|sub| {
                    sub.iter()
                        .map(|seg| match seg {
                            PathSeg::MoveTo(p) => PathSeg::MoveTo(tp(p)),
                            PathSeg::LineTo(p) => PathSeg::LineTo(tp(p)),
                            PathSeg::CurveTo(c1, c2, p) => PathSeg::CurveTo(tp(c1), tp(c2), tp(p)),
                            PathSeg::ClosePath => PathSeg::ClosePath,
                        })
                        .collect()
                })
                .collect(),
        }
    }

    /// Even-odd / nonzero point-in-path test over the flattened outline,
    /// used by the insideness operators.
    pub fn contains(&self, x: f64, y: f64, even_odd: bool) -> bool {
        let flat = self.flatten(0.2);
        let mut winding = 0i32;
        let mut crossings = 0u32;
        for sub in &flat.subpaths {
            let mut pts: Vec<Point> = Vec::with_capacity(sub.len());
            for seg in sub {
                match *seg {
                    PathSeg::MoveTo(p) | PathSeg::LineTo(p) => pts.push(p),
                    PathSeg::ClosePath => {}
                    PathSeg::CurveTo(..) => unreachable!("flattened"),
                }
            }
            if pts.len() < 2 {
                continue;
            }
            // Implicit close for the winding test.
            let n = pts.len();
            for i in 0..n {
                let a = pts[i];
                let b = pts[(i + 1) % n];
                if (a.y <= y) != (b.y <= y) {
                    let t = (y - a.y) / (b.y - a.y);
                    let cx = a.x + t * (b.x - a.x);
                    if cx > x {
                        crossings += 1;
                        winding += if b.y > a.y { 1 } else { -1 };
                    }
                }
            }
        }
        if even_odd {
            crossings % 2 == 1
        } else {
            winding != 0
        }
    }
}

fn bezier_point(p0: Point, c1: Point, c2: Point, p3: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let x = u * u * u * p0.x + 3.0 * u * u * t * c1.x + 3.0 * u * t * t * c2.x + t * t * t * p3.x;
    let y = u * u * u * p0.y + 3.0 * u * u * t * c1.y + 3.0 * u * t * t * c2.y + t * t * t * p3.y;
    Point::new(x, y)
}

fn curve_steps(p0: Point, c1: Point, c2: Point, p3: Point, flatness: f64) -> usize {
    // Chord/hull length ratio bounds the subdivision needed for the
    // requested flatness.
    let hull = dist(p0, c1) + dist(c1, c2) + dist(c2, p3);
    let steps = (hull / flatness.max(0.2)).sqrt().ceil() as usize;
    steps.clamp(4, 64)
}

fn dist(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Path {
        let mut p = Path::new();
        p.move_to(Point::new(0.0, 0.0));
        p.line_to(Point::new(10.0, 0.0));
        p.line_to(Point::new(10.0, 10.0));
        p.line_to(Point::new(0.0, 10.0));
        p.close();
        p
    }

    #[test]
    fn bbox_of_square() {
        assert_eq!(square().bbox(), Some((0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn consecutive_movetos_collapse() {
        let mut p = Path::new();
        p.move_to(Point::new(1.0, 1.0));
        p.move_to(Point::new(2.0, 2.0));
        assert_eq!(p.subpaths.len(), 1);
        assert_eq!(p.subpaths[0][0], PathSeg::MoveTo(Point::new(2.0, 2.0)));
    }

    #[test]
    fn close_returns_subpath_start() {
        let mut p = Path::new();
        p.move_to(Point::new(3.0, 4.0));
        p.line_to(Point::new(8.0, 4.0));
        assert_eq!(p.close(), Some(Point::new(3.0, 4.0)));
        // A second close on the same subpath is a no-op.
        assert_eq!(p.close(), None);
    }

    #[test]
    fn point_in_square() {
        let p = square();
        assert!(p.contains(5.0, 5.0, false));
        assert!(p.contains(5.0, 5.0, true));
        assert!(!p.contains(15.0, 5.0, false));
    }

    #[test]
    fn flatten_removes_curves() {
        let mut p = Path::new();
        p.move_to(Point::new(0.0, 0.0));
        p.curve_to(
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
        );
        let flat = p.flatten(1.0);
        assert!(flat
            .segments()
            .all(|s| !matches!(s, PathSeg::CurveTo(..))));
        // Endpoint preserved.
        assert!(matches!(
            flat.subpaths[0].last(),
            Some(PathSeg::LineTo(pt)) if (pt.x - 10.0).abs() < 1e-9 && pt.y.abs() < 1e-9
        ));
    }

    #[test]
    fn reversed_keeps_endpoints_and_closure() {
        let p = square();
        let r = p.reversed();
        assert_eq!(r.subpaths.len(), 1);
        assert!(matches!(r.subpaths[0][0], PathSeg::MoveTo(pt) if pt == Point::new(0.0, 10.0)));
        assert!(matches!(r.subpaths[0].last(), Some(PathSeg::ClosePath)));
    }
}
