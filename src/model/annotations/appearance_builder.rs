//! Appearance stream generation for new annotations.
//!
//! Every form gets `/BBox` equal to the annotation rectangle and the
//! identity `/Matrix`, so drawing happens directly in page coordinates.

use super::types::{format_number as n, AnnotationColor, TextMarkupKind};
use crate::error::Result;
use crate::model::resources::XFormStream;

/// Magic number for the Bézier approximation of a quarter ellipse.
const KAPPA: f64 = 0.552_284_75;

/// Builder for annotation appearance forms.
#[derive(Debug, Clone)]
pub struct AppearanceBuilder {
    rect: [f64; 4],
    content: String,
}

impl AppearanceBuilder {
    /// Empty appearance over `rect`.
    pub fn new(rect: [f64; 4]) -> Self {
        Self {
            rect,
            content: String::new(),
        }
    }

    fn stroke_setup(&mut self, color: &AnnotationColor, width: f64) {
        self.content.push_str(&format!("{} w\n", n(width)));
        if let Some(ops) = color.stroke_ops() {
            self.content.push_str(&ops);
        }
    }

    /// Rectangle inset by half the border width (Square, FreeText, Stamp).
    pub fn rectangle(mut self, stroke: &AnnotationColor, fill: &AnnotationColor, width: f64) -> Self {
        self.stroke_setup(stroke, width);
        let filled = fill.fill_ops().inspect(|ops| self.content.push_str(ops)).is_some();
        let [x0, y0, x1, y1] = self.rect;
        let half = width / 2.0;
        self.content.push_str(&format!(
            "{} {} {} {} re {}\n",
            n(x0 + half),
            n(y0 + half),
            n((x1 - x0 - width).max(0.0)),
            n((y1 - y0 - width).max(0.0)),
            if filled { "B" } else { "S" }
        ));
        self
    }

    /// Ellipse inscribed in the rectangle (Circle).
    pub fn ellipse(mut self, stroke: &AnnotationColor, fill: &AnnotationColor, width: f64) -> Self {
        self.stroke_setup(stroke, width);
        let filled = fill.fill_ops().inspect(|ops| self.content.push_str(ops)).is_some();
        let [x0, y0, x1, y1] = self.rect;
        let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        let rx = ((x1 - x0 - width) / 2.0).max(0.0);
        let ry = ((y1 - y0 - width) / 2.0).max(0.0);
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);

        let c = &mut self.content;
        c.push_str(&format!("{} {} m\n", n(cx + rx), n(cy)));
        let curves = [
            [cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry],
            [cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy],
            [cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry],
            [cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy],
        ];
        for curve in curves {
            let parts: Vec<String> = curve.iter().map(|&v| n(v)).collect();
            c.push_str(&format!("{} c\n", parts.join(" ")));
        }
        c.push_str(if filled { "B\n" } else { "S\n" });
        self
    }

    /// Open or closed path through `points` given as `x0 y0 x1 y1 ...`.
    pub fn path(mut self, points: &[f64], closed: bool, color: &AnnotationColor, width: f64) -> Self {
        if points.len() < 4 {
            return self;
        }
        self.stroke_setup(color, width);
        self.content.push_str("1 J 1 j\n");
        self.push_path(points);
        self.content.push_str(if closed { "s\n" } else { "S\n" });
        self
    }

    /// One stroke per ink path.
    pub fn ink(mut self, strokes: &[Vec<f64>], color: &AnnotationColor, width: f64) -> Self {
        self.stroke_setup(color, width);
        self.content.push_str("1 J 1 j\n");
        for stroke in strokes.iter().filter(|s| s.len() >= 2) {
            if stroke.len() == 2 {
                // Single point: zero-length segment so round caps draw a dot.
                self.push_path(&[stroke[0], stroke[1], stroke[0], stroke[1]]);
            } else {
                self.push_path(stroke);
            }
            self.content.push_str("S\n");
        }
        self
    }

    /// Text markup over quadrilaterals `x1 y1 x2 y2 x3 y3 x4 y4`
    /// (upper-left, upper-right, lower-left, lower-right).
    pub fn text_markup(mut self, kind: TextMarkupKind, quads: &[f64], color: &AnnotationColor) -> Self {
        for quad in quads.chunks_exact(8) {
            let (ulx, uly, urx, ury, llx, lly, lrx, lry) =
                (quad[0], quad[1], quad[2], quad[3], quad[4], quad[5], quad[6], quad[7]);
            let height = (uly - lly).abs().max(1.0);
            match kind {
                TextMarkupKind::Highlight => {
                    if let Some(ops) = color.fill_ops() {
                        self.content.push_str(&ops);
                    }
                    self.push_path(&[ulx, uly, urx, ury, lrx, lry, llx, lly]);
                    self.content.push_str("h f\n");
                },
                TextMarkupKind::Underline | TextMarkupKind::StrikeOut => {
                    let width = (height / 14.0).max(0.5);
                    self.stroke_setup(color, width);
                    let lift = if kind == TextMarkupKind::StrikeOut { height / 2.0 } else { width };
                    self.push_path(&[llx, lly + lift, lrx, lry + lift]);
                    self.content.push_str("S\n");
                },
                TextMarkupKind::Squiggly => {
                    let width = (height / 14.0).max(0.5);
                    self.stroke_setup(color, width);
                    let step = (height / 6.0).max(1.0);
                    let amplitude = step / 2.0;
                    let mut points = vec![llx, lly + amplitude];
                    let mut x = llx;
                    let mut up = false;
                    while x + step <= lrx {
                        x += step;
                        let t = if lrx > llx { (x - llx) / (lrx - llx) } else { 0.0 };
                        let base = lly + (lry - lly) * t;
                        points.extend_from_slice(&[x, if up { base + amplitude } else { base }]);
                        up = !up;
                    }
                    self.push_path(&points);
                    self.content.push_str("S\n");
                },
            }
        }
        self
    }

    /// Note icon: filled page with a folded corner (Text).
    pub fn note_icon(mut self, color: &AnnotationColor) -> Self {
        let [x0, y0, x1, y1] = self.rect;
        let (w, h) = (x1 - x0, y1 - y0);
        let margin = w.min(h) * 0.1;
        let fold = (w - 2.0 * margin) * 0.25;
        let (l, b, r, t) = (x0 + margin, y0 + margin, x1 - margin, y1 - margin);

        self.stroke_setup(&AnnotationColor::black(), 1.0);
        let fill = match color {
            AnnotationColor::None => AnnotationColor::yellow(),
            other => other.clone(),
        };
        if let Some(ops) = fill.fill_ops() {
            self.content.push_str(&ops);
        }
        self.push_path(&[l, b, l, t, r, t, r, b + fold, r - fold, b]);
        self.content.push_str("h B\n");
        self.push_path(&[r - fold, b, r - fold, b + fold, r, b + fold]);
        self.content.push_str("S\n");
        for i in 1..=3 {
            let y = t - (t - b) * 0.22 * i as f64;
            self.push_path(&[l + margin, y, r - margin, y]);
            self.content.push_str("S\n");
        }
        self
    }

    fn push_path(&mut self, points: &[f64]) {
        for (i, pair) in points.chunks_exact(2).enumerate() {
            let op = if i == 0 { "m" } else { "l" };
            self.content.push_str(&format!("{} {} {}\n", n(pair[0]), n(pair[1]), op));
        }
    }

    /// Content stream generated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Wrap the content in a form XObject.
    pub fn build(self) -> Result<XFormStream> {
        let content = format!("q\n{}Q\n", self.content);
        XFormStream::new(self.rect, content.as_bytes())
    }
}
