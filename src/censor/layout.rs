//! Slim text-state tracking for censor box placement
//!
//! Follows just enough of the graphics and text state machine (CTM stack,
//! text/line matrices, font size, spacing) to place an opaque box over each
//! censored glyph. Exact widths need font programs; [`GlyphMetrics`] keeps
//! that resolution external and [`ApproxMetrics`] supplies a workable
//! fixed-advance fallback.

use lopdf::content::Operation;

use crate::rewrite::ops;

/// Axis-aligned device-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// 2D affine transform `[a b c d e f]`, row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    /// `self * other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }
}

/// Glyph metric resolution in text-space units per em.
pub trait GlyphMetrics {
    fn advance(&self, ch: char) -> f64;
    fn ascent(&self) -> f64;
    fn descent(&self) -> f64;
}

/// Fixed metrics close to a typical proportional face. Boxes drawn from
/// these cover the glyph run with a little slack rather than hugging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMetrics;

impl GlyphMetrics for ApproxMetrics {
    fn advance(&self, _ch: char) -> f64 {
        0.5
    }

    fn ascent(&self) -> f64 {
        0.8
    }

    fn descent(&self) -> f64 {
        -0.2
    }
}

/// Incremental text/graphics state, fed one operation at a time in the same
/// traversal order the rewrite driver uses.
pub struct TextTracker {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
}

impl Default for TextTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTracker {
    pub fn new() -> Self {
        Self {
            ctm: Matrix::identity(),
            ctm_stack: Vec::new(),
            text_matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }

    /// Replace the base transform when entering a form with its own
    /// `/Matrix`; the caller brackets the recursion with push/pop.
    pub fn push_ctm(&mut self) {
        self.ctm_stack.push(self.ctm);
    }

    pub fn pop_ctm(&mut self) {
        if let Some(ctm) = self.ctm_stack.pop() {
            self.ctm = ctm;
        }
    }

    pub fn concat(&mut self, m: &Matrix) {
        self.ctm = m.multiply(&self.ctm);
    }

    /// Apply an operation's state effects. For `'` and `"` this covers the
    /// implicit line advance and spacing operands; glyph extraction happens
    /// separately through [`glyph`](Self::glyph).
    pub fn apply_op(&mut self, op: &Operation) {
        let nums: Vec<f64> = op.operands.iter().filter_map(ops::number).collect();
        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    let m = Matrix { a, b, c, d, e, f };
                    self.ctm = m.multiply(&self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::identity();
                self.line_matrix = Matrix::identity();
            }
            "ET" => {}
            "Tf" => {
                if let Some(size) = nums.last() {
                    self.font_size = *size;
                }
            }
            "Td" => {
                if let [tx, ty] = nums[..] {
                    self.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let [tx, ty] = nums[..] {
                    self.leading = -ty;
                    self.translate_line(tx, ty);
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = nums[..] {
                    self.line_matrix = Matrix { a, b, c, d, e, f };
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => self.next_line(),
            "TL" => {
                if let Some(l) = nums.first() {
                    self.leading = *l;
                }
            }
            "Tc" => {
                if let Some(tc) = nums.first() {
                    self.char_spacing = *tc;
                }
            }
            "Tw" => {
                if let Some(tw) = nums.first() {
                    self.word_spacing = *tw;
                }
            }
            "Tz" => {
                if let Some(tz) = nums.first() {
                    self.horizontal_scale = tz / 100.0;
                }
            }
            "'" => self.next_line(),
            "\"" => {
                if let [tw, tc] = nums[..] {
                    self.word_spacing = tw;
                    self.char_spacing = tc;
                }
                self.next_line();
            }
            _ => {}
        }
    }

    fn translate_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.translate_line(0.0, -leading);
    }

    /// Device-space box of one glyph, advancing the text matrix past it.
    pub fn glyph(&mut self, ch: char, metrics: &dyn GlyphMetrics) -> Rect {
        let mut width = metrics.advance(ch) * self.font_size + self.char_spacing;
        if ch == ' ' {
            width += self.word_spacing;
        }
        width *= self.horizontal_scale;
        let rendering = self.text_matrix.multiply(&self.ctm);
        let (x0, y0) = rendering.apply(0.0, metrics.descent() * self.font_size);
        let (x1, y1) = rendering.apply(width, metrics.ascent() * self.font_size);
        self.text_matrix = Matrix::translate(width, 0.0).multiply(&self.text_matrix);
        Rect::new(x0, y0, x1, y1)
    }

    /// `TJ` positioning number: thousandths of a unit, negative moves right.
    pub fn adjust(&mut self, amount: f64) {
        let tx = -amount / 1000.0 * self.font_size * self.horizontal_scale;
        self.text_matrix = Matrix::translate(tx, 0.0).multiply(&self.text_matrix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Object;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    #[test]
    fn test_identity_round_trip() {
        let m = Matrix::identity();
        assert_eq!(m.apply(3.0, 4.0), (3.0, 4.0));
        assert_eq!(m.multiply(&Matrix::identity()), m);
    }

    #[test]
    fn test_glyph_advances_along_baseline() {
        let mut tracker = TextTracker::new();
        tracker.apply_op(&op("BT", vec![]));
        tracker.apply_op(&op(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
        ));
        tracker.apply_op(&op("Td", vec![Object::Integer(100), Object::Integer(700)]));
        let first = tracker.glyph('a', &ApproxMetrics);
        let second = tracker.glyph('b', &ApproxMetrics);
        assert!((first.x0 - 100.0).abs() < 1e-4);
        assert!((second.x0 - 105.0).abs() < 1e-4);
        assert!((first.height() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_q_restores_ctm() {
        let mut tracker = TextTracker::new();
        tracker.apply_op(&op("q", vec![]));
        tracker.apply_op(&op(
            "cm",
            vec![
                Object::Integer(2),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(2),
                Object::Integer(0),
                Object::Integer(0),
            ],
        ));
        tracker.apply_op(&op("BT", vec![]));
        tracker.apply_op(&op(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
        ));
        let scaled = tracker.glyph('x', &ApproxMetrics);
        assert!((scaled.height() - 20.0).abs() < 1e-4);
        tracker.apply_op(&op("Q", vec![]));
        tracker.apply_op(&op("BT", vec![]));
        tracker.apply_op(&op(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
        ));
        let restored = tracker.glyph('x', &ApproxMetrics);
        assert!((restored.height() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_tj_adjustment_moves_right_for_negative_amounts() {
        let mut tracker = TextTracker::new();
        tracker.apply_op(&op("BT", vec![]));
        tracker.apply_op(&op(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
        ));
        let before = tracker.glyph('a', &ApproxMetrics);
        tracker.adjust(-500.0);
        let after = tracker.glyph('a', &ApproxMetrics);
        assert!(after.x0 > before.x1);
    }
}
