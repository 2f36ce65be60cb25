//! Positioned word tokens from the PDF text layer.

use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};
use serde::Serialize;
use tracing::trace;

/// A word from the text layer with its box in top-left-origin page points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageToken {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageToken {
    pub fn new(text: impl Into<String>, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            text: text.into(),
            x0,
            y0,
            x1,
            y1,
        }
    }
}

#[derive(Debug)]
struct WordBuf {
    text: String,
    x0: f64,
    top: f64,
    baseline: f64,
    end_x: f64,
    size: f64,
}

/// Collects characters emitted by the content-stream interpreter into words.
///
/// Characters join the current word until whitespace, a baseline change
/// larger than half the glyph size, or a horizontal gap wider than a tenth of
/// the glyph size. Only the requested page is recorded.
#[derive(Debug)]
pub struct TokenCollector {
    page: u32,
    active: bool,
    page_height: f64,
    current: Option<WordBuf>,
    tokens: Vec<PageToken>,
}

impl TokenCollector {
    /// Collector for one page (1-indexed).
    pub fn new(page: u32) -> Self {
        Self {
            page,
            active: false,
            page_height: 0.0,
            current: None,
            tokens: Vec::new(),
        }
    }

    pub fn into_tokens(mut self) -> Vec<PageToken> {
        self.flush();
        self.tokens
    }

    /// Record one glyph.
    ///
    /// `x` and `baseline` are in PDF user space (bottom-left origin), `advance`
    /// is the horizontal distance to the next glyph origin and `size` the
    /// rendered glyph height.
    fn push_glyph(&mut self, x: f64, baseline: f64, advance: f64, size: f64, ch: &str) {
        if ch.chars().all(char::is_whitespace) {
            self.flush();
            return;
        }

        // Flip into top-left-origin coordinates.
        let flipped = self.page_height - baseline;
        let top = flipped - size;

        if let Some(word) = &self.current {
            let new_line = (flipped - word.baseline).abs() > word.size * 0.5;
            let gap = x > word.end_x + word.size * 0.1;
            let moved_left = x < word.end_x - word.size;
            if new_line || gap || moved_left {
                self.flush();
            }
        }

        match &mut self.current {
            Some(word) => {
                word.text.push_str(ch);
                word.end_x = x + advance;
                word.top = word.top.min(top);
            }
            None => {
                self.current = Some(WordBuf {
                    text: ch.to_string(),
                    x0: x,
                    top,
                    baseline: flipped,
                    end_x: x + advance,
                    size,
                });
            }
        }
    }

    fn flush(&mut self) {
        if let Some(word) = self.current.take() {
            trace!("token {:?} at ({:.1}, {:.1})", word.text, word.x0, word.top);
            self.tokens.push(PageToken::new(
                word.text,
                word.x0 as f32,
                word.top as f32,
                word.end_x as f32,
                word.baseline as f32,
            ));
        }
    }
}

impl OutputDev for TokenCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.active = page_num == self.page;
        self.page_height = media_box.ury - media_box.lly;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        if self.active {
            self.flush();
        }
        self.active = false;
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        spacing: f64,
        font_size: f64,
        ch: &str,
    ) -> Result<(), OutputError> {
        if !self.active {
            return Ok(());
        }
        let scale = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs().sqrt();
        let size = font_size * scale;
        let advance = width * size + spacing * scale;
        self.push_glyph(trm.m31, trm.m32, advance, size, ch);
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        if self.active {
            self.flush();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collector() -> TokenCollector {
        let mut c = TokenCollector::new(1);
        c.active = true;
        c.page_height = 792.0;
        c
    }

    #[test]
    fn test_adjacent_glyphs_form_one_word() {
        let mut c = collector();
        c.push_glyph(100.0, 566.0, 6.0, 12.0, "1");
        c.push_glyph(106.0, 566.0, 6.0, 12.0, "2");
        c.push_glyph(112.0, 566.0, 6.0, 12.0, "3");
        let tokens = c.into_tokens();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "123");
        assert_eq!(tokens[0].x0, 100.0);
        assert_eq!(tokens[0].y0, 214.0);
        assert_eq!(tokens[0].x1, 118.0);
    }

    #[test]
    fn test_whitespace_and_gaps_split_words() {
        let mut c = collector();
        c.push_glyph(100.0, 566.0, 6.0, 12.0, "1");
        c.push_glyph(106.0, 566.0, 3.0, 12.0, " ");
        c.push_glyph(109.0, 566.0, 6.0, 12.0, "2");
        c.push_glyph(140.0, 566.0, 6.0, 12.0, "3");
        let texts: Vec<String> = c.into_tokens().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_baseline_change_splits_words() {
        let mut c = collector();
        c.push_glyph(100.0, 566.0, 6.0, 12.0, "1");
        c.push_glyph(106.0, 540.0, 6.0, 12.0, "2");
        let tokens = c.into_tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].y0, 240.0);
    }

    #[test]
    fn test_other_pages_are_ignored() {
        let mut c = TokenCollector::new(2);
        let media_box = MediaBox {
            llx: 0.0,
            lly: 0.0,
            urx: 612.0,
            ury: 792.0,
        };
        c.begin_page(1, &media_box, None).unwrap();
        assert!(!c.active);
        c.end_page().unwrap();
        c.begin_page(2, &media_box, None).unwrap();
        assert!(c.active);
    }
}
