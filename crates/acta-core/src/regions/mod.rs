//! Region catalog: where each field is printed on the sheet.
//!
//! Every field has rectangles in two coordinate spaces. `Text` rectangles are
//! in PDF points with a top-left origin, as reported for text-layer tokens.
//! `Raster` rectangles are in pixels of the page rendered at the configured
//! DPI. The two are measured separately and must not be mixed.

use std::path::Path;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::models::tally::{Field, TallyFields};

/// Coordinate space a rectangle is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    Text,
    Raster,
}

impl CoordinateSpace {
    pub fn name(self) -> &'static str {
        match self {
            CoordinateSpace::Text => "text",
            CoordinateSpace::Raster => "raster",
        }
    }
}

/// Axis-aligned rectangle with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Whether a point lies inside, edges included.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Pixel crop `(x, y, width, height)` clamped to an image, or `None` when
    /// the rectangle falls outside it.
    pub fn pixel_crop(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x0.max(0.0).floor() as u32;
        let y0 = self.y0.max(0.0).floor() as u32;
        let x1 = (self.x1.max(0.0).ceil() as u32).min(image_width);
        let y1 = (self.y1.max(0.0).ceil() as u32).min(image_height);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

impl From<[f32; 4]> for Rect {
    fn from(v: [f32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [f32; 4] {
    fn from(r: Rect) -> Self {
        [r.x0, r.y0, r.x1, r.y1]
    }
}

/// Post-processing applied to a recovered value before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    #[default]
    None,
    /// Keep only the first N characters.
    KeepFirst(usize),
    /// Drop the last N characters.
    DropLast(usize),
}

impl Truncation {
    /// Apply the rule; an emptied value counts as not found.
    pub fn apply(self, value: &str) -> Option<String> {
        let out: String = match self {
            Truncation::None => value.to_string(),
            Truncation::KeepFirst(n) => value.chars().take(n).collect(),
            Truncation::DropLast(n) => {
                let len = value.chars().count();
                value.chars().take(len.saturating_sub(n)).collect()
            }
        };
        (!out.is_empty()).then_some(out)
    }
}

/// Where a field is printed and how its value is cleaned up, per pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: Field,
    pub text: Vec<Rect>,
    pub raster: Vec<Rect>,
    #[serde(default)]
    pub text_rule: Truncation,
    #[serde(default)]
    pub raster_rule: Truncation,
}

impl FieldSpec {
    fn new(field: Field, text: Rect, raster: Rect) -> Self {
        Self {
            field,
            text: vec![text],
            raster: vec![raster],
            text_rule: Truncation::None,
            raster_rule: Truncation::None,
        }
    }

    fn with_rules(mut self, text_rule: Truncation, raster_rule: Truncation) -> Self {
        self.text_rule = text_rule;
        self.raster_rule = raster_rule;
        self
    }

    pub fn regions(&self, space: CoordinateSpace) -> &[Rect] {
        match space {
            CoordinateSpace::Text => &self.text,
            CoordinateSpace::Raster => &self.raster,
        }
    }

    pub fn rule(&self, space: CoordinateSpace) -> Truncation {
        match space {
            CoordinateSpace::Text => self.text_rule,
            CoordinateSpace::Raster => self.raster_rule,
        }
    }
}

lazy_static! {
    static ref STANDARD: RegionCatalog = RegionCatalog::build_standard();
}

/// Immutable field → rectangles lookup, one entry per field.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCatalog {
    specs: TallyFields<FieldSpec>,
}

impl RegionCatalog {
    /// The catalog for the standard tally sheet.
    pub fn standard() -> &'static RegionCatalog {
        &STANDARD
    }

    fn build_standard() -> Self {
        let r = Rect::new;
        let specs = TallyFields::from_fn(|field| match field {
            Field::TableCode => FieldSpec::new(field, r(90., 210., 160., 220.), r(90., 210., 170., 235.))
                .with_rules(Truncation::KeepFirst(5), Truncation::KeepFirst(5)),
            Field::PrecinctCode => FieldSpec::new(field, r(80., 220., 160., 240.), r(80., 230., 160., 250.)),
            Field::TableNumber => FieldSpec::new(field, r(80., 260., 150., 320.), r(80., 270., 140., 310.))
                .with_rules(Truncation::DropLast(2), Truncation::None),
            Field::TotalIssued => FieldSpec::new(field, r(90., 310., 160., 370.), r(90., 330., 160., 370.))
                .with_rules(Truncation::DropLast(3), Truncation::None),
            Field::BallotsUsed => FieldSpec::new(field, r(80., 380., 190., 430.), r(80., 400., 190., 430.)),
            Field::BallotsUnused => FieldSpec::new(field, r(80., 440., 190., 495.), r(80., 440., 190., 495.)),
            Field::Mas => FieldSpec::new(field, r(460., 160., 570., 215.), r(460., 180., 570., 215.)),
            Field::Sumate => FieldSpec::new(field, r(460., 215., 570., 255.), r(460., 220., 570., 257.)),
            Field::Votexchi => FieldSpec::new(field, r(460., 254., 570., 300.), r(460., 265., 568., 300.)),
            Field::Chupacoto => FieldSpec::new(field, r(460., 290., 570., 350.), r(460., 310., 570., 350.)),
            Field::ValidVotes => FieldSpec::new(field, r(460., 370., 570., 420.), r(460., 380., 570., 420.)),
            Field::BlankVotes => FieldSpec::new(field, r(460., 420., 570., 465.), r(460., 420., 570., 465.)),
            Field::NullVotes => FieldSpec::new(field, r(460., 465., 570., 510.), r(460., 467., 570., 510.)),
        });
        Self { specs }
    }

    /// Build a catalog from a list of entries.
    ///
    /// Every field must appear exactly once with at least one rectangle in
    /// each coordinate space.
    pub fn from_specs(specs: Vec<FieldSpec>) -> Result<Self, ConfigError> {
        let mut slots: TallyFields<Option<FieldSpec>> = TallyFields::default();

        for spec in specs {
            let field = spec.field;
            for space in [CoordinateSpace::Text, CoordinateSpace::Raster] {
                if spec.regions(space).is_empty() {
                    return Err(ConfigError::NoRegions {
                        field,
                        space: space.name(),
                    });
                }
            }
            let slot = slots.get_mut(field);
            if slot.is_some() {
                return Err(ConfigError::DuplicateField(field));
            }
            *slot = Some(spec);
        }

        let specs = TallyFields::try_from_fn(|field| {
            slots.get_mut(field).take().ok_or(ConfigError::MissingField(field))
        })?;

        Ok(Self { specs })
    }

    /// Load a catalog from a JSON array of field entries.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let specs: Vec<FieldSpec> = serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let catalog = Self::from_specs(specs)?;
        debug!("Loaded region catalog from {}", path.display());
        Ok(catalog)
    }

    pub fn spec(&self, field: Field) -> &FieldSpec {
        self.specs.get(field)
    }

    pub fn regions(&self, field: Field, space: CoordinateSpace) -> &[Rect] {
        self.specs.get(field).regions(space)
    }

    pub fn rule(&self, field: Field, space: CoordinateSpace) -> Truncation {
        self.specs.get(field).rule(space)
    }

    /// All entries in sheet order.
    pub fn specs(&self) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.specs.iter().map(|(_, spec)| spec)
    }
}
