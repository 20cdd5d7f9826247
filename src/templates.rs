//! Pattern templates: the named structures the matcher tries, in priority order

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{detectors::Direction, PatternError, Ratio, Result};

/// Geometry a template is matched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryClass {
    /// Trough, neckline peak, second trough
    #[serde(rename = "W-SHAPE")]
    WShape,
    /// Peak, neckline trough, second peak
    #[serde(rename = "M-SHAPE")]
    MShape,
    /// Delegated to the candlestick catalog
    #[serde(rename = "CANDLESTICK-MICRO")]
    CandlestickMicro,
}

impl GeometryClass {
    pub fn label(self) -> &'static str {
        match self {
            GeometryClass::WShape => "W-SHAPE",
            GeometryClass::MShape => "M-SHAPE",
            GeometryClass::CandlestickMicro => "CANDLESTICK-MICRO",
        }
    }

    /// Implied direction of a macro geometry; neutral for micro
    pub fn direction(self) -> Direction {
        match self {
            GeometryClass::WShape => Direction::Bullish,
            GeometryClass::MShape => Direction::Bearish,
            GeometryClass::CandlestickMicro => Direction::Neutral,
        }
    }

    #[inline]
    pub fn is_macro(self) -> bool {
        !matches!(self, GeometryClass::CandlestickMicro)
    }
}

/// A named structure with its matching tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTemplate {
    pub id: Cow<'static, str>,
    pub display_name: Cow<'static, str>,
    pub geometry: GeometryClass,
    /// Swing pivots the window must show at least
    pub required_pivots: usize,
    /// Allowed relative deviation between the two extremes
    pub tolerance: Ratio,
    /// Similarity (percent) above which a high-confidence match locks
    pub lock_threshold: f64,
}

/// Two troughs within 3%, neckline peak between them
pub const DOUBLE_BOTTOM: PatternTemplate = PatternTemplate::new(
    "DOUBLE_BOTTOM",
    "DOUBLE BOTTOM",
    GeometryClass::WShape,
    3,
    0.03,
    90.0,
);

/// Two peaks within 3%, neckline trough between them
pub const DOUBLE_TOP: PatternTemplate = PatternTemplate::new(
    "DOUBLE_TOP",
    "DOUBLE TOP",
    GeometryClass::MShape,
    3,
    0.03,
    90.0,
);

/// Candlestick fallback; similarity is detector strength in percent
pub const CANDLESTICK_EDGE: PatternTemplate = PatternTemplate::new(
    "CANDLESTICK_EDGE",
    "CANDLESTICK EDGE",
    GeometryClass::CandlestickMicro,
    1,
    0.5,
    70.0,
);

impl PatternTemplate {
    pub const fn new(
        id: &'static str,
        display_name: &'static str,
        geometry: GeometryClass,
        required_pivots: usize,
        tolerance: f64,
        lock_threshold: f64,
    ) -> Self {
        Self {
            id: Cow::Borrowed(id),
            display_name: Cow::Borrowed(display_name),
            geometry,
            required_pivots,
            tolerance: Ratio::new_const(tolerance),
            lock_threshold,
        }
    }

    /// Similarity (percent) a match must strictly exceed
    #[inline]
    pub fn match_threshold(&self) -> f64 {
        (1.0 - self.tolerance.get()) * 100.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() || self.display_name.trim().is_empty() {
            return Err(PatternError::InvalidConfig(
                "template id and display_name must not be empty".into(),
            ));
        }
        Ratio::new(self.tolerance.get())?;
        if !(0.0..=100.0).contains(&self.lock_threshold) {
            return Err(PatternError::OutOfRange {
                field: "lock_threshold",
                value: self.lock_threshold,
                min: 0.0,
                max: 100.0,
            });
        }
        if self.geometry.is_macro() && self.required_pivots < 3 {
            return Err(PatternError::InvalidConfig(format!(
                "{}: macro templates need at least 3 pivots",
                self.id
            )));
        }
        Ok(())
    }
}

/// Ordered template list. Earlier macro templates win when several match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateCatalog {
    templates: Vec<PatternTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Double bottom, double top, candlestick edge
    pub fn with_defaults() -> Self {
        Self {
            templates: vec![DOUBLE_BOTTOM, DOUBLE_TOP, CANDLESTICK_EDGE],
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| PatternError::InvalidConfig(format!("template catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn push(&mut self, template: PatternTemplate) {
        self.templates.push(template);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PatternTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// W/M templates in priority order
    pub fn macro_templates(&self) -> impl Iterator<Item = &PatternTemplate> {
        self.templates.iter().filter(|t| t.geometry.is_macro())
    }

    /// First candlestick template, if any
    pub fn micro_template(&self) -> Option<&PatternTemplate> {
        self.templates
            .iter()
            .find(|t| t.geometry == GeometryClass::CandlestickMicro)
    }

    pub fn validate(&self) -> Result<()> {
        for (i, template) in self.templates.iter().enumerate() {
            template.validate()?;
            if self.templates[..i].iter().any(|t| t.id == template.id) {
                return Err(PatternError::InvalidConfig(format!(
                    "duplicate template id {}",
                    template.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let catalog = TemplateCatalog::with_defaults();
        assert!(catalog.validate().is_ok());
        let ids: Vec<&str> = catalog.macro_templates().map(|t| t.id.as_ref()).collect();
        assert_eq!(ids, vec!["DOUBLE_BOTTOM", "DOUBLE_TOP"]);
        assert_eq!(catalog.micro_template().map(|t| t.id.as_ref()), Some("CANDLESTICK_EDGE"));
        assert!((DOUBLE_BOTTOM.match_threshold() - 97.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut catalog = TemplateCatalog::with_defaults();
        catalog.push(DOUBLE_TOP);
        assert!(matches!(catalog.validate(), Err(PatternError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json() {
        let json = r#"[{
            "id": "WIDE_BOTTOM",
            "display_name": "WIDE DOUBLE BOTTOM",
            "geometry": "W-SHAPE",
            "required_pivots": 3,
            "tolerance": 0.06,
            "lock_threshold": 95.0
        }]"#;
        let catalog = TemplateCatalog::from_json(json).unwrap();
        let template = catalog.get("WIDE_BOTTOM").unwrap();
        assert_eq!(template.geometry, GeometryClass::WShape);
        assert!((template.match_threshold() - 94.0).abs() < 1e-9);

        let bad_tolerance = json.replace("0.06", "1.5");
        assert!(TemplateCatalog::from_json(&bad_tolerance).is_err());
    }

    #[test]
    fn test_macro_needs_three_pivots() {
        let mut template = DOUBLE_BOTTOM;
        template.required_pivots = 2;
        assert!(template.validate().is_err());
    }
}
