//! Value rendering hooks
//!
//! The presentation layer renders audit values through a pluggable
//! `ValueRenderer`; dimensioned fields (lengths, diameters) get their
//! unit labels from the field definition. The engine itself never
//! depends on rendered output.

use crate::model::ModelDef;

/// Pluggable rendering seam for serialized audit values
pub trait ValueRenderer: Send + Sync {
    /// Render one serialized value for display
    fn render(&self, model: &ModelDef, field: &str, raw: &str) -> String;
}

/// Renders the serialized text unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainRenderer;

impl ValueRenderer for PlainRenderer {
    fn render(&self, _model: &ModelDef, _field: &str, raw: &str) -> String {
        raw.to_string()
    }
}

/// Appends the field's declared unit label, when one exists
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitRenderer;

impl ValueRenderer for UnitRenderer {
    fn render(&self, model: &ModelDef, field: &str, raw: &str) -> String {
        match model.fields.get(field).and_then(|def| def.unit.as_deref()) {
            Some(unit) => format!("{} {}", raw, unit),
            None => raw.to_string(),
        }
    }
}

/// Title-case a snake_case field name: `date_planted` → `Date Planted`
pub fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
