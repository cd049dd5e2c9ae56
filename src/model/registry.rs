//! Model registry
//!
//! A process-wide, startup-populated map from model name to `ModelDef`.
//! Unknown names are rejected when a definition is registered or looked
//! up, never at first field access. The registry also carries the
//! deployment's dependency order for batch moderation: when a batch
//! resolves identity audits for several models, a model listed earlier
//! (a container, e.g. a plot) is resolved before one listed later (the
//! entity it contains, e.g. a tree).

use std::collections::BTreeMap;

use super::errors::ModelError;
use super::types::{FieldDef, FieldKind, ModelDef};

/// Startup-populated registry of auditable models
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelDef>,
    dependency_order: Vec<String>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model definition.
    ///
    /// The definition is structurally validated and duplicate names are
    /// rejected. Models not named in the dependency order sort after all
    /// named ones, by name.
    pub fn register(&mut self, def: ModelDef) -> Result<(), ModelError> {
        def.validate_structure()?;
        if self.models.contains_key(&def.name) {
            return Err(ModelError::DuplicateModel(def.name));
        }
        self.models.insert(def.name.clone(), def);
        Ok(())
    }

    /// Set the batch-approval dependency order.
    ///
    /// Every listed name must already be registered.
    pub fn set_dependency_order<I, S>(&mut self, order: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = order.into_iter().map(Into::into).collect();
        for name in &order {
            if !self.models.contains_key(name) {
                return Err(ModelError::UnknownModel(name.clone()));
            }
        }
        self.dependency_order = order;
        Ok(())
    }

    /// Look up a model definition
    pub fn get(&self, name: &str) -> Result<&ModelDef, ModelError> {
        self.models
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// Whether a model name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Registered model names, sorted
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Rank of a model in the dependency order; unlisted models rank
    /// after all listed ones.
    pub fn dependency_rank(&self, name: &str) -> usize {
        self.dependency_order
            .iter()
            .position(|m| m == name)
            .unwrap_or(self.dependency_order.len())
    }

    /// The default inventory domain: geospatial plots and the trees
    /// planted in them, with the plot-before-tree dependency order.
    pub fn inventory() -> Self {
        let mut registry = Self::new();
        registry
            .register(
                ModelDef::new("plot")
                    .field(
                        "geom",
                        FieldDef::required(FieldKind::Point { srid: 3857 })
                            .with_display_name("Location"),
                    )
                    .field(
                        "width",
                        FieldDef::optional(FieldKind::Float).with_unit("ft"),
                    )
                    .field(
                        "length",
                        FieldDef::optional(FieldKind::Float).with_unit("ft"),
                    )
                    .field("address", FieldDef::optional(FieldKind::Text))
                    .with_creator_override(),
            )
            .expect("inventory plot model is well-formed");
        registry
            .register(
                ModelDef::new("tree")
                    .field(
                        "plot",
                        FieldDef::required(FieldKind::Reference {
                            model: "plot".into(),
                        }),
                    )
                    .field("species", FieldDef::optional(FieldKind::Text))
                    .field(
                        "diameter",
                        FieldDef::optional(FieldKind::Float).with_unit("in"),
                    )
                    .field(
                        "height",
                        FieldDef::optional(FieldKind::Float).with_unit("ft"),
                    )
                    .field("date_planted", FieldDef::optional(FieldKind::Timestamp))
                    .with_creator_override(),
            )
            .expect("inventory tree model is well-formed");
        registry
            .set_dependency_order(["plot", "tree"])
            .expect("inventory dependency order names registered models");
        registry
    }
}
