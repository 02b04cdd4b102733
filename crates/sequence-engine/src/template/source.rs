//! Where templates come from.

use std::collections::HashMap;

use async_trait::async_trait;

use super::types::{ObservationTemplates, TemplateSet};
use crate::error::EngineResult;
use crate::model::ObservationId;

/// Supplier of per-observation templates.
///
/// Implementations that consult an exposure time calculator or any other
/// upstream service report its failures as `EngineError::RemoteService`
/// (`anyhow::Error` converts into it); they are not retried.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Templates for the observation, `None` if it is unknown.
    async fn templates(
        &self,
        observation_id: ObservationId,
    ) -> EngineResult<Option<ObservationTemplates>>;
}

/// Template source backed by an already-parsed document.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateSource {
    templates: HashMap<ObservationId, ObservationTemplates>,
}

impl StaticTemplateSource {
    pub fn new(set: TemplateSet) -> EngineResult<Self> {
        set.validate()?;
        Ok(Self {
            templates: set
                .templates
                .into_iter()
                .map(|t| (t.observation_id, t))
                .collect(),
        })
    }

    /// Add or replace one observation's templates.
    pub fn insert(&mut self, templates: ObservationTemplates) -> EngineResult<()> {
        templates.validate()?;
        self.templates.insert(templates.observation_id, templates);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[async_trait]
impl TemplateSource for StaticTemplateSource {
    async fn templates(
        &self,
        observation_id: ObservationId,
    ) -> EngineResult<Option<ObservationTemplates>> {
        Ok(self.templates.get(&observation_id).cloned())
    }
}
